//! The parser facade.
//!
//! [Parser] is a state machine around the generation pipeline and the virtual machine. A
//! facade starts `Invalid`, acquires a grammar through [Parser::generate] or [Parser::decode],
//! and parses sources while the grammar is good. Illegal operations for the current state
//! return an [ImplementationError]; failed operations move the machine into the matching bad
//! state with diagnostics available from [Parser::get_error_messages].

use crate::engine::ParserEngine;
use crate::errors::ErrorSink;
use crate::grammar::{editor, extract, syntax, Grammar, SymbolId};
use crate::icode::CodeBuilder;
use crate::parser_data::TokenData;
use crate::{
    lalr, reduce, scanner::ScannerGenerator, Diagnostic, DiagnosticKind, GrammarError,
    ImplementationError, Location, Log, ParseError, Parser, ParserData, ParserState, SourceText,
    SynTree,
};
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Invalid,
            data: None,
            sink: None,
            ast: None,
            pending_kind_map: None,
            log: OnceCell::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_grammar_loaded(&self) -> bool {
        matches!(
            self.state,
            ParserState::GrammarGood | ParserState::SourceGood | ParserState::SourceBad
        )
    }

    pub fn is_grammar_failed(&self) -> bool {
        self.state == ParserState::GrammarBad
    }

    pub fn is_source_loaded(&self) -> bool {
        self.state == ParserState::SourceGood
    }

    pub fn is_source_failed(&self) -> bool {
        self.state == ParserState::SourceBad
    }

    /// Set a log label to trace the generation stages; [Log::Detail] adds measurements.
    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("Log label {} is already assigned.", err))
    }

    fn log_progress(&self, stage: &str) {
        if let Some(log) = self.log.get() {
            log.log_progress(stage);
        }
    }

    fn log_verbose(&self, detail: &str) {
        if let Some(log) = self.log.get() {
            log.log_verbose(detail);
        }
    }

    /// Install a kind map before generating or decoding, pinning kind numbers so several
    /// parsers can share them.
    pub fn set_kind_map(
        &mut self,
        kind_map: BTreeMap<String, i64>,
    ) -> Result<(), ImplementationError> {
        if self.state != ParserState::Invalid {
            return Err(ImplementationError::state_error("set_kind_map"));
        }
        self.pending_kind_map = Some(kind_map);
        self.state = ParserState::KindMapGood;
        Ok(())
    }

    /// Generate a parser from a grammar description. On failure the facade moves to
    /// `GrammarBad` and the diagnostics stay readable.
    pub fn generate(&mut self, grammar_text: &str) -> Result<(), GrammarError> {
        // leaving any prior state frees its resources
        self.data = None;
        self.sink = None;
        self.ast = None;
        if self.state != ParserState::KindMapGood {
            self.state = ParserState::Invalid;
        }

        let mut sink = ErrorSink::new(SourceText::from(grammar_text));
        let mut prsd = ParserData::new();
        if let Some(pending) = &self.pending_kind_map {
            prsd.kind_map.install(pending);
        }
        prsd.src = grammar_text.to_string();

        let outcome = self.run_pipeline(grammar_text, &mut prsd, &mut sink);

        match outcome {
            Ok(()) => {
                self.sink = Some(sink);
                self.data = Some(Rc::new(prsd));
                self.state = ParserState::GrammarGood;
                Ok(())
            }
            Err(err) => {
                self.sink = Some(sink);
                self.state = ParserState::GrammarBad;
                Err(err)
            }
        }
    }

    fn run_pipeline(
        &self,
        grammar_text: &str,
        prsd: &mut ParserData,
        sink: &mut ErrorSink,
    ) -> Result<(), GrammarError> {
        let check = |sink: &ErrorSink| -> Result<(), GrammarError> {
            if sink.error_count() > 0 {
                Err(GrammarError::new("Grammar errors".to_string()))
            } else {
                Ok(())
            }
        };

        self.log_progress("reading grammar");
        let src = SourceText::from(grammar_text);
        let root = syntax::parse_grammar(&src, sink)
            .ok_or_else(|| GrammarError::new("Grammar errors".to_string()))?;
        check(sink)?;

        self.log_progress("extracting grammar");
        let mut gram = Grammar::new();
        extract::extract(&mut gram, &root, sink);
        check(sink)?;

        self.log_progress("editing grammar");
        editor::edit(&mut gram, sink);
        check(sink)?;

        let mut code = CodeBuilder::new();

        self.log_progress("building parse tables");
        lalr::generate(&gram, prsd, sink);
        check(sink)?;

        self.log_progress("generating scanner");
        let scan_label = {
            let mut scan = ScannerGenerator::new(&gram, &mut code, sink);
            scan.generate();
            scan.scan_label
        };
        check(sink)?;

        self.log_progress("generating reduce actions");
        let rule_labels = reduce::generate(&gram, &mut code, prsd, sink);
        check(sink)?;

        self.log_progress("optimizing and encoding");
        code.generate(prsd);
        check(sink)?;
        self.log_verbose(&format!(
            "{} instructions over {} operands, {} registers",
            prsd.instruction_list.len(),
            prsd.operand_list.len(),
            prsd.register_list.len()
        ));

        // everything that needed laid-out label addresses
        prsd.scanner_pc = scan_label.map_or(-1, |label| code.label_pc(label));
        prsd.prolog_pc = code.label_pc(code.prolog_label());

        prsd.rule_pc = rule_labels
            .iter()
            .map(|label| label.map_or(-1, |label| code.label_pc(label)))
            .collect();
        prsd.rule_lhs = Vec::with_capacity(gram.rule_count());
        prsd.rule_rhs_len = Vec::with_capacity(gram.rule_count());
        for index in 0..gram.rule_count() {
            let rule = gram.rule(crate::grammar::RuleId(index));
            prsd.rule_lhs.push(gram.symbol(rule.lhs).symbol_num as i64);
            prsd.rule_rhs_len.push(rule.rhs.len() as i64);
        }

        for index in 0..gram.symbol_count() {
            let symbol = gram.symbol(SymbolId(index));
            let kind = if symbol.is_terminal && !symbol.is_deleted {
                prsd.kind_map.get_kind_force(&symbol.symbol_name)
            } else {
                syntax::GramKind::Null as i64
            };
            prsd.token_list.push(TokenData {
                name: symbol.symbol_name.clone(),
                description: symbol.description.clone(),
                kind,
                is_terminal: symbol.is_terminal,
                lexeme_needed: symbol.lexeme_needed,
            });
        }

        Ok(())
    }

    /// Parse a source document with the generated machinery.
    pub fn parse(&mut self, source_text: &str) -> Result<SynTree, ParseError> {
        let data = match (&self.state, &self.data) {
            (
                ParserState::GrammarGood | ParserState::SourceGood | ParserState::SourceBad,
                Some(data),
            ) => data.clone(),
            _ => {
                return Err(ParseError::new(
                    0,
                    "No generated grammar is loaded.".to_string(),
                ))
            }
        };

        // leaving a prior source state frees its tree
        self.ast = None;

        let mut sink = ErrorSink::new(SourceText::from(source_text));
        let tree = {
            let mut engine = ParserEngine::new(&data, &mut sink);
            engine.parse()
        };

        let failed = sink.error_count() > 0 || tree.is_none();
        if failed {
            let (pointer, message) = sink
                .get_error_messages()
                .iter()
                .find(|m| m.is_error())
                .map(|m| (m.location.max(0) as usize, m.short_message.clone()))
                .unwrap_or((0, "Parse failed.".to_string()));
            self.sink = Some(sink);
            self.state = ParserState::SourceBad;
            return Err(ParseError::new(pointer, message));
        }

        let tree = tree.unwrap_or_else(SynTree::null);
        self.sink = Some(sink);
        self.ast = Some(tree.clone());
        self.state = ParserState::SourceGood;
        Ok(tree)
    }

    /// Serialize the generated parser to a reloadable text artifact.
    pub fn encode(&self) -> Result<String, ImplementationError> {
        match (&self.state, &self.data) {
            (
                ParserState::GrammarGood | ParserState::SourceGood | ParserState::SourceBad,
                Some(data),
            ) => Ok(data.encode()),
            _ => Err(ImplementationError::state_error("encode")),
        }
    }

    /// Reload a parser from an encoded artifact.
    pub fn decode(&mut self, blob: &str) -> Result<(), ImplementationError> {
        let prsd = ParserData::decode(blob)?;

        if let Some(pending) = &self.pending_kind_map {
            for (name, kind) in pending {
                if let Some(stored) = prsd.kind_map.get_kind(name) {
                    if stored != *kind {
                        return Err(ImplementationError::decode_error(format!(
                            "Kind '{}' is {} in the artifact but {} in the kind map.",
                            name, stored, kind
                        )));
                    }
                }
            }
        }

        self.sink = Some(ErrorSink::new(SourceText::from(prsd.src.as_str())));
        self.data = Some(Rc::new(prsd));
        self.ast = None;
        self.state = ParserState::GrammarGood;
        Ok(())
    }

    /// The tree of the last successful parse.
    pub fn get_ast(&self) -> Result<&SynTree, ImplementationError> {
        match (&self.state, &self.ast) {
            (ParserState::SourceGood, Some(ast)) => Ok(ast),
            _ => Err(ImplementationError::state_error("get_ast")),
        }
    }

    pub fn get_error_messages(&self) -> Result<Vec<Diagnostic>, ImplementationError> {
        match &self.sink {
            Some(sink) => Ok(sink.get_error_messages()),
            None => Err(ImplementationError::state_error("get_error_messages")),
        }
    }

    pub fn get_error_count(&self) -> Result<usize, ImplementationError> {
        match &self.sink {
            Some(sink) => Ok(sink.error_count()),
            None => Err(ImplementationError::state_error("get_error_count")),
        }
    }

    pub fn get_warning_count(&self) -> Result<usize, ImplementationError> {
        match &self.sink {
            Some(sink) => Ok(sink.warning_count()),
            None => Err(ImplementationError::state_error("get_warning_count")),
        }
    }

    /// Record an outside diagnostic against the current source.
    pub fn add_error(
        &mut self,
        kind: DiagnosticKind,
        location: Location,
        message: String,
    ) -> Result<(), ImplementationError> {
        match &mut self.sink {
            Some(sink) => {
                sink.add_error(kind, location, message);
                Ok(())
            }
            None => Err(ImplementationError::state_error("add_error")),
        }
    }

    /// The source interleaved with caret-pointed diagnostics.
    pub fn get_source_list(&self) -> Result<String, ImplementationError> {
        match &self.sink {
            Some(sink) => Ok(sink.source_list()),
            None => Err(ImplementationError::state_error("get_source_list")),
        }
    }

    pub fn get_kind(&self, name: &str) -> Result<Option<i64>, ImplementationError> {
        match &self.data {
            Some(data) => Ok(data.get_kind(name)),
            None => Err(ImplementationError::state_error("get_kind")),
        }
    }

    pub fn get_kind_string(&self, kind: i64) -> Result<Option<String>, ImplementationError> {
        match &self.data {
            Some(data) => Ok(data.get_kind_string(kind).map(|s| s.to_string())),
            None => Err(ImplementationError::state_error("get_kind_string")),
        }
    }

    /// Every user kind the grammar registered, by name.
    pub fn get_kind_map(&self) -> Result<BTreeMap<String, i64>, ImplementationError> {
        match &self.data {
            Some(data) => Ok(data.kind_map.user_pairs().into_iter().collect()),
            None => Err(ImplementationError::state_error("get_kind_map")),
        }
    }

    /// The shared artifact, for building further facades over the same frozen grammar.
    pub fn parser_data(&self) -> Option<Rc<ParserData>> {
        self.data.clone()
    }

    /// Build a facade directly over a frozen artifact shared with another parser.
    pub fn attach(data: Rc<ParserData>) -> Self {
        let sink = ErrorSink::new(SourceText::from(data.src.as_str()));
        Self {
            state: ParserState::GrammarGood,
            data: Some(data),
            sink: Some(sink),
            ast: None,
            pending_kind_map: None,
            log: OnceCell::new(),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
