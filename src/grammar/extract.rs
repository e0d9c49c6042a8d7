//! Populate the grammar model from the description syntax tree.
//!
//! The walk is a single pass. Every handler matches one node kind; a kind no handler claims is
//! an internal logic error, not a user mistake. Rule-level EBNF (`?`, `*`, `+`, groups and
//! `::^` precedence declarations) is desugared here into auxiliary nonterminals whose rules
//! carry synthesized AST formers.

use super::syntax::{leaf, literal_regex, node, null_node, GramKind};
use super::{Assoc, Grammar, RuleId, SymbolId};
use crate::errors::ErrorSink;
use crate::{DiagnosticKind, Location, SynTree, NO_LOCATION};
use std::collections::{BTreeMap, BTreeSet};

pub struct Extractor<'sink> {
    sink: &'sink mut ErrorSink,
    aux_counters: BTreeMap<String, usize>,
}

/// Extract the grammar model from a parsed description. Diagnostics go to the sink; the
/// caller checks the error count afterwards.
pub fn extract(gram: &mut Grammar, root: &SynTree, sink: &mut ErrorSink) {
    let mut extractor = Extractor {
        sink,
        aux_counters: BTreeMap::new(),
    };
    extractor.handle_grammar(gram, root);
}

impl<'sink> Extractor<'sink> {
    fn handle_grammar(&mut self, gram: &mut Grammar, root: &SynTree) {
        if GramKind::of(root) != GramKind::Grammar || root.children.len() != 3 {
            self.handle_error(root);
            return;
        }

        self.handle_option_list(gram, &root.children[0]);
        self.handle_token_list(gram, &root.children[1]);
        self.handle_rule_list(gram, &root.children[2]);

        self.install_whitespace(gram);
    }

    /// This should never fire. It means the front end produced a node this walk does not
    /// accommodate, which is a logic error rather than a user error.
    fn handle_error(&mut self, root: &SynTree) {
        panic!(
            "No grammar extraction handler for node kind {}",
            GramKind::of(root).name()
        );
    }

    //
    //  Global options
    //

    fn handle_option_list(&mut self, gram: &mut Grammar, list: &SynTree) {
        let mut seen: BTreeSet<i64> = BTreeSet::new();

        for option in &list.children {
            let kind = GramKind::of(option);

            if !seen.insert(option.kind) {
                self.sink.add_error(
                    DiagnosticKind::DupGrammarOption,
                    option.location,
                    format!("Grammar option '{}' is set more than once.", kind.name()),
                );
                continue;
            }

            let value = match option.children.first() {
                Some(value) => value,
                None => continue,
            };

            match kind {
                GramKind::Lookaheads => gram.max_lookaheads = integer_value(value),
                GramKind::Conflicts => gram.expected_conflicts = integer_value(value),
                GramKind::ErrorRecovery => gram.error_recovery = bool_value(value),
                GramKind::KeepWhitespace => gram.keep_whitespace = bool_value(value),
                GramKind::CaseSensitive => gram.case_sensitive = bool_value(value),
                _ => self.handle_error(option),
            }
        }
    }

    //
    //  Token declarations
    //

    fn handle_token_list(&mut self, gram: &mut Grammar, list: &SynTree) {
        for declaration in &list.children {
            if GramKind::of(declaration) != GramKind::TokenDeclaration {
                self.handle_error(declaration);
                continue;
            }
            self.handle_token_declaration(gram, declaration);
        }
    }

    fn handle_token_declaration(&mut self, gram: &mut Grammar, declaration: &SynTree) {
        let name_node = &declaration.children[0];
        let options = &declaration.children[1];
        let name = name_node.lexeme.clone();

        // template tokens exist only as regex macros, which the front end has already expanded
        let is_template = options.children.iter().any(|o| {
            GramKind::of(o) == GramKind::TokenTemplate
                && o.children.first().map_or(false, bool_value)
        });
        if is_template {
            return;
        }

        if let Some(existing) = gram.get_symbol(&name) {
            let symbol = gram.symbol(existing);
            if symbol.is_scanned || symbol.is_nonterminal {
                self.sink.add_error(
                    DiagnosticKind::DupToken,
                    declaration.location,
                    format!("Token '{}' is already declared.", name),
                );
                return;
            }
        }

        let id = gram.get_or_create_terminal(&name, declaration.location);
        {
            let symbol = gram.symbol_mut(id);
            symbol.is_scanned = true;
            symbol.location = declaration.location;
        }

        let mut seen: BTreeSet<i64> = BTreeSet::new();
        for option in &options.children {
            let kind = GramKind::of(option);

            if kind == GramKind::TokenTemplate {
                continue;
            }

            if !seen.insert(option.kind) {
                self.sink.add_error(
                    DiagnosticKind::DupTokenOption,
                    option.location,
                    format!(
                        "Token option '{}' is given more than once on '{}'.",
                        kind.name(),
                        name
                    ),
                );
                continue;
            }

            let symbol = gram.symbol_mut(id);
            match kind {
                GramKind::TokenRegexList => {
                    symbol.regex_list = Some(option.clone());
                }
                GramKind::TokenDescription => {
                    symbol.description = lexeme_value(option);
                }
                GramKind::TokenPrecedence => {
                    symbol.precedence = option
                        .children
                        .first()
                        .map_or(100, |v| integer_value(v) as i32);
                }
                GramKind::TokenAction => {
                    symbol.action = option.children.first().cloned();
                }
                GramKind::TokenLexeme => {
                    symbol.lexeme_needed = option.children.first().map_or(false, bool_value);
                }
                GramKind::TokenIgnore => {
                    symbol.is_ignored = option.children.first().map_or(false, bool_value);
                }
                GramKind::TokenError => {
                    symbol.is_error = true;
                    symbol.error_message = lexeme_value(option);
                }
                _ => self.handle_error(option),
            }
        }

        // tokens with a real regex keep their lexeme unless told otherwise
        if !seen.contains(&(GramKind::TokenLexeme as i64)) {
            let symbol = gram.symbol_mut(id);
            if symbol.regex_list.is_some() {
                symbol.lexeme_needed = true;
            }
        }
    }

    /// A scanner needs something to do with blanks even when the grammar never mentions them.
    fn install_whitespace(&mut self, gram: &mut Grammar) {
        if gram.keep_whitespace || gram.get_symbol("<whitespace>").is_some() {
            return;
        }

        let mut scratch = crate::errors::ErrorSink::new(crate::SourceText::new(String::new()));
        let regex = super::syntax::parse_standalone_regex(r"\s+", &mut scratch);

        let id = gram.get_or_create_terminal("<whitespace>", NO_LOCATION);
        let symbol = gram.symbol_mut(id);
        symbol.is_scanned = true;
        symbol.is_ignored = true;
        symbol.is_regex_synthesized = true;
        symbol.regex_list = Some(node(
            GramKind::TokenRegexList,
            NO_LOCATION,
            vec![node(
                GramKind::TokenRegex,
                NO_LOCATION,
                vec![null_node(), regex],
            )],
        ));
    }

    //
    //  Rules
    //

    fn handle_rule_list(&mut self, gram: &mut Grammar, list: &SynTree) {
        for rule in &list.children {
            match GramKind::of(rule) {
                GramKind::Rule => self.handle_rule(gram, rule),
                GramKind::RulePrecedence => self.handle_rule_precedence(gram, rule),
                _ => self.handle_error(rule),
            }
        }
    }

    fn handle_rule(&mut self, gram: &mut Grammar, rule: &SynTree) {
        let lhs_node = &rule.children[0];
        let alternatives = &rule.children[1];

        let lhs = gram.get_or_create_nonterminal(&lhs_node.lexeme, lhs_node.location);

        for alternative in &alternatives.children {
            let rule_id = self.handle_rule_rhs(gram, lhs, alternative);
            if gram.start_rule.is_none() {
                gram.start_rule = Some(rule_id);
            }
        }
    }

    fn handle_rule_rhs(
        &mut self,
        gram: &mut Grammar,
        lhs: SymbolId,
        alternative: &SynTree,
    ) -> RuleId {
        let rule_id = gram.add_rule(lhs, alternative.location);
        let lhs_name = gram.symbol(lhs).symbol_name.clone();

        for item in &alternative.children {
            match GramKind::of(item) {
                GramKind::AstFormer | GramKind::AstChild => {
                    gram.rule_mut(rule_id).ast_former = Some(item.clone());
                }
                GramKind::ActionStatementList => {
                    gram.rule_mut(rule_id).action = Some(item.clone());
                }
                GramKind::Empty => {}
                _ => {
                    if let Some(symbol) = self.handle_rhs_item(gram, &lhs_name, item) {
                        gram.rule_mut(rule_id).rhs.push(symbol);
                    }
                }
            }
        }

        rule_id
    }

    /// Resolve one rhs item to a symbol, desugaring closures and groups into auxiliaries.
    fn handle_rhs_item(
        &mut self,
        gram: &mut Grammar,
        lhs_name: &str,
        item: &SynTree,
    ) -> Option<SymbolId> {
        match GramKind::of(item) {
            GramKind::TerminalReference => {
                Some(self.handle_terminal_reference(gram, item))
            }
            GramKind::NonterminalReference => {
                Some(gram.get_or_create_nonterminal(&item.lexeme, item.location))
            }
            GramKind::Optional => {
                let inner = self.handle_rhs_item(gram, lhs_name, &item.children[0])?;
                Some(self.desugar_optional(gram, lhs_name, inner, item.location))
            }
            GramKind::ZeroClosure => {
                let inner = self.handle_rhs_item(gram, lhs_name, &item.children[0])?;
                Some(self.desugar_closure(gram, lhs_name, inner, item.location, true))
            }
            GramKind::OneClosure => {
                let inner = self.handle_rhs_item(gram, lhs_name, &item.children[0])?;
                Some(self.desugar_closure(gram, lhs_name, inner, item.location, false))
            }
            GramKind::Group => {
                Some(self.desugar_group(gram, lhs_name, item))
            }
            _ => {
                self.handle_error(item);
                None
            }
        }
    }

    fn handle_terminal_reference(&mut self, gram: &mut Grammar, item: &SynTree) -> SymbolId {
        let name = &item.lexeme;
        let id = gram.get_or_create_terminal(name, item.location);

        // a quoted literal used directly in a rule scans as exactly that text
        if name.starts_with('\'') {
            let symbol = gram.symbol_mut(id);
            if symbol.regex_list.is_none() {
                let literal = unquote(name);
                let regex = literal_regex(&literal, item.location);
                symbol.regex_list = Some(node(
                    GramKind::TokenRegexList,
                    item.location,
                    vec![node(
                        GramKind::TokenRegex,
                        item.location,
                        vec![null_node(), regex],
                    )],
                ));
                symbol.is_regex_synthesized = true;
                symbol.is_scanned = true;
            }
        }

        id
    }

    fn next_aux(&mut self, gram: &mut Grammar, lhs_name: &str, location: Location) -> SymbolId {
        let counter = self.aux_counters.entry(lhs_name.to_string()).or_insert(0);
        *counter += 1;
        let name = format!("{}:{}", lhs_name, counter);
        gram.get_or_create_nonterminal(&name, location)
    }

    /// `X?`: one rule deriving the item and one deriving nothing. Default reduce behavior
    /// hoists the single item and supplies a null tree for the empty derivation.
    fn desugar_optional(
        &mut self,
        gram: &mut Grammar,
        lhs_name: &str,
        inner: SymbolId,
        location: Location,
    ) -> SymbolId {
        let aux = self.next_aux(gram, lhs_name, location);

        let some_rule = gram.add_rule(aux, location);
        gram.rule_mut(some_rule).rhs.push(inner);

        gram.add_rule(aux, location);

        aux
    }

    /// `X*` and `X+`: a left-recursive pair whose synthesized formers accumulate every
    /// element as a child of the auxiliary node, ready for splicing with `$n._`.
    fn desugar_closure(
        &mut self,
        gram: &mut Grammar,
        lhs_name: &str,
        inner: SymbolId,
        location: Location,
        nullable: bool,
    ) -> SymbolId {
        let aux = self.next_aux(gram, lhs_name, location);

        let base_rule = gram.add_rule(aux, location);
        if nullable {
            let rule = gram.rule_mut(base_rule);
            rule.ast_former = Some(node(GramKind::AstFormer, location, vec![]));
            rule.is_former_synthesized = true;
        } else {
            let rule = gram.rule_mut(base_rule);
            rule.rhs.push(inner);
            rule.ast_former = Some(node(
                GramKind::AstFormer,
                location,
                vec![child_reference(1, location)],
            ));
            rule.is_former_synthesized = true;
        }

        let step_rule = gram.add_rule(aux, location);
        {
            let rule = gram.rule_mut(step_rule);
            rule.rhs.push(aux);
            rule.rhs.push(inner);
            rule.ast_former = Some(node(
                GramKind::AstFormer,
                location,
                vec![child_splice(1, location), child_reference(2, location)],
            ));
            rule.is_former_synthesized = true;
        }

        aux
    }

    /// `( alt | alt … )`: an auxiliary with one rule per alternative.
    fn desugar_group(&mut self, gram: &mut Grammar, lhs_name: &str, group: &SynTree) -> SymbolId {
        let aux = self.next_aux(gram, lhs_name, group.location);
        let alternatives = &group.children[0];

        for alternative in &alternatives.children {
            self.handle_rule_rhs(gram, aux, alternative);
        }

        aux
    }

    //
    //  Precedence climbing declarations
    //

    fn handle_rule_precedence(&mut self, gram: &mut Grammar, rule: &SynTree) {
        let lhs_node = &rule.children[0];
        let operand_rhs = &rule.children[1];
        let operator_list = &rule.children[2];

        let lhs = gram.get_or_create_nonterminal(&lhs_node.lexeme, lhs_node.location);
        let lhs_name = lhs_node.lexeme.clone();

        // resolve the operand to a single symbol
        let operand = if operand_rhs.children.len() == 1 {
            self.handle_rhs_item(gram, &lhs_name, &operand_rhs.children[0])
        } else {
            let aux = self.next_aux(gram, &lhs_name, operand_rhs.location);
            self.handle_rule_rhs(gram, aux, operand_rhs);
            Some(aux)
        };
        let operand = match operand {
            Some(operand) => operand,
            None => return,
        };

        // groups are listed tightest first; the lhs itself is the loosest level
        let group_count = operator_list.children.len();
        let mut levels: Vec<SymbolId> = vec![lhs];
        for _ in 1..group_count {
            let aux = self.next_aux(gram, &lhs_name, rule.location);
            levels.push(aux);
        }
        levels.push(operand);
        // levels[0] is loosest and pairs with the last group

        for (group_index, spec) in operator_list.children.iter().enumerate().rev() {
            let level_index = group_count - 1 - group_index;
            let level = levels[level_index];
            let tighter = levels[level_index + 1];

            let assoc = match GramKind::of(&spec.children[0]) {
                GramKind::RuleRightAssoc => Assoc::Right,
                _ => Assoc::Left,
            };
            let precedence = (group_count - group_index) as i32;

            for op in spec.children.iter().skip(1) {
                let op_symbol = self.handle_terminal_reference(gram, op);
                gram.operator_prec.insert(op_symbol, (precedence, assoc));

                let binary = gram.add_rule(level, op.location);
                let rule = gram.rule_mut(binary);
                match assoc {
                    Assoc::Left => {
                        rule.rhs.push(level);
                        rule.rhs.push(op_symbol);
                        rule.rhs.push(tighter);
                    }
                    Assoc::Right => {
                        rule.rhs.push(tighter);
                        rule.rhs.push(op_symbol);
                        rule.rhs.push(level);
                    }
                }
                rule.ast_former = Some(operator_former(op.location));
                rule.is_former_synthesized = true;
                rule.op_prec = Some((precedence, assoc));
            }

            // pass-through to the next tighter level
            let through = gram.add_rule(level, rule.location);
            gram.rule_mut(through).rhs.push(tighter);

            if gram.start_rule.is_none() {
                gram.start_rule = Some(through);
            }
        }

        if gram.start_rule.is_none() {
            let fallback = gram.add_rule(lhs, rule.location);
            gram.rule_mut(fallback).rhs.push(operand);
            gram.start_rule = Some(fallback);
        }
    }
}

//
//  Former synthesis helpers
//

/// `$n` as a former item.
fn child_reference(index: i64, location: Location) -> SynTree {
    node(
        GramKind::AstChild,
        location,
        vec![
            node(
                GramKind::AstDot,
                location,
                vec![leaf(GramKind::Integer, &index.to_string(), location)],
            ),
            null_node(),
        ],
    )
}

/// `$n._` as a former item: every child of the n-th rhs tree.
fn child_splice(index: i64, location: Location) -> SynTree {
    node(
        GramKind::AstChild,
        location,
        vec![
            node(
                GramKind::AstDot,
                location,
                vec![leaf(GramKind::Integer, &index.to_string(), location)],
            ),
            node(
                GramKind::AstSlice,
                location,
                vec![
                    leaf(GramKind::Integer, "1", location),
                    leaf(GramKind::NegativeInteger, "1", location),
                ],
            ),
        ],
    )
}

/// `(%$2, $1, $3)`: a binary operator node taking its kind from the operator leaf.
fn operator_former(location: Location) -> SynTree {
    node(
        GramKind::AstFormer,
        location,
        vec![
            node(
                GramKind::AstKind,
                location,
                vec![node(
                    GramKind::AstDot,
                    location,
                    vec![leaf(GramKind::Integer, "2", location)],
                )],
            ),
            child_reference(1, location),
            child_reference(3, location),
        ],
    )
}

fn integer_value(value: &SynTree) -> i64 {
    match GramKind::of(value) {
        GramKind::Integer => value.lexeme.parse().unwrap_or(0),
        GramKind::NegativeInteger => -value.lexeme.parse().unwrap_or(0),
        _ => 0,
    }
}

fn bool_value(value: &SynTree) -> bool {
    GramKind::of(value) == GramKind::True
}

fn lexeme_value(option: &SynTree) -> String {
    option
        .children
        .first()
        .map(|c| c.lexeme.clone())
        .unwrap_or_default()
}

fn unquote(name: &str) -> String {
    let inner = &name[1..name.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
