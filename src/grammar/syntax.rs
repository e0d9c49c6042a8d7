//! Front end for the grammar description language.
//!
//! The reader tokenizes the grammar text with anchored regular expressions, then builds the
//! grammar syntax tree by recursive descent. Token regular expressions and character classes
//! are parsed here too, so the extraction phase only ever sees finished subtrees. Syntax
//! problems are recorded as [Syntax](crate::DiagnosticKind::Syntax) diagnostics and the reader
//! returns `None` once the token stream is exhausted or unrecoverable.

use crate::errors::ErrorSink;
use crate::{DiagnosticKind, Location, SourceText, SynTree, NO_LOCATION};
use regex::bytes::Regex;
use std::collections::BTreeMap;

/// Syntactic categories of the grammar description language. These occupy the reserved kind
/// range below [GRAM_KIND_BOUNDARY]; user grammars allocate their kinds above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i64)]
pub enum GramKind {
    Unknown = 0,
    Null,
    Grammar,
    OptionList,
    TokenList,
    RuleList,
    Lookaheads,
    ErrorRecovery,
    Conflicts,
    KeepWhitespace,
    CaseSensitive,
    TokenDeclaration,
    TokenOptionList,
    TokenTemplate,
    TokenDescription,
    TokenRegexList,
    TokenRegex,
    TokenPrecedence,
    TokenAction,
    TokenLexeme,
    TokenIgnore,
    TokenError,
    Rule,
    RuleRhsList,
    RuleRhs,
    Optional,
    ZeroClosure,
    OneClosure,
    Group,
    RulePrecedence,
    RuleOperatorList,
    RuleOperatorSpec,
    RuleLeftAssoc,
    RuleRightAssoc,
    TerminalReference,
    NonterminalReference,
    Empty,
    AstFormer,
    AstChild,
    AstKind,
    AstLocation,
    AstLocationString,
    AstLexeme,
    AstLexemeString,
    AstDot,
    AstSlice,
    Identifier,
    Integer,
    NegativeInteger,
    LitString,
    True,
    False,
    Regex,
    RegexOr,
    RegexList,
    RegexOptional,
    RegexZeroClosure,
    RegexOneClosure,
    RegexChar,
    RegexWildcard,
    RegexWhitespace,
    RegexNotWhitespace,
    RegexDigits,
    RegexNotDigits,
    Charset,
    CharsetInvert,
    CharsetRange,
    CharsetChar,
    CharsetWhitespace,
    CharsetNotWhitespace,
    CharsetDigits,
    CharsetNotDigits,
    ActionStatementList,
    ActionAssign,
    ActionEqual,
    ActionNotEqual,
    ActionLessThan,
    ActionLessEqual,
    ActionGreaterThan,
    ActionGreaterEqual,
    ActionAdd,
    ActionSubtract,
    ActionMultiply,
    ActionDivide,
    ActionUnaryMinus,
    ActionAnd,
    ActionOr,
    ActionNot,
    ActionDumpStack,
    ActionTokenCount,
}

/// One past the largest grammar kind; the first kind number available to user grammars.
pub const GRAM_KIND_BOUNDARY: i64 = GramKind::ActionTokenCount as i64 + 1;

static GRAM_KIND_LIST: &[GramKind] = &[
    GramKind::Unknown,
    GramKind::Null,
    GramKind::Grammar,
    GramKind::OptionList,
    GramKind::TokenList,
    GramKind::RuleList,
    GramKind::Lookaheads,
    GramKind::ErrorRecovery,
    GramKind::Conflicts,
    GramKind::KeepWhitespace,
    GramKind::CaseSensitive,
    GramKind::TokenDeclaration,
    GramKind::TokenOptionList,
    GramKind::TokenTemplate,
    GramKind::TokenDescription,
    GramKind::TokenRegexList,
    GramKind::TokenRegex,
    GramKind::TokenPrecedence,
    GramKind::TokenAction,
    GramKind::TokenLexeme,
    GramKind::TokenIgnore,
    GramKind::TokenError,
    GramKind::Rule,
    GramKind::RuleRhsList,
    GramKind::RuleRhs,
    GramKind::Optional,
    GramKind::ZeroClosure,
    GramKind::OneClosure,
    GramKind::Group,
    GramKind::RulePrecedence,
    GramKind::RuleOperatorList,
    GramKind::RuleOperatorSpec,
    GramKind::RuleLeftAssoc,
    GramKind::RuleRightAssoc,
    GramKind::TerminalReference,
    GramKind::NonterminalReference,
    GramKind::Empty,
    GramKind::AstFormer,
    GramKind::AstChild,
    GramKind::AstKind,
    GramKind::AstLocation,
    GramKind::AstLocationString,
    GramKind::AstLexeme,
    GramKind::AstLexemeString,
    GramKind::AstDot,
    GramKind::AstSlice,
    GramKind::Identifier,
    GramKind::Integer,
    GramKind::NegativeInteger,
    GramKind::LitString,
    GramKind::True,
    GramKind::False,
    GramKind::Regex,
    GramKind::RegexOr,
    GramKind::RegexList,
    GramKind::RegexOptional,
    GramKind::RegexZeroClosure,
    GramKind::RegexOneClosure,
    GramKind::RegexChar,
    GramKind::RegexWildcard,
    GramKind::RegexWhitespace,
    GramKind::RegexNotWhitespace,
    GramKind::RegexDigits,
    GramKind::RegexNotDigits,
    GramKind::Charset,
    GramKind::CharsetInvert,
    GramKind::CharsetRange,
    GramKind::CharsetChar,
    GramKind::CharsetWhitespace,
    GramKind::CharsetNotWhitespace,
    GramKind::CharsetDigits,
    GramKind::CharsetNotDigits,
    GramKind::ActionStatementList,
    GramKind::ActionAssign,
    GramKind::ActionEqual,
    GramKind::ActionNotEqual,
    GramKind::ActionLessThan,
    GramKind::ActionLessEqual,
    GramKind::ActionGreaterThan,
    GramKind::ActionGreaterEqual,
    GramKind::ActionAdd,
    GramKind::ActionSubtract,
    GramKind::ActionMultiply,
    GramKind::ActionDivide,
    GramKind::ActionUnaryMinus,
    GramKind::ActionAnd,
    GramKind::ActionOr,
    GramKind::ActionNot,
    GramKind::ActionDumpStack,
    GramKind::ActionTokenCount,
];

impl GramKind {
    /// Classify a kind number, mapping anything out of range to `Unknown`.
    pub fn from_kind(kind: i64) -> GramKind {
        if kind < 0 {
            return GramKind::Unknown;
        }
        GRAM_KIND_LIST
            .get(kind as usize)
            .copied()
            .unwrap_or(GramKind::Unknown)
    }

    /// Classify a tree node by its kind number.
    pub fn of(tree: &SynTree) -> GramKind {
        Self::from_kind(tree.kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GramKind::Unknown => "Unknown",
            GramKind::Null => "Null",
            GramKind::Grammar => "Grammar",
            GramKind::OptionList => "OptionList",
            GramKind::TokenList => "TokenList",
            GramKind::RuleList => "RuleList",
            GramKind::Lookaheads => "Lookaheads",
            GramKind::ErrorRecovery => "ErrorRecovery",
            GramKind::Conflicts => "Conflicts",
            GramKind::KeepWhitespace => "KeepWhitespace",
            GramKind::CaseSensitive => "CaseSensitive",
            GramKind::TokenDeclaration => "TokenDeclaration",
            GramKind::TokenOptionList => "TokenOptionList",
            GramKind::TokenTemplate => "TokenTemplate",
            GramKind::TokenDescription => "TokenDescription",
            GramKind::TokenRegexList => "TokenRegexList",
            GramKind::TokenRegex => "TokenRegex",
            GramKind::TokenPrecedence => "TokenPrecedence",
            GramKind::TokenAction => "TokenAction",
            GramKind::TokenLexeme => "TokenLexeme",
            GramKind::TokenIgnore => "TokenIgnore",
            GramKind::TokenError => "TokenError",
            GramKind::Rule => "Rule",
            GramKind::RuleRhsList => "RuleRhsList",
            GramKind::RuleRhs => "RuleRhs",
            GramKind::Optional => "Optional",
            GramKind::ZeroClosure => "ZeroClosure",
            GramKind::OneClosure => "OneClosure",
            GramKind::Group => "Group",
            GramKind::RulePrecedence => "RulePrecedence",
            GramKind::RuleOperatorList => "RuleOperatorList",
            GramKind::RuleOperatorSpec => "RuleOperatorSpec",
            GramKind::RuleLeftAssoc => "RuleLeftAssoc",
            GramKind::RuleRightAssoc => "RuleRightAssoc",
            GramKind::TerminalReference => "TerminalReference",
            GramKind::NonterminalReference => "NonterminalReference",
            GramKind::Empty => "Empty",
            GramKind::AstFormer => "AstFormer",
            GramKind::AstChild => "AstChild",
            GramKind::AstKind => "AstKind",
            GramKind::AstLocation => "AstLocation",
            GramKind::AstLocationString => "AstLocationString",
            GramKind::AstLexeme => "AstLexeme",
            GramKind::AstLexemeString => "AstLexemeString",
            GramKind::AstDot => "AstDot",
            GramKind::AstSlice => "AstSlice",
            GramKind::Identifier => "Identifier",
            GramKind::Integer => "Integer",
            GramKind::NegativeInteger => "NegativeInteger",
            GramKind::LitString => "LitString",
            GramKind::True => "True",
            GramKind::False => "False",
            GramKind::Regex => "Regex",
            GramKind::RegexOr => "RegexOr",
            GramKind::RegexList => "RegexList",
            GramKind::RegexOptional => "RegexOptional",
            GramKind::RegexZeroClosure => "RegexZeroClosure",
            GramKind::RegexOneClosure => "RegexOneClosure",
            GramKind::RegexChar => "RegexChar",
            GramKind::RegexWildcard => "RegexWildcard",
            GramKind::RegexWhitespace => "RegexWhitespace",
            GramKind::RegexNotWhitespace => "RegexNotWhitespace",
            GramKind::RegexDigits => "RegexDigits",
            GramKind::RegexNotDigits => "RegexNotDigits",
            GramKind::Charset => "Charset",
            GramKind::CharsetInvert => "CharsetInvert",
            GramKind::CharsetRange => "CharsetRange",
            GramKind::CharsetChar => "CharsetChar",
            GramKind::CharsetWhitespace => "CharsetWhitespace",
            GramKind::CharsetNotWhitespace => "CharsetNotWhitespace",
            GramKind::CharsetDigits => "CharsetDigits",
            GramKind::CharsetNotDigits => "CharsetNotDigits",
            GramKind::ActionStatementList => "ActionStatementList",
            GramKind::ActionAssign => "ActionAssign",
            GramKind::ActionEqual => "ActionEqual",
            GramKind::ActionNotEqual => "ActionNotEqual",
            GramKind::ActionLessThan => "ActionLessThan",
            GramKind::ActionLessEqual => "ActionLessEqual",
            GramKind::ActionGreaterThan => "ActionGreaterThan",
            GramKind::ActionGreaterEqual => "ActionGreaterEqual",
            GramKind::ActionAdd => "ActionAdd",
            GramKind::ActionSubtract => "ActionSubtract",
            GramKind::ActionMultiply => "ActionMultiply",
            GramKind::ActionDivide => "ActionDivide",
            GramKind::ActionUnaryMinus => "ActionUnaryMinus",
            GramKind::ActionAnd => "ActionAnd",
            GramKind::ActionOr => "ActionOr",
            GramKind::ActionNot => "ActionNot",
            GramKind::ActionDumpStack => "ActionDumpStack",
            GramKind::ActionTokenCount => "ActionTokenCount",
        }
    }

    /// All grammar kinds, in kind-number order.
    pub fn all() -> &'static [GramKind] {
        GRAM_KIND_LIST
    }
}

/// Build an interior tree node for a grammar kind.
pub fn node(kind: GramKind, location: Location, children: Vec<SynTree>) -> SynTree {
    SynTree::new(kind as i64, String::new(), location, children)
}

/// Build a leaf tree node carrying a lexeme.
pub fn leaf(kind: GramKind, lexeme: &str, location: Location) -> SynTree {
    SynTree::leaf(kind as i64, lexeme.to_string(), location)
}

pub fn null_node() -> SynTree {
    SynTree::leaf(GramKind::Null as i64, String::new(), NO_LOCATION)
}

//
//  Tokenization of the description language
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DslTok {
    Whitespace,
    Comment,
    Identifier,
    BracketName,
    Int,
    Str,
    DefineOp,    // ::=
    ClimbOp,     // ::^
    AssignOp,    // :=
    NotEqual,    // /=
    LessEqual,   // <=
    GreaterEqual,// >=
    LeftAssoc,   // <<
    RightAssoc,  // >>
    Colon,
    Equal,
    Question,
    Star,
    Plus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    VBar,
    Dot,
    Comma,
    Semi,
    Less,
    Greater,
    Minus,
    Slash,
    Amp,
    Bang,
    At,
    Percent,
    Dollar,
    Underscore,
    Eof,
}

#[derive(Debug, Clone)]
struct Lex {
    tok: DslTok,
    start: usize,
    end: usize,
}

struct DslLexer {
    patterns: Vec<(DslTok, Regex)>,
    punctuations: &'static [(&'static str, DslTok)],
}

/// Multi-character operators first so that prefix matching picks the longest.
static PUNCTUATIONS: &[(&str, DslTok)] = &[
    ("::=", DslTok::DefineOp),
    ("::^", DslTok::ClimbOp),
    (":=", DslTok::AssignOp),
    ("/=", DslTok::NotEqual),
    ("<=", DslTok::LessEqual),
    (">=", DslTok::GreaterEqual),
    ("<<", DslTok::LeftAssoc),
    (">>", DslTok::RightAssoc),
    (":", DslTok::Colon),
    ("=", DslTok::Equal),
    ("?", DslTok::Question),
    ("*", DslTok::Star),
    ("+", DslTok::Plus),
    ("(", DslTok::LParen),
    (")", DslTok::RParen),
    ("[", DslTok::LBracket),
    ("]", DslTok::RBracket),
    ("|", DslTok::VBar),
    (".", DslTok::Dot),
    (",", DslTok::Comma),
    (";", DslTok::Semi),
    ("<", DslTok::Less),
    (">", DslTok::Greater),
    ("-", DslTok::Minus),
    ("/", DslTok::Slash),
    ("&", DslTok::Amp),
    ("!", DslTok::Bang),
    ("@", DslTok::At),
    ("%", DslTok::Percent),
    ("$", DslTok::Dollar),
    ("_", DslTok::Underscore),
];

impl DslLexer {
    fn new() -> Self {
        let patterns = vec![
            (DslTok::Whitespace, Regex::new(r"^\s+").unwrap()),
            (DslTok::Comment, Regex::new(r"^//[^\n]*").unwrap()),
            (
                DslTok::BracketName,
                Regex::new(r"^<[A-Za-z][A-Za-z0-9_]*>").unwrap(),
            ),
            (
                DslTok::Identifier,
                Regex::new(r"^[A-Za-z][A-Za-z0-9_]*").unwrap(),
            ),
            (DslTok::Int, Regex::new(r"^[0-9]+").unwrap()),
            (DslTok::Str, Regex::new(r"^'([^'\\]|\\.)*'").unwrap()),
        ];

        Self {
            patterns,
            punctuations: PUNCTUATIONS,
        }
    }

    fn tokenize(&self, src: &SourceText, sink: &mut ErrorSink) -> Vec<Lex> {
        let mut stream: Vec<Lex> = Vec::new();
        let bytes = src.text.as_bytes();
        let mut pointer: usize = 0;

        'scan: while pointer < bytes.len() {
            for (tok, pattern) in &self.patterns {
                if let Some(m) = pattern.find(&bytes[pointer..]) {
                    debug_assert_eq!(m.start(), 0);
                    let end = pointer + m.end();
                    if *tok != DslTok::Whitespace && *tok != DslTok::Comment {
                        stream.push(Lex {
                            tok: *tok,
                            start: pointer,
                            end,
                        });
                    }
                    pointer = end;
                    continue 'scan;
                }
            }

            for (text, tok) in self.punctuations {
                if bytes[pointer..].starts_with(text.as_bytes()) {
                    stream.push(Lex {
                        tok: *tok,
                        start: pointer,
                        end: pointer + text.len(),
                    });
                    pointer += text.len();
                    continue 'scan;
                }
            }

            sink.add_error(
                DiagnosticKind::Syntax,
                pointer as Location,
                "Unrecognized character in grammar description.".to_string(),
            );
            pointer += src.text[pointer..].chars().next().map_or(1, |c| c.len_utf8());
        }

        stream.push(Lex {
            tok: DslTok::Eof,
            start: bytes.len(),
            end: bytes.len(),
        });
        stream
    }
}

//
//  The recursive-descent reader
//

pub struct GrammarReader<'sink> {
    src_text: String,
    stream: Vec<Lex>,
    pos: usize,
    sink: &'sink mut ErrorSink,
    templates: BTreeMap<String, SynTree>,
}

/// Parse a grammar description into its syntax tree. Returns `None` when the text is too
/// damaged to produce a tree; recoverable problems only record diagnostics.
pub fn parse_grammar(src: &SourceText, sink: &mut ErrorSink) -> Option<SynTree> {
    let lexer = DslLexer::new();
    let stream = lexer.tokenize(src, sink);

    let mut reader = GrammarReader {
        src_text: src.text.clone(),
        stream,
        pos: 0,
        sink,
        templates: BTreeMap::new(),
    };

    reader.read_grammar()
}

impl<'sink> GrammarReader<'sink> {
    fn peek(&self) -> &Lex {
        &self.stream[self.pos.min(self.stream.len() - 1)]
    }

    fn peek_tok(&self) -> DslTok {
        self.peek().tok
    }

    fn peek2_tok(&self) -> DslTok {
        self.stream[(self.pos + 1).min(self.stream.len() - 1)].tok
    }

    fn lexeme_of(&self, lex: &Lex) -> &str {
        &self.src_text[lex.start..lex.end]
    }

    fn location(&self) -> Location {
        self.peek().start as Location
    }

    fn advance(&mut self) -> Lex {
        let lex = self.peek().clone();
        if self.pos < self.stream.len() - 1 {
            self.pos += 1;
        }
        lex
    }

    fn at(&self, tok: DslTok) -> bool {
        self.peek_tok() == tok
    }

    fn accept(&mut self, tok: DslTok) -> Option<Lex> {
        if self.at(tok) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, tok: DslTok, what: &str) -> Option<Lex> {
        if self.at(tok) {
            Some(self.advance())
        } else {
            self.syntax_error(format!("Expected {}.", what));
            None
        }
    }

    fn syntax_error(&mut self, message: String) {
        let location = self.location();
        self.sink
            .add_error(DiagnosticKind::Syntax, location, message);
    }

    /// Keyword check on an identifier token.
    fn at_keyword(&self, keyword: &str) -> bool {
        self.at(DslTok::Identifier) && self.lexeme_of(self.peek()) == keyword
    }

    //
    //  Grammar  →  options? tokens? rules
    //

    fn read_grammar(&mut self) -> Option<SynTree> {
        let grammar_location = self.location();

        let options = if self.at_keyword("options") {
            self.advance();
            self.read_option_list()
        } else {
            node(GramKind::OptionList, NO_LOCATION, vec![])
        };

        let tokens = if self.at_keyword("tokens") {
            self.advance();
            self.read_token_list()
        } else {
            node(GramKind::TokenList, NO_LOCATION, vec![])
        };

        let rules = if self.at_keyword("rules") {
            self.advance();
            self.read_rule_list()
        } else {
            node(GramKind::RuleList, NO_LOCATION, vec![])
        };

        if !self.at(DslTok::Eof) {
            self.syntax_error("Unexpected text after the rules section.".to_string());
        }

        Some(node(
            GramKind::Grammar,
            grammar_location,
            vec![options, tokens, rules],
        ))
    }

    fn read_option_list(&mut self) -> SynTree {
        let list_location = self.location();
        let mut options = Vec::new();

        while self.at(DslTok::Identifier)
            && self.peek2_tok() == DslTok::Equal
            && !self.at_keyword("tokens")
            && !self.at_keyword("rules")
        {
            let name_lex = self.advance();
            let location = name_lex.start as Location;
            let name = self.lexeme_of(&name_lex).to_string();
            self.advance(); // =

            let value = self.read_option_value();

            let kind = match name.as_str() {
                "lookaheads" => GramKind::Lookaheads,
                "conflicts" => GramKind::Conflicts,
                "error_recovery" => GramKind::ErrorRecovery,
                "keep_whitespace" => GramKind::KeepWhitespace,
                "case_sensitive" => GramKind::CaseSensitive,
                _ => {
                    self.sink.add_error(
                        DiagnosticKind::Syntax,
                        location,
                        format!("Unknown grammar option '{}'.", name),
                    );
                    continue;
                }
            };

            if let Some(value) = value {
                options.push(node(kind, location, vec![value]));
            }
        }

        node(GramKind::OptionList, list_location, options)
    }

    fn read_option_value(&mut self) -> Option<SynTree> {
        let location = self.location();
        match self.peek_tok() {
            DslTok::Int => {
                let lex = self.advance();
                let lexeme = self.lexeme_of(&lex).to_string();
                if lexeme.parse::<i64>().is_err() {
                    self.sink.add_error(
                        DiagnosticKind::WordOverflow,
                        location,
                        format!("Integer '{}' does not fit in a word.", lexeme),
                    );
                    return None;
                }
                Some(leaf(GramKind::Integer, &lexeme, location))
            }
            DslTok::Identifier if self.at_keyword("true") => {
                self.advance();
                Some(leaf(GramKind::True, "true", location))
            }
            DslTok::Identifier if self.at_keyword("false") => {
                self.advance();
                Some(leaf(GramKind::False, "false", location))
            }
            _ => {
                self.syntax_error("Expected an integer, 'true' or 'false'.".to_string());
                None
            }
        }
    }

    //
    //  Token declarations
    //

    fn read_token_list(&mut self) -> SynTree {
        let list_location = self.location();
        let mut tokens = Vec::new();

        while self.at(DslTok::BracketName) {
            if let Some(declaration) = self.read_token_declaration() {
                tokens.push(declaration);
            }
        }

        node(GramKind::TokenList, list_location, tokens)
    }

    fn read_token_declaration(&mut self) -> Option<SynTree> {
        let name_lex = self.advance();
        let location = name_lex.start as Location;
        let name = self.lexeme_of(&name_lex).to_string();

        self.expect(DslTok::Colon, "':' after token name")?;

        let mut options = Vec::new();
        let option_list_location = self.location();

        while self.at(DslTok::Identifier) && self.peek2_tok() == DslTok::Equal {
            let option_lex = self.advance();
            let option_location = option_lex.start as Location;
            let option_name = self.lexeme_of(&option_lex).to_string();

            self.advance(); // =

            match option_name.as_str() {
                "regex" => {
                    let list = self.read_token_regex_list(option_location)?;
                    options.push(list);
                }
                "template" => {
                    let value = self.read_option_value()?;
                    options.push(node(GramKind::TokenTemplate, option_location, vec![value]));
                }
                "description" => {
                    let lit = self.read_string_literal()?;
                    options.push(node(GramKind::TokenDescription, option_location, vec![lit]));
                }
                "precedence" => {
                    let value = self.read_option_value()?;
                    options.push(node(GramKind::TokenPrecedence, option_location, vec![value]));
                }
                "action" => {
                    self.expect(DslTok::LBracket, "'[' opening a token action")?;
                    let statements = self.read_statement_list();
                    self.expect(DslTok::RBracket, "']' closing a token action")?;
                    options.push(node(GramKind::TokenAction, option_location, vec![statements]));
                }
                "lexeme" => {
                    let value = self.read_option_value()?;
                    options.push(node(GramKind::TokenLexeme, option_location, vec![value]));
                }
                "ignore" => {
                    let value = self.read_option_value()?;
                    options.push(node(GramKind::TokenIgnore, option_location, vec![value]));
                }
                "error" => {
                    let lit = self.read_string_literal()?;
                    options.push(node(GramKind::TokenError, option_location, vec![lit]));
                }
                _ => {
                    self.sink.add_error(
                        DiagnosticKind::Syntax,
                        option_location,
                        format!("Unknown token option '{}'.", option_name),
                    );
                    // discard the value so reading can continue
                    self.advance();
                }
            }
        }

        // a template token's regex becomes available as a {macro}
        let is_template = options.iter().any(|o| {
            GramKind::of(o) == GramKind::TokenTemplate
                && o.children
                    .first()
                    .map_or(false, |v| GramKind::of(v) == GramKind::True)
        });
        if is_template {
            let regex_list = options
                .iter()
                .find(|o| GramKind::of(o) == GramKind::TokenRegexList);
            if let Some(regex) = regex_list
                .and_then(|list| list.children.first())
                .and_then(|clause| clause.get_child(1))
            {
                let macro_name = name.trim_start_matches('<').trim_end_matches('>').to_string();
                self.templates.insert(macro_name, regex.clone());
            }
        }

        Some(node(
            GramKind::TokenDeclaration,
            location,
            vec![
                leaf(GramKind::Identifier, &name, location),
                node(GramKind::TokenOptionList, option_list_location, options),
            ],
        ))
    }

    /// regex = ( '[' guard ']' )? 'pattern' ( '|' ( '[' guard ']' )? 'pattern' )*
    fn read_token_regex_list(&mut self, location: Location) -> Option<SynTree> {
        let mut clauses = Vec::new();

        loop {
            let clause_location = self.location();

            let guard = if self.accept(DslTok::LBracket).is_some() {
                let guard = self.read_condition();
                self.expect(DslTok::RBracket, "']' closing a regex guard")?;
                guard
            } else {
                null_node()
            };

            let regex = self.read_regex_string()?;
            clauses.push(node(
                GramKind::TokenRegex,
                clause_location,
                vec![guard, regex],
            ));

            if self.accept(DslTok::VBar).is_none() {
                break;
            }
        }

        Some(node(GramKind::TokenRegexList, location, clauses))
    }

    fn read_string_literal(&mut self) -> Option<SynTree> {
        let lex = self.expect(DslTok::Str, "a string literal")?;
        let location = lex.start as Location;
        let raw = self.lexeme_of(&lex);
        let content = unescape_literal(&raw[1..raw.len() - 1]);
        Some(SynTree::leaf(GramKind::LitString as i64, content, location))
    }

    fn read_regex_string(&mut self) -> Option<SynTree> {
        let lex = self.expect(DslTok::Str, "a regex string")?;
        let location = lex.start as Location;
        let raw = self.lexeme_of(&lex).to_string();
        let content: String = raw[1..raw.len() - 1].to_string();

        let mut regex_reader = RegexReader {
            chars: content.chars().collect(),
            pos: 0,
            base_location: location + 1,
            sink: &mut *self.sink,
            templates: &self.templates,
        };
        let tree = regex_reader.read_alternation();
        if regex_reader.pos < regex_reader.chars.len() {
            let at = regex_reader.location();
            self.sink.add_error(
                DiagnosticKind::Syntax,
                at,
                "Unexpected character in regular expression.".to_string(),
            );
        }
        Some(node(GramKind::Regex, location, vec![tree]))
    }

    //
    //  Rules
    //

    fn read_rule_list(&mut self) -> SynTree {
        let list_location = self.location();
        let mut rules = Vec::new();

        while self.at(DslTok::Identifier) {
            if let Some(rule) = self.read_rule() {
                rules.push(rule);
            } else {
                // resynchronize at the next plausible rule head
                while !self.at(DslTok::Eof)
                    && !(self.at(DslTok::Identifier)
                        && (self.peek2_tok() == DslTok::DefineOp
                            || self.peek2_tok() == DslTok::ClimbOp))
                {
                    self.advance();
                }
            }
        }

        node(GramKind::RuleList, list_location, rules)
    }

    fn read_rule(&mut self) -> Option<SynTree> {
        let lhs_lex = self.advance();
        let location = lhs_lex.start as Location;
        let lhs_name = self.lexeme_of(&lhs_lex).to_string();
        let lhs = leaf(GramKind::Identifier, &lhs_name, location);

        match self.peek_tok() {
            DslTok::DefineOp => {
                self.advance();
                let alternatives = self.read_rule_rhs_list()?;
                Some(node(GramKind::Rule, location, vec![lhs, alternatives]))
            }
            DslTok::ClimbOp => {
                self.advance();
                let operand = self.read_rule_rhs()?;
                let operators = self.read_operator_list()?;
                Some(node(
                    GramKind::RulePrecedence,
                    location,
                    vec![lhs, operand, operators],
                ))
            }
            _ => {
                self.syntax_error("Expected '::=' or '::^' after rule name.".to_string());
                None
            }
        }
    }

    fn read_rule_rhs_list(&mut self) -> Option<SynTree> {
        let list_location = self.location();
        let mut alternatives = vec![self.read_rule_rhs()?];

        while self.accept(DslTok::VBar).is_some() {
            alternatives.push(self.read_rule_rhs()?);
        }

        Some(node(GramKind::RuleRhsList, list_location, alternatives))
    }

    /// One alternative: symbols, then an optional `: former`, then an optional `[ action ]`.
    fn read_rule_rhs(&mut self) -> Option<SynTree> {
        let rhs_location = self.location();
        let mut items = Vec::new();

        loop {
            match self.peek_tok() {
                DslTok::BracketName | DslTok::Str => {
                    let lex = self.advance();
                    let location = lex.start as Location;
                    let name = self.lexeme_of(&lex).to_string();
                    items.push(self.read_postfix(leaf(
                        GramKind::TerminalReference,
                        &name,
                        location,
                    )));
                }
                DslTok::Identifier => {
                    if self.at_keyword("empty") {
                        let lex = self.advance();
                        items.push(leaf(GramKind::Empty, "empty", lex.start as Location));
                        continue;
                    }
                    // the next rule begins here
                    if self.peek2_tok() == DslTok::DefineOp || self.peek2_tok() == DslTok::ClimbOp {
                        break;
                    }
                    let lex = self.advance();
                    let location = lex.start as Location;
                    let name = self.lexeme_of(&lex).to_string();
                    items.push(self.read_postfix(leaf(
                        GramKind::NonterminalReference,
                        &name,
                        location,
                    )));
                }
                DslTok::LParen => {
                    let lex = self.advance();
                    let location = lex.start as Location;
                    let alternatives = self.read_rule_rhs_list()?;
                    self.expect(DslTok::RParen, "')' closing a group")?;
                    items.push(self.read_postfix(node(GramKind::Group, location, vec![alternatives])));
                }
                _ => break,
            }
        }

        if self.accept(DslTok::Colon).is_some() {
            items.push(self.read_former()?);
        }

        if self.at(DslTok::LBracket) {
            self.advance();
            let statements = self.read_statement_list();
            self.expect(DslTok::RBracket, "']' closing a rule action")?;
            items.push(statements);
        }

        Some(node(GramKind::RuleRhs, rhs_location, items))
    }

    fn read_postfix(&mut self, item: SynTree) -> SynTree {
        let location = item.location;
        match self.peek_tok() {
            DslTok::Question => {
                self.advance();
                node(GramKind::Optional, location, vec![item])
            }
            DslTok::Star => {
                self.advance();
                node(GramKind::ZeroClosure, location, vec![item])
            }
            DslTok::Plus => {
                self.advance();
                node(GramKind::OneClosure, location, vec![item])
            }
            _ => item,
        }
    }

    /// Operator groups of a `::^` declaration, highest precedence first.
    fn read_operator_list(&mut self) -> Option<SynTree> {
        let list_location = self.location();
        let mut specs = Vec::new();

        loop {
            let (assoc, location) = match self.peek_tok() {
                DslTok::LeftAssoc => {
                    let lex = self.advance();
                    (GramKind::RuleLeftAssoc, lex.start as Location)
                }
                DslTok::RightAssoc => {
                    let lex = self.advance();
                    (GramKind::RuleRightAssoc, lex.start as Location)
                }
                _ => break,
            };

            let mut operators = vec![leaf(
                if assoc == GramKind::RuleLeftAssoc {
                    GramKind::RuleLeftAssoc
                } else {
                    GramKind::RuleRightAssoc
                },
                "",
                location,
            )];

            while matches!(self.peek_tok(), DslTok::Str | DslTok::BracketName) {
                let lex = self.advance();
                let op_location = lex.start as Location;
                let name = self.lexeme_of(&lex).to_string();
                operators.push(leaf(GramKind::TerminalReference, &name, op_location));
            }

            if operators.len() == 1 {
                self.syntax_error("Expected at least one operator terminal.".to_string());
                return None;
            }

            specs.push(node(GramKind::RuleOperatorSpec, location, operators));
        }

        if specs.is_empty() {
            self.syntax_error("Expected '<<' or '>>' operator groups after '::^'.".to_string());
            return None;
        }

        Some(node(GramKind::RuleOperatorList, list_location, specs))
    }

    //
    //  AST formers
    //

    /// A former is either a parenthesized item list or a bare child reference.
    fn read_former(&mut self) -> Option<SynTree> {
        match self.peek_tok() {
            DslTok::LParen => {
                let lex = self.advance();
                let location = lex.start as Location;
                let mut items = Vec::new();

                if !self.at(DslTok::RParen) {
                    loop {
                        items.push(self.read_former_item()?);
                        if self.accept(DslTok::Comma).is_none() {
                            break;
                        }
                    }
                }
                self.expect(DslTok::RParen, "')' closing an AST former")?;
                Some(node(GramKind::AstFormer, location, items))
            }
            DslTok::Dollar => self.read_child_reference(),
            _ => {
                self.syntax_error("Expected an AST former.".to_string());
                None
            }
        }
    }

    fn read_former_item(&mut self) -> Option<SynTree> {
        let location = self.location();
        match self.peek_tok() {
            DslTok::Identifier => {
                let lex = self.advance();
                let name = self.lexeme_of(&lex).to_string();
                Some(leaf(GramKind::Identifier, &name, location))
            }
            DslTok::Dollar => self.read_child_reference(),
            DslTok::LParen => self.read_former(),
            DslTok::Percent => {
                self.advance();
                let dot = self.read_dot_expression()?;
                Some(node(GramKind::AstKind, location, vec![dot]))
            }
            DslTok::At => {
                self.advance();
                if self.at(DslTok::Str) {
                    let lit = self.read_string_literal()?;
                    Some(node(GramKind::AstLocationString, location, vec![lit]))
                } else {
                    let dot = self.read_dot_expression()?;
                    Some(node(GramKind::AstLocation, location, vec![dot]))
                }
            }
            DslTok::Amp => {
                self.advance();
                if self.at(DslTok::Str) {
                    let lit = self.read_string_literal()?;
                    Some(node(GramKind::AstLexemeString, location, vec![lit]))
                } else {
                    let dot = self.read_dot_expression()?;
                    Some(node(GramKind::AstLexeme, location, vec![dot]))
                }
            }
            _ => {
                self.syntax_error("Invalid item in AST former.".to_string());
                None
            }
        }
    }

    /// `$n`, `$n.m`, `$n._`, `$f_l`: a child reference with optional descent and slice.
    fn read_child_reference(&mut self) -> Option<SynTree> {
        let location = self.location();
        self.expect(DslTok::Dollar, "'$'")?;

        let first = self.read_signed_index()?;

        // top-level slice $f_l
        if self.accept(DslTok::Underscore).is_some() {
            let last = self.read_signed_index()?;
            let slice = node(GramKind::AstSlice, location, vec![first, last]);
            return Some(node(
                GramKind::AstChild,
                location,
                vec![null_node(), slice],
            ));
        }

        let mut indices = vec![first];
        let mut slice = null_node();

        while self.at(DslTok::Dot) {
            self.advance();
            if self.accept(DslTok::Underscore).is_some() {
                // `._` takes every child of the node reached so far
                let all_first = leaf(GramKind::Integer, "1", location);
                let all_last = leaf(GramKind::NegativeInteger, "1", location);
                slice = node(GramKind::AstSlice, location, vec![all_first, all_last]);
                break;
            }
            indices.push(self.read_signed_index()?);
        }

        let dot = node(GramKind::AstDot, location, indices);
        Some(node(GramKind::AstChild, location, vec![dot, slice]))
    }

    /// `$n`, `$n.m`, …: a descent without any slice, as used after `%`, `@` and `&`.
    fn read_dot_expression(&mut self) -> Option<SynTree> {
        let location = self.location();
        self.expect(DslTok::Dollar, "'$'")?;

        let mut indices = vec![self.read_signed_index()?];
        while self.at(DslTok::Dot) {
            self.advance();
            indices.push(self.read_signed_index()?);
        }

        Some(node(GramKind::AstDot, location, indices))
    }

    fn read_signed_index(&mut self) -> Option<SynTree> {
        let location = self.location();
        let negative = self.accept(DslTok::Minus).is_some();
        let lex = self.expect(DslTok::Int, "a child index")?;
        let lexeme = self.lexeme_of(&lex).to_string();
        if negative {
            Some(leaf(GramKind::NegativeInteger, &lexeme, location))
        } else {
            Some(leaf(GramKind::Integer, &lexeme, location))
        }
    }

    //
    //  The action sub-language
    //

    fn read_statement_list(&mut self) -> SynTree {
        let list_location = self.location();
        let mut statements = Vec::new();

        loop {
            let location = self.location();
            if self.at_keyword("dump_stack") {
                self.advance();
                statements.push(leaf(GramKind::ActionDumpStack, "dump_stack", location));
            } else if self.at(DslTok::Identifier) && self.peek2_tok() == DslTok::AssignOp {
                let lex = self.advance();
                let name = self.lexeme_of(&lex).to_string();
                let lhs = leaf(GramKind::Identifier, &name, location);
                self.advance(); // :=
                let rhs = match self.read_expression() {
                    Some(rhs) => rhs,
                    None => break,
                };
                statements.push(node(GramKind::ActionAssign, location, vec![lhs, rhs]));
            } else {
                break;
            }

            if self.accept(DslTok::Semi).is_none() {
                break;
            }
        }

        node(GramKind::ActionStatementList, list_location, statements)
    }

    /// Condition grammar: `|` above `&` above `!` above relations above arithmetic.
    fn read_condition(&mut self) -> SynTree {
        let mut left = self.read_condition_and();
        while self.at(DslTok::VBar) {
            let lex = self.advance();
            let right = self.read_condition_and();
            left = node(
                GramKind::ActionOr,
                lex.start as Location,
                vec![left, right],
            );
        }
        left
    }

    fn read_condition_and(&mut self) -> SynTree {
        let mut left = self.read_condition_not();
        while self.at(DslTok::Amp) {
            let lex = self.advance();
            let right = self.read_condition_not();
            left = node(
                GramKind::ActionAnd,
                lex.start as Location,
                vec![left, right],
            );
        }
        left
    }

    fn read_condition_not(&mut self) -> SynTree {
        if self.at(DslTok::Bang) {
            let lex = self.advance();
            let operand = self.read_condition_not();
            return node(GramKind::ActionNot, lex.start as Location, vec![operand]);
        }
        self.read_relation()
    }

    fn read_relation(&mut self) -> SynTree {
        let left = match self.read_expression() {
            Some(left) => left,
            None => return null_node(),
        };

        let kind = match self.peek_tok() {
            DslTok::Equal => GramKind::ActionEqual,
            DslTok::NotEqual => GramKind::ActionNotEqual,
            DslTok::Less => GramKind::ActionLessThan,
            DslTok::LessEqual => GramKind::ActionLessEqual,
            DslTok::Greater => GramKind::ActionGreaterThan,
            DslTok::GreaterEqual => GramKind::ActionGreaterEqual,
            _ => return left,
        };

        let lex = self.advance();
        let right = match self.read_expression() {
            Some(right) => right,
            None => return left,
        };
        node(kind, lex.start as Location, vec![left, right])
    }

    fn read_expression(&mut self) -> Option<SynTree> {
        let mut left = self.read_term()?;
        loop {
            let kind = match self.peek_tok() {
                DslTok::Plus => GramKind::ActionAdd,
                DslTok::Minus => GramKind::ActionSubtract,
                _ => break,
            };
            let lex = self.advance();
            let right = self.read_term()?;
            left = node(kind, lex.start as Location, vec![left, right]);
        }
        Some(left)
    }

    fn read_term(&mut self) -> Option<SynTree> {
        let mut left = self.read_factor()?;
        loop {
            let kind = match self.peek_tok() {
                DslTok::Star => GramKind::ActionMultiply,
                DslTok::Slash => GramKind::ActionDivide,
                _ => break,
            };
            let lex = self.advance();
            let right = self.read_factor()?;
            left = node(kind, lex.start as Location, vec![left, right]);
        }
        Some(left)
    }

    fn read_factor(&mut self) -> Option<SynTree> {
        let location = self.location();
        match self.peek_tok() {
            DslTok::Minus => {
                self.advance();
                let operand = self.read_factor()?;
                Some(node(GramKind::ActionUnaryMinus, location, vec![operand]))
            }
            DslTok::Int => {
                let lex = self.advance();
                let lexeme = self.lexeme_of(&lex).to_string();
                if lexeme.parse::<i64>().is_err() {
                    self.sink.add_error(
                        DiagnosticKind::WordOverflow,
                        location,
                        format!("Integer '{}' does not fit in a word.", lexeme),
                    );
                    return None;
                }
                Some(leaf(GramKind::Integer, &lexeme, location))
            }
            DslTok::Identifier => {
                let lex = self.advance();
                let name = self.lexeme_of(&lex).to_string();
                if name == "token_count" {
                    Some(leaf(GramKind::ActionTokenCount, &name, location))
                } else {
                    Some(leaf(GramKind::Identifier, &name, location))
                }
            }
            DslTok::LParen => {
                self.advance();
                let inner = self.read_condition();
                self.expect(DslTok::RParen, "')' closing an expression")?;
                Some(inner)
            }
            _ => {
                self.syntax_error("Expected an expression.".to_string());
                None
            }
        }
    }
}

/// Remove the string-literal escapes; regex escapes are handled by the regex reader instead.
fn unescape_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    out
}

//
//  Regular expressions
//
//  The token regex DSL is parsed character by character from the string literal contents.
//  Locations point back into the grammar text so diagnostics land on the offending character.
//

/// Library macros available to every grammar through `{name}`.
static LIBRARY_MACROS: &[(&str, &str)] = &[
    ("whitespace", r"\s+"),
    ("identifier", "[A-Za-z][A-Za-z0-9_]*"),
    ("integer", r"\d+"),
    ("decimal", r"\d+(.\d+)?"),
];

struct RegexReader<'sink, 'tpl> {
    chars: Vec<char>,
    pos: usize,
    base_location: Location,
    sink: &'sink mut ErrorSink,
    templates: &'tpl BTreeMap<String, SynTree>,
}

impl<'sink, 'tpl> RegexReader<'sink, 'tpl> {
    fn location(&self) -> Location {
        self.base_location + self.pos as Location
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn read_alternation(&mut self) -> SynTree {
        let location = self.location();
        let mut branches = vec![self.read_sequence()];

        while self.peek() == Some('|') {
            self.advance();
            branches.push(self.read_sequence());
        }

        if branches.len() == 1 {
            branches.pop().unwrap()
        } else {
            node(GramKind::RegexOr, location, branches)
        }
    }

    fn read_sequence(&mut self) -> SynTree {
        let location = self.location();
        let mut items = Vec::new();

        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            if let Some(item) = self.read_postfixed() {
                items.push(item);
            }
        }

        node(GramKind::RegexList, location, items)
    }

    fn read_postfixed(&mut self) -> Option<SynTree> {
        let location = self.location();
        let mut item = self.read_atom()?;

        loop {
            match self.peek() {
                Some('?') => {
                    self.advance();
                    item = node(GramKind::RegexOptional, location, vec![item]);
                }
                Some('*') => {
                    self.advance();
                    item = node(GramKind::RegexZeroClosure, location, vec![item]);
                }
                Some('+') => {
                    self.advance();
                    item = node(GramKind::RegexOneClosure, location, vec![item]);
                }
                _ => break,
            }
        }

        Some(item)
    }

    fn read_atom(&mut self) -> Option<SynTree> {
        let location = self.location();
        let c = self.advance()?;

        match c {
            '(' => {
                let inner = self.read_alternation();
                if self.advance() != Some(')') {
                    self.sink.add_error(
                        DiagnosticKind::Syntax,
                        location,
                        "Unbalanced '(' in regular expression.".to_string(),
                    );
                }
                Some(inner)
            }
            '[' => Some(self.read_charset(location)),
            '{' => {
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c == '}' {
                        break;
                    }
                    name.push(c);
                    self.advance();
                }
                if self.advance() != Some('}') {
                    self.sink.add_error(
                        DiagnosticKind::Syntax,
                        location,
                        "Unbalanced '{' in regular expression.".to_string(),
                    );
                }
                self.resolve_macro(&name, location)
            }
            '.' => Some(leaf(GramKind::RegexWildcard, ".", location)),
            '\\' => {
                let escaped = self.advance().unwrap_or('\\');
                match escaped {
                    's' => Some(leaf(GramKind::RegexWhitespace, "\\s", location)),
                    'S' => Some(leaf(GramKind::RegexNotWhitespace, "\\S", location)),
                    'd' => Some(leaf(GramKind::RegexDigits, "\\d", location)),
                    'D' => Some(leaf(GramKind::RegexNotDigits, "\\D", location)),
                    'n' => Some(char_leaf('\n', location)),
                    'r' => Some(char_leaf('\r', location)),
                    't' => Some(char_leaf('\t', location)),
                    other => Some(char_leaf(other, location)),
                }
            }
            '?' | '*' | '+' => {
                self.sink.add_error(
                    DiagnosticKind::Syntax,
                    location,
                    format!("'{}' must follow a regular expression term.", c),
                );
                None
            }
            other => Some(char_leaf(other, location)),
        }
    }

    fn resolve_macro(&mut self, name: &str, location: Location) -> Option<SynTree> {
        if let Some(template) = self.templates.get(name) {
            return Some(template.clone());
        }

        if let Some((_, pattern)) = LIBRARY_MACROS.iter().find(|(n, _)| *n == name) {
            let mut library_reader = RegexReader {
                chars: pattern.chars().collect(),
                pos: 0,
                base_location: location,
                sink: &mut *self.sink,
                templates: self.templates,
            };
            return Some(library_reader.read_alternation());
        }

        self.sink.add_error(
            DiagnosticKind::UnknownMacro,
            location,
            format!("Unknown regex macro '{{{}}}'.", name),
        );
        None
    }

    fn read_charset(&mut self, location: Location) -> SynTree {
        let inverted = if self.peek() == Some('^') {
            self.advance();
            true
        } else {
            false
        };

        let mut items = Vec::new();

        while let Some(c) = self.peek() {
            if c == ']' {
                break;
            }
            let item_location = self.location();
            self.advance();

            let first = if c == '\\' {
                let escaped = self.advance().unwrap_or('\\');
                match escaped {
                    's' => {
                        items.push(leaf(GramKind::CharsetWhitespace, "\\s", item_location));
                        continue;
                    }
                    'S' => {
                        items.push(leaf(GramKind::CharsetNotWhitespace, "\\S", item_location));
                        continue;
                    }
                    'd' => {
                        items.push(leaf(GramKind::CharsetDigits, "\\d", item_location));
                        continue;
                    }
                    'D' => {
                        items.push(leaf(GramKind::CharsetNotDigits, "\\D", item_location));
                        continue;
                    }
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                }
            } else {
                c
            };

            if self.peek() == Some('-') && self.chars.get(self.pos + 1) != Some(&']') {
                self.advance(); // -
                let end_location = self.location();
                let mut last = self.advance().unwrap_or(first);
                if last == '\\' {
                    last = match self.advance() {
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some(other) => other,
                        None => first,
                    };
                }
                if (last as u32) < (first as u32) {
                    self.sink.add_error(
                        DiagnosticKind::CharacterRange,
                        end_location,
                        format!("Character range '{}-{}' is out of order.", first, last),
                    );
                    continue;
                }
                items.push(node(
                    GramKind::CharsetRange,
                    item_location,
                    vec![char_set_leaf(first, item_location), char_set_leaf(last, end_location)],
                ));
            } else {
                items.push(char_set_leaf(first, item_location));
            }
        }

        if self.advance() != Some(']') {
            self.sink.add_error(
                DiagnosticKind::Syntax,
                location,
                "Unbalanced '[' in regular expression.".to_string(),
            );
        }

        let set = node(GramKind::Charset, location, items);
        if inverted {
            node(GramKind::CharsetInvert, location, vec![set])
        } else {
            set
        }
    }
}

fn char_leaf(c: char, location: Location) -> SynTree {
    SynTree::leaf(GramKind::RegexChar as i64, c.to_string(), location)
}

fn char_set_leaf(c: char, location: Location) -> SynTree {
    SynTree::leaf(GramKind::CharsetChar as i64, c.to_string(), location)
}

/// Parse a bare regex pattern outside any grammar, used for synthesized library tokens.
pub fn parse_standalone_regex(pattern: &str, sink: &mut ErrorSink) -> SynTree {
    let templates = BTreeMap::new();
    let mut reader = RegexReader {
        chars: pattern.chars().collect(),
        pos: 0,
        base_location: NO_LOCATION,
        sink,
        templates: &templates,
    };
    let tree = reader.read_alternation();
    node(GramKind::Regex, NO_LOCATION, vec![tree])
}

/// Build the regex tree matching a string literal exactly, for terminals that appear as
/// quoted strings in rules.
pub fn literal_regex(literal: &str, location: Location) -> SynTree {
    let items = literal
        .chars()
        .map(|c| char_leaf(c, location))
        .collect::<Vec<_>>();
    let list = node(GramKind::RegexList, location, items);
    node(GramKind::Regex, location, vec![list])
}
