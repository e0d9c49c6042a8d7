//! Language parser generator (lang_pg) is a library to compile a grammar written in a small
//! declarative DSL into an executable parser, and to run that parser over source documents
//! producing an abstract syntax tree ([SynTree]) or a list of diagnostics ([Diagnostic]).
//!
//! # Overview
//!
//! A parser built with a generator tool is described in a grammar language rather than in
//! handwritten code. This library consumes such a grammar description and produces parsing and
//! scanning machinery as bytecode for a small virtual machine. The generated parser can be used
//! immediately, or serialized to a text artifact with [Parser::encode] and reloaded later with
//! [Parser::decode] without paying the generation cost again.
//!
//! The grammar language has three sections. An `options` section sets global switches such as
//! `conflicts` or `keep_whitespace`. A `tokens` section declares scanned tokens with regular
//! expressions, precedences, guards and actions. A `rules` section holds the productions of the
//! language, each optionally followed by an AST former describing the tree built when the rule
//! is reduced.
//!
//! # Design
//!
//! Generation is a strictly sequential pipeline. The grammar description is parsed into a syntax
//! tree and extracted into a symbol/rule model. An editing pass removes unused symbols and
//! reports undefined or useless ones. The scanner generator builds an NFA from the token regular
//! expressions, converts it to a DFA by subset construction, minimizes it, and emits a scan loop
//! in intermediate code. The reduce generator emits tree-forming code for every rule with an AST
//! former or guard. The intermediate code is peephole optimized and laid out as flat bytecode
//! which the virtual machine in [engine] executes against a source buffer.
//!
//! # Example
//!
//! ```
//! use lang_pg::Parser;
//!
//! let grammar = r#"
//! tokens
//!     <id> : regex = '[A-Za-z][A-Za-z0-9_]*'
//! rules
//!     List ::= <id>+ : (List, $1._)
//! "#;
//!
//! let mut parser = Parser::new();
//! parser.generate(grammar).unwrap();
//!
//! let tree = parser.parse("alpha beta gamma").unwrap();
//! assert_eq!(tree.children.len(), 3);
//! assert_eq!(tree.children[0].lexeme, "alpha");
//! ```
//!
//! # License
//! [lang_pg](crate) is provided under the MIT license.

mod ast;
mod code;
mod errors;
pub mod actions;
pub mod engine;
pub mod grammar;
pub mod icode;
pub mod lalr;
mod parser_data;
mod parsing;
mod position;
pub mod reduce;
pub mod scanner;
mod util;

#[cfg(test)]
mod __tests__;

pub use parser_data::{KindMap, ParserData};
pub use util::Log;

use errors::ErrorSink;
use std::collections::BTreeMap;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

/// A source location: a byte offset into the parsed text, or -1 meaning "no location".
pub type Location = i64;

/// The location value used when a diagnostic or node is not tied to the source.
pub const NO_LOCATION: Location = -1;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// The line and column information at a source offset. Both are 1-based.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A wrapper for the text being processed, with lazily computed line information.
pub struct SourceText {
    pub text: String,
    line_breaks: OnceCell<Vec<usize>>,
}

#[derive(Clone, PartialEq, Eq)]
/// Abstract syntax tree node produced by a generated parser.
///
/// Nodes form a uniform n-ary tagged tree. The `kind` names the syntactic category through the
/// parser's kind map; kinds below the reserved grammar boundary belong to the grammar
/// description language itself, larger values are allocated on demand for user grammars.
pub struct SynTree {
    pub kind: i64,
    pub lexeme: String,
    pub location: Location,
    pub children: Vec<SynTree>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Category of a [Diagnostic]. Each category carries a fixed severity; categories at or above
/// the error threshold abort generation or parsing.
pub enum DiagnosticKind {
    Error,
    Warning,
    UnknownMacro,
    DupGrammarOption,
    DupToken,
    DupTokenOption,
    UnusedTerm,
    UndefinedNonterm,
    UnusedNonterm,
    UselessNonterm,
    UselessRule,
    ReadsCycle,
    SymbolSelfProduce,
    LalrConflict,
    WordOverflow,
    CharacterRange,
    RegexConflict,
    DupAstItem,
    Syntax,
    Lexical,
    AstIndex,
}

#[derive(Debug, Clone)]
/// A single diagnostic recorded against the grammar description or a parsed source document.
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: i32,
    pub location: Location,
    pub line: usize,
    pub column: usize,
    pub source_line: String,
    pub short_message: String,
    pub long_message: String,
}

#[derive(Debug)]
/// An error returned due to failed validation of an operation against the parser state, or a
/// corrupt artifact on decode.
pub struct ImplementationError {
    message: String,
    what: String,
}

#[derive(Debug)]
/// An error returned when grammar generation fails. The detailed messages are available from
/// [Parser::get_error_messages].
pub struct GrammarError {
    pub message: String,
}

#[derive(Debug)]
/// An error returned when the parser failed to parse the input because of a source error.
pub struct ParseError {
    pub pointer: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Facade state. Operations are legal only in a subset of states; see [Parser].
pub enum ParserState {
    Invalid,
    KindMapGood,
    GrammarGood,
    GrammarBad,
    SourceGood,
    SourceBad,
}

/// A parser facade constructed around a generated (or decoded) grammar.
///
/// The facade is state dependent. It starts [Invalid](ParserState::Invalid); [Parser::generate]
/// or [Parser::decode] move it to `GrammarGood` or `GrammarBad`; [Parser::parse] moves it to
/// `SourceGood` or `SourceBad`. Calling an operation that is illegal in the current state
/// returns an [ImplementationError]. Backward transitions release the resources of the state
/// being left.
pub struct Parser {
    state: ParserState,
    data: Option<Rc<ParserData>>,
    sink: Option<ErrorSink>,
    ast: Option<SynTree>,
    pending_kind_map: Option<BTreeMap<String, i64>>,
    log: OnceCell<Log<&'static str>>,
}
