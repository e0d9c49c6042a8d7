use crate::errors::ErrorSink;
use crate::grammar::{editor, extract, syntax, Grammar};
use crate::lalr;
use crate::parser_data::{lr_tag, ParserData, LR_ACCEPT, LR_SHIFT};
use crate::{DiagnosticKind, SourceText};

fn build_grammar(text: &str) -> (Grammar, ErrorSink) {
    let src = SourceText::from(text);
    let mut sink = ErrorSink::new(SourceText::from(text));
    let root = syntax::parse_grammar(&src, &mut sink).expect("grammar text should read");
    let mut gram = Grammar::new();
    extract::extract(&mut gram, &root, &mut sink);
    editor::edit(&mut gram, &mut sink);
    (gram, sink)
}

#[test]
pub fn tables_cover_shift_goto_and_accept() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <a> : regex = 'x'
    <b> : regex = 'y'
rules
    S ::= <a> S
    S ::= <b>
"#,
    );

    let mut prsd = ParserData::new();
    lalr::generate(&gram, &mut prsd, &mut sink);
    assert_eq!(sink.error_count(), 0);

    assert!(prsd.lr_rows.len() >= 4, "the automaton has several states");
    assert_eq!(prsd.start_state, 0);

    // the start state shifts both terminals and has a goto for S
    let a_num = gram.symbol(gram.get_symbol("<a>").unwrap()).symbol_num as i64;
    let b_num = gram.symbol(gram.get_symbol("<b>").unwrap()).symbol_num as i64;
    let s_num = gram.symbol(gram.get_symbol("S").unwrap()).symbol_num as i64;

    assert_eq!(lr_tag(prsd.lr_action(0, a_num)), LR_SHIFT);
    assert_eq!(lr_tag(prsd.lr_action(0, b_num)), LR_SHIFT);
    assert_eq!(lr_tag(prsd.lr_action(0, s_num)), LR_SHIFT);

    // some state accepts on end of input
    let accepts = prsd
        .lr_rows
        .iter()
        .any(|row| row.iter().any(|(_, action)| lr_tag(*action) == LR_ACCEPT));
    assert!(accepts);
}

#[test]
pub fn empty_grammar_accepts_immediately() {
    let (gram, mut sink) = build_grammar("options\n    conflicts = 0\n");

    let mut prsd = ParserData::new();
    lalr::generate(&gram, &mut prsd, &mut sink);
    assert_eq!(sink.error_count(), 0);

    let action = prsd.lr_action(0, prsd.eof_symbol_num);
    assert_eq!(lr_tag(action), LR_ACCEPT);
}

#[test]
pub fn ambiguity_without_budget_is_reported() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <num> : regex = '[0-9]+'
rules
    E ::= E '+' E
    E ::= <num>
"#,
    );

    let mut prsd = ParserData::new();
    lalr::generate(&gram, &mut prsd, &mut sink);
    assert!(sink.has_kind(DiagnosticKind::LalrConflict));
}

#[test]
pub fn operator_metadata_resolves_ambiguity() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <num> : regex = '[0-9]+'
rules
    E ::^ <num> << '+'
"#,
    );

    let mut prsd = ParserData::new();
    lalr::generate(&gram, &mut prsd, &mut sink);
    assert_eq!(sink.error_count(), 0, "the climb desugaring is unambiguous");
    assert!(!sink.has_kind(DiagnosticKind::LalrConflict));
}
