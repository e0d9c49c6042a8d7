use crate::{DiagnosticKind, Parser};

fn kinds_of(parser: &Parser) -> Vec<DiagnosticKind> {
    parser
        .get_error_messages()
        .unwrap()
        .iter()
        .map(|m| m.kind)
        .collect()
}

#[test]
pub fn overlapping_regex_at_equal_precedence_conflicts() {
    let grammar = r#"
tokens
    <a> : regex = 'x'
    <b> : regex = 'x'
rules
    S ::= <a> <b>
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(parser.is_grammar_failed());

    let messages = parser.get_error_messages().unwrap();
    let conflict = messages
        .iter()
        .find(|m| m.kind == DiagnosticKind::RegexConflict)
        .expect("a regex conflict should be recorded");
    assert!(conflict.short_message.contains("<a>"));
    assert!(conflict.short_message.contains("<b>"));
}

#[test]
pub fn distinct_precedence_resolves_overlap() {
    let grammar = r#"
tokens
    <kw> : regex = 'if'
           precedence = 200
    <id> : regex = '[a-z]+'
rules
    S ::= ( <kw> | <id> ) ( <kw> | <id> ) : (S, $1, $2)
"#;

    let mut parser = Parser::new();
    parser
        .generate(grammar)
        .expect("precedence separates the keyword from the identifier");

    // the keyword outranks the identifier on the exact overlap
    let tree = parser.parse("if ab").expect("source should parse");
    let kw_kind = parser.get_kind("<kw>").unwrap().unwrap();
    let id_kind = parser.get_kind("<id>").unwrap().unwrap();
    assert_eq!(tree.children[0].kind, kw_kind);
    assert_eq!(tree.children[1].kind, id_kind);

    // a longer identifier match still beats the keyword prefix
    let tree = parser.parse("ifx ab").expect("source should parse");
    assert_eq!(tree.children[0].kind, id_kind);
    assert_eq!(tree.children[0].lexeme, "ifx");
}

#[test]
pub fn undefined_nonterminal_is_an_error() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= X
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(parser.is_grammar_failed());

    let messages = parser.get_error_messages().unwrap();
    let undefined = messages
        .iter()
        .find(|m| m.kind == DiagnosticKind::UndefinedNonterm)
        .expect("an undefined nonterminal should be recorded");
    assert!(undefined.short_message.contains('X'));

    let reference = grammar.find("X").unwrap() as i64;
    assert_eq!(undefined.location, reference);
}

#[test]
pub fn unused_terminal_warns_but_generates() {
    let grammar = r#"
tokens
    <a> : regex = 'x'
    <b> : regex = 'y'
rules
    S ::= <a>
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("warnings do not stop generation");
    assert!(kinds_of(&parser).contains(&DiagnosticKind::UnusedTerm));
    assert!(parser.get_warning_count().unwrap() >= 1);
    assert_eq!(parser.get_error_count().unwrap(), 0);

    parser.parse("x").expect("the used token still scans");
}

#[test]
pub fn duplicate_token_option_is_an_error() {
    let grammar = r#"
tokens
    <a> : regex = 'x'
          regex = 'y'
rules
    S ::= <a>
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::DupTokenOption));
}

#[test]
pub fn duplicate_grammar_option_is_an_error() {
    let grammar = r#"
options
    lookaheads = 2
    lookaheads = 3
rules
    S ::= 'x'
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::DupGrammarOption));
}

#[test]
pub fn duplicate_token_declaration_is_an_error() {
    let grammar = r#"
tokens
    <a> : regex = 'x'
    <a> : regex = 'y'
rules
    S ::= <a>
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::DupToken));
}

#[test]
pub fn duplicate_former_kind_is_an_error() {
    let grammar = r#"
tokens
    <a> : regex = 'x'
rules
    S ::= <a> : (One, Two)
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::DupAstItem));
}

#[test]
pub fn former_index_outside_rule_is_an_error() {
    let grammar = r#"
tokens
    <a> : regex = 'x'
rules
    S ::= <a> : (S, $3)
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::AstIndex));
}

#[test]
pub fn unknown_macro_is_an_error() {
    let grammar = r#"
tokens
    <a> : regex = '{nosuchthing}'
rules
    S ::= <a>
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::UnknownMacro));
}

#[test]
pub fn backwards_character_range_is_an_error() {
    let grammar = r#"
tokens
    <a> : regex = '[z-a]+'
rules
    S ::= <a>
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::CharacterRange));
}

#[test]
pub fn template_tokens_expand_as_macros() {
    let grammar = r#"
tokens
    <letters> : regex = '[a-z]+'
                template = true
    <id> : regex = '{letters}'
rules
    S ::= <id>
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("templates should expand");

    let tree = parser.parse("abc").expect("source should parse");
    assert_eq!(tree.lexeme, "abc");
}

#[test]
pub fn unresolved_conflicts_beyond_budget_fail() {
    let grammar = r#"
tokens
    <num> : regex = '[0-9]+'
rules
    E ::= E '+' E
    E ::= <num>
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::LalrConflict));
}

#[test]
pub fn expected_conflicts_are_tolerated() {
    let grammar = r#"
options
    conflicts = 1
tokens
    <num> : regex = '[0-9]+'
rules
    E ::= E '+' E
    E ::= <num>
"#;

    let mut parser = Parser::new();
    parser
        .generate(grammar)
        .expect("a budgeted conflict should not stop generation");

    // the default resolution shifts, so the grammar still parses
    let tree = parser.parse("1+2+3").expect("source should parse");
    assert!(tree.children.len() > 0);
}

#[test]
pub fn unit_rule_cycle_is_an_error() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
rules
    A ::= B | <id>
    B ::= A
"#;

    let mut parser = Parser::new();
    assert!(parser.generate(grammar).is_err());
    assert!(kinds_of(&parser).contains(&DiagnosticKind::ReadsCycle));
}

#[test]
pub fn operations_are_guarded_by_state() {
    let parser = Parser::new();
    assert!(parser.encode().is_err());
    assert!(parser.get_ast().is_err());
    assert!(parser.get_error_messages().is_err());

    let mut parser = Parser::new();
    parser
        .generate("rules\n    S ::= 'x'\n")
        .expect("grammar should generate");
    assert!(parser.get_ast().is_err(), "no source has been parsed yet");
    assert!(parser.encode().is_ok());
}
