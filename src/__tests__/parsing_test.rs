use crate::grammar::syntax::GramKind;
use crate::Parser;

#[test]
pub fn empty_grammar_parses_empty_source() {
    let mut parser = Parser::new();
    parser
        .generate("options\n    conflicts = 0\n")
        .expect("an options-only grammar should generate");

    let tree = parser.parse("").expect("the empty source should parse");
    assert_eq!(tree.kind, GramKind::Null as i64, "should be the null tree");
    assert_eq!(tree.children.len(), 0);
    assert_eq!(parser.get_error_count().unwrap(), 0);
    assert!(parser.is_source_loaded());
}

#[test]
pub fn single_token_scanner_collects_lexemes() {
    let grammar = r#"
tokens
    <id> : regex = '[A-Za-z][A-Za-z0-9_]*'
rules
    R ::= <id>+ : (Id, $1._)
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = match parser.parse("a b1 cd") {
        Ok(tree) => tree,
        Err(err) => panic!("{:?}", err),
    };

    let id_kind = parser.get_kind("Id").unwrap().expect("Id should be registered");
    assert_eq!(tree.kind, id_kind);
    assert_eq!(tree.children.len(), 3);
    assert_eq!(tree.children[0].lexeme, "a");
    assert_eq!(tree.children[1].lexeme, "b1");
    assert_eq!(tree.children[2].lexeme, "cd");
}

#[test]
pub fn ast_slice_splices_closure_children() {
    let grammar = r#"
rules
    L ::= 'a'+ : (List, $1._)
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("aaa").expect("aaa should parse");
    let list_kind = parser.get_kind("List").unwrap().unwrap();
    let a_kind = parser.get_kind("'a'").unwrap().unwrap();

    assert_eq!(tree.kind, list_kind);
    assert_eq!(tree.children.len(), 3);
    for child in &tree.children {
        assert_eq!(child.kind, a_kind, "every child should be an 'a' leaf");
    }

    // left to right order is the source order
    let mut locations: Vec<i64> = tree.children.iter().map(|c| c.location).collect();
    let sorted = {
        let mut sorted = locations.clone();
        sorted.sort();
        sorted
    };
    assert_eq!(locations, sorted);
    locations.dedup();
    assert_eq!(locations.len(), 3);
}

#[test]
pub fn guarded_token_needs_its_flag() {
    let grammar = r#"
tokens
    <a> : regex = [ in_guard ] 'x'
    <b> : regex = 'y'
          action = [ in_guard := 1; ]
rules
    S ::= <b> <a>
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    // scanning y toggles the guard, so the x that follows is accepted
    let tree = parser.parse("yx").expect("yx should parse");
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].lexeme, "y");
    assert_eq!(tree.children[1].lexeme, "x");

    // without the toggle the guarded token never matches
    assert!(parser.parse("x").is_err());
    assert!(parser.is_source_failed());
}

#[test]
pub fn precedence_climb_orders_operators() {
    let grammar = r#"
tokens
    <num> : regex = '[0-9]+'
rules
    E ::^ <num> << '*' '/' << '+' '-'
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("1+2*3").expect("expression should parse");

    let plus_kind = parser.get_kind("'+'").unwrap().unwrap();
    let star_kind = parser.get_kind("'*'").unwrap().unwrap();

    assert_eq!(tree.kind, plus_kind, "the loosest operator should be on top");
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].lexeme, "1");

    let product = &tree.children[1];
    assert_eq!(product.kind, star_kind);
    assert_eq!(product.children[0].lexeme, "2");
    assert_eq!(product.children[1].lexeme, "3");
}

#[test]
pub fn left_associative_operators_nest_left() {
    let grammar = r#"
tokens
    <num> : regex = '[0-9]+'
rules
    E ::^ <num> << '-'
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("7-3-1").expect("expression should parse");
    let minus_kind = parser.get_kind("'-'").unwrap().unwrap();

    // (7-3)-1, not 7-(3-1)
    assert_eq!(tree.kind, minus_kind);
    assert_eq!(tree.children[1].lexeme, "1");
    assert_eq!(tree.children[0].kind, minus_kind);
    assert_eq!(tree.children[0].children[0].lexeme, "7");
    assert_eq!(tree.children[0].children[1].lexeme, "3");
}

#[test]
pub fn syntax_error_moves_to_source_bad() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= <id>
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    match parser.parse("one two") {
        Ok(_) => panic!("two identifiers should not parse as one"),
        Err(err) => {
            assert!(err.pointer > 0, "the error should point into the source");
        }
    }
    assert!(parser.is_source_failed());
    assert!(parser.get_error_count().unwrap() >= 1);

    // a bad source does not poison the grammar
    let tree = parser.parse("one").expect("a single identifier parses");
    assert_eq!(tree.children.len(), 0);
    assert!(parser.is_source_loaded());
}

#[test]
pub fn lexical_error_is_reported_with_position() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= <id>
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    assert!(parser.parse("abc?").is_err());
    let messages = parser.get_error_messages().unwrap();
    let lexical = messages
        .iter()
        .find(|m| m.kind == crate::DiagnosticKind::Lexical)
        .expect("a lexical diagnostic should be recorded");
    assert_eq!(lexical.location, 3);
    assert_eq!(lexical.line, 1);
    assert_eq!(lexical.column, 4);
}

#[test]
pub fn optional_and_group_desugar() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
    <num> : regex = '[0-9]+'
rules
    S ::= <id> ( ',' <id> | ';' <num> )? : (Pair, $1, $2)
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("ab ; 12").expect("grouped tail should parse");
    let pair_kind = parser.get_kind("Pair").unwrap().unwrap();
    assert_eq!(tree.kind, pair_kind);
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].lexeme, "ab");

    // the optional absent: the second child is the null placeholder
    let tree = parser.parse("ab").expect("a bare identifier should parse");
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[1].kind, GramKind::Null as i64);
}

#[test]
pub fn keep_whitespace_scans_blanks_as_tokens() {
    let grammar = r#"
options
    keep_whitespace = true
tokens
    <id> : regex = '[a-z]+'
    <ws> : regex = '{whitespace}'
rules
    S ::= <id> <ws> <id> : (S, $1, $3)
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("ab cd").expect("whitespace should be a token");
    assert_eq!(tree.children.len(), 2);
    assert_eq!(tree.children[0].lexeme, "ab");
    assert_eq!(tree.children[1].lexeme, "cd");
}

#[test]
pub fn former_literal_lexeme_and_location() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= <id> : (Tag, &"marked", @$1, $1)
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("abc").expect("source should parse");
    assert_eq!(tree.lexeme, "marked");
    assert_eq!(tree.location, 0);
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].lexeme, "abc");
}

#[test]
pub fn reduce_guard_statements_run() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= <id>+ : (S, $1._) [ seen := token_count; ]
"#;

    let mut parser = Parser::new();
    parser.generate(grammar).expect("grammar should generate");

    let tree = parser.parse("aa bb cc").expect("source should parse");
    assert_eq!(tree.children.len(), 3);
}
