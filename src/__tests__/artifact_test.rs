use crate::Parser;
use std::collections::BTreeMap;

const LIST_GRAMMAR: &str = r#"
tokens
    <id> : regex = '[A-Za-z][A-Za-z0-9_]*'
rules
    R ::= <id>+ : (Id, $1._)
"#;

#[test]
pub fn encode_then_decode_is_the_same_parser() {
    let mut original = Parser::new();
    original.generate(LIST_GRAMMAR).expect("grammar should generate");
    let blob = original.encode().expect("a good grammar encodes");

    let mut reloaded = Parser::new();
    reloaded.decode(&blob).expect("the artifact should decode");

    let from_original = original.parse("a b1 cd").unwrap();
    let from_reloaded = reloaded.parse("a b1 cd").unwrap();
    assert_eq!(from_original, from_reloaded);

    // the decoded artifact re-encodes to the identical text
    assert_eq!(reloaded.encode().unwrap(), blob);
}

#[test]
pub fn decode_rejects_garbage() {
    let mut parser = Parser::new();
    assert!(parser.decode("not|a|parser|artifact|").is_err());
    assert!(parser.decode("").is_err());

    let mut original = Parser::new();
    original.generate(LIST_GRAMMAR).unwrap();
    let blob = original.encode().unwrap();
    let truncated = &blob[..blob.len() / 2];
    assert!(parser.decode(truncated).is_err());
}

#[test]
pub fn escaped_delimiters_survive_the_blob() {
    let grammar = r#"
tokens
    <id> : regex = '[a-z]+'
    <bad> : regex = '%'
            error = 'pipe | and tick ` inside'
rules
    S ::= <id>
"#;

    let mut original = Parser::new();
    original.generate(grammar).expect("grammar should generate");
    let blob = original.encode().unwrap();

    let mut reloaded = Parser::new();
    reloaded.decode(&blob).expect("escaped text should decode");
    assert_eq!(reloaded.encode().unwrap(), blob);

    // the reloaded scanner still reports the custom message
    let err = reloaded.parse("%ab").unwrap_err();
    assert!(err.message.contains("pipe | and tick"));
}

#[test]
pub fn preset_kind_map_pins_numbers() {
    let mut kind_map = BTreeMap::new();
    kind_map.insert("Id".to_string(), 5000i64);

    let mut parser = Parser::new();
    parser.set_kind_map(kind_map).unwrap();
    parser.generate(LIST_GRAMMAR).expect("grammar should generate");

    assert_eq!(parser.get_kind("Id").unwrap(), Some(5000));
    let tree = parser.parse("ab").unwrap();
    assert_eq!(tree.kind, 5000);
}

#[test]
pub fn shared_artifact_feeds_many_parsers() {
    let mut original = Parser::new();
    original.generate(LIST_GRAMMAR).unwrap();
    let data = original.parser_data().expect("a generated parser has data");

    let mut second = Parser::attach(data);
    let tree = second.parse("x y").unwrap();
    assert_eq!(tree.children.len(), 2);

    // the first facade is untouched by the second's parsing
    let tree = original.parse("q").unwrap();
    assert_eq!(tree.children.len(), 1);
}
