use crate::errors::ErrorSink;
use crate::grammar::{editor, extract, syntax, Grammar};
use crate::icode::CodeBuilder;
use crate::scanner::{ScannerGenerator, StateId};
use crate::{DiagnosticKind, SourceText};
use std::collections::BTreeSet;

fn build_grammar(text: &str) -> (Grammar, ErrorSink) {
    let src = SourceText::from(text);
    let mut sink = ErrorSink::new(SourceText::from(text));
    let root = syntax::parse_grammar(&src, &mut sink).expect("grammar text should read");
    let mut gram = Grammar::new();
    extract::extract(&mut gram, &root, &mut sink);
    editor::edit(&mut gram, &mut sink);
    assert_eq!(sink.error_count(), 0, "test grammar should be clean");
    (gram, sink)
}

fn reachable(scan: &ScannerGenerator, start: StateId) -> Vec<StateId> {
    let mut seen: BTreeSet<StateId> = BTreeSet::new();
    let mut pending = vec![start];
    while let Some(state) = pending.pop() {
        if !seen.insert(state) {
            continue;
        }
        for transition in &scan.state(state).transitions {
            pending.push(transition.target);
        }
    }
    seen.into_iter().collect()
}

#[test]
pub fn dfa_transition_ranges_are_disjoint() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <kw> : regex = 'if'
           precedence = 200
    <id> : regex = '[a-z]+'
    <num> : regex = '[0-9]+(.[0-9]+)?'
rules
    S ::= <kw> <id> <num>
"#,
    );

    let mut code = CodeBuilder::new();
    let mut scan = ScannerGenerator::new(&gram, &mut code, &mut sink);
    scan.construct_nfa();
    scan.nfa_to_dfa();

    for state in reachable(&scan, scan.dfa_start) {
        let transitions: Vec<_> = scan.state(state).transitions.iter().collect();
        for pair in transitions.windows(2) {
            assert!(
                pair[0].range_end < pair[1].range_start,
                "ranges [{},{}] and [{},{}] overlap",
                pair[0].range_start,
                pair[0].range_end,
                pair[1].range_start,
                pair[1].range_end
            );
        }
    }

    assert_eq!(scan.sink.error_count(), 0);
}

#[test]
pub fn dfa_states_have_no_epsilon_moves() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= <id>
"#,
    );

    let mut code = CodeBuilder::new();
    let mut scan = ScannerGenerator::new(&gram, &mut code, &mut sink);
    scan.construct_nfa();
    scan.nfa_to_dfa();

    for state in reachable(&scan, scan.dfa_start) {
        assert!(scan.state(state).e_moves.is_empty());
    }
}

#[test]
pub fn minimization_only_shrinks_the_automaton() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <a> : regex = 'ab|cb'
rules
    S ::= <a>
"#,
    );

    let mut code = CodeBuilder::new();
    let mut scan = ScannerGenerator::new(&gram, &mut code, &mut sink);
    scan.construct_nfa();
    scan.nfa_to_dfa();

    let before = reachable(&scan, scan.dfa_start).len();
    scan.minimize_dfa();
    let after = reachable(&scan, scan.dfa_start).len();

    assert!(after <= before);
    // the two 'b' tails are indistinguishable and must fuse
    assert!(after < before, "ab|cb has mergeable tail states");
}

#[test]
pub fn same_precedence_overlap_is_a_conflict() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <a> : regex = 'x'
    <b> : regex = 'x'
rules
    S ::= <a> <b>
"#,
    );

    let mut code = CodeBuilder::new();
    let mut scan = ScannerGenerator::new(&gram, &mut code, &mut sink);
    scan.construct_nfa();
    scan.nfa_to_dfa();

    assert!(scan.sink.has_kind(DiagnosticKind::RegexConflict));
}

#[test]
pub fn different_precedence_overlap_is_not() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <a> : regex = 'x'
          precedence = 150
    <b> : regex = 'x|y'
rules
    S ::= <a> <b>
"#,
    );

    let mut code = CodeBuilder::new();
    let mut scan = ScannerGenerator::new(&gram, &mut code, &mut sink);
    scan.construct_nfa();
    scan.nfa_to_dfa();

    assert_eq!(scan.sink.error_count(), 0);

    // the overlap state accepts both tokens at their own precedence
    let overlap = reachable(&scan, scan.dfa_start)
        .into_iter()
        .find(|s| scan.state(*s).accepts.len() == 2);
    assert!(overlap.is_some(), "some state accepts both tokens");
}

#[test]
pub fn scan_loop_emits_an_extern_entry() {
    let (gram, mut sink) = build_grammar(
        r#"
tokens
    <id> : regex = '[a-z]+'
rules
    S ::= <id>
"#,
    );

    let mut code = CodeBuilder::new();
    {
        let mut scan = ScannerGenerator::new(&gram, &mut code, &mut sink);
        scan.generate();
        let label = scan.scan_label.expect("the scan entry label exists");
        assert!(scan.code.label_info(label).is_extern);
    }

    // the emitted loop survives optimization because the entry is extern
    let before = code.instruction_count();
    code.optimize();
    assert!(code.instruction_count() > 3, "the scan loop is still there");
    assert!(code.instruction_count() <= before);
}
