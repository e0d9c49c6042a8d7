//! The scanner generator.
//!
//! Each scanned token contributes a regular expression. From these the generator builds an
//! NFA with epsilon moves, converts it to a DFA by subset construction, minimizes the DFA by
//! partition refinement, and emits the scan loop as intermediate code. The theory is the
//! classic construction from the automata textbooks; the interesting parts here are guard
//! handling and the precedence rules between overlapping tokens.

mod dfa;
mod emit;
mod minimize;
mod nfa;

#[cfg(test)]
mod __tests__;

use crate::errors::ErrorSink;
use crate::grammar::{Grammar, SymbolId};
use crate::icode::{CodeBuilder, LabelId};
use crate::SynTree;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub usize);

/// Reaching this action in an accepting state proposes a token, subject to its guard.
#[derive(Clone)]
pub struct AcceptAction {
    pub token: SymbolId,
    pub precedence: i32,
    pub guard: Option<SynTree>,
}

/// A transition over an inclusive codepoint range. For DFAs the ranges of one state are
/// pairwise disjoint; NFAs are free to overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Transition {
    pub range_start: u32,
    pub range_end: u32,
    pub target: StateId,
}

/// A state of either automaton. States live in a flat pool on the generator and refer to
/// each other by [StateId], so the cyclic transition graph needs no ownership tricks.
#[derive(Default)]
pub struct State {
    pub e_moves: BTreeSet<StateId>,
    pub transitions: BTreeSet<Transition>,
    pub accepts: Vec<AcceptAction>,
}

pub struct ScannerGenerator<'a> {
    pub(crate) gram: &'a Grammar,
    pub(crate) code: &'a mut CodeBuilder,
    pub(crate) sink: &'a mut ErrorSink,
    pub(crate) states: Vec<State>,
    pub(crate) nfa_start: StateId,
    pub(crate) dfa_start: StateId,
    pub(crate) scan_label: Option<LabelId>,
}

impl<'a> ScannerGenerator<'a> {
    pub fn new(gram: &'a Grammar, code: &'a mut CodeBuilder, sink: &'a mut ErrorSink) -> Self {
        Self {
            gram,
            code,
            sink,
            states: Vec::new(),
            nfa_start: StateId(0),
            dfa_start: StateId(0),
            scan_label: None,
        }
    }

    /// Run the whole pipeline, leaving the scan loop in the intermediate code.
    pub fn generate(&mut self) {
        self.construct_nfa();
        self.nfa_to_dfa();
        if self.sink.error_count() > 0 {
            return;
        }
        self.minimize_dfa();
        self.create_vmcode();
    }

    pub(crate) fn get_new_state(&mut self) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(State::default());
        id
    }

    pub(crate) fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id.0]
    }
}
