//! Subset construction: NFA with epsilon moves to DFA.
//!
//! A DFA state stands for the epsilon closure of a set of NFA states, interned in a map keyed
//! by that set, driven from a worklist. Collapsing a state's outgoing transitions sweeps the
//! range endpoints so the resulting ranges are pairwise disjoint, each mapped to the DFA
//! state for the closure of the targets active over that range.

use super::{ScannerGenerator, StateId, Transition};
use crate::DiagnosticKind;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

impl<'a> ScannerGenerator<'a> {
    pub(crate) fn nfa_to_dfa(&mut self) {
        let mut intern: BTreeMap<Vec<StateId>, StateId> = BTreeMap::new();
        let mut members: BTreeMap<StateId, Vec<StateId>> = BTreeMap::new();
        let mut workpile: VecDeque<StateId> = VecDeque::new();

        let mut start_set: BTreeSet<StateId> = BTreeSet::new();
        start_set.insert(self.nfa_start);
        self.find_e_closure(&mut start_set);

        self.dfa_start = self.get_dfa_state(
            start_set,
            &mut intern,
            &mut members,
            &mut workpile,
        );

        while let Some(state) = workpile.pop_front() {
            self.collapse_dfa_state(state, &mut intern, &mut members, &mut workpile);
        }
    }

    /// Add to a state set every state reachable through epsilon moves.
    pub(crate) fn find_e_closure(&self, closure: &mut BTreeSet<StateId>) {
        let mut additions: Vec<StateId> = closure.iter().copied().collect();

        while let Some(state) = additions.pop() {
            for next_state in &self.state(state).e_moves {
                if closure.insert(*next_state) {
                    additions.push(*next_state);
                }
            }
        }
    }

    /// The DFA state for a set of NFA states, interning a new one when unseen.
    fn get_dfa_state(
        &mut self,
        state_set: BTreeSet<StateId>,
        intern: &mut BTreeMap<Vec<StateId>, StateId>,
        members: &mut BTreeMap<StateId, Vec<StateId>>,
        workpile: &mut VecDeque<StateId>,
    ) -> StateId {
        let key: Vec<StateId> = state_set.iter().copied().collect();

        if let Some(existing) = intern.get(&key) {
            return *existing;
        }

        let state = self.get_new_state();
        intern.insert(key.clone(), state);
        members.insert(state, key);
        workpile.push_back(state);
        state
    }

    /// Collapse the transitions of the member NFA states into disjoint DFA transitions, and
    /// merge their accept actions.
    fn collapse_dfa_state(
        &mut self,
        state: StateId,
        intern: &mut BTreeMap<Vec<StateId>, StateId>,
        members: &mut BTreeMap<StateId, Vec<StateId>>,
        workpile: &mut VecDeque<StateId>,
    ) {
        let member_states = members.get(&state).cloned().unwrap_or_default();

        // merged transitions and accept actions of every member
        let mut transitions: Vec<Transition> = Vec::new();
        for nfa_state in &member_states {
            for transition in &self.state(*nfa_state).transitions {
                transitions.push(*transition);
            }

            let accepts = self.state(*nfa_state).accepts.clone();
            for accept in accepts {
                let already = self
                    .state(state)
                    .accepts
                    .iter()
                    .any(|a| a.token == accept.token && a.guard == accept.guard);
                if !already {
                    self.state_mut(state).accepts.push(accept);
                }
            }
        }

        self.check_accept_conflicts(state);

        // sweep the endpoints: each elementary interval maps to the closure of the targets
        // active over it, and adjacent intervals with the same target fuse back together
        let mut points: BTreeSet<u32> = BTreeSet::new();
        for transition in &transitions {
            points.insert(transition.range_start);
            if let Some(after) = transition.range_end.checked_add(1) {
                points.insert(after);
            }
        }

        let points: Vec<u32> = points.into_iter().collect();
        let mut pending: Option<(u32, u32, StateId)> = None;

        for (index, &point) in points.iter().enumerate() {
            let interval_end = match points.get(index + 1) {
                Some(next) => next - 1,
                None => u32::MAX,
            };

            let mut targets: BTreeSet<StateId> = BTreeSet::new();
            for transition in &transitions {
                if transition.range_start <= point && point <= transition.range_end {
                    targets.insert(transition.target);
                }
            }

            if targets.is_empty() {
                if let Some((start, end, target)) = pending.take() {
                    self.state_mut(state).transitions.insert(Transition {
                        range_start: start,
                        range_end: end,
                        target,
                    });
                }
                continue;
            }

            let mut closure = targets;
            self.find_e_closure(&mut closure);
            let target = self.get_dfa_state(closure, intern, members, workpile);

            pending = match pending.take() {
                Some((start, end, prev_target))
                    if prev_target == target && end.saturating_add(1) == point =>
                {
                    Some((start, interval_end, prev_target))
                }
                Some((start, end, prev_target)) => {
                    self.state_mut(state).transitions.insert(Transition {
                        range_start: start,
                        range_end: end,
                        target: prev_target,
                    });
                    Some((point, interval_end, target))
                }
                None => Some((point, interval_end, target)),
            };
        }

        if let Some((start, end, target)) = pending {
            self.state_mut(state).transitions.insert(Transition {
                range_start: start,
                range_end: end,
                target,
            });
        }
    }

    /// Two distinct tokens accepted at the same precedence cannot be told apart.
    fn check_accept_conflicts(&mut self, state: StateId) {
        let mut by_precedence: BTreeMap<i32, BTreeSet<usize>> = BTreeMap::new();
        for accept in &self.state(state).accepts {
            by_precedence
                .entry(accept.precedence)
                .or_default()
                .insert(accept.token.0);
        }

        for (_, tokens) in by_precedence {
            if tokens.len() < 2 {
                continue;
            }

            let names: Vec<String> = tokens
                .iter()
                .map(|t| {
                    self.gram
                        .symbol(crate::grammar::SymbolId(*t))
                        .symbol_name
                        .clone()
                })
                .collect();

            let joined = match names.split_last() {
                Some((last, rest)) if !rest.is_empty() => {
                    format!("{} and {}", rest.join(", "), last)
                }
                _ => names.join(", "),
            };

            self.sink.add_error(
                DiagnosticKind::RegexConflict,
                crate::NO_LOCATION,
                format!(
                    "Token regex conflict {} {}",
                    if tokens.len() > 2 { "among" } else { "between" },
                    joined
                ),
            );
        }
    }
}
