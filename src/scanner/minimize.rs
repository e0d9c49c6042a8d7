//! DFA minimization by iterative partition refinement.
//!
//! States start out bucketed alone and merge whenever they are indistinguishable under the
//! current partition of their targets. A similarity key, the accepted tokens plus the shape
//! of the transition ranges, prunes the pairs worth comparing: two states with different keys
//! can never merge. After the fixpoint, transitions are rebuilt onto bucket representatives.

use super::{ScannerGenerator, StateId, Transition};
use std::collections::{BTreeMap, BTreeSet};

/// Accept tokens and transition range shape; equal keys are necessary for mergeability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SimilarKey {
    tokens: Vec<usize>,
    shape: Vec<(u32, u32)>,
}

impl<'a> ScannerGenerator<'a> {
    pub(crate) fn minimize_dfa(&mut self) {
        let mut bucket_list: Vec<BTreeSet<StateId>> = Vec::new();
        let mut bucket_map: BTreeMap<StateId, usize> = BTreeMap::new();
        let mut similar_states: BTreeMap<SimilarKey, Vec<StateId>> = BTreeMap::new();

        // place every reachable state in its own bucket, grouped by similarity key
        let mut pending = vec![self.dfa_start];
        while let Some(state) = pending.pop() {
            if bucket_map.contains_key(&state) {
                continue;
            }

            let mut bucket = BTreeSet::new();
            bucket.insert(state);
            bucket_map.insert(state, bucket_list.len());
            bucket_list.push(bucket);

            similar_states
                .entry(self.similar_key(state))
                .or_default()
                .push(state);

            for transition in &self.state(state).transitions {
                pending.push(transition.target);
            }
        }

        // merge indistinguishable states until no pass finds anything to merge
        let mut any_changes = true;
        while any_changes {
            any_changes = false;

            for (_, state_list) in &similar_states {
                for i in 0..state_list.len() {
                    for j in (i + 1)..state_list.len() {
                        let left_bucket = bucket_map[&state_list[i]];
                        let right_bucket = bucket_map[&state_list[j]];
                        if left_bucket == right_bucket {
                            continue;
                        }

                        let left = *bucket_list[left_bucket].iter().next().unwrap();
                        let right = *bucket_list[right_bucket].iter().next().unwrap();
                        if self.indistinguishable(left, right, &bucket_map) {
                            // merge the right bucket into the left
                            let moved: Vec<StateId> =
                                bucket_list[right_bucket].iter().copied().collect();
                            for state in moved {
                                bucket_list[left_bucket].insert(state);
                                bucket_map.insert(state, left_bucket);
                            }
                            bucket_list[right_bucket].clear();
                            any_changes = true;
                        }
                    }
                }
            }
        }

        // rebuild every transition onto its bucket representative
        let mut rebuilt: BTreeSet<StateId> = BTreeSet::new();
        let mut pending = vec![self.dfa_start];
        while let Some(state) = pending.pop() {
            if !rebuilt.insert(state) {
                continue;
            }

            let new_transitions: BTreeSet<Transition> = self
                .state(state)
                .transitions
                .iter()
                .map(|t| Transition {
                    range_start: t.range_start,
                    range_end: t.range_end,
                    target: *bucket_list[bucket_map[&t.target]].iter().next().unwrap(),
                })
                .collect();

            for transition in &new_transitions {
                pending.push(transition.target);
            }
            self.state_mut(state).transitions = new_transitions;
        }
    }

    fn similar_key(&self, state: StateId) -> SimilarKey {
        let state = self.state(state);
        let mut tokens: Vec<usize> = state.accepts.iter().map(|a| a.token.0).collect();
        tokens.sort();
        tokens.dedup();

        SimilarKey {
            tokens,
            shape: state
                .transitions
                .iter()
                .map(|t| (t.range_start, t.range_end))
                .collect(),
        }
    }

    /// Equal accepts, including guards, and matching transitions into the same buckets.
    fn indistinguishable(
        &self,
        left: StateId,
        right: StateId,
        bucket_map: &BTreeMap<StateId, usize>,
    ) -> bool {
        let left_state = self.state(left);
        let right_state = self.state(right);

        if left_state.accepts.len() != right_state.accepts.len() {
            return false;
        }
        for (left_accept, right_accept) in
            left_state.accepts.iter().zip(right_state.accepts.iter())
        {
            if left_accept.token != right_accept.token
                || left_accept.guard != right_accept.guard
            {
                return false;
            }
        }

        if left_state.transitions.len() != right_state.transitions.len() {
            return false;
        }
        for (left_transition, right_transition) in left_state
            .transitions
            .iter()
            .zip(right_state.transitions.iter())
        {
            if left_transition.range_start != right_transition.range_start
                || left_transition.range_end != right_transition.range_end
                || bucket_map[&left_transition.target] != bucket_map[&right_transition.target]
            {
                return false;
            }
        }

        true
    }
}
