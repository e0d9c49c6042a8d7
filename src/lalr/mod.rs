//! LALR(1) table construction.
//!
//! The tables are built as LR(1) item sets merged by core as they are produced, which yields
//! the LALR automaton directly: a goto to an existing core merges its lookaheads and requeues
//! the state when anything new arrived. Shift/reduce conflicts consult the operator
//! precedence metadata from `::^` declarations; what survives is counted against the
//! grammar's `conflicts` option.

use crate::errors::ErrorSink;
use crate::grammar::{Assoc, Grammar, SymbolId};
use crate::parser_data::{lr_encode, ParserData, LR_ACCEPT, LR_REDUCE, LR_SHIFT};
use crate::{DiagnosticKind, NO_LOCATION};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[cfg(test)]
mod __tests__;

/// One production as the table builder sees it. Production 0 is the augmented start.
struct Prod {
    lhs: SymbolId,
    rhs: Vec<SymbolId>,
    rule_num: Option<usize>,
    op_prec: Option<(i32, Assoc)>,
}

type Item = (usize, usize);
type Lookaheads = BTreeSet<SymbolId>;
type ItemSet = BTreeMap<Item, Lookaheads>;

struct LalrGenerator<'a> {
    gram: &'a Grammar,
    sink: &'a mut ErrorSink,
    prods: Vec<Prod>,
    prods_by_lhs: BTreeMap<SymbolId, Vec<usize>>,
    nullable: BTreeSet<SymbolId>,
    first: BTreeMap<SymbolId, BTreeSet<SymbolId>>,

    kernels: Vec<ItemSet>,
    core_index: BTreeMap<Vec<Item>, usize>,
    transitions: BTreeMap<(usize, SymbolId), usize>,
}

/// Build the LALR(1) tables into the artifact.
pub fn generate(gram: &Grammar, prsd: &mut ParserData, sink: &mut ErrorSink) {
    let mut generator = LalrGenerator {
        gram,
        sink,
        prods: Vec::new(),
        prods_by_lhs: BTreeMap::new(),
        nullable: BTreeSet::new(),
        first: BTreeMap::new(),
        kernels: Vec::new(),
        core_index: BTreeMap::new(),
        transitions: BTreeMap::new(),
    };

    generator.collect_prods();
    generator.find_reads_cycles();
    generator.compute_first();
    generator.build_states();
    generator.build_tables(prsd);
}

impl<'a> LalrGenerator<'a> {
    fn collect_prods(&mut self) {
        // the augmented start production
        let start_rhs = match self.gram.start_symbol() {
            Some(start) => vec![start],
            None => vec![],
        };
        self.prods.push(Prod {
            lhs: self.gram.accept_symbol,
            rhs: start_rhs,
            rule_num: None,
            op_prec: None,
        });

        for rule_id in self.gram.rule_ids() {
            let rule = self.gram.rule(rule_id);
            self.prods.push(Prod {
                lhs: rule.lhs,
                rhs: rule.rhs.clone(),
                rule_num: Some(rule.rule_num),
                op_prec: rule.op_prec,
            });
        }

        for (index, prod) in self.prods.iter().enumerate() {
            self.prods_by_lhs.entry(prod.lhs).or_default().push(index);
        }
    }

    /// A cycle of unit productions makes every derivation through it ambiguous.
    fn find_reads_cycles(&mut self) {
        let mut unit_edges: BTreeMap<SymbolId, BTreeSet<SymbolId>> = BTreeMap::new();
        for prod in &self.prods {
            if prod.rhs.len() == 1 && self.gram.symbol(prod.rhs[0]).is_nonterminal {
                unit_edges.entry(prod.lhs).or_default().insert(prod.rhs[0]);
            }
        }

        let nodes: Vec<SymbolId> = unit_edges.keys().copied().collect();
        for start in nodes {
            // walk unit edges; returning to the origin is a cycle
            let mut visited: BTreeSet<SymbolId> = BTreeSet::new();
            let mut pending: Vec<SymbolId> = unit_edges
                .get(&start)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();

            while let Some(next) = pending.pop() {
                if next == start {
                    self.sink.add_error(
                        DiagnosticKind::ReadsCycle,
                        self.gram.symbol(start).location,
                        format!(
                            "Nonterminal '{}' derives itself through unit rules.",
                            self.gram.symbol(start).symbol_name
                        ),
                    );
                    break;
                }
                if visited.insert(next) {
                    if let Some(targets) = unit_edges.get(&next) {
                        pending.extend(targets.iter().copied());
                    }
                }
            }
        }
    }

    fn compute_first(&mut self) {
        for id in self.gram.symbol_ids() {
            let symbol = self.gram.symbol(id);
            let mut set = BTreeSet::new();
            if symbol.is_terminal {
                set.insert(id);
            }
            self.first.insert(id, set);
        }
        self.first.insert(self.gram.eof_symbol, {
            let mut set = BTreeSet::new();
            set.insert(self.gram.eof_symbol);
            set
        });

        let mut any_changes = true;
        while any_changes {
            any_changes = false;
            for prod in &self.prods {
                let mut all_nullable = true;
                let mut gathered: BTreeSet<SymbolId> = BTreeSet::new();

                for rhs in &prod.rhs {
                    if let Some(first) = self.first.get(rhs) {
                        gathered.extend(first.iter().copied());
                    }
                    if !self.nullable.contains(rhs) {
                        all_nullable = false;
                        break;
                    }
                }

                let entry = self.first.entry(prod.lhs).or_default();
                let before = entry.len();
                entry.extend(gathered);
                if entry.len() != before {
                    any_changes = true;
                }

                if all_nullable && self.nullable.insert(prod.lhs) {
                    any_changes = true;
                }
            }
        }
    }

    /// FIRST of a sentential suffix followed by a lookahead set.
    fn first_of_seq(&self, seq: &[SymbolId], follow: &Lookaheads) -> Lookaheads {
        let mut out = Lookaheads::new();
        for symbol in seq {
            if let Some(first) = self.first.get(symbol) {
                out.extend(first.iter().copied());
            }
            if !self.nullable.contains(symbol) {
                return out;
            }
        }
        out.extend(follow.iter().copied());
        out
    }

    fn closure(&self, kernel: &ItemSet) -> ItemSet {
        let mut items = kernel.clone();

        let mut any_changes = true;
        while any_changes {
            any_changes = false;
            let snapshot: Vec<(Item, Lookaheads)> =
                items.iter().map(|(i, l)| (*i, l.clone())).collect();

            for ((prod_index, dot), lookaheads) in snapshot {
                let prod = &self.prods[prod_index];
                if dot >= prod.rhs.len() {
                    continue;
                }
                let next = prod.rhs[dot];
                if !self.gram.symbol(next).is_nonterminal {
                    continue;
                }

                let added = self.first_of_seq(&prod.rhs[dot + 1..], &lookaheads);
                if let Some(child_prods) = self.prods_by_lhs.get(&next) {
                    for child in child_prods {
                        let entry = items.entry((*child, 0)).or_default();
                        let before = entry.len();
                        entry.extend(added.iter().copied());
                        if entry.len() != before {
                            any_changes = true;
                        }
                    }
                }
            }
        }

        items
    }

    fn build_states(&mut self) {
        let mut start_kernel = ItemSet::new();
        let mut eof_la = Lookaheads::new();
        eof_la.insert(self.gram.eof_symbol);
        start_kernel.insert((0, 0), eof_la);

        self.kernels.push(start_kernel);
        self.core_index.insert(vec![(0, 0)], 0);

        let mut worklist: VecDeque<usize> = VecDeque::new();
        worklist.push_back(0);

        while let Some(state) = worklist.pop_front() {
            let closure = self.closure(&self.kernels[state]);

            // group the advanceable items by the symbol after the dot
            let mut by_symbol: BTreeMap<SymbolId, ItemSet> = BTreeMap::new();
            for ((prod_index, dot), lookaheads) in &closure {
                let prod = &self.prods[*prod_index];
                if *dot >= prod.rhs.len() {
                    continue;
                }
                let next = prod.rhs[*dot];
                by_symbol
                    .entry(next)
                    .or_default()
                    .insert((*prod_index, dot + 1), lookaheads.clone());
            }

            for (symbol, kernel) in by_symbol {
                let core: Vec<Item> = kernel.keys().copied().collect();

                let target = match self.core_index.get(&core) {
                    Some(existing) => {
                        // merge lookaheads; anything new reopens the state
                        let mut grew = false;
                        for (item, lookaheads) in &kernel {
                            let entry =
                                self.kernels[*existing].entry(*item).or_default();
                            let before = entry.len();
                            entry.extend(lookaheads.iter().copied());
                            if entry.len() != before {
                                grew = true;
                            }
                        }
                        if grew && !worklist.contains(existing) {
                            worklist.push_back(*existing);
                        }
                        *existing
                    }
                    None => {
                        let target = self.kernels.len();
                        self.kernels.push(kernel);
                        self.core_index.insert(core, target);
                        worklist.push_back(target);
                        target
                    }
                };

                self.transitions.insert((state, symbol), target);
            }
        }
    }

    fn build_tables(&mut self, prsd: &mut ParserData) {
        let mut conflict_count: i64 = 0;
        let mut conflict_notes: Vec<String> = Vec::new();

        let mut rows: Vec<Vec<(i64, i64)>> = Vec::new();

        for state in 0..self.kernels.len() {
            let closure = self.closure(&self.kernels[state]);
            let mut row: BTreeMap<i64, i64> = BTreeMap::new();

            // shifts and gotos
            for ((transition_state, symbol), target) in &self.transitions {
                if *transition_state != state {
                    continue;
                }
                let symbol_num = self.gram.symbol(*symbol).symbol_num as i64;
                row.insert(symbol_num, lr_encode(LR_SHIFT, *target as i64));
            }

            // reductions and accept
            for ((prod_index, dot), lookaheads) in &closure {
                let prod = &self.prods[*prod_index];
                if *dot < prod.rhs.len() {
                    continue;
                }

                if *prod_index == 0 {
                    let eof_num = self.gram.symbol(self.gram.eof_symbol).symbol_num as i64;
                    row.insert(eof_num, lr_encode(LR_ACCEPT, 0));
                    continue;
                }

                let rule_num = prod.rule_num.expect("live production without a rule") as i64;
                for lookahead in lookaheads {
                    let symbol_num = self.gram.symbol(*lookahead).symbol_num as i64;
                    let reduce_action = lr_encode(LR_REDUCE, rule_num);

                    match row.get(&symbol_num).copied() {
                        None => {
                            row.insert(symbol_num, reduce_action);
                        }
                        Some(existing) if existing == reduce_action => {}
                        Some(existing) => {
                            let resolved = self.resolve_conflict(
                                state,
                                *lookahead,
                                existing,
                                reduce_action,
                                prod.op_prec,
                                &mut conflict_count,
                                &mut conflict_notes,
                            );
                            row.insert(symbol_num, resolved);
                        }
                    }
                }
            }

            rows.push(row.into_iter().collect());
        }

        if conflict_count > self.gram.expected_conflicts {
            self.sink.add_error(
                DiagnosticKind::LalrConflict,
                NO_LOCATION,
                format!(
                    "{} unresolved parsing conflict{} (expected {}): {}",
                    conflict_count,
                    if conflict_count == 1 { "" } else { "s" },
                    self.gram.expected_conflicts,
                    conflict_notes.join("; ")
                ),
            );
        }

        prsd.lr_rows = rows;
        prsd.start_state = 0;
        prsd.eof_symbol_num = self.gram.symbol(self.gram.eof_symbol).symbol_num as i64;
        prsd.error_symbol_num = self.gram.symbol(self.gram.error_symbol).symbol_num as i64;
        prsd.error_recovery = self.gram.error_recovery;
    }

    /// Precedence metadata settles a shift/reduce conflict when both sides carry it; what it
    /// cannot settle is counted and defaults to shift, or to the earlier rule.
    #[allow(clippy::too_many_arguments)]
    fn resolve_conflict(
        &self,
        state: usize,
        lookahead: SymbolId,
        existing: i64,
        reduce_action: i64,
        rule_prec: Option<(i32, Assoc)>,
        conflict_count: &mut i64,
        conflict_notes: &mut Vec<String>,
    ) -> i64 {
        use crate::parser_data::{lr_tag, lr_value};

        let lookahead_name = self.gram.symbol(lookahead).symbol_name.clone();

        if lr_tag(existing) == LR_SHIFT {
            let terminal_prec = self.gram.operator_prec.get(&lookahead).copied();
            if let (Some((rule_level, _)), Some((term_level, term_assoc))) =
                (rule_prec, terminal_prec)
            {
                if rule_level > term_level {
                    return reduce_action;
                }
                if rule_level < term_level {
                    return existing;
                }
                return match term_assoc {
                    Assoc::Left => reduce_action,
                    Assoc::Right => existing,
                };
            }

            *conflict_count += 1;
            conflict_notes.push(format!(
                "shift/reduce on '{}' in state {}",
                lookahead_name, state
            ));
            existing
        } else {
            // reduce/reduce: the earlier rule wins
            *conflict_count += 1;
            conflict_notes.push(format!(
                "reduce/reduce on '{}' in state {}",
                lookahead_name, state
            ));
            if lr_value(existing) <= lr_value(reduce_action) {
                existing
            } else {
                reduce_action
            }
        }
    }
}
