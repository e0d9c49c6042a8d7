//! Light editing and fix-up phase following extraction.
//!
//! Detects and removes nonsense like unused symbols and rules. For serious problems, a needed
//! symbol with no definition or a nonterminal that derives nothing, the pipeline stops. A
//! grammar that survives this phase is clean enough to build the parsing automaton.

use super::{Grammar, RuleId, SymbolId};
use crate::errors::ErrorSink;
use crate::{DiagnosticKind, NO_LOCATION};
use std::collections::BTreeSet;

pub struct Editor<'sink> {
    sink: &'sink mut ErrorSink,
    useless_symbols: BTreeSet<SymbolId>,
    useless_rules: BTreeSet<RuleId>,
}

/// Run every editing pass, then clean the flagged symbols and rules out of the grammar.
/// Error-severity findings leave the model untouched; the caller refuses to continue.
pub fn edit(gram: &mut Grammar, sink: &mut ErrorSink) {
    let mut editor = Editor {
        sink,
        useless_symbols: BTreeSet::new(),
        useless_rules: BTreeSet::new(),
    };

    editor.find_unused_terminals(gram);
    editor.find_undefined_nonterminals(gram);
    editor.find_unused_nonterminals(gram);
    editor.find_useless_nonterminals(gram);
    editor.find_useless_rules(gram);

    for symbol in editor.useless_symbols {
        gram.delete_symbol(symbol);
    }
    for rule in editor.useless_rules {
        gram.delete_rule(rule);
    }
}

impl<'sink> Editor<'sink> {
    /// An unused terminal is probably an incomplete grammar: the definition exists but no
    /// rule mentions it yet. A warning.
    fn find_unused_terminals(&mut self, gram: &Grammar) {
        let mut unused: BTreeSet<SymbolId> = gram
            .symbol_ids()
            .filter(|id| {
                let symbol = gram.symbol(*id);
                symbol.is_terminal && !symbol.is_ignored && !symbol.is_error
            })
            .collect();

        for rule_id in gram.rule_ids() {
            for rhs in &gram.rule(rule_id).rhs {
                unused.remove(rhs);
            }
        }

        unused.remove(&gram.epsilon_symbol);
        unused.remove(&gram.error_symbol);
        unused.remove(&gram.eof_symbol);

        if !unused.is_empty() {
            let names: Vec<String> = unused
                .iter()
                .map(|id| gram.symbol(*id).symbol_name.clone())
                .collect();
            self.sink.add_error(
                DiagnosticKind::UnusedTerm,
                NO_LOCATION,
                format!(
                    "The following terminal{} unused: {}",
                    if names.len() > 1 { "s are" } else { " is" },
                    names.join(", ")
                ),
            );
            self.useless_symbols.extend(unused);
        }
    }

    /// A nonterminal used on a right hand side but defined nowhere. An error.
    fn find_undefined_nonterminals(&mut self, gram: &Grammar) {
        let mut undefined: BTreeSet<SymbolId> = gram
            .symbol_ids()
            .filter(|id| gram.symbol(*id).is_nonterminal)
            .collect();

        undefined.remove(&gram.accept_symbol);
        for rule_id in gram.rule_ids() {
            undefined.remove(&gram.rule(rule_id).lhs);
        }

        if !undefined.is_empty() {
            // report at the first reference so the user can find it
            let mut location = NO_LOCATION;
            for id in &undefined {
                let symbol = gram.symbol(*id);
                if symbol.location >= 0 && (location < 0 || symbol.location < location) {
                    location = symbol.location;
                }
            }

            let names: Vec<String> = undefined
                .iter()
                .map(|id| gram.symbol(*id).symbol_name.clone())
                .collect();
            self.sink.add_error(
                DiagnosticKind::UndefinedNonterm,
                location,
                format!(
                    "The following nonterminal{} undefined: {}",
                    if names.len() > 1 { "s are" } else { " is" },
                    names.join(", ")
                ),
            );
        }
    }

    /// A nonterminal mentioned nowhere outside its own definitions. A warning.
    fn find_unused_nonterminals(&mut self, gram: &Grammar) {
        let mut unused: BTreeSet<SymbolId> = gram
            .symbol_ids()
            .filter(|id| gram.symbol(*id).is_nonterminal)
            .collect();

        unused.remove(&gram.accept_symbol);
        if let Some(start) = gram.start_symbol() {
            unused.remove(&start);
        }

        for rule_id in gram.rule_ids() {
            for rhs in &gram.rule(rule_id).rhs {
                unused.remove(rhs);
            }
        }

        if !unused.is_empty() {
            let names: Vec<String> = unused
                .iter()
                .map(|id| gram.symbol(*id).symbol_name.clone())
                .collect();
            self.sink.add_error(
                DiagnosticKind::UnusedNonterm,
                NO_LOCATION,
                format!(
                    "The following nonterminal{} unused: {}",
                    if names.len() > 1 { "s are" } else { " is" },
                    names.join(", ")
                ),
            );
            self.useless_symbols.extend(unused);
        }
    }

    /// A useless nonterminal cannot derive any terminal string. Found by removing, to a
    /// fixpoint, every nonterminal with a rule whose rhs is already clean. An error.
    fn find_useless_nonterminals(&mut self, gram: &Grammar) {
        let mut useless: BTreeSet<SymbolId> = gram
            .symbol_ids()
            .filter(|id| gram.symbol(*id).is_nonterminal)
            .collect();
        useless.remove(&gram.accept_symbol);

        let mut any_changes = true;
        while any_changes {
            any_changes = false;
            for rule_id in gram.rule_ids() {
                let rule = gram.rule(rule_id);

                if !useless.contains(&rule.lhs) {
                    continue;
                }

                let found = rule.rhs.iter().any(|s| useless.contains(s));
                if !found {
                    useless.remove(&rule.lhs);
                    any_changes = true;
                }
            }
        }

        if !useless.is_empty() {
            for id in &useless {
                // a symbol that only ever produces itself deserves its own message
                let only_self = gram.rule_ids().filter(|r| gram.rule(*r).lhs == *id).all(|r| {
                    let rule = gram.rule(r);
                    rule.rhs.len() == 1 && rule.rhs[0] == *id
                });
                if only_self {
                    self.sink.add_error(
                        DiagnosticKind::SymbolSelfProduce,
                        gram.symbol(*id).location,
                        format!(
                            "Nonterminal '{}' produces only itself.",
                            gram.symbol(*id).symbol_name
                        ),
                    );
                }
            }

            let names: Vec<String> = useless
                .iter()
                .map(|id| gram.symbol(*id).symbol_name.clone())
                .collect();
            self.sink.add_error(
                DiagnosticKind::UselessNonterm,
                NO_LOCATION,
                format!(
                    "The following nonterminal{} useless: {}",
                    if names.len() > 1 { "s are" } else { " is" },
                    names.join(", ")
                ),
            );
        }
    }

    /// A rule whose lhs cannot be reached from the start symbol. A warning.
    fn find_useless_rules(&mut self, gram: &Grammar) {
        let mut reachable: BTreeSet<SymbolId> = gram
            .symbol_ids()
            .filter(|id| {
                let symbol = gram.symbol(*id);
                symbol.is_terminal && !self.useless_symbols.contains(id)
            })
            .collect();

        if let Some(start) = gram.start_symbol() {
            reachable.insert(start);
        }
        reachable.insert(gram.accept_symbol);

        let mut any_changes = true;
        while any_changes {
            any_changes = false;
            for rule_id in gram.rule_ids() {
                let rule = gram.rule(rule_id);
                if !reachable.contains(&rule.lhs) {
                    continue;
                }
                for rhs in &rule.rhs {
                    if reachable.insert(*rhs) {
                        any_changes = true;
                    }
                }
            }
        }

        let mut flagged_names: Vec<String> = Vec::new();
        for rule_id in gram.rule_ids() {
            let rule = gram.rule(rule_id);
            let lhs_unreachable = !reachable.contains(&rule.lhs);
            let lhs_useless = self.useless_symbols.contains(&rule.lhs);
            if lhs_unreachable || lhs_useless {
                self.useless_rules.insert(rule_id);
                if lhs_unreachable && !lhs_useless {
                    flagged_names.push(gram.symbol(rule.lhs).symbol_name.clone());
                }
            }
        }

        flagged_names.sort();
        flagged_names.dedup();
        if !flagged_names.is_empty() {
            self.sink.add_error(
                DiagnosticKind::UselessRule,
                NO_LOCATION,
                format!(
                    "Rules for the following nonterminal{} unreachable: {}",
                    if flagged_names.len() > 1 { "s are" } else { " is" },
                    flagged_names.join(", ")
                ),
            );
        }
    }
}
