//! Emission of the scan loop.
//!
//! Every DFA state becomes a label followed by its accept actions, highest precedence first
//! with guard conditions chained so a lower precedence token applies only when the higher
//! guards fail, then a `ScanChar` dispatch over the state's disjoint ranges. Tokens with
//! custom actions, ignore or error handling get their own accept action labels; everything
//! else shares the default accept and ignore code.

use super::{ScannerGenerator, StateId};
use crate::actions;
use crate::grammar::SymbolId;
use crate::icode::{LabelId, Opcode, Operand};
use crate::NO_LOCATION;
use std::collections::BTreeMap;

impl<'a> ScannerGenerator<'a> {
    pub(crate) fn create_vmcode(&mut self) {
        let scan_label = self.code.get_label_named("Scan");
        self.code.set_extern(scan_label);
        self.scan_label = Some(scan_label);

        let default_accept_label = self.code.get_label();
        let default_ignore_label = self.code.get_label();

        // an accept action label for every scanned symbol
        let mut symbol_action_map: BTreeMap<SymbolId, LabelId> = BTreeMap::new();
        for id in self.gram.symbol_ids() {
            let symbol = self.gram.symbol(id);
            if symbol.is_nonterminal || !symbol.is_scanned {
                continue;
            }

            if symbol.action.is_none() {
                if symbol.is_ignored {
                    symbol_action_map.insert(id, default_ignore_label);
                    continue;
                }
                if !symbol.is_error {
                    symbol_action_map.insert(id, default_accept_label);
                    continue;
                }
            }

            let label = self.code.get_label();
            symbol_action_map.insert(id, label);
        }

        // the scanner prolog, then every reachable state
        self.code
            .emit(Opcode::Label, NO_LOCATION, &[Operand::Label(scan_label)]);
        self.code.emit(Opcode::ScanStart, NO_LOCATION, &[]);

        let mut state_label_map: BTreeMap<StateId, LabelId> = BTreeMap::new();
        let mut coded: std::collections::BTreeSet<StateId> = std::collections::BTreeSet::new();
        let mut pending = vec![self.dfa_start];

        while let Some(state) = pending.pop() {
            if !coded.insert(state) {
                continue;
            }
            self.encode_state(state, &mut state_label_map, &symbol_action_map);

            for transition in &self.state(state).transitions {
                pending.push(transition.target);
            }
        }

        // default accept: commit the token, count it, return to the caller
        let token_count = self.code.get_register_init("token_count", 0);
        let one = self.code.get_register("1");

        self.code.emit(
            Opcode::Label,
            NO_LOCATION,
            &[Operand::Label(default_accept_label)],
        );
        self.code.emit(Opcode::ScanToken, NO_LOCATION, &[]);
        self.code.emit(
            Opcode::Add,
            NO_LOCATION,
            &[
                Operand::Reg(token_count),
                Operand::Reg(token_count),
                Operand::Reg(one),
            ],
        );
        self.code.emit(Opcode::Return, NO_LOCATION, &[]);

        // default ignore: go scan the next token
        self.code.emit(
            Opcode::Label,
            NO_LOCATION,
            &[Operand::Label(default_ignore_label)],
        );
        self.code
            .emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(scan_label)]);

        // accept actions for symbols needing their own code
        for (id, label) in &symbol_action_map {
            if *label == default_accept_label || *label == default_ignore_label {
                continue;
            }

            let symbol = self.gram.symbol(*id);
            let location = symbol.location;
            let action = symbol.action.clone();
            let is_ignored = symbol.is_ignored;
            let is_error = symbol.is_error;
            let error_message = symbol.error_message.clone();

            self.code
                .emit(Opcode::Label, location, &[Operand::Label(*label)]);

            if let Some(action) = &action {
                actions::generate_action(self.code, action);
            }

            if is_ignored {
                self.code
                    .emit(Opcode::Branch, location, &[Operand::Label(scan_label)]);
                continue;
            }

            if is_error {
                let message = self.code.get_string(&error_message);
                self.code
                    .emit(Opcode::ScanError, location, &[Operand::Str(message)]);
                self.code.emit(Opcode::Return, location, &[]);
                continue;
            }

            self.code.emit(Opcode::ScanToken, location, &[]);
            self.code.emit(
                Opcode::Add,
                location,
                &[
                    Operand::Reg(token_count),
                    Operand::Reg(token_count),
                    Operand::Reg(one),
                ],
            );
            self.code.emit(Opcode::Return, location, &[]);
        }
    }

    /// The code for one DFA state: guarded accepts from highest precedence down, then the
    /// character dispatch.
    fn encode_state(
        &mut self,
        state: StateId,
        state_label_map: &mut BTreeMap<StateId, LabelId>,
        symbol_action_map: &BTreeMap<SymbolId, LabelId>,
    ) {
        let label = self.state_label(state, state_label_map);
        self.code
            .emit(Opcode::Label, NO_LOCATION, &[Operand::Label(label)]);

        // one accept per precedence level, strongest first
        let mut accepts: BTreeMap<i32, super::AcceptAction> = BTreeMap::new();
        for accept in &self.state(state).accepts {
            accepts.entry(accept.precedence).or_insert_with(|| accept.clone());
        }

        for (_, accept) in accepts.iter().rev() {
            let symbol = self.gram.symbol(accept.token);
            let location = symbol.location;
            let symbol_num = symbol.symbol_num;
            let action_label = symbol_action_map[&accept.token];

            let false_label = match &accept.guard {
                Some(guard) => {
                    let true_label = self.code.get_label();
                    let false_label = self.code.get_label();
                    actions::generate_condition(self.code, guard, true_label, false_label);
                    self.code
                        .emit(Opcode::Label, location, &[Operand::Label(true_label)]);
                    Some(false_label)
                }
                None => None,
            };

            self.code.emit(
                Opcode::ScanAccept,
                location,
                &[
                    Operand::Integer(symbol_num as i64),
                    Operand::Label(action_label),
                ],
            );

            match false_label {
                // an unguarded accept shadows everything weaker
                None => break,
                Some(false_label) => {
                    self.code
                        .emit(Opcode::Label, location, &[Operand::Label(false_label)]);
                }
            }
        }

        // character dispatch over the disjoint ranges
        let transitions: Vec<_> = self.state(state).transitions.iter().copied().collect();
        let mut operands = vec![Operand::Integer(transitions.len() as i64)];
        for transition in &transitions {
            operands.push(Operand::Codepoint(transition.range_start));
            operands.push(Operand::Codepoint(transition.range_end));
            operands.push(Operand::Label(self.state_label(transition.target, state_label_map)));
        }
        self.code.emit(Opcode::ScanChar, NO_LOCATION, &operands);
    }

    fn state_label(
        &mut self,
        state: StateId,
        state_label_map: &mut BTreeMap<StateId, LabelId>,
    ) -> LabelId {
        if let Some(label) = state_label_map.get(&state) {
            return *label;
        }
        let label = self.code.get_label();
        state_label_map.insert(state, label);
        label
    }
}
