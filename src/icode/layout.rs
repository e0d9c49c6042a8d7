//! Final translation of intermediate code into the flat bytecode of the artifact.
//!
//! After optimization, every surviving instruction gets a pc, label operands resolve to pc
//! values, and the register, string and AST slot tables move into [ParserData]. Operand
//! encoding is opcode specific: each opcode owns a fixed operand shape the virtual machine
//! reads back at the same offsets.

use super::{CodeBuilder, Opcode, Operand};
use crate::parser_data::{ParserData, RegisterData, VmInstruction};

impl CodeBuilder {
    /// Optimize, lay out and encode the intermediate code into the artifact.
    pub fn generate(&mut self, prsd: &mut ParserData) {
        self.optimize();

        // registers
        prsd.register_list = self
            .registers()
            .iter()
            .map(|r| RegisterData {
                name: r.name.clone(),
                initial_value: r.initial_value,
            })
            .collect();

        // AST slots
        prsd.ast_slot_count = self.slot_count();

        // strings
        prsd.string_list = self.strings().to_vec();

        // find the pc of every label and every live instruction
        let mut instruction_count: i64 = 0;
        let mut label_pcs: Vec<(super::LabelId, i64)> = Vec::new();
        for instruction in self.icode() {
            match instruction.opcode {
                Opcode::Label => {
                    label_pcs.push((instruction.operands[0].label(), instruction_count));
                }
                Opcode::Null => {}
                _ => instruction_count += 1,
            }
        }
        for (label, pc) in label_pcs {
            *self.label_pc_mut(label) = pc;
        }

        // encode the surviving instructions
        let mut instruction_list = Vec::with_capacity(instruction_count as usize);
        let mut operand_list: Vec<i64> = Vec::new();

        for instruction in self.icode() {
            if instruction.opcode == Opcode::Label || instruction.opcode == Opcode::Null {
                continue;
            }

            instruction_list.push(VmInstruction {
                opcode: instruction.opcode,
                location: instruction.location,
                operand_offset: operand_list.len(),
            });

            for operand in &instruction.operands {
                operand_list.push(self.encode_operand(operand));
            }
        }

        prsd.instruction_list = instruction_list;
        prsd.operand_list = operand_list;
    }

    fn encode_operand(&self, operand: &Operand) -> i64 {
        match operand {
            Operand::Integer(value) => *value,
            Operand::Codepoint(value) => *value as i64,
            Operand::Str(id) => id.0 as i64,
            Operand::Reg(id) => id.0 as i64,
            Operand::Slot(id) => id.0 as i64,
            Operand::Label(id) => {
                let pc = self.label_pc(*id);
                debug_assert!(pc >= 0, "label used but never placed");
                pc
            }
        }
    }
}
