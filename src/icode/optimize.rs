//! Peephole optimization of the intermediate code.
//!
//! A light pass over branches, run to a fixpoint: short-circuit chained branches, drop labels
//! nothing reaches, drop branches to the next instruction, fold a conditional branch over an
//! unconditional one into the inverse conditional, and delete unreachable code after an
//! unconditional terminator. Extern labels are the roots that survive everything.

use super::{CodeBuilder, Instruction, LabelId, Opcode};
use crate::NO_LOCATION;
use std::collections::{BTreeMap, BTreeSet};

impl CodeBuilder {
    pub fn optimize(&mut self) {
        let mut any_changes = true;

        while any_changes {
            any_changes = false;

            let mut branch_target_map: BTreeMap<LabelId, usize> = BTreeMap::new();
            let mut used_labels: BTreeSet<LabelId> = BTreeSet::new();

            for (index, label) in self.labels().iter().enumerate() {
                if label.is_extern {
                    used_labels.insert(LabelId(index));
                }
            }

            for (index, instruction) in self.icode().iter().enumerate() {
                if instruction.opcode == Opcode::Label {
                    branch_target_map.insert(instruction.operands[0].label(), index);
                }
            }

            // short-circuit branch operands and collect the labels still used
            let icode = self.icode_mut();
            for i in 0..icode.len() {
                let opcode = icode[i].opcode;
                let operand_indices: Vec<usize> = match opcode {
                    Opcode::Call | Opcode::Branch => vec![0],
                    Opcode::ScanAccept => vec![1],
                    Opcode::ScanChar => {
                        let count = icode[i].operands[0].integer() as usize;
                        (0..count).map(|j| 3 * j + 3).collect()
                    }
                    Opcode::BranchEqual
                    | Opcode::BranchNotEqual
                    | Opcode::BranchLessThan
                    | Opcode::BranchLessEqual
                    | Opcode::BranchGreaterThan
                    | Opcode::BranchGreaterEqual => vec![0],
                    _ => vec![],
                };

                for operand_index in operand_indices {
                    let label = icode[i].operands[operand_index].label();
                    let target_index = *branch_target_map
                        .get(&label)
                        .unwrap_or_else(|| panic!("Branch to non-existent label"));
                    let target = next_active_instruction(icode, target_index);

                    if icode[target].opcode == Opcode::Branch {
                        let replacement = icode[target].operands[0];
                        if icode[i].operands[operand_index] != replacement {
                            icode[i].operands[operand_index] = replacement;
                            any_changes = true;
                        }
                    }

                    used_labels.insert(icode[i].operands[operand_index].label());
                }
            }

            // remove unused labels
            for i in 0..icode.len() {
                if icode[i].opcode == Opcode::Label
                    && !used_labels.contains(&icode[i].operands[0].label())
                {
                    icode[i] = null_instruction();
                    any_changes = true;
                }
            }

            // remove branches to the immediately following instruction
            for i in 0..icode.len() {
                if !icode[i].opcode.info().is_branch {
                    continue;
                }

                let label = icode[i].operands[0].label();
                let target_index = *branch_target_map
                    .get(&label)
                    .unwrap_or_else(|| panic!("Branch to non-existent label"));

                if target_index > i && target_index < next_active_instruction(icode, i + 1) {
                    icode[i] = null_instruction();
                    any_changes = true;
                }
            }

            // a conditional branch around an unconditional branch becomes the inverse branch
            for i in 0..icode.len().saturating_sub(1) {
                let inverse = match icode[i].opcode.info().inverse_branch {
                    Some(inverse) => inverse,
                    None => continue,
                };

                let j = i + 1;
                if icode[j].opcode != Opcode::Branch {
                    continue;
                }

                let label = icode[i].operands[0].label();
                let target_index = *branch_target_map
                    .get(&label)
                    .unwrap_or_else(|| panic!("Branch to non-existent label"));

                if target_index > j && target_index < next_active_instruction(icode, j + 1) {
                    let further = icode[j].operands[0];
                    icode[i].operands[0] = further;
                    icode[i].opcode = inverse;
                    icode[j] = null_instruction();
                    any_changes = true;
                }
            }

            // anything following an unconditional terminator up to the next label is dead
            for i in 0..icode.len() {
                if !icode[i].opcode.info().is_no_follow {
                    continue;
                }

                let mut j = i + 1;
                while j < icode.len() && icode[j].opcode != Opcode::Label {
                    if icode[j].opcode != Opcode::Null {
                        icode[j] = null_instruction();
                        any_changes = true;
                    }
                    j += 1;
                }
            }

            // compact out the deleted slots
            icode.retain(|instruction| instruction.opcode != Opcode::Null);
        }
    }
}

/// Starting from a given index, find the next instruction that will execute.
fn next_active_instruction(icode: &[Instruction], start: usize) -> usize {
    let mut index = start;
    while index < icode.len() {
        match icode[index].opcode {
            Opcode::Label | Opcode::Null => index += 1,
            _ => return index,
        }
    }
    start
}

fn null_instruction() -> Instruction {
    Instruction {
        opcode: Opcode::Null,
        location: NO_LOCATION,
        operands: Vec::new(),
    }
}
