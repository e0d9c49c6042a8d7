use crate::icode::{CodeBuilder, Opcode, Operand};
use crate::NO_LOCATION;

fn opcodes(code: &CodeBuilder) -> Vec<Opcode> {
    code.icode().iter().map(|i| i.opcode).collect()
}

#[test]
pub fn branch_to_next_instruction_is_removed() {
    let mut code = CodeBuilder::new();

    let entry = code.get_label_named("entry");
    code.set_extern(entry);
    let next = code.get_label();

    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(entry)]);
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(next)]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(next)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);

    code.optimize();

    assert!(
        !opcodes(&code).contains(&Opcode::Branch),
        "a branch to the following instruction is pointless"
    );
}

#[test]
pub fn branch_chains_short_circuit() {
    let mut code = CodeBuilder::new();

    let entry = code.get_label_named("entry");
    code.set_extern(entry);
    let hop = code.get_label();
    let target = code.get_label_named("target");
    code.set_extern(target);

    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(entry)]);
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(hop)]);
    code.emit(Opcode::Halt, NO_LOCATION, &[]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(hop)]);
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(target)]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(target)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);

    code.optimize();

    // the first branch bypasses the hop, which then evaporates with its own branch
    let branch_targets: Vec<_> = code
        .icode()
        .iter()
        .filter(|i| i.opcode == Opcode::Branch)
        .map(|i| i.operands[0])
        .collect();
    assert!(!branch_targets.is_empty());
    for operand in branch_targets {
        assert_eq!(operand, Operand::Label(target));
    }
}

#[test]
pub fn conditional_over_unconditional_becomes_inverse() {
    let mut code = CodeBuilder::new();

    let entry = code.get_label_named("entry");
    code.set_extern(entry);
    let over = code.get_label();
    let further = code.get_label_named("further");
    code.set_extern(further);
    let a = code.get_register("a");
    let b = code.get_register("b");

    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(entry)]);
    code.emit(
        Opcode::BranchEqual,
        NO_LOCATION,
        &[Operand::Label(over), Operand::Reg(a), Operand::Reg(b)],
    );
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(further)]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(over)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(further)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);

    code.optimize();

    let ops = opcodes(&code);
    assert!(ops.contains(&Opcode::BranchNotEqual), "the inverse appears");
    assert!(!ops.contains(&Opcode::BranchEqual), "the original is gone");
    assert!(!ops.contains(&Opcode::Branch), "the jumped-over branch is gone");
}

#[test]
pub fn code_after_a_terminator_is_dead() {
    let mut code = CodeBuilder::new();

    let entry = code.get_label_named("entry");
    code.set_extern(entry);
    let tail = code.get_label_named("tail");
    code.set_extern(tail);
    let a = code.get_register("a");
    let b = code.get_register("b");

    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(entry)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);
    code.emit(
        Opcode::Add,
        NO_LOCATION,
        &[Operand::Reg(a), Operand::Reg(a), Operand::Reg(b)],
    );
    code.emit(
        Opcode::Assign,
        NO_LOCATION,
        &[Operand::Reg(a), Operand::Reg(b)],
    );
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(tail)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);

    code.optimize();

    let ops = opcodes(&code);
    assert!(!ops.contains(&Opcode::Add));
    // the prolog keeps its own assign; the dead one is gone
    assert_eq!(ops.iter().filter(|o| **o == Opcode::Assign).count(), 1);
}

#[test]
pub fn no_follow_instructions_end_their_blocks() {
    let mut code = CodeBuilder::new();

    let entry = code.get_label_named("entry");
    code.set_extern(entry);
    let other = code.get_label_named("other");
    code.set_extern(other);
    let a = code.get_register("a");
    let b = code.get_register("b");

    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(entry)]);
    code.emit(
        Opcode::Assign,
        NO_LOCATION,
        &[Operand::Reg(a), Operand::Reg(b)],
    );
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(other)]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(other)]);
    code.emit(Opcode::Halt, NO_LOCATION, &[]);

    code.optimize();

    // every unconditional terminator is the last thing before the next label
    let icode = code.icode();
    for (index, instruction) in icode.iter().enumerate() {
        if instruction.opcode.info().is_no_follow && index + 1 < icode.len() {
            assert_eq!(
                icode[index + 1].opcode,
                Opcode::Label,
                "live code must not follow a terminator"
            );
        }
    }
}

#[test]
pub fn optimizing_twice_deletes_nothing_more() {
    let mut code = CodeBuilder::new();

    let entry = code.get_label_named("entry");
    code.set_extern(entry);
    let t = code.get_label();
    let f = code.get_label();
    let out = code.get_label();
    let a = code.get_register("a");
    let zero = code.get_register("0");
    let one = code.get_register("1");

    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(entry)]);
    code.emit(
        Opcode::BranchNotEqual,
        NO_LOCATION,
        &[Operand::Label(t), Operand::Reg(a), Operand::Reg(zero)],
    );
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(f)]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(t)]);
    code.emit(
        Opcode::Assign,
        NO_LOCATION,
        &[Operand::Reg(a), Operand::Reg(one)],
    );
    code.emit(Opcode::Branch, NO_LOCATION, &[Operand::Label(out)]);
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(f)]);
    code.emit(
        Opcode::Assign,
        NO_LOCATION,
        &[Operand::Reg(a), Operand::Reg(zero)],
    );
    code.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(out)]);
    code.emit(Opcode::Return, NO_LOCATION, &[]);

    code.optimize();
    let after_first = code.instruction_count();
    code.optimize();
    let after_second = code.instruction_count();

    assert_eq!(after_first, after_second, "the fixpoint is stable");
}

#[test]
pub fn temporaries_recycle_by_name() {
    let mut code = CodeBuilder::new();

    let first = code.get_temporary();
    let second = code.get_temporary();
    assert_ne!(first, second);
    assert!(code.is_temporary(first));

    code.free_temporary(first);
    let third = code.get_temporary();
    assert_eq!(first, third, "a released temporary comes back first");

    let plain = code.get_register("counter");
    assert!(!code.is_temporary(plain));
}

#[test]
pub fn numeric_registers_are_constants() {
    let mut code = CodeBuilder::new();

    let five = code.get_register("5");
    let minus = code.get_register("-3");
    assert_eq!(code.registers()[five.0].initial_value, 5);
    assert_eq!(code.registers()[minus.0].initial_value, -3);

    let named = code.get_register("flag");
    assert_eq!(code.registers()[named.0].initial_value, 0);
}

#[test]
pub fn ast_slots_recycle_per_action() {
    let mut code = CodeBuilder::new();

    let first = code.get_ast_slot();
    let second = code.get_ast_slot();
    assert_ne!(first, second);

    code.free_all_asts();
    let reused = code.get_ast_slot();
    assert_eq!(reused, first, "slots restart after an action boundary");
    assert_eq!(code.slot_count(), 2);
}
