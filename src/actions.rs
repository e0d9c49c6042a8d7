//! Code generation for the action sub-language: token actions, reduce actions and guard
//! conditions.
//!
//! There are three syntactic contexts. Statements produce side effects, expressions produce a
//! value in a target register, and conditions produce control flow to one of two labels. Each
//! context routes nodes through its own dispatcher; a node kind with no handler in the current
//! context is a logic error in the front end, not a user mistake.

use crate::grammar::syntax::GramKind;
use crate::icode::{CodeBuilder, LabelId, Opcode, Operand, RegId};
use crate::SynTree;

/// Generate statement-context code for a token or reduce action.
pub fn generate_action(code: &mut CodeBuilder, root: &SynTree) {
    handle_statement(code, root);
}

/// Generate condition-context code for a guard, branching to one of the two labels.
pub fn generate_condition(
    code: &mut CodeBuilder,
    root: &SynTree,
    true_label: LabelId,
    false_label: LabelId,
) {
    handle_condition(code, root, true_label, false_label);
}

//
//  Statement context
//

fn handle_statement(code: &mut CodeBuilder, root: &SynTree) {
    match GramKind::of(root) {
        GramKind::ActionStatementList => {
            for child in &root.children {
                handle_statement(code, child);
            }
        }
        GramKind::ActionAssign => handle_statement_assign(code, root),
        GramKind::ActionDumpStack => {
            code.emit(Opcode::DumpStack, root.location, &[]);
        }
        kind => panic!("No statement handler for node kind {}", kind.name()),
    }
}

/// Copy the right hand value to the left hand register. When the expression already landed in
/// the target no copy is emitted.
fn handle_statement_assign(code: &mut CodeBuilder, root: &SynTree) {
    let lhs_register = handle_expression(code, &root.children[0], None);
    let rhs_register = handle_expression(code, &root.children[1], None);

    if rhs_register != lhs_register {
        code.emit(
            Opcode::Assign,
            root.location,
            &[Operand::Reg(lhs_register), Operand::Reg(rhs_register)],
        );
    }

    if code.is_temporary(rhs_register) {
        code.free_temporary(rhs_register);
    }
}

//
//  Expression context
//

/// Generate expression code. The value lands in `target`, or in a fresh temporary when the
/// caller passes `None`; either way the register holding the result is returned.
fn handle_expression(code: &mut CodeBuilder, root: &SynTree, target: Option<RegId>) -> RegId {
    match GramKind::of(root) {
        GramKind::ActionAdd => handle_expression_binop(code, root, target, Opcode::Add),
        GramKind::ActionSubtract => handle_expression_binop(code, root, target, Opcode::Subtract),
        GramKind::ActionMultiply => handle_expression_binop(code, root, target, Opcode::Multiply),
        GramKind::ActionDivide => handle_expression_binop(code, root, target, Opcode::Divide),
        GramKind::ActionUnaryMinus => handle_expression_unop(code, root, target, Opcode::UnaryMinus),
        GramKind::Identifier => code.get_register(&root.lexeme),
        GramKind::Integer => code.get_register(&root.lexeme),
        GramKind::NegativeInteger => {
            let name = format!("-{}", root.lexeme);
            code.get_register(&name)
        }
        GramKind::ActionTokenCount => code.get_register("token_count"),
        GramKind::ActionEqual
        | GramKind::ActionNotEqual
        | GramKind::ActionLessThan
        | GramKind::ActionLessEqual
        | GramKind::ActionGreaterThan
        | GramKind::ActionGreaterEqual
        | GramKind::ActionAnd
        | GramKind::ActionOr
        | GramKind::ActionNot => handle_expression_relation(code, root, target),
        kind => panic!("No expression handler for node kind {}", kind.name()),
    }
}

/// Common code for binary arithmetic operators.
fn handle_expression_binop(
    code: &mut CodeBuilder,
    root: &SynTree,
    target: Option<RegId>,
    opcode: Opcode,
) -> RegId {
    let left = handle_expression(code, &root.children[0], None);
    let right = handle_expression(code, &root.children[1], None);

    let target = target.unwrap_or_else(|| code.get_temporary());

    code.emit(
        opcode,
        root.location,
        &[
            Operand::Reg(target),
            Operand::Reg(left),
            Operand::Reg(right),
        ],
    );

    if code.is_temporary(left) {
        code.free_temporary(left);
    }
    if code.is_temporary(right) {
        code.free_temporary(right);
    }

    target
}

/// Common code for unary arithmetic operators.
fn handle_expression_unop(
    code: &mut CodeBuilder,
    root: &SynTree,
    target: Option<RegId>,
    opcode: Opcode,
) -> RegId {
    let operand = handle_expression(code, &root.children[0], None);

    let target = target.unwrap_or_else(|| code.get_temporary());

    code.emit(
        opcode,
        root.location,
        &[Operand::Reg(target), Operand::Reg(operand)],
    );

    if code.is_temporary(operand) {
        code.free_temporary(operand);
    }

    target
}

/// A relation used for its value: route through condition context and materialize 1 or 0.
fn handle_expression_relation(
    code: &mut CodeBuilder,
    root: &SynTree,
    target: Option<RegId>,
) -> RegId {
    let true_label = code.get_label();
    let false_label = code.get_label();
    let next_label = code.get_label();

    let target = target.unwrap_or_else(|| code.get_temporary());

    handle_condition(code, root, true_label, false_label);

    let one = code.get_register("1");
    let zero = code.get_register("0");

    code.emit(Opcode::Label, root.location, &[Operand::Label(true_label)]);
    code.emit(
        Opcode::Assign,
        root.location,
        &[Operand::Reg(target), Operand::Reg(one)],
    );
    code.emit(Opcode::Branch, root.location, &[Operand::Label(next_label)]);
    code.emit(Opcode::Label, root.location, &[Operand::Label(false_label)]);
    code.emit(
        Opcode::Assign,
        root.location,
        &[Operand::Reg(target), Operand::Reg(zero)],
    );
    code.emit(Opcode::Label, root.location, &[Operand::Label(next_label)]);

    target
}

//
//  Condition context
//

fn handle_condition(
    code: &mut CodeBuilder,
    root: &SynTree,
    true_label: LabelId,
    false_label: LabelId,
) {
    match GramKind::of(root) {
        GramKind::ActionEqual => {
            handle_condition_relation(code, root, true_label, false_label, Opcode::BranchEqual)
        }
        GramKind::ActionNotEqual => {
            handle_condition_relation(code, root, true_label, false_label, Opcode::BranchNotEqual)
        }
        GramKind::ActionLessThan => {
            handle_condition_relation(code, root, true_label, false_label, Opcode::BranchLessThan)
        }
        GramKind::ActionLessEqual => {
            handle_condition_relation(code, root, true_label, false_label, Opcode::BranchLessEqual)
        }
        GramKind::ActionGreaterThan => {
            handle_condition_relation(code, root, true_label, false_label, Opcode::BranchGreaterThan)
        }
        GramKind::ActionGreaterEqual => handle_condition_relation(
            code,
            root,
            true_label,
            false_label,
            Opcode::BranchGreaterEqual,
        ),
        GramKind::ActionAnd => {
            // short-circuit: the first operand falls through to the second only on success
            let mid_label = code.get_label();
            handle_condition(code, &root.children[0], mid_label, false_label);
            code.emit(Opcode::Label, root.location, &[Operand::Label(mid_label)]);
            handle_condition(code, &root.children[1], true_label, false_label);
        }
        GramKind::ActionOr => {
            let mid_label = code.get_label();
            handle_condition(code, &root.children[0], true_label, mid_label);
            code.emit(Opcode::Label, root.location, &[Operand::Label(mid_label)]);
            handle_condition(code, &root.children[1], true_label, false_label);
        }
        GramKind::ActionNot => {
            handle_condition(code, &root.children[0], false_label, true_label);
        }
        GramKind::ActionAdd
        | GramKind::ActionSubtract
        | GramKind::ActionMultiply
        | GramKind::ActionDivide
        | GramKind::ActionUnaryMinus
        | GramKind::Identifier
        | GramKind::Integer
        | GramKind::NegativeInteger
        | GramKind::ActionTokenCount => {
            handle_condition_math(code, root, true_label, false_label)
        }
        kind => panic!("No condition handler for node kind {}", kind.name()),
    }
}

/// Plain arithmetic in condition context: evaluate, then branch on the value being nonzero.
fn handle_condition_math(
    code: &mut CodeBuilder,
    root: &SynTree,
    true_label: LabelId,
    false_label: LabelId,
) {
    let value = handle_expression(code, root, None);
    let zero = code.get_register("0");

    code.emit(
        Opcode::BranchNotEqual,
        root.location,
        &[
            Operand::Label(true_label),
            Operand::Reg(value),
            Operand::Reg(zero),
        ],
    );
    code.emit(
        Opcode::Branch,
        root.location,
        &[Operand::Label(false_label)],
    );

    if code.is_temporary(value) {
        code.free_temporary(value);
    }
}

/// Common code for relational operators: the conditional branch goes to the true label, the
/// fall-through branch to the false label.
fn handle_condition_relation(
    code: &mut CodeBuilder,
    root: &SynTree,
    true_label: LabelId,
    false_label: LabelId,
    opcode: Opcode,
) {
    let left = handle_expression(code, &root.children[0], None);
    let right = handle_expression(code, &root.children[1], None);

    code.emit(
        opcode,
        root.location,
        &[
            Operand::Label(true_label),
            Operand::Reg(left),
            Operand::Reg(right),
        ],
    );
    code.emit(
        Opcode::Branch,
        root.location,
        &[Operand::Label(false_label)],
    );

    if code.is_temporary(left) {
        code.free_temporary(left);
    }
    if code.is_temporary(right) {
        code.free_temporary(right);
    }
}
