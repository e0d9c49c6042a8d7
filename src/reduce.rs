//! Code generation for reduce actions.
//!
//! Reducing by a rule generally builds a tree from the ones on top of the AST stack. This
//! module emits the tree-forming code described by each rule's AST former and calls the
//! action generator for reduce guards. Formers walk their tree twice: a children phase that
//! pushes constructed children, then a data phase that fills in kind, location and lexeme.

use crate::actions;
use crate::errors::ErrorSink;
use crate::grammar::syntax::GramKind;
use crate::grammar::Grammar;
use crate::icode::{AstSlotId, CodeBuilder, LabelId, Opcode, Operand, RegId};
use crate::parser_data::ParserData;
use crate::{DiagnosticKind, SynTree};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Top,
    Children,
    Data,
}

struct ReduceGenerator<'a> {
    code: &'a mut CodeBuilder,
    prsd: &'a mut ParserData,
    sink: &'a mut ErrorSink,
    rhs_len: i64,
    lhs_name: String,
    base_ptr: RegId,
}

struct Ctx {
    phase: Phase,
    processed: BTreeSet<i64>,
    integer_value: i64,
}

/// Emit reduce code for every rule with a former or a guard. Returns each rule's entry label,
/// `None` where the rule needs no code.
pub fn generate(
    gram: &Grammar,
    code: &mut CodeBuilder,
    prsd: &mut ParserData,
    sink: &mut ErrorSink,
) -> Vec<Option<LabelId>> {
    let mut rule_labels: Vec<Option<LabelId>> = vec![None; gram.rule_count()];

    for rule_id in gram.rule_ids() {
        let rule = gram.rule(rule_id);

        if rule.ast_former.is_none() && rule.action.is_none() {
            continue;
        }

        let label = code.get_label();
        code.set_extern(label);
        rule_labels[rule.rule_num] = Some(label);

        code.emit(Opcode::Label, rule.location, &[Operand::Label(label)]);
        code.free_all_asts();
        code.free_all_temporaries();

        if let Some(former) = &rule.ast_former {
            let base_ptr = code.get_temporary();
            code.emit(Opcode::AstStart, former.location, &[Operand::Reg(base_ptr)]);

            let mut generator = ReduceGenerator {
                code: &mut *code,
                prsd: &mut *prsd,
                sink: &mut *sink,
                rhs_len: rule.rhs.len() as i64,
                lhs_name: gram.symbol(rule.lhs).symbol_name.clone(),
                base_ptr,
            };
            let mut ctx = Ctx {
                phase: Phase::Top,
                processed: BTreeSet::new(),
                integer_value: 0,
            };
            generator.handle_former(former, &mut ctx);

            code.emit(
                Opcode::AstFinish,
                former.location,
                &[Operand::Integer(rule.rhs.len() as i64)],
            );
            code.free_temporary(base_ptr);
        }

        // a guard without a former still owes the stack its default tree
        if rule.ast_former.is_none() {
            emit_default_former(code, rule.rhs.len() as i64, rule.location);
        }

        if let Some(action) = &rule.action {
            actions::generate_action(code, action);
        }

        code.emit(Opcode::Return, rule.location, &[]);
    }

    rule_labels
}

/// The tree behavior of a rule with no former: a single item passes through untouched, an
/// empty rule yields a null tree, anything longer wraps its items in an anonymous node.
fn emit_default_former(code: &mut CodeBuilder, rhs_len: i64, location: crate::Location) {
    if rhs_len == 1 {
        return;
    }

    let base_ptr = code.get_temporary();
    let top_ptr = code.get_temporary();
    code.emit(Opcode::AstStart, location, &[Operand::Reg(base_ptr)]);
    code.emit(Opcode::AstNew, location, &[Operand::Reg(top_ptr)]);

    for i in 1..=rhs_len {
        let slot = code.get_ast_slot();
        code.emit(
            Opcode::AstLoad,
            location,
            &[
                Operand::Slot(slot),
                Operand::Reg(base_ptr),
                Operand::Integer(i - rhs_len - 1),
            ],
        );
        code.emit(Opcode::AstChild, location, &[Operand::Slot(slot)]);
        code.free_ast_slot(slot);
    }

    code.emit(
        Opcode::AstForm,
        location,
        &[
            Operand::Reg(base_ptr),
            Operand::Reg(top_ptr),
            Operand::Integer(rhs_len),
        ],
    );
    code.emit(Opcode::AstFinish, location, &[Operand::Integer(rhs_len)]);
    code.free_temporary(top_ptr);
    code.free_temporary(base_ptr);
}

impl<'a> ReduceGenerator<'a> {
    fn handle_former(&mut self, root: &SynTree, ctx: &mut Ctx) {
        match GramKind::of(root) {
            GramKind::AstFormer => self.handle_ast_former(root, ctx),
            GramKind::AstChild => self.handle_ast_child(root, ctx),
            GramKind::Identifier => self.handle_identifier(root, ctx),
            GramKind::AstKind => self.handle_ast_kind(root, ctx),
            GramKind::AstLocation => self.handle_ast_location(root, ctx),
            GramKind::AstLocationString => self.handle_ast_location_string(root, ctx),
            GramKind::AstLexeme => self.handle_ast_lexeme(root, ctx),
            GramKind::AstLexemeString => self.handle_ast_lexeme_string(root, ctx),
            GramKind::Integer => ctx.integer_value = root.lexeme.parse().unwrap_or(0),
            GramKind::NegativeInteger => {
                ctx.integer_value = -root.lexeme.parse().unwrap_or(0);
            }
            kind => panic!("No former handler for node kind {}", kind.name()),
        }
    }

    /// Build a tree from a list of items: push the children, form the node, then go back and
    /// fill in the data items. An unnamed former takes its kind from the rule's lhs.
    fn handle_ast_former(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase == Phase::Data {
            return;
        }

        let top_ptr = self.code.get_temporary();
        self.code
            .emit(Opcode::AstNew, root.location, &[Operand::Reg(top_ptr)]);

        let mut cctx = Ctx {
            phase: Phase::Children,
            processed: BTreeSet::new(),
            integer_value: 0,
        };

        for child in &root.children {
            self.handle_former(child, &mut cctx);
        }

        self.code.emit(
            Opcode::AstForm,
            root.location,
            &[
                Operand::Reg(self.base_ptr),
                Operand::Reg(top_ptr),
                Operand::Integer(self.rhs_len),
            ],
        );
        self.code.free_temporary(top_ptr);

        cctx.phase = Phase::Data;
        for child in &root.children {
            self.handle_former(child, &mut cctx);
        }

        if !cctx.processed.contains(&(GramKind::Identifier as i64))
            && !cctx.processed.contains(&(GramKind::AstKind as i64))
        {
            let kind = self.prsd.kind_map.get_kind_force(&self.lhs_name);
            self.code
                .emit(Opcode::AstKindNum, root.location, &[Operand::Integer(kind)]);
        }
    }

    /// An existing tree hoisted onto the stack: `$n`, a descent, or a slice.
    fn handle_ast_child(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase == Phase::Data {
            return;
        }

        let dot = &root.children[0];
        let slice = &root.children[1];

        let slot = if GramKind::of(dot) == GramKind::AstDot {
            Some(self.handle_ast_dot(dot, ctx))
        } else {
            None
        };

        if GramKind::of(slice) == GramKind::AstSlice {
            self.handle_ast_slice(slice, slot, ctx);
        } else if let Some(slot) = slot {
            self.code
                .emit(Opcode::AstChild, root.location, &[Operand::Slot(slot)]);
        }

        if let Some(slot) = slot {
            self.code.free_ast_slot(slot);
        }
    }

    /// A dot expression starts at the rule's input slots and descends a subtree. The stack
    /// index can be checked here; nested indices wait until runtime.
    fn handle_ast_dot(&mut self, root: &SynTree, ctx: &mut Ctx) -> AstSlotId {
        self.handle_former(&root.children[0], ctx);
        let mut child_num = ctx.integer_value;

        if child_num < 0 {
            child_num = self.rhs_len + 1 + child_num;
        }
        if child_num < 1 || child_num > self.rhs_len {
            self.sink.add_error(
                DiagnosticKind::AstIndex,
                root.location,
                format!("Child index must be within rule: 1 to {}.", self.rhs_len),
            );
            child_num = 0;
        }

        let slot = self.code.get_ast_slot();
        self.code.emit(
            Opcode::AstLoad,
            root.location,
            &[
                Operand::Slot(slot),
                Operand::Reg(self.base_ptr),
                Operand::Integer(child_num - self.rhs_len - 1),
            ],
        );

        for index in root.children.iter().skip(1) {
            self.handle_former(index, ctx);
            let mut child_num = ctx.integer_value;
            if child_num > 0 {
                child_num -= 1;
            }
            self.code.emit(
                Opcode::AstIndex,
                root.location,
                &[Operand::Slot(slot), Operand::Integer(child_num)],
            );
        }

        slot
    }

    /// Copy a range of trees to the stack, from the input slots or from a loaded tree.
    fn handle_ast_slice(&mut self, root: &SynTree, slot: Option<AstSlotId>, ctx: &mut Ctx) {
        self.handle_former(&root.children[0], ctx);
        let mut first = ctx.integer_value;
        self.handle_former(&root.children[1], ctx);
        let mut last = ctx.integer_value;

        match slot {
            None => {
                if first < 0 {
                    first = self.rhs_len + 1 + first;
                }
                if first < 1 || first > self.rhs_len {
                    self.sink.add_error(
                        DiagnosticKind::AstIndex,
                        root.children[0].location,
                        format!("Child index must be within rule: 1 to {}.", self.rhs_len),
                    );
                    first = 0;
                }

                if last < 0 {
                    last = self.rhs_len + 1 + last;
                }
                if last < 1 || last > self.rhs_len {
                    self.sink.add_error(
                        DiagnosticKind::AstIndex,
                        root.children[1].location,
                        format!("Child index must be within rule: 1 to {}.", self.rhs_len),
                    );
                    last = 0;
                }

                for i in first..=last {
                    let slot = self.code.get_ast_slot();
                    self.code.emit(
                        Opcode::AstLoad,
                        root.location,
                        &[
                            Operand::Slot(slot),
                            Operand::Reg(self.base_ptr),
                            Operand::Integer(i - self.rhs_len - 1),
                        ],
                    );
                    self.code
                        .emit(Opcode::AstChild, root.location, &[Operand::Slot(slot)]);
                    self.code.free_ast_slot(slot);
                }
            }
            Some(slot) => {
                if first > 0 {
                    first -= 1;
                }
                if last > 0 {
                    last -= 1;
                }
                self.code.emit(
                    Opcode::AstChildSlice,
                    root.location,
                    &[
                        Operand::Slot(slot),
                        Operand::Integer(first),
                        Operand::Integer(last),
                    ],
                );
            }
        }
    }

    /// A raw identifier names the kind of the tree being formed.
    fn handle_identifier(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase != Phase::Data {
            return;
        }

        if ctx.processed.contains(&(GramKind::Identifier as i64))
            || ctx.processed.contains(&(GramKind::AstKind as i64))
        {
            self.sink.add_error(
                DiagnosticKind::DupAstItem,
                root.location,
                "Duplicate Ast kind".to_string(),
            );
            return;
        }

        let kind = self.prsd.kind_map.get_kind_force(&root.lexeme);
        self.code
            .emit(Opcode::AstKindNum, root.location, &[Operand::Integer(kind)]);
        ctx.processed.insert(GramKind::Identifier as i64);
    }

    /// `%expr`: copy the kind from an existing tree.
    fn handle_ast_kind(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase != Phase::Data {
            return;
        }

        if ctx.processed.contains(&(GramKind::Identifier as i64))
            || ctx.processed.contains(&(GramKind::AstKind as i64))
        {
            self.sink.add_error(
                DiagnosticKind::DupAstItem,
                root.location,
                "Duplicate Ast kind".to_string(),
            );
            return;
        }

        let slot = self.handle_ast_dot(&root.children[0], ctx);
        self.code
            .emit(Opcode::AstKind, root.location, &[Operand::Slot(slot)]);
        self.code.free_ast_slot(slot);
        ctx.processed.insert(GramKind::AstKind as i64);
    }

    /// `@expr`: copy the location from an existing tree.
    fn handle_ast_location(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase != Phase::Data {
            return;
        }

        if ctx.processed.contains(&(GramKind::AstLocation as i64))
            || ctx.processed.contains(&(GramKind::AstLocationString as i64))
        {
            self.sink.add_error(
                DiagnosticKind::DupAstItem,
                root.location,
                "Duplicate Ast location".to_string(),
            );
            return;
        }

        let slot = self.handle_ast_dot(&root.children[0], ctx);
        self.code
            .emit(Opcode::AstLocation, root.location, &[Operand::Slot(slot)]);
        self.code.free_ast_slot(slot);
        ctx.processed.insert(GramKind::AstLocation as i64);
    }

    /// `@"n"`: a literal location.
    fn handle_ast_location_string(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase != Phase::Data {
            return;
        }

        if ctx.processed.contains(&(GramKind::AstLocation as i64))
            || ctx.processed.contains(&(GramKind::AstLocationString as i64))
        {
            self.sink.add_error(
                DiagnosticKind::DupAstItem,
                root.location,
                "Duplicate Ast location".to_string(),
            );
            return;
        }

        let value = root.children[0].lexeme.parse().unwrap_or(0);
        self.code.emit(
            Opcode::AstLocationNum,
            root.location,
            &[Operand::Integer(value)],
        );
        ctx.processed.insert(GramKind::AstLocationString as i64);
    }

    /// `&expr`: copy the lexeme from an existing tree.
    fn handle_ast_lexeme(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase != Phase::Data {
            return;
        }

        if ctx.processed.contains(&(GramKind::AstLexeme as i64))
            || ctx.processed.contains(&(GramKind::AstLexemeString as i64))
        {
            self.sink.add_error(
                DiagnosticKind::DupAstItem,
                root.location,
                "Duplicate Ast lexeme".to_string(),
            );
            return;
        }

        let slot = self.handle_ast_dot(&root.children[0], ctx);
        self.code
            .emit(Opcode::AstLexeme, root.location, &[Operand::Slot(slot)]);
        self.code.free_ast_slot(slot);
        ctx.processed.insert(GramKind::AstLexeme as i64);
    }

    /// `&"text"`: a literal lexeme.
    fn handle_ast_lexeme_string(&mut self, root: &SynTree, ctx: &mut Ctx) {
        if ctx.phase != Phase::Data {
            return;
        }

        if ctx.processed.contains(&(GramKind::AstLexeme as i64))
            || ctx.processed.contains(&(GramKind::AstLexemeString as i64))
        {
            self.sink.add_error(
                DiagnosticKind::DupAstItem,
                root.location,
                "Duplicate Ast lexeme".to_string(),
            );
            return;
        }

        let string = self.code.get_string(&root.children[0].lexeme);
        self.code.emit(
            Opcode::AstLexemeString,
            root.location,
            &[Operand::Str(string)],
        );
        ctx.processed.insert(GramKind::AstLexemeString as i64);
    }
}
