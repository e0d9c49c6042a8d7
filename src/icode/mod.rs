//! Intermediate code: a register/label based IR emitted by the generators, peephole
//! optimized, and finally laid out as flat bytecode for the virtual machine.
//!
//! The builder hands out stable ids from flat pools of labels, registers, strings and AST
//! slots. Registers are deduplicated by name; a register whose name is a decimal number is a
//! constant carrying that value. Temporaries are recycled registers named `Temp$N`.

mod layout;
mod optimize;

#[cfg(test)]
mod __tests__;

use crate::{Location, NO_LOCATION};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AstSlotId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(pub usize);

/// The opcode set of the virtual machine. The discriminants are the canonical numbering and
/// are stable across serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i64)]
pub enum Opcode {
    Null = 0,
    Halt,
    Label,
    Call,
    ScanStart,
    ScanChar,
    ScanAccept,
    ScanToken,
    ScanError,
    AstStart,
    AstFinish,
    AstNew,
    AstForm,
    AstLoad,
    AstIndex,
    AstChild,
    AstChildSlice,
    AstKind,
    AstKindNum,
    AstLocation,
    AstLocationNum,
    AstLexeme,
    AstLexemeString,
    Assign,
    DumpStack,
    Add,
    Subtract,
    Multiply,
    Divide,
    UnaryMinus,
    Return,
    Branch,
    BranchEqual,
    BranchNotEqual,
    BranchLessThan,
    BranchLessEqual,
    BranchGreaterThan,
    BranchGreaterEqual,
}

static OPCODE_LIST: &[Opcode] = &[
    Opcode::Null,
    Opcode::Halt,
    Opcode::Label,
    Opcode::Call,
    Opcode::ScanStart,
    Opcode::ScanChar,
    Opcode::ScanAccept,
    Opcode::ScanToken,
    Opcode::ScanError,
    Opcode::AstStart,
    Opcode::AstFinish,
    Opcode::AstNew,
    Opcode::AstForm,
    Opcode::AstLoad,
    Opcode::AstIndex,
    Opcode::AstChild,
    Opcode::AstChildSlice,
    Opcode::AstKind,
    Opcode::AstKindNum,
    Opcode::AstLocation,
    Opcode::AstLocationNum,
    Opcode::AstLexeme,
    Opcode::AstLexemeString,
    Opcode::Assign,
    Opcode::DumpStack,
    Opcode::Add,
    Opcode::Subtract,
    Opcode::Multiply,
    Opcode::Divide,
    Opcode::UnaryMinus,
    Opcode::Return,
    Opcode::Branch,
    Opcode::BranchEqual,
    Opcode::BranchNotEqual,
    Opcode::BranchLessThan,
    Opcode::BranchLessEqual,
    Opcode::BranchGreaterThan,
    Opcode::BranchGreaterEqual,
];

/// Static information about an opcode.
pub struct OpcodeInfo {
    pub name: &'static str,
    pub is_branch: bool,
    pub is_no_follow: bool,
    pub inverse_branch: Option<Opcode>,
}

static OPCODE_TABLE: &[OpcodeInfo] = &[
    OpcodeInfo { name: "Null", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Halt", is_branch: false, is_no_follow: true, inverse_branch: None },
    OpcodeInfo { name: "Label", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Call", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "ScanStart", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "ScanChar", is_branch: false, is_no_follow: true, inverse_branch: None },
    OpcodeInfo { name: "ScanAccept", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "ScanToken", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "ScanError", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstStart", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstFinish", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstNew", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstForm", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstLoad", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstIndex", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstChild", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstChildSlice", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstKind", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstKindNum", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstLocation", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstLocationNum", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstLexeme", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "AstLexemeString", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Assign", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "DumpStack", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Add", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Subtract", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Multiply", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Divide", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "UnaryMinus", is_branch: false, is_no_follow: false, inverse_branch: None },
    OpcodeInfo { name: "Return", is_branch: false, is_no_follow: true, inverse_branch: None },
    OpcodeInfo { name: "Branch", is_branch: true, is_no_follow: true, inverse_branch: None },
    OpcodeInfo { name: "BranchEqual", is_branch: true, is_no_follow: false, inverse_branch: Some(Opcode::BranchNotEqual) },
    OpcodeInfo { name: "BranchNotEqual", is_branch: true, is_no_follow: false, inverse_branch: Some(Opcode::BranchEqual) },
    OpcodeInfo { name: "BranchLessThan", is_branch: true, is_no_follow: false, inverse_branch: Some(Opcode::BranchGreaterEqual) },
    OpcodeInfo { name: "BranchLessEqual", is_branch: true, is_no_follow: false, inverse_branch: Some(Opcode::BranchGreaterThan) },
    OpcodeInfo { name: "BranchGreaterThan", is_branch: true, is_no_follow: false, inverse_branch: Some(Opcode::BranchLessEqual) },
    OpcodeInfo { name: "BranchGreaterEqual", is_branch: true, is_no_follow: false, inverse_branch: Some(Opcode::BranchLessThan) },
];

impl Opcode {
    pub fn info(&self) -> &'static OpcodeInfo {
        &OPCODE_TABLE[*self as usize]
    }

    pub fn from_num(num: i64) -> Option<Opcode> {
        if num < 0 {
            return None;
        }
        OPCODE_LIST.get(num as usize).copied()
    }
}

/// An operand in intermediate code. The virtual machine sees only integers; the tagged form
/// exists so label resolution and pool numbering can happen at layout time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Integer(i64),
    Codepoint(u32),
    Str(StrId),
    Reg(RegId),
    Slot(AstSlotId),
    Label(LabelId),
}

impl Operand {
    pub fn label(&self) -> LabelId {
        match self {
            Operand::Label(label) => *label,
            _ => panic!("Operand is not a label"),
        }
    }

    pub fn integer(&self) -> i64 {
        match self {
            Operand::Integer(value) => *value,
            _ => panic!("Operand is not an integer"),
        }
    }
}

/// One intermediate code instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub location: Location,
    pub operands: Vec<Operand>,
}

pub struct LabelInfo {
    pub name: String,
    pub is_extern: bool,
    pub pc: i64,
}

pub struct RegisterInfo {
    pub name: String,
    pub initial_value: i64,
}

/// The intermediate code builder shared by every generator stage.
pub struct CodeBuilder {
    labels: Vec<LabelInfo>,
    registers: Vec<RegisterInfo>,
    register_map: BTreeMap<String, RegId>,
    strings: Vec<String>,
    string_map: BTreeMap<String, StrId>,
    slot_count: usize,
    slot_queue: VecDeque<AstSlotId>,
    temporary_set: BTreeSet<RegId>,
    temporary_queue: VecDeque<RegId>,
    icode: Vec<Instruction>,
    prolog_label: LabelId,
}

impl CodeBuilder {
    /// A fresh builder with the prolog already emitted: reset `token_count` and return.
    pub fn new() -> Self {
        let mut builder = Self {
            labels: Vec::new(),
            registers: Vec::new(),
            register_map: BTreeMap::new(),
            strings: Vec::new(),
            string_map: BTreeMap::new(),
            slot_count: 0,
            slot_queue: VecDeque::new(),
            temporary_set: BTreeSet::new(),
            temporary_queue: VecDeque::new(),
            icode: Vec::new(),
            prolog_label: LabelId(0),
        };

        let prolog = builder.get_label_named("Prolog");
        builder.set_extern(prolog);
        builder.prolog_label = prolog;

        builder.emit(Opcode::Label, NO_LOCATION, &[Operand::Label(prolog)]);
        let token_count = builder.get_register_init("token_count", 0);
        let zero = builder.get_register_init("0", 0);
        builder.emit(
            Opcode::Assign,
            NO_LOCATION,
            &[Operand::Reg(token_count), Operand::Reg(zero)],
        );
        builder.emit(Opcode::Return, NO_LOCATION, &[]);

        builder
    }

    pub fn prolog_label(&self) -> LabelId {
        self.prolog_label
    }

    //
    //  Pools
    //

    pub fn get_label(&mut self) -> LabelId {
        let id = LabelId(self.labels.len());
        self.labels.push(LabelInfo {
            name: String::new(),
            is_extern: false,
            pc: -1,
        });
        id
    }

    pub fn get_label_named(&mut self, name: &str) -> LabelId {
        let id = self.get_label();
        self.labels[id.0].name = name.to_string();
        id
    }

    pub fn set_extern(&mut self, label: LabelId) {
        self.labels[label.0].is_extern = true;
    }

    pub fn label_info(&self, label: LabelId) -> &LabelInfo {
        &self.labels[label.0]
    }

    pub fn label_pc(&self, label: LabelId) -> i64 {
        self.labels[label.0].pc
    }

    /// A register is a named integer counter. Registers with numeric names are constants
    /// initialized to that number and never assigned.
    pub fn get_register(&mut self, name: &str) -> RegId {
        if let Some(id) = self.register_map.get(name) {
            return *id;
        }

        let initial_value = name.parse::<i64>().unwrap_or(0);
        let id = RegId(self.registers.len());
        self.registers.push(RegisterInfo {
            name: name.to_string(),
            initial_value,
        });
        self.register_map.insert(name.to_string(), id);
        id
    }

    pub fn get_register_init(&mut self, name: &str, initial_value: i64) -> RegId {
        let id = self.get_register(name);
        self.registers[id.0].initial_value = initial_value;
        id
    }

    /// Get an available AST slot, reusing a released one when possible.
    pub fn get_ast_slot(&mut self) -> AstSlotId {
        if let Some(slot) = self.slot_queue.pop_front() {
            return slot;
        }

        let slot = AstSlotId(self.slot_count);
        self.slot_count += 1;
        slot
    }

    pub fn free_ast_slot(&mut self, slot: AstSlotId) {
        self.slot_queue.push_back(slot);
    }

    /// Release every AST slot. Called at the start of each reduce action so slots are
    /// recycled per action but never across one.
    pub fn free_all_asts(&mut self) {
        self.slot_queue.clear();
        for i in 0..self.slot_count {
            self.slot_queue.push_back(AstSlotId(i));
        }
    }

    pub fn get_string(&mut self, value: &str) -> StrId {
        if let Some(id) = self.string_map.get(value) {
            return *id;
        }

        let id = StrId(self.strings.len());
        self.strings.push(value.to_string());
        self.string_map.insert(value.to_string(), id);
        id
    }

    //
    //  Temporaries
    //

    pub fn get_temporary(&mut self) -> RegId {
        if let Some(register) = self.temporary_queue.pop_front() {
            return register;
        }

        let name = format!("Temp${}", self.temporary_set.len());
        let register = self.get_register(&name);
        self.temporary_set.insert(register);
        register
    }

    pub fn is_temporary(&self, register: RegId) -> bool {
        self.temporary_set.contains(&register)
    }

    pub fn free_temporary(&mut self, register: RegId) {
        self.temporary_queue.push_back(register);
    }

    pub fn free_all_temporaries(&mut self) {
        self.temporary_queue.clear();
        for register in &self.temporary_set {
            self.temporary_queue.push_back(*register);
        }
    }

    //
    //  Emission
    //

    pub fn emit(&mut self, opcode: Opcode, location: Location, operands: &[Operand]) {
        self.icode.push(Instruction {
            opcode,
            location,
            operands: operands.to_vec(),
        });
    }

    pub fn instruction_count(&self) -> usize {
        self.icode.len()
    }

    pub(crate) fn icode(&self) -> &[Instruction] {
        &self.icode
    }

    /// Render the intermediate code for debugging.
    pub fn dump_icode(&self) -> String {
        let mut out = String::new();
        for (i, instruction) in self.icode.iter().enumerate() {
            let _ = write!(out, "{:>5}  {:<18}", i, instruction.opcode.info().name);
            for operand in &instruction.operands {
                let text = match operand {
                    Operand::Integer(value) => format!(" {}", value),
                    Operand::Codepoint(value) => match char::from_u32(*value) {
                        Some(c) if !c.is_control() => format!(" '{}'", c),
                        _ => format!(" U+{:04X}", value),
                    },
                    Operand::Str(id) => format!(" str:{:?}", self.strings[id.0]),
                    Operand::Reg(id) => format!(" r:{}", self.registers[id.0].name),
                    Operand::Slot(id) => format!(" ast:{}", id.0),
                    Operand::Label(id) => {
                        let info = &self.labels[id.0];
                        if info.name.is_empty() {
                            format!(" L{}", id.0)
                        } else {
                            format!(" {}", info.name)
                        }
                    }
                };
                out.push_str(&text);
            }
            out.push('\n');
        }
        out
    }

    pub(crate) fn registers(&self) -> &[RegisterInfo] {
        &self.registers
    }

    pub(crate) fn strings(&self) -> &[String] {
        &self.strings
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub(crate) fn labels(&self) -> &[LabelInfo] {
        &self.labels
    }

    pub(crate) fn icode_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.icode
    }

    pub(crate) fn label_pc_mut(&mut self, label: LabelId) -> &mut i64 {
        &mut self.labels[label.0].pc
    }
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
