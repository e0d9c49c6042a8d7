//! The serializable parser artifact.
//!
//! A [ParserData] holds everything the virtual machine needs to scan and parse: the kind map,
//! register and string tables, the flat instruction and operand arrays, per-symbol metadata,
//! per-rule reduce entry points, the LR tables and the scanner entry point. It is immutable
//! once generation finishes and can be shared by any number of parser facades.
//!
//! The text encoding is a single line of `|`-delimited fields with `` ` `` escaping, broken
//! into sections by `}1`, `}2`, … markers so a damaged blob fails loudly rather than quietly.

use crate::grammar::syntax::{GramKind, GRAM_KIND_BOUNDARY};
use crate::icode::Opcode;
use crate::ImplementationError;
use std::collections::BTreeMap;

/// Maps kind names to kind numbers. Grammar kinds occupy the reserved range; user kinds are
/// allocated on demand above [GRAM_KIND_BOUNDARY].
#[derive(Debug, Clone)]
pub struct KindMap {
    map: BTreeMap<String, i64>,
    names: BTreeMap<i64, String>,
    next_kind: i64,
}

impl KindMap {
    pub fn new() -> Self {
        let mut kind_map = Self {
            map: BTreeMap::new(),
            names: BTreeMap::new(),
            next_kind: GRAM_KIND_BOUNDARY,
        };

        for kind in GramKind::all() {
            kind_map.map.insert(kind.name().to_string(), *kind as i64);
            kind_map.names.insert(*kind as i64, kind.name().to_string());
        }

        kind_map
    }

    /// Install user kinds before generation so numbering is stable across parsers.
    pub fn install(&mut self, pairs: &BTreeMap<String, i64>) {
        for (name, kind) in pairs {
            self.map.insert(name.clone(), *kind);
            self.names.insert(*kind, name.clone());
            if *kind >= self.next_kind {
                self.next_kind = *kind + 1;
            }
        }
    }

    pub fn get_kind(&self, name: &str) -> Option<i64> {
        self.map.get(name).copied()
    }

    /// Find a kind, allocating a fresh number when the name is new.
    pub fn get_kind_force(&mut self, name: &str) -> i64 {
        if let Some(kind) = self.map.get(name) {
            return *kind;
        }

        let kind = self.next_kind;
        self.next_kind += 1;
        self.map.insert(name.to_string(), kind);
        self.names.insert(kind, name.to_string());
        kind
    }

    pub fn get_kind_string(&self, kind: i64) -> Option<&str> {
        self.names.get(&kind).map(|s| s.as_str())
    }

    /// User-defined kinds only, the part worth persisting.
    pub fn user_pairs(&self) -> Vec<(String, i64)> {
        self.map
            .iter()
            .filter(|(_, kind)| **kind >= GRAM_KIND_BOUNDARY)
            .map(|(name, kind)| (name.clone(), *kind))
            .collect()
    }
}

impl Default for KindMap {
    fn default() -> Self {
        Self::new()
    }
}

/// One register of the virtual machine.
#[derive(Debug, Clone)]
pub struct RegisterData {
    pub name: String,
    pub initial_value: i64,
}

/// Metadata for one grammar symbol, indexed by symbol number.
#[derive(Debug, Clone)]
pub struct TokenData {
    pub name: String,
    pub description: String,
    pub kind: i64,
    pub is_terminal: bool,
    pub lexeme_needed: bool,
}

/// One executable instruction: the opcode, the grammar location it came from, and where its
/// operands start in the flat operand array.
#[derive(Debug, Clone, Copy)]
pub struct VmInstruction {
    pub opcode: Opcode,
    pub location: i64,
    pub operand_offset: usize,
}

//
//  LR actions are packed into an i64: the low three bits are the tag and the rest the
//  target state or rule.
//

pub const LR_ERROR: i64 = 0;
pub const LR_SHIFT: i64 = 1;
pub const LR_REDUCE: i64 = 2;
pub const LR_ACCEPT: i64 = 3;

pub fn lr_encode(tag: i64, value: i64) -> i64 {
    (value << 3) | tag
}

pub fn lr_tag(action: i64) -> i64 {
    action & 7
}

pub fn lr_value(action: i64) -> i64 {
    action >> 3
}

/// The frozen parser artifact.
pub struct ParserData {
    pub kind_map: KindMap,
    pub src: String,

    pub register_list: Vec<RegisterData>,
    pub ast_slot_count: usize,
    pub string_list: Vec<String>,
    pub instruction_list: Vec<VmInstruction>,
    pub operand_list: Vec<i64>,

    pub token_list: Vec<TokenData>,
    pub rule_pc: Vec<i64>,
    pub rule_lhs: Vec<i64>,
    pub rule_rhs_len: Vec<i64>,

    /// Per LR state, sorted `(symbol_num, action)` pairs covering terminals and nonterminals.
    pub lr_rows: Vec<Vec<(i64, i64)>>,
    pub start_state: i64,
    pub eof_symbol_num: i64,
    pub error_symbol_num: i64,
    pub error_recovery: bool,

    pub scanner_pc: i64,
    pub prolog_pc: i64,
}

impl ParserData {
    pub fn new() -> Self {
        Self {
            kind_map: KindMap::new(),
            src: String::new(),
            register_list: Vec::new(),
            ast_slot_count: 0,
            string_list: Vec::new(),
            instruction_list: Vec::new(),
            operand_list: Vec::new(),
            token_list: Vec::new(),
            rule_pc: Vec::new(),
            rule_lhs: Vec::new(),
            rule_rhs_len: Vec::new(),
            lr_rows: Vec::new(),
            start_state: 0,
            eof_symbol_num: 0,
            error_symbol_num: 0,
            error_recovery: true,
            scanner_pc: -1,
            prolog_pc: -1,
        }
    }

    pub fn get_kind(&self, name: &str) -> Option<i64> {
        self.kind_map.get_kind(name)
    }

    pub fn get_kind_string(&self, kind: i64) -> Option<&str> {
        self.kind_map.get_kind_string(kind)
    }

    /// Look up an action in the LR tables.
    pub fn lr_action(&self, state: i64, symbol_num: i64) -> i64 {
        let row = match self.lr_rows.get(state as usize) {
            Some(row) => row,
            None => return LR_ERROR,
        };
        match row.binary_search_by_key(&symbol_num, |(sym, _)| *sym) {
            Ok(index) => row[index].1,
            Err(_) => LR_ERROR,
        }
    }

    //
    //  Text encoding
    //

    pub fn encode(&self) -> String {
        let mut out = String::new();

        write_marker(&mut out, 1);
        let user_pairs = self.kind_map.user_pairs();
        write_long(&mut out, user_pairs.len() as i64);
        for (name, kind) in &user_pairs {
            write_string(&mut out, name);
            write_long(&mut out, *kind);
        }

        write_marker(&mut out, 2);
        write_string(&mut out, &self.src);

        write_marker(&mut out, 3);
        write_long(&mut out, self.token_list.len() as i64);
        for token in &self.token_list {
            write_string(&mut out, &token.name);
            write_string(&mut out, &token.description);
            write_long(&mut out, token.kind);
            write_long(&mut out, token.is_terminal as i64);
            write_long(&mut out, token.lexeme_needed as i64);
        }

        write_marker(&mut out, 4);
        write_long(&mut out, self.register_list.len() as i64);
        for register in &self.register_list {
            write_string(&mut out, &register.name);
            write_long(&mut out, register.initial_value);
        }

        write_marker(&mut out, 5);
        write_long(&mut out, self.ast_slot_count as i64);

        write_marker(&mut out, 6);
        write_long(&mut out, self.string_list.len() as i64);
        for string in &self.string_list {
            write_string(&mut out, string);
        }

        write_marker(&mut out, 7);
        write_long(&mut out, self.instruction_list.len() as i64);
        for instruction in &self.instruction_list {
            write_long(&mut out, instruction.opcode as i64);
            write_long(&mut out, instruction.location);
            write_long(&mut out, instruction.operand_offset as i64);
        }

        write_marker(&mut out, 8);
        write_long(&mut out, self.operand_list.len() as i64);
        for operand in &self.operand_list {
            write_long(&mut out, *operand);
        }

        write_marker(&mut out, 9);
        write_long(&mut out, self.rule_pc.len() as i64);
        for i in 0..self.rule_pc.len() {
            write_long(&mut out, self.rule_pc[i]);
            write_long(&mut out, self.rule_lhs[i]);
            write_long(&mut out, self.rule_rhs_len[i]);
        }

        write_marker(&mut out, 10);
        write_long(&mut out, self.lr_rows.len() as i64);
        for row in &self.lr_rows {
            write_long(&mut out, row.len() as i64);
            for (symbol, action) in row {
                write_long(&mut out, *symbol);
                write_long(&mut out, *action);
            }
        }
        write_long(&mut out, self.start_state);
        write_long(&mut out, self.eof_symbol_num);
        write_long(&mut out, self.error_symbol_num);
        write_long(&mut out, self.error_recovery as i64);

        write_marker(&mut out, 11);
        write_long(&mut out, self.scanner_pc);
        write_long(&mut out, self.prolog_pc);

        out
    }

    pub fn decode(blob: &str) -> Result<ParserData, ImplementationError> {
        let mut reader = BlobReader::new(blob);
        let mut prsd = ParserData::new();

        reader.marker(1)?;
        let kind_count = reader.long()?;
        let mut pairs = BTreeMap::new();
        for _ in 0..kind_count {
            let name = reader.string()?;
            let kind = reader.long()?;
            pairs.insert(name, kind);
        }
        prsd.kind_map.install(&pairs);

        reader.marker(2)?;
        prsd.src = reader.string()?;

        reader.marker(3)?;
        let token_count = reader.long()?;
        for _ in 0..token_count {
            let name = reader.string()?;
            let description = reader.string()?;
            let kind = reader.long()?;
            let is_terminal = reader.long()? != 0;
            let lexeme_needed = reader.long()? != 0;
            prsd.token_list.push(TokenData {
                name,
                description,
                kind,
                is_terminal,
                lexeme_needed,
            });
        }

        reader.marker(4)?;
        let register_count = reader.long()?;
        for _ in 0..register_count {
            let name = reader.string()?;
            let initial_value = reader.long()?;
            prsd.register_list.push(RegisterData {
                name,
                initial_value,
            });
        }

        reader.marker(5)?;
        prsd.ast_slot_count = reader.long()? as usize;

        reader.marker(6)?;
        let string_count = reader.long()?;
        for _ in 0..string_count {
            let string = reader.string()?;
            prsd.string_list.push(string);
        }

        reader.marker(7)?;
        let instruction_count = reader.long()?;
        for _ in 0..instruction_count {
            let opcode_num = reader.long()?;
            let location = reader.long()?;
            let operand_offset = reader.long()? as usize;
            let opcode = Opcode::from_num(opcode_num).ok_or_else(|| {
                ImplementationError::decode_error(format!(
                    "Unknown opcode {} in parser artifact.",
                    opcode_num
                ))
            })?;
            prsd.instruction_list.push(VmInstruction {
                opcode,
                location,
                operand_offset,
            });
        }

        reader.marker(8)?;
        let operand_count = reader.long()?;
        for _ in 0..operand_count {
            prsd.operand_list.push(reader.long()?);
        }

        reader.marker(9)?;
        let rule_count = reader.long()?;
        for _ in 0..rule_count {
            prsd.rule_pc.push(reader.long()?);
            prsd.rule_lhs.push(reader.long()?);
            prsd.rule_rhs_len.push(reader.long()?);
        }

        reader.marker(10)?;
        let state_count = reader.long()?;
        for _ in 0..state_count {
            let entry_count = reader.long()?;
            let mut row = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let symbol = reader.long()?;
                let action = reader.long()?;
                row.push((symbol, action));
            }
            prsd.lr_rows.push(row);
        }
        prsd.start_state = reader.long()?;
        prsd.eof_symbol_num = reader.long()?;
        prsd.error_symbol_num = reader.long()?;
        prsd.error_recovery = reader.long()? != 0;

        reader.marker(11)?;
        prsd.scanner_pc = reader.long()?;
        prsd.prolog_pc = reader.long()?;

        Ok(prsd)
    }
}

impl Default for ParserData {
    fn default() -> Self {
        Self::new()
    }
}

//
//  Field level encoding
//

fn write_long(out: &mut String, value: i64) {
    out.push_str(&value.to_string());
    out.push('|');
}

fn write_string(out: &mut String, value: &str) {
    for c in value.chars() {
        if c == '`' || c == '|' {
            out.push('`');
        }
        out.push(c);
    }
    out.push('|');
}

fn write_marker(out: &mut String, section: usize) {
    out.push('}');
    out.push_str(&section.to_string());
    out.push('|');
}

struct BlobReader<'b> {
    chars: std::str::Chars<'b>,
}

impl<'b> BlobReader<'b> {
    fn new(blob: &'b str) -> Self {
        Self {
            chars: blob.chars(),
        }
    }

    /// The next `|`-terminated field, with `` ` `` escapes removed.
    fn field(&mut self) -> Result<String, ImplementationError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some('`') => match self.chars.next() {
                    Some(c) => out.push(c),
                    None => {
                        return Err(ImplementationError::decode_error(
                            "Parser artifact ends inside an escape.".to_string(),
                        ))
                    }
                },
                Some('|') => return Ok(out),
                Some(c) => out.push(c),
                None => {
                    return Err(ImplementationError::decode_error(
                        "Parser artifact is truncated.".to_string(),
                    ))
                }
            }
        }
    }

    fn long(&mut self) -> Result<i64, ImplementationError> {
        let field = self.field()?;
        field.parse::<i64>().map_err(|_| {
            ImplementationError::decode_error(format!(
                "Expected a number in parser artifact, found '{}'.",
                field
            ))
        })
    }

    fn string(&mut self) -> Result<String, ImplementationError> {
        self.field()
    }

    fn marker(&mut self, section: usize) -> Result<(), ImplementationError> {
        let field = self.field()?;
        let expected = format!("}}{}", section);
        if field != expected {
            return Err(ImplementationError::decode_error(format!(
                "Bad section marker in parser artifact: expected '{}', found '{}'.",
                expected, field
            )));
        }
        Ok(())
    }
}
