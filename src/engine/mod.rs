//! The parser virtual machine.
//!
//! Executes the flat bytecode of a [ParserData] against one source buffer. The outer loop is
//! a conventional LR driver over the serialized tables; the scanner and the reduce actions
//! run as bytecode through [ParserEngine::call]. Runtime failures become diagnostics against
//! the source, never panics.

use crate::errors::ErrorSink;
use crate::icode::Opcode;
use crate::parser_data::{lr_tag, lr_value, ParserData, LR_ACCEPT, LR_ERROR, LR_REDUCE, LR_SHIFT};
use crate::{DiagnosticKind, SynTree, NO_LOCATION};

/// How many syntax errors to tolerate before giving up on a source.
const MAX_SYNTAX_ERRORS: usize = 25;

#[derive(Debug, Clone, Copy)]
struct Token {
    symbol_num: i64,
    start_char: usize,
    end_char: usize,
}

pub struct ParserEngine<'a> {
    prsd: &'a ParserData,
    sink: &'a mut ErrorSink,

    registers: Vec<i64>,

    chars: Vec<char>,
    offsets: Vec<usize>,
    cursor: usize,
    scan_backup: usize,
    last_accept: Option<(i64, usize, i64)>,
    scanned: Option<Token>,

    ast_stack: Vec<SynTree>,
    slots: Vec<SynTree>,
    call_stack: Vec<usize>,
    halted: bool,
}

impl<'a> ParserEngine<'a> {
    pub fn new(prsd: &'a ParserData, sink: &'a mut ErrorSink) -> Self {
        let text = &sink.source().text;
        let mut chars = Vec::new();
        let mut offsets = Vec::new();
        for (offset, c) in text.char_indices() {
            chars.push(c);
            offsets.push(offset);
        }
        offsets.push(text.len());

        let registers = prsd
            .register_list
            .iter()
            .map(|r| r.initial_value)
            .collect();
        let slots = vec![SynTree::null(); prsd.ast_slot_count];

        Self {
            prsd,
            sink,
            registers,
            chars,
            offsets,
            cursor: 0,
            scan_backup: 0,
            last_accept: None,
            scanned: None,
            ast_stack: Vec::new(),
            slots,
            call_stack: Vec::new(),
            halted: false,
        }
    }

    /// Run the parse. Diagnostics land in the sink; `None` means the source failed.
    pub fn parse(&mut self) -> Option<SynTree> {
        self.call(self.prsd.prolog_pc);

        let mut state_stack: Vec<i64> = vec![self.prsd.start_state];
        let mut lookahead = self.next_token();
        let mut syntax_errors = 0usize;

        loop {
            let state = *state_stack.last().unwrap();
            let action = self.prsd.lr_action(state, lookahead.symbol_num);

            match lr_tag(action) {
                LR_SHIFT => {
                    state_stack.push(lr_value(action));
                    let leaf = self.token_leaf(&lookahead);
                    self.ast_stack.push(leaf);
                    lookahead = self.next_token();
                }

                LR_REDUCE => {
                    let rule = lr_value(action) as usize;
                    let rhs_len = self.prsd.rule_rhs_len[rule] as usize;

                    let reduce_pc = self.prsd.rule_pc[rule];
                    if reduce_pc >= 0 {
                        self.call(reduce_pc);
                    } else {
                        self.default_reduce(rhs_len);
                    }

                    for _ in 0..rhs_len {
                        state_stack.pop();
                    }

                    let lhs = self.prsd.rule_lhs[rule];
                    let top = *state_stack.last().unwrap();
                    let goto = self.prsd.lr_action(top, lhs);
                    if lr_tag(goto) != LR_SHIFT {
                        self.sink.add_error(
                            DiagnosticKind::Error,
                            NO_LOCATION,
                            "Internal error: missing goto after reduce.".to_string(),
                        );
                        return None;
                    }
                    state_stack.push(lr_value(goto));
                }

                LR_ACCEPT => {
                    return Some(self.ast_stack.pop().unwrap_or_else(SynTree::null));
                }

                _ => {
                    syntax_errors += 1;
                    self.report_syntax_error(&lookahead);

                    if !self.prsd.error_recovery || syntax_errors > MAX_SYNTAX_ERRORS {
                        return None;
                    }

                    if !self.recover(&mut state_stack, &mut lookahead) {
                        return None;
                    }
                }
            }
        }
    }

    //
    //  Tokens
    //

    fn next_token(&mut self) -> Token {
        loop {
            if self.cursor >= self.chars.len() {
                return Token {
                    symbol_num: self.prsd.eof_symbol_num,
                    start_char: self.chars.len(),
                    end_char: self.chars.len(),
                };
            }

            self.scanned = None;
            self.call(self.prsd.scanner_pc);

            if let Some(token) = self.scanned.take() {
                return token;
            }
            // an error token or a lexical failure consumed input; scan again
        }
    }

    /// The tree leaf for a shifted token.
    fn token_leaf(&self, token: &Token) -> SynTree {
        let (kind, lexeme_needed) = match self.prsd.token_list.get(token.symbol_num as usize) {
            Some(data) => (data.kind, data.lexeme_needed),
            None => (SynTree::null().kind, false),
        };

        let location = self
            .offsets
            .get(token.start_char)
            .map_or(NO_LOCATION, |o| *o as i64);

        let lexeme = if lexeme_needed && token.start_char < token.end_char {
            let start = self.offsets[token.start_char];
            let end = self.offsets[token.end_char];
            self.sink.source().text[start..end].to_string()
        } else {
            String::new()
        };

        SynTree::leaf(kind, lexeme, location)
    }

    /// Reduce for a rule with no former or guard: hoist a single tree, or wrap the popped
    /// trees in an anonymous node.
    fn default_reduce(&mut self, rhs_len: usize) {
        if rhs_len == 0 {
            self.ast_stack.push(SynTree::null());
            return;
        }

        let at = self.ast_stack.len() - rhs_len;
        let mut popped: Vec<SynTree> = self.ast_stack.split_off(at);

        if popped.len() == 1 {
            self.ast_stack.push(popped.pop().unwrap());
        } else {
            let location = popped.first().map_or(NO_LOCATION, |t| t.location);
            self.ast_stack
                .push(SynTree::new(SynTree::null().kind, String::new(), location, popped));
        }
    }

    //
    //  Errors
    //

    fn report_syntax_error(&mut self, token: &Token) {
        let location = self
            .offsets
            .get(token.start_char)
            .map_or(NO_LOCATION, |o| *o as i64);

        let name = self
            .prsd
            .token_list
            .get(token.symbol_num as usize)
            .map(|data| {
                if data.description.is_empty() {
                    data.name.clone()
                } else {
                    data.description.clone()
                }
            })
            .unwrap_or_else(|| "token".to_string());

        self.sink.add_error(
            DiagnosticKind::Syntax,
            location,
            format!("Unexpected {}.", name),
        );
    }

    /// Panic-mode recovery. Pop states until one can shift the error symbol, then discard
    /// input until a token parses there; without an error production just drop the token.
    fn recover(&mut self, state_stack: &mut Vec<i64>, lookahead: &mut Token) -> bool {
        let error_num = self.prsd.error_symbol_num;

        let mut depth = state_stack.len();
        while depth > 0 {
            let state = state_stack[depth - 1];
            if lr_tag(self.prsd.lr_action(state, error_num)) == LR_SHIFT {
                break;
            }
            depth -= 1;
        }

        if depth == 0 {
            // no error production anywhere on the stack: drop the offending token
            if lookahead.symbol_num == self.prsd.eof_symbol_num {
                return false;
            }
            *lookahead = self.next_token();
            return true;
        }

        state_stack.truncate(depth);
        self.ast_stack.truncate(depth - 1);

        let state = state_stack[depth - 1];
        let action = self.prsd.lr_action(state, error_num);
        state_stack.push(lr_value(action));
        self.ast_stack.push(SynTree::null());

        loop {
            let state = *state_stack.last().unwrap();
            if lr_tag(self.prsd.lr_action(state, lookahead.symbol_num)) != LR_ERROR {
                return true;
            }
            if lookahead.symbol_num == self.prsd.eof_symbol_num {
                return false;
            }
            *lookahead = self.next_token();
        }
    }

    //
    //  Bytecode execution
    //

    fn operand(&self, offset: usize, index: usize) -> i64 {
        self.prsd.operand_list[offset + index]
    }

    /// Execute bytecode starting at an entry point until the matching return.
    pub fn call(&mut self, entry: i64) {
        if entry < 0 || self.halted {
            return;
        }

        let depth0 = self.call_stack.len();
        let mut pc = entry as usize;

        while pc < self.prsd.instruction_list.len() {
            let instruction = self.prsd.instruction_list[pc];
            let off = instruction.operand_offset;
            pc += 1;

            match instruction.opcode {
                Opcode::Null | Opcode::Label => {}

                Opcode::Halt => {
                    self.halted = true;
                    self.call_stack.truncate(depth0);
                    return;
                }

                Opcode::Call => {
                    self.call_stack.push(pc);
                    pc = self.operand(off, 0) as usize;
                }

                Opcode::Return => {
                    if self.call_stack.len() == depth0 {
                        return;
                    }
                    pc = self.call_stack.pop().unwrap();
                }

                Opcode::Branch => {
                    pc = self.operand(off, 0) as usize;
                }

                Opcode::BranchEqual
                | Opcode::BranchNotEqual
                | Opcode::BranchLessThan
                | Opcode::BranchLessEqual
                | Opcode::BranchGreaterThan
                | Opcode::BranchGreaterEqual => {
                    let target = self.operand(off, 0) as usize;
                    let a = self.registers[self.operand(off, 1) as usize];
                    let b = self.registers[self.operand(off, 2) as usize];
                    let taken = match instruction.opcode {
                        Opcode::BranchEqual => a == b,
                        Opcode::BranchNotEqual => a != b,
                        Opcode::BranchLessThan => a < b,
                        Opcode::BranchLessEqual => a <= b,
                        Opcode::BranchGreaterThan => a > b,
                        _ => a >= b,
                    };
                    if taken {
                        pc = target;
                    }
                }

                //
                //  Scanning
                //

                Opcode::ScanStart => {
                    if self.cursor >= self.chars.len() {
                        if self.call_stack.len() == depth0 {
                            return;
                        }
                        pc = self.call_stack.pop().unwrap();
                    } else {
                        self.scan_backup = self.cursor;
                        self.last_accept = None;
                    }
                }

                Opcode::ScanChar => {
                    let count = self.operand(off, 0) as usize;
                    let mut next_pc: Option<usize> = None;

                    if self.cursor < self.chars.len() {
                        let c = self.chars[self.cursor] as u32;
                        for i in 0..count {
                            let lo = self.operand(off, 3 * i + 1) as u32;
                            let hi = self.operand(off, 3 * i + 2) as u32;
                            if lo <= c && c <= hi {
                                self.cursor += 1;
                                next_pc = Some(self.operand(off, 3 * i + 3) as usize);
                                break;
                            }
                        }
                    }

                    match next_pc {
                        Some(target) => pc = target,
                        None => match self.last_accept {
                            Some((_, position, action_pc)) => {
                                self.cursor = position;
                                pc = action_pc as usize;
                            }
                            None => {
                                let c = self.chars[self.scan_backup];
                                let at = self.offsets[self.scan_backup] as i64;
                                self.sink.add_error(
                                    DiagnosticKind::Lexical,
                                    at,
                                    format!("Unrecognized character '{}'.", c.escape_default()),
                                );
                                self.cursor = self.scan_backup + 1;
                                if self.cursor >= self.chars.len() {
                                    if self.call_stack.len() == depth0 {
                                        return;
                                    }
                                    pc = self.call_stack.pop().unwrap();
                                } else {
                                    pc = self.prsd.scanner_pc as usize;
                                }
                            }
                        },
                    }
                }

                Opcode::ScanAccept => {
                    let symbol_num = self.operand(off, 0);
                    let action_pc = self.operand(off, 1);
                    self.last_accept = Some((symbol_num, self.cursor, action_pc));
                }

                Opcode::ScanToken => {
                    if let Some((symbol_num, _, _)) = self.last_accept {
                        if self.cursor == self.scan_backup {
                            // a token matching the empty string would never advance
                            let at = self.offsets[self.scan_backup] as i64;
                            self.sink.add_error(
                                DiagnosticKind::Lexical,
                                at,
                                "Token matches the empty string.".to_string(),
                            );
                            self.cursor += 1;
                        } else {
                            self.scanned = Some(Token {
                                symbol_num,
                                start_char: self.scan_backup,
                                end_char: self.cursor,
                            });
                        }
                    }
                }

                Opcode::ScanError => {
                    let message = self.prsd.string_list[self.operand(off, 0) as usize].clone();
                    let at = self.offsets[self.scan_backup] as i64;
                    self.sink
                        .add_error(DiagnosticKind::Lexical, at, message);
                }

                //
                //  Tree building
                //

                Opcode::AstStart | Opcode::AstNew => {
                    let register = self.operand(off, 0) as usize;
                    self.registers[register] = self.ast_stack.len() as i64;
                }

                Opcode::AstLoad => {
                    let slot = self.operand(off, 0) as usize;
                    let base = self.registers[self.operand(off, 1) as usize];
                    let delta = self.operand(off, 2);
                    let index = base + delta;

                    if index < 0 || index >= self.ast_stack.len() as i64 {
                        self.runtime_index_error();
                        self.slots[slot] = SynTree::null();
                    } else {
                        self.slots[slot] = self.ast_stack[index as usize].clone();
                    }
                }

                Opcode::AstIndex => {
                    let slot = self.operand(off, 0) as usize;
                    let mut index = self.operand(off, 1);
                    let child_count = self.slots[slot].children.len() as i64;
                    if index < 0 {
                        index += child_count;
                    }

                    if index < 0 || index >= child_count {
                        self.runtime_index_error();
                        self.slots[slot] = SynTree::null();
                    } else {
                        self.slots[slot] = self.slots[slot].children[index as usize].clone();
                    }
                }

                Opcode::AstChild => {
                    let slot = self.operand(off, 0) as usize;
                    self.ast_stack.push(self.slots[slot].clone());
                }

                Opcode::AstChildSlice => {
                    let slot = self.operand(off, 0) as usize;
                    let child_count = self.slots[slot].children.len() as i64;
                    let mut first = self.operand(off, 1);
                    let mut last = self.operand(off, 2);
                    if first < 0 {
                        first += child_count;
                    }
                    if last < 0 {
                        last += child_count;
                    }

                    let mut index = first.max(0);
                    while index <= last && index < child_count {
                        self.ast_stack
                            .push(self.slots[slot].children[index as usize].clone());
                        index += 1;
                    }
                }

                Opcode::AstForm => {
                    let base = self.registers[self.operand(off, 0) as usize];
                    let top = self.registers[self.operand(off, 1) as usize].max(0) as usize;
                    let rhs_len = self.operand(off, 2);

                    let children = if top <= self.ast_stack.len() {
                        self.ast_stack.split_off(top)
                    } else {
                        Vec::new()
                    };

                    let input_index = base - rhs_len;
                    let location = if rhs_len > 0
                        && input_index >= 0
                        && (input_index as usize) < self.ast_stack.len()
                    {
                        self.ast_stack[input_index as usize].location
                    } else {
                        NO_LOCATION
                    };

                    self.ast_stack.push(SynTree::new(
                        SynTree::null().kind,
                        String::new(),
                        location,
                        children,
                    ));
                }

                Opcode::AstFinish => {
                    let rhs_len = self.operand(off, 0) as usize;
                    if let Some(formed) = self.ast_stack.pop() {
                        let keep = self.ast_stack.len().saturating_sub(rhs_len);
                        self.ast_stack.truncate(keep);
                        self.ast_stack.push(formed);
                    }
                }

                Opcode::AstKindNum => {
                    let kind = self.operand(off, 0);
                    if let Some(top) = self.ast_stack.last_mut() {
                        top.kind = kind;
                    }
                }

                Opcode::AstKind => {
                    let slot = self.operand(off, 0) as usize;
                    let kind = self.slots[slot].kind;
                    if let Some(top) = self.ast_stack.last_mut() {
                        top.kind = kind;
                    }
                }

                Opcode::AstLocation => {
                    let slot = self.operand(off, 0) as usize;
                    let location = self.slots[slot].location;
                    if let Some(top) = self.ast_stack.last_mut() {
                        top.location = location;
                    }
                }

                Opcode::AstLocationNum => {
                    let location = self.operand(off, 0);
                    if let Some(top) = self.ast_stack.last_mut() {
                        top.location = location;
                    }
                }

                Opcode::AstLexeme => {
                    let slot = self.operand(off, 0) as usize;
                    let lexeme = self.slots[slot].lexeme.clone();
                    if let Some(top) = self.ast_stack.last_mut() {
                        top.lexeme = lexeme;
                    }
                }

                Opcode::AstLexemeString => {
                    let lexeme = self.prsd.string_list[self.operand(off, 0) as usize].clone();
                    if let Some(top) = self.ast_stack.last_mut() {
                        top.lexeme = lexeme;
                    }
                }

                //
                //  Arithmetic
                //

                Opcode::Assign => {
                    let dst = self.operand(off, 0) as usize;
                    let src = self.operand(off, 1) as usize;
                    self.registers[dst] = self.registers[src];
                }

                Opcode::Add | Opcode::Subtract | Opcode::Multiply | Opcode::Divide => {
                    let dst = self.operand(off, 0) as usize;
                    let a = self.registers[self.operand(off, 1) as usize];
                    let b = self.registers[self.operand(off, 2) as usize];
                    self.registers[dst] = match instruction.opcode {
                        Opcode::Add => a.wrapping_add(b),
                        Opcode::Subtract => a.wrapping_sub(b),
                        Opcode::Multiply => a.wrapping_mul(b),
                        _ => {
                            if b == 0 {
                                0
                            } else {
                                a.wrapping_div(b)
                            }
                        }
                    };
                }

                Opcode::UnaryMinus => {
                    let dst = self.operand(off, 0) as usize;
                    let src = self.operand(off, 1) as usize;
                    self.registers[dst] = self.registers[src].wrapping_neg();
                }

                Opcode::DumpStack => {
                    println!("AST stack ({} entries):", self.ast_stack.len());
                    for (index, tree) in self.ast_stack.iter().enumerate().rev() {
                        println!(
                            "  [{}] kind {} with {} children",
                            index,
                            tree.kind,
                            tree.children.len()
                        );
                    }
                }
            }
        }
    }

    fn runtime_index_error(&mut self) {
        self.sink.add_error(
            DiagnosticKind::AstIndex,
            NO_LOCATION,
            "Tree index out of range during reduce.".to_string(),
        );
    }
}
