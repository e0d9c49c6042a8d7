//! NFA construction from the token regular expressions.
//!
//! Each regex clause of each scanned token becomes a sub-automaton reachable from the global
//! start state through an epsilon move, with the clause's accept action on its final state.
//! Construction is a depth-first walk of the regex tree keeping a start/final state pair in a
//! small context.

use super::{AcceptAction, ScannerGenerator, StateId, Transition};
use crate::grammar::syntax::GramKind;
use crate::SynTree;

const CODEPOINT_MAX: u32 = 0xffff_ffff;

struct Ctx {
    start_state: StateId,
    final_state: StateId,
}

impl<'a> ScannerGenerator<'a> {
    pub(crate) fn construct_nfa(&mut self) {
        self.nfa_start = self.get_new_state();

        let token_ids: Vec<_> = self
            .gram
            .symbol_ids()
            .filter(|id| self.gram.symbol(*id).is_scanned)
            .collect();

        for token_id in token_ids {
            let symbol = self.gram.symbol(token_id);
            let precedence = symbol.precedence;
            let regex_list = match &symbol.regex_list {
                Some(list) => list.clone(),
                None => continue,
            };

            for clause in &regex_list.children {
                let guard = &clause.children[0];
                let regex = &clause.children[1];

                let start = self.get_new_state();
                self.state_mut(self.nfa_start).e_moves.insert(start);

                let mut ctx = Ctx {
                    start_state: start,
                    final_state: start,
                };
                self.handle_build_nfa(regex, &mut ctx);

                let guard = if GramKind::of(guard) == GramKind::Null {
                    None
                } else {
                    Some(guard.clone())
                };
                self.state_mut(ctx.final_state).accepts.push(AcceptAction {
                    token: token_id,
                    precedence,
                    guard,
                });
            }
        }
    }

    fn handle_build_nfa(&mut self, root: &SynTree, ctx: &mut Ctx) {
        match GramKind::of(root) {
            GramKind::Regex | GramKind::RegexList => {
                for child in &root.children {
                    self.handle_build_nfa(child, ctx);
                    ctx.start_state = ctx.final_state;
                }
            }
            GramKind::RegexOr => self.handle_regex_or(root, ctx),
            GramKind::RegexOptional => self.handle_regex_optional(root, ctx),
            GramKind::RegexZeroClosure => self.handle_regex_zero_closure(root, ctx),
            GramKind::RegexOneClosure => self.handle_regex_one_closure(root, ctx),
            GramKind::RegexChar => {
                let c = root.lexeme.chars().next().unwrap_or('\0');
                self.emit_char_edge(c, ctx);
            }
            GramKind::RegexWildcard => {
                self.emit_ranges(&[(0, CODEPOINT_MAX)], ctx);
            }
            GramKind::RegexWhitespace => {
                self.emit_ranges(&whitespace_ranges(), ctx);
            }
            GramKind::RegexNotWhitespace => {
                self.emit_ranges(&complement(&whitespace_ranges()), ctx);
            }
            GramKind::RegexDigits => {
                self.emit_ranges(&digit_ranges(), ctx);
            }
            GramKind::RegexNotDigits => {
                self.emit_ranges(&complement(&digit_ranges()), ctx);
            }
            GramKind::Charset => {
                let ranges = self.charset_ranges(root);
                self.emit_ranges(&ranges, ctx);
            }
            GramKind::CharsetInvert => {
                let ranges = self.charset_ranges(&root.children[0]);
                self.emit_ranges(&complement(&ranges), ctx);
            }
            kind => panic!("No NFA handler for node kind {}", kind.name()),
        }
    }

    /// An or clause: fan out through epsilon moves and fan back in.
    fn handle_regex_or(&mut self, root: &SynTree, ctx: &mut Ctx) {
        let final_state = self.get_new_state();

        for child in &root.children {
            let branch_start = self.get_new_state();
            self.state_mut(ctx.start_state).e_moves.insert(branch_start);

            let mut cctx = Ctx {
                start_state: branch_start,
                final_state: branch_start,
            };
            self.handle_build_nfa(child, &mut cctx);

            self.state_mut(cctx.final_state).e_moves.insert(final_state);
        }

        ctx.final_state = final_state;
        ctx.start_state = final_state;
    }

    /// `t?`: a bypass epsilon around the sub-automaton.
    fn handle_regex_optional(&mut self, root: &SynTree, ctx: &mut Ctx) {
        let inner_start = self.get_new_state();
        self.state_mut(ctx.start_state).e_moves.insert(inner_start);

        let mut cctx = Ctx {
            start_state: inner_start,
            final_state: inner_start,
        };
        self.handle_build_nfa(&root.children[0], &mut cctx);

        let final_state = self.get_new_state();
        self.state_mut(cctx.final_state).e_moves.insert(final_state);
        self.state_mut(ctx.start_state).e_moves.insert(final_state);

        ctx.final_state = final_state;
        ctx.start_state = final_state;
    }

    /// `t*`: bypass and back epsilons.
    fn handle_regex_zero_closure(&mut self, root: &SynTree, ctx: &mut Ctx) {
        let inner_start = self.get_new_state();
        self.state_mut(ctx.start_state).e_moves.insert(inner_start);

        let mut cctx = Ctx {
            start_state: inner_start,
            final_state: inner_start,
        };
        self.handle_build_nfa(&root.children[0], &mut cctx);

        let final_state = self.get_new_state();
        self.state_mut(cctx.final_state).e_moves.insert(final_state);
        self.state_mut(cctx.final_state).e_moves.insert(ctx.start_state);
        self.state_mut(ctx.start_state).e_moves.insert(final_state);

        ctx.final_state = final_state;
        ctx.start_state = final_state;
    }

    /// `t+`: a back epsilon only.
    fn handle_regex_one_closure(&mut self, root: &SynTree, ctx: &mut Ctx) {
        let inner_start = self.get_new_state();
        self.state_mut(ctx.start_state).e_moves.insert(inner_start);

        let mut cctx = Ctx {
            start_state: inner_start,
            final_state: inner_start,
        };
        self.handle_build_nfa(&root.children[0], &mut cctx);

        let final_state = self.get_new_state();
        self.state_mut(cctx.final_state).e_moves.insert(final_state);
        self.state_mut(cctx.final_state).e_moves.insert(ctx.start_state);

        ctx.final_state = final_state;
        ctx.start_state = final_state;
    }

    /// A single character edge, doubled across case when the grammar is case insensitive.
    fn emit_char_edge(&mut self, c: char, ctx: &mut Ctx) {
        let mut ranges = vec![(c as u32, c as u32)];
        if !self.gram.case_sensitive && c.is_ascii_alphabetic() {
            let twin = if c.is_ascii_lowercase() {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            ranges.push((twin as u32, twin as u32));
        }
        self.emit_ranges(&ranges, ctx);
    }

    fn emit_ranges(&mut self, ranges: &[(u32, u32)], ctx: &mut Ctx) {
        let final_state = self.get_new_state();
        for (start, end) in ranges {
            self.state_mut(ctx.start_state).transitions.insert(Transition {
                range_start: *start,
                range_end: *end,
                target: final_state,
            });
        }
        ctx.final_state = final_state;
        ctx.start_state = final_state;
    }

    /// The included ranges of a character class body.
    fn charset_ranges(&mut self, root: &SynTree) -> Vec<(u32, u32)> {
        let mut ranges: Vec<(u32, u32)> = Vec::new();

        for item in &root.children {
            match GramKind::of(item) {
                GramKind::CharsetChar => {
                    let c = item.lexeme.chars().next().unwrap_or('\0');
                    ranges.push((c as u32, c as u32));
                    if !self.gram.case_sensitive && c.is_ascii_alphabetic() {
                        let twin = if c.is_ascii_lowercase() {
                            c.to_ascii_uppercase()
                        } else {
                            c.to_ascii_lowercase()
                        };
                        ranges.push((twin as u32, twin as u32));
                    }
                }
                GramKind::CharsetRange => {
                    let first = item.children[0].lexeme.chars().next().unwrap_or('\0');
                    let last = item.children[1].lexeme.chars().next().unwrap_or('\0');
                    ranges.push((first as u32, last as u32));
                }
                GramKind::CharsetWhitespace => ranges.extend(whitespace_ranges()),
                GramKind::CharsetNotWhitespace => {
                    ranges.extend(complement(&whitespace_ranges()))
                }
                GramKind::CharsetDigits => ranges.extend(digit_ranges()),
                GramKind::CharsetNotDigits => ranges.extend(complement(&digit_ranges())),
                kind => panic!("No charset handler for node kind {}", kind.name()),
            }
        }

        ranges
    }
}

fn whitespace_ranges() -> Vec<(u32, u32)> {
    vec![('\t' as u32, '\r' as u32), (' ' as u32, ' ' as u32)]
}

fn digit_ranges() -> Vec<(u32, u32)> {
    vec![('0' as u32, '9' as u32)]
}

/// The complement of a union of ranges over the full codepoint space.
pub(crate) fn complement(ranges: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut merged: Vec<(u32, u32)> = Vec::new();
    for (start, end) in sorted {
        match merged.last_mut() {
            Some((_, last_end)) if start <= last_end.saturating_add(1) => {
                *last_end = (*last_end).max(end);
            }
            _ => merged.push((start, end)),
        }
    }

    let mut out = Vec::new();
    let mut next = 0u32;
    for (start, end) in merged {
        if start > next {
            out.push((next, start - 1));
        }
        next = match end.checked_add(1) {
            Some(next) => next,
            None => return out,
        };
    }
    out.push((next, CODEPOINT_MAX));
    out
}
