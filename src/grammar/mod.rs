//! The grammar model: symbols, rules and global options, extracted from the grammar
//! description syntax tree.
//!
//! Symbols and rules are flyweights owned by flat pools inside [Grammar]. Everything else
//! refers to them through [SymbolId] and [RuleId]; deleting a symbol or rule tombstones its
//! slot so identities stay stable for the rest of the generation.

pub mod editor;
pub mod extract;
pub mod syntax;

use crate::{Location, SynTree, NO_LOCATION};
use std::collections::BTreeMap;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
/// A stable reference into the symbol pool of a [Grammar].
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
/// A stable reference into the rule pool of a [Grammar].
pub struct RuleId(pub usize);

impl Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something named in the grammar: a terminal, a nonterminal, or one of the predefined
/// bookkeeping symbols. The classification flags are mutually constrained: a scanned symbol is
/// a terminal, and ignored or error symbols are scanned.
pub struct Symbol {
    pub symbol_num: usize,
    pub symbol_name: String,

    pub is_terminal: bool,
    pub is_nonterminal: bool,
    pub is_ignored: bool,
    pub is_error: bool,
    pub is_scanned: bool,

    pub description: String,
    pub location: Location,

    /// Regex clauses for scanned tokens: a `TokenRegexList` tree whose children each hold a
    /// guard (possibly `Null`) and a regex.
    pub regex_list: Option<SynTree>,
    pub is_regex_synthesized: bool,
    pub action: Option<SynTree>,
    pub precedence: i32,
    pub lexeme_needed: bool,
    pub error_message: String,

    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// One production of the grammar. An empty `rhs` is the epsilon rule.
pub struct Rule {
    pub rule_num: usize,
    pub lhs: SymbolId,
    pub rhs: Vec<SymbolId>,
    pub ast_former: Option<SynTree>,
    pub is_former_synthesized: bool,
    pub action: Option<SynTree>,
    pub location: Location,
    /// Operator precedence metadata from `::^` declarations, used for conflict resolution.
    pub op_prec: Option<(i32, Assoc)>,

    pub is_deleted: bool,
}

/// The assembled grammar: symbol and rule pools plus global options.
pub struct Grammar {
    pub max_lookaheads: i64,
    pub expected_conflicts: i64,
    pub error_recovery: bool,
    pub keep_whitespace: bool,
    pub case_sensitive: bool,

    symbols: Vec<Symbol>,
    symbol_map: BTreeMap<String, SymbolId>,
    rules: Vec<Rule>,

    pub eof_symbol: SymbolId,
    pub error_symbol: SymbolId,
    pub accept_symbol: SymbolId,
    pub epsilon_symbol: SymbolId,

    pub start_rule: Option<RuleId>,
    /// Operator precedence assigned to terminals by `::^` groups.
    pub operator_prec: BTreeMap<SymbolId, (i32, Assoc)>,
}

impl Grammar {
    pub fn new() -> Self {
        let mut grammar = Self {
            max_lookaheads: 2,
            expected_conflicts: 0,
            error_recovery: true,
            keep_whitespace: false,
            case_sensitive: true,
            symbols: Vec::new(),
            symbol_map: BTreeMap::new(),
            rules: Vec::new(),
            eof_symbol: SymbolId(0),
            error_symbol: SymbolId(0),
            accept_symbol: SymbolId(0),
            epsilon_symbol: SymbolId(0),
            start_rule: None,
            operator_prec: BTreeMap::new(),
        };

        grammar.epsilon_symbol = grammar.create_symbol("*epsilon*");
        grammar.error_symbol = grammar.create_symbol("*error*");
        grammar.eof_symbol = grammar.create_symbol("*eof*");
        grammar.accept_symbol = grammar.create_symbol("*accept*");

        {
            let error = grammar.symbol_mut(grammar.error_symbol);
            error.is_terminal = true;
        }
        {
            let eof = grammar.symbol_mut(grammar.eof_symbol);
            eof.is_terminal = true;
        }
        {
            let accept = grammar.symbol_mut(grammar.accept_symbol);
            accept.is_nonterminal = true;
        }

        grammar
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0]
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    pub fn rule_mut(&mut self, id: RuleId) -> &mut Rule {
        &mut self.rules[id.0]
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Live symbols in creation order.
    pub fn symbol_ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_deleted)
            .map(|(i, _)| SymbolId(i))
    }

    /// Live rules in declaration order.
    pub fn rule_ids(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_deleted)
            .map(|(i, _)| RuleId(i))
    }

    pub fn get_symbol(&self, name: &str) -> Option<SymbolId> {
        self.symbol_map.get(name).copied()
    }

    /// Create a fresh symbol. The name must not already be present.
    pub fn create_symbol(&mut self, name: &str) -> SymbolId {
        debug_assert!(!self.symbol_map.contains_key(name));

        let id = SymbolId(self.symbols.len());
        self.symbols.push(Symbol {
            symbol_num: id.0,
            symbol_name: name.to_string(),
            is_terminal: false,
            is_nonterminal: false,
            is_ignored: false,
            is_error: false,
            is_scanned: false,
            description: String::new(),
            location: NO_LOCATION,
            regex_list: None,
            is_regex_synthesized: false,
            action: None,
            precedence: 100,
            lexeme_needed: false,
            error_message: String::new(),
            is_deleted: false,
        });
        self.symbol_map.insert(name.to_string(), id);
        id
    }

    pub fn get_or_create_terminal(&mut self, name: &str, location: Location) -> SymbolId {
        match self.get_symbol(name) {
            Some(id) => id,
            None => {
                let id = self.create_symbol(name);
                let symbol = self.symbol_mut(id);
                symbol.is_terminal = true;
                symbol.location = location;
                id
            }
        }
    }

    pub fn get_or_create_nonterminal(&mut self, name: &str, location: Location) -> SymbolId {
        match self.get_symbol(name) {
            Some(id) => id,
            None => {
                let id = self.create_symbol(name);
                let symbol = self.symbol_mut(id);
                symbol.is_nonterminal = true;
                symbol.location = location;
                id
            }
        }
    }

    pub fn delete_symbol(&mut self, id: SymbolId) {
        let name = self.symbols[id.0].symbol_name.clone();
        self.symbols[id.0].is_deleted = true;
        self.symbol_map.remove(&name);
    }

    pub fn add_rule(&mut self, lhs: SymbolId, location: Location) -> RuleId {
        let id = RuleId(self.rules.len());
        self.rules.push(Rule {
            rule_num: id.0,
            lhs,
            rhs: Vec::new(),
            ast_former: None,
            is_former_synthesized: false,
            action: None,
            location,
            op_prec: None,
            is_deleted: false,
        });
        id
    }

    pub fn delete_rule(&mut self, id: RuleId) {
        self.rules[id.0].is_deleted = true;
    }

    /// The symbol the whole grammar derives, the lhs of the start rule.
    pub fn start_symbol(&self) -> Option<SymbolId> {
        self.start_rule.map(|r| self.rule(r).lhs)
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}
