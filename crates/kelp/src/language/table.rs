//! Serialized parse tables.
//!
//! [`LanguageTables`] is the payload of a compiled language blob. Every
//! lookup the parser performs at runtime goes through these rows: sparse
//! action lists sorted by symbol, sparse goto lists, and the lex mode each
//! state lexes under.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parser state index.
pub type StateId = u16;

/// Grammar symbol id.
///
/// Ids are dense: `0` is the end-of-input marker, `1` is `ERROR`, then come
/// the terminals, then the nonterminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub u16);

impl Symbol {
    pub const END: Self = Self(0);
    pub const ERROR: Self = Self(1);

    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn id(self) -> u16 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: CompactString,
    pub terminal: bool,
    /// Named symbols come from grammar rules; anonymous ones from string
    /// literals and inline patterns.
    pub named: bool,
    /// Hidden symbols are flattened out of the child views.
    pub visible: bool,
    #[serde(default)]
    pub extra: bool,
}

/// Operator associativity used when resolving shift/reduce conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Associativity {
    Left,
    Right,
    #[default]
    None,
}

/// One grammar production, as seen by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    pub lhs: Symbol,
    pub len: u16,
    #[serde(default)]
    pub precedence: i32,
    #[serde(default)]
    pub associativity: Associativity,
    #[serde(default)]
    pub dynamic_precedence: i32,
}

/// Parser action stored in a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParseAction {
    Shift(StateId),
    Reduce(u16),
    Accept,
}

impl ParseAction {
    #[must_use]
    pub const fn shift(state: StateId) -> Self {
        Self::Shift(state)
    }

    #[must_use]
    pub const fn reduce(production: u16) -> Self {
        Self::Reduce(production)
    }

    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shift(_))
    }
}

/// A table row.
///
/// `actions` and `gotos` are sorted by symbol. A cell with more than one
/// action is a conflict cell explored by forking; its actions are ordered
/// most-preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStateRow {
    pub actions: Vec<(Symbol, Vec<ParseAction>)>,
    pub gotos: Vec<(Symbol, StateId)>,
    pub lex_mode: u16,
}

impl ParseStateRow {
    #[must_use]
    pub fn actions(&self, symbol: Symbol) -> &[ParseAction] {
        match self.actions.binary_search_by_key(&symbol, |(s, _)| *s) {
            Ok(index) => &self.actions[index].1,
            Err(_) => &[],
        }
    }

    #[must_use]
    pub fn goto(&self, symbol: Symbol) -> Option<StateId> {
        self.gotos
            .binary_search_by_key(&symbol, |(s, _)| *s)
            .ok()
            .map(|index| self.gotos[index].1)
    }
}

/// Set of terminals a state can accept; the lexer only matches these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LexModeTable {
    pub valid: Vec<Symbol>,
}

/// How a terminal is matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenPattern {
    Literal(String),
    Regex(String),
}

impl TokenPattern {
    /// Regex source for the pattern, with literals escaped.
    #[must_use]
    pub fn to_regex(&self) -> String {
        match self {
            Self::Literal(text) => regex_syntax::escape(text),
            Self::Regex(source) => source.clone(),
        }
    }

    #[must_use]
    pub const fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDef {
    pub symbol: Symbol,
    pub pattern: TokenPattern,
}

/// Complete compiled grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTables {
    pub name: String,
    pub symbols: Vec<SymbolInfo>,
    pub productions: Vec<Production>,
    pub states: Vec<ParseStateRow>,
    pub lex_modes: Vec<LexModeTable>,
    pub tokens: Vec<TokenDef>,
    #[serde(default)]
    pub extras: Vec<Symbol>,
    #[serde(default)]
    pub word_token: Option<Symbol>,
    #[serde(default)]
    pub external_tokens: Vec<Symbol>,
    pub start_symbol: Symbol,
}

impl LanguageTables {
    /// Check that every index stored in the tables is in bounds.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let symbol_count = self.symbols.len();
        let symbol_ok = |symbol: Symbol| symbol.index() < symbol_count;

        if symbol_count < 2 {
            return Err("symbol table lacks the end and ERROR entries".into());
        }
        if self.states.is_empty() {
            return Err("no parse states".into());
        }
        if symbol_count > usize::from(u16::MAX) || self.states.len() > usize::from(StateId::MAX) {
            return Err("table dimensions exceed the id space".into());
        }
        if !symbol_ok(self.start_symbol) || self.symbols[self.start_symbol.index()].terminal {
            return Err(format!("start symbol {} is not a nonterminal", self.start_symbol));
        }

        for (index, production) in self.productions.iter().enumerate() {
            if !symbol_ok(production.lhs) || self.symbols[production.lhs.index()].terminal {
                return Err(format!("production {index} has an invalid left-hand side"));
            }
        }

        for (index, row) in self.states.iter().enumerate() {
            if usize::from(row.lex_mode) >= self.lex_modes.len() {
                return Err(format!("state {index} refers to a missing lex mode"));
            }
            if !row.actions.windows(2).all(|w| w[0].0 < w[1].0)
                || !row.gotos.windows(2).all(|w| w[0].0 < w[1].0)
            {
                return Err(format!("state {index} rows are not sorted"));
            }
            for (symbol, actions) in &row.actions {
                if !symbol_ok(*symbol) || !self.symbols[symbol.index()].terminal {
                    return Err(format!("state {index} has an action on a non-terminal"));
                }
                for action in actions {
                    match *action {
                        ParseAction::Shift(target) if usize::from(target) >= self.states.len() => {
                            return Err(format!("state {index} shifts to missing state {target}"));
                        }
                        ParseAction::Reduce(production)
                            if usize::from(production) >= self.productions.len() =>
                        {
                            return Err(format!(
                                "state {index} reduces by missing production {production}"
                            ));
                        }
                        _ => {}
                    }
                }
            }
            for (symbol, target) in &row.gotos {
                if !symbol_ok(*symbol) || usize::from(*target) >= self.states.len() {
                    return Err(format!("state {index} has an invalid goto"));
                }
            }
        }

        for mode in &self.lex_modes {
            if !mode.valid.iter().all(|symbol| symbol_ok(*symbol)) {
                return Err("lex mode refers to a missing symbol".into());
            }
        }
        for token in &self.tokens {
            if !symbol_ok(token.symbol) || !self.symbols[token.symbol.index()].terminal {
                return Err(format!("token definition for {} is not a terminal", token.symbol));
            }
        }
        let terminal = |symbol: &Symbol| symbol_ok(*symbol) && self.symbols[symbol.index()].terminal;
        if !self.extras.iter().all(terminal)
            || !self.external_tokens.iter().all(terminal)
            || !self.word_token.iter().all(terminal)
        {
            return Err("extras, external or word token refer to non-terminals".into());
        }
        Ok(())
    }
}
