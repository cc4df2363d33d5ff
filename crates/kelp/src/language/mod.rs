//! # Languages
//!
//! The table store: immutable, grammar-specific parse tables loaded from a
//! compiled blob.
//!
//! ## Overview
//!
//! A [`Language`] is a cheap, clonable handle to one set of tables. It is
//! `Send + Sync` and never mutated after loading, so any number of parses on
//! any number of threads can share it without coordination.
//!
//! Loading either yields a fully validated handle or a typed
//! [`LoadError`]; there are no partially usable handles.
//!
//! ```rust,no_run
//! use kelp::language::Language;
//!
//! # fn load(blob: &[u8]) -> Result<(), kelp::error::LoadError> {
//! let language = Language::from_blob(blob)?;
//! println!("{} v{}", language.name(), language.version());
//! # Ok(())
//! # }
//! ```

pub mod blob;
mod registry;
mod table;

pub use blob::{LANGUAGE_VERSION, MIN_COMPATIBLE_LANGUAGE_VERSION};
pub use registry::LanguageRegistry;
pub use table::{
    Associativity, LanguageTables, LexModeTable, ParseAction, ParseStateRow, Production, StateId,
    Symbol, SymbolInfo, TokenDef, TokenPattern,
};

use crate::error::LoadError;
use crate::lexer::ExternalScanner;
use crate::lexer::dfa::TokenMatcher;
use std::fmt;
use std::sync::Arc;

/// Lex mode recorded on tokens lexed with every terminal enabled.
pub const LEX_MODE_ERROR: u16 = u16::MAX - 1;
/// Lex mode recorded on tokens lexed for several stacks at once.
pub const LEX_MODE_UNION: u16 = u16::MAX;

/// Handle to a loaded language.
#[derive(Clone)]
pub struct Language(Arc<LanguageInner>);

#[derive(Clone)]
struct LanguageInner {
    version: u32,
    tables: LanguageTables,
    matcher: TokenMatcher,
    /// Per lex mode, indexed by symbol.
    valid_sets: Vec<Box<[bool]>>,
    /// Terminals lexed when nothing valid matches: literals and named
    /// tokens. Anonymous patterns only make sense where they are declared.
    recovery_terminals: Box<[bool]>,
    extras: Box<[bool]>,
    keywords: Box<[bool]>,
    external: Box<[bool]>,
    scanner: Option<Arc<dyn ExternalScanner>>,
}

impl Language {
    /// Load a compiled language blob.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::IncompatibleVersion`] for a blob produced for
    /// another ABI, [`LoadError::CorruptBlob`] for anything malformed, and
    /// [`LoadError::InvalidTokenPattern`] when a token pattern cannot be
    /// compiled.
    pub fn from_blob(blob: &[u8]) -> Result<Self, LoadError> {
        let (version, tables) = blob::decode(blob)?;
        Self::build(version, tables)
    }

    /// Load tables that are already in memory.
    ///
    /// # Errors
    ///
    /// Fails like [`Language::from_blob`] on invalid tables.
    pub fn from_tables(tables: LanguageTables) -> Result<Self, LoadError> {
        tables.validate().map_err(LoadError::corrupt)?;
        Self::build(LANGUAGE_VERSION, tables)
    }

    fn build(version: u32, tables: LanguageTables) -> Result<Self, LoadError> {
        let symbol_count = tables.symbols.len();
        let matcher = TokenMatcher::new(&tables.tokens, |symbol| {
            tables
                .symbols
                .get(symbol.index())
                .map_or_else(|| symbol.to_string(), |info| info.name.to_string())
        })?;

        let set_of = |symbols: &mut dyn Iterator<Item = Symbol>| {
            let mut set = vec![false; symbol_count].into_boxed_slice();
            for symbol in symbols {
                if let Some(slot) = set.get_mut(symbol.index()) {
                    *slot = true;
                }
            }
            set
        };

        let valid_sets = tables
            .lex_modes
            .iter()
            .map(|mode| set_of(&mut mode.valid.iter().copied()))
            .collect();
        let recovery_terminals = set_of(
            &mut (2..symbol_count)
                .filter(|&index| {
                    let info = &tables.symbols[index];
                    info.terminal
                        && (info.named
                            || tables.tokens.iter().any(|token| {
                                token.symbol.index() == index && token.pattern.is_literal()
                            }))
                })
                .filter_map(|index| u16::try_from(index).ok().map(Symbol)),
        );
        let extras = set_of(&mut tables.extras.iter().copied());
        let external = set_of(&mut tables.external_tokens.iter().copied());

        let keywords = match tables.word_token {
            Some(word) => set_of(&mut tables.tokens.iter().filter_map(|token| match &token.pattern {
                TokenPattern::Literal(text) if matcher.matches_whole(text.as_bytes(), word) => {
                    Some(token.symbol)
                }
                _ => None,
            })),
            None => set_of(&mut std::iter::empty::<Symbol>()),
        };

        log::debug!(
            "loaded language `{}` v{version}: {} symbols, {} states",
            tables.name,
            symbol_count,
            tables.states.len()
        );

        Ok(Self(Arc::new(LanguageInner {
            version,
            tables,
            matcher,
            valid_sets,
            recovery_terminals,
            extras,
            keywords,
            external,
            scanner: None,
        })))
    }

    /// A new handle over the same tables with an external scanner attached.
    #[must_use]
    pub fn with_external_scanner(&self, scanner: impl ExternalScanner + 'static) -> Self {
        let mut inner = (*self.0).clone();
        inner.scanner = Some(Arc::new(scanner));
        Self(Arc::new(inner))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.tables.name
    }

    /// ABI version the blob was produced for.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.0.version
    }

    #[must_use]
    pub fn tables(&self) -> &LanguageTables {
        &self.0.tables
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.0.tables.symbols.len()
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.0.tables.states.len()
    }

    #[must_use]
    pub fn start_symbol(&self) -> Symbol {
        self.0.tables.start_symbol
    }

    #[must_use]
    pub fn symbol_info(&self, symbol: Symbol) -> Option<&SymbolInfo> {
        self.0.tables.symbols.get(symbol.index())
    }

    /// Kind name of a symbol, `"ERROR"` for error nodes.
    #[must_use]
    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        self.symbol_info(symbol).map_or("", |info| info.name.as_str())
    }

    /// Look a symbol up by name. Named and anonymous symbols may share a
    /// name (`identifier` vs `"identifier"`), so the caller picks.
    #[must_use]
    pub fn symbol_for_name(&self, name: &str, named: bool) -> Option<Symbol> {
        self.0
            .tables
            .symbols
            .iter()
            .position(|info| info.name == name && info.named == named)
            .and_then(|index| u16::try_from(index).ok())
            .map(Symbol)
    }

    #[must_use]
    pub fn is_named(&self, symbol: Symbol) -> bool {
        symbol == Symbol::ERROR || self.symbol_info(symbol).is_some_and(|info| info.named)
    }

    #[must_use]
    pub fn is_visible(&self, symbol: Symbol) -> bool {
        symbol == Symbol::ERROR || self.symbol_info(symbol).is_some_and(|info| info.visible)
    }

    #[must_use]
    pub fn is_terminal(&self, symbol: Symbol) -> bool {
        self.symbol_info(symbol).is_some_and(|info| info.terminal)
    }

    #[must_use]
    pub fn is_extra(&self, symbol: Symbol) -> bool {
        self.0.extras.get(symbol.index()).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_keyword(&self, symbol: Symbol) -> bool {
        self.0.keywords.get(symbol.index()).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_external(&self, symbol: Symbol) -> bool {
        self.0.external.get(symbol.index()).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn word_token(&self) -> Option<Symbol> {
        self.0.tables.word_token
    }

    #[must_use]
    pub fn production(&self, id: u16) -> Option<&Production> {
        self.0.tables.productions.get(usize::from(id))
    }

    /// Actions for `symbol` in `state`, most preferred first. Empty means a
    /// syntax error.
    #[must_use]
    pub fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        self.0
            .tables
            .states
            .get(usize::from(state))
            .map_or(&[] as &[ParseAction], |row| row.actions(symbol))
    }

    #[must_use]
    pub fn has_actions(&self, state: StateId, symbol: Symbol) -> bool {
        !self.actions(state, symbol).is_empty()
    }

    /// Every terminal with an action in `state`, in symbol order.
    #[must_use]
    pub fn state_actions(&self, state: StateId) -> &[(Symbol, Vec<ParseAction>)] {
        self.0
            .tables
            .states
            .get(usize::from(state))
            .map_or(&[] as &[(Symbol, Vec<ParseAction>)], |row| {
                row.actions.as_slice()
            })
    }

    #[must_use]
    pub fn goto(&self, state: StateId, symbol: Symbol) -> Option<StateId> {
        self.0
            .tables
            .states
            .get(usize::from(state))
            .and_then(|row| row.goto(symbol))
    }

    #[must_use]
    pub fn lex_mode(&self, state: StateId) -> u16 {
        self.0
            .tables
            .states
            .get(usize::from(state))
            .map_or(LEX_MODE_ERROR, |row| row.lex_mode)
    }

    /// Terminals valid under a lex mode, indexed by symbol. Unknown and
    /// sentinel modes enable the recovery terminals: every literal and every
    /// named token.
    #[must_use]
    pub fn valid_set(&self, lex_mode: u16) -> &[bool] {
        self.0
            .valid_sets
            .get(usize::from(lex_mode))
            .map_or(&self.0.recovery_terminals, |set| set)
    }

    pub(crate) fn recovery_terminals(&self) -> &[bool] {
        &self.0.recovery_terminals
    }

    pub(crate) fn matcher(&self) -> &TokenMatcher {
        &self.0.matcher
    }

    pub(crate) fn external_scanner(&self) -> Option<&dyn ExternalScanner> {
        self.0.scanner.as_deref()
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("symbols", &self.symbol_count())
            .field("states", &self.state_count())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.tables == other.0.tables
    }
}

impl Eq for Language {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_language_is_send_sync() {
        assert_send_sync::<Language>();
    }
}
