//! # Table Generator
//!
//! Compiles a grammar written with [`Expr`] combinators into
//! [`LanguageTables`].
//!
//! ## Overview
//!
//! The generator runs offline: grammar crates call it once (usually behind
//! a `OnceLock`) and ship or cache the resulting blob. It is not needed at
//! parse time.
//!
//! 1. Rules are lowered to flat productions. Repeats become hidden
//!    left-recursive helper rules; optional parts and choices expand into
//!    alternative productions.
//! 2. An LALR(1) automaton is built over the productions.
//! 3. Conflicts are resolved with precedence and associativity where the
//!    grammar gives them. Whatever remains becomes a multi-action cell the
//!    GLR parser explores at runtime.
//!
//! ## Rules and tokens
//!
//! A rule whose body is a single [`Expr::String`], [`Expr::Pattern`] or
//! [`Expr::Token`] becomes a named token; every other rule is a
//! nonterminal. Strings and patterns used inside a nonterminal become
//! anonymous tokens. Rule names starting with `_` are hidden from the
//! child views of the syntax tree.
//!
//! ## Example
//!
//! ```rust
//! use kelp::generate::{GrammarBuilder, choice, lit, pat, prec_left, seq, sym};
//!
//! let tables = GrammarBuilder::new("calc")
//!     .rule("expression", choice([
//!         sym("number"),
//!         prec_left(1, seq([sym("expression"), lit("+"), sym("expression")])),
//!     ]))
//!     .rule("number", pat("[0-9]+"))
//!     .extra(pat(r"\s+"))
//!     .build()
//!     .unwrap();
//! let language = kelp::language::Language::from_tables(tables).unwrap();
//! assert_eq!(language.name(), "calc");
//! ```

mod lalr;
mod lower;

use crate::error::GrammarError;
use crate::language::{LANGUAGE_VERSION, LanguageTables, blob};

/// Grammar expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Seq(Vec<Expr>),
    Choice(Vec<Expr>),
    /// Zero or more.
    Repeat(Box<Expr>),
    /// One or more.
    Repeat1(Box<Expr>),
    Optional(Box<Expr>),
    /// Matches nothing.
    Blank,
    /// Reference to another rule.
    Symbol(String),
    /// Literal token.
    String(String),
    /// Regex token.
    Pattern(String),
    Prec(i32, Box<Expr>),
    PrecLeft(i32, Box<Expr>),
    PrecRight(i32, Box<Expr>),
    /// Precedence applied at runtime between competing parses.
    PrecDynamic(i32, Box<Expr>),
    /// Collapse lexical content into a single token.
    Token(Box<Expr>),
}

#[must_use]
pub fn seq(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Seq(items.into_iter().collect())
}

#[must_use]
pub fn choice(items: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Choice(items.into_iter().collect())
}

#[must_use]
pub fn repeat(item: Expr) -> Expr {
    Expr::Repeat(Box::new(item))
}

#[must_use]
pub fn repeat1(item: Expr) -> Expr {
    Expr::Repeat1(Box::new(item))
}

#[must_use]
pub fn optional(item: Expr) -> Expr {
    Expr::Optional(Box::new(item))
}

#[must_use]
pub fn sym(name: &str) -> Expr {
    Expr::Symbol(name.to_owned())
}

#[must_use]
pub fn lit(text: &str) -> Expr {
    Expr::String(text.to_owned())
}

#[must_use]
pub fn pat(regex: &str) -> Expr {
    Expr::Pattern(regex.to_owned())
}

#[must_use]
pub fn blank() -> Expr {
    Expr::Blank
}

#[must_use]
pub fn token(item: Expr) -> Expr {
    Expr::Token(Box::new(item))
}

#[must_use]
pub fn prec(level: i32, item: Expr) -> Expr {
    Expr::Prec(level, Box::new(item))
}

#[must_use]
pub fn prec_left(level: i32, item: Expr) -> Expr {
    Expr::PrecLeft(level, Box::new(item))
}

#[must_use]
pub fn prec_right(level: i32, item: Expr) -> Expr {
    Expr::PrecRight(level, Box::new(item))
}

#[must_use]
pub fn prec_dynamic(level: i32, item: Expr) -> Expr {
    Expr::PrecDynamic(level, Box::new(item))
}

/// Collects a grammar and compiles it.
///
/// The first rule is the start rule.
#[derive(Debug, Clone, Default)]
pub struct GrammarBuilder {
    name: String,
    rules: Vec<(String, Expr)>,
    extras: Vec<Expr>,
    word: Option<String>,
    conflicts: Vec<Vec<String>>,
    externals: Vec<String>,
    strict_conflicts: bool,
}

impl GrammarBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rule(mut self, name: impl Into<String>, body: Expr) -> Self {
        self.rules.push((name.into(), body));
        self
    }

    /// A token that may appear anywhere between other tokens (whitespace,
    /// comments). Either a token rule reference or a string or pattern.
    #[must_use]
    pub fn extra(mut self, item: Expr) -> Self {
        self.extras.push(item);
        self
    }

    /// The identifier-like token used for keyword extraction.
    #[must_use]
    pub fn word(mut self, name: impl Into<String>) -> Self {
        self.word = Some(name.into());
        self
    }

    /// Rules expected to conflict with each other. Their conflicts are
    /// kept for the GLR parser without complaint.
    #[must_use]
    pub fn conflict<S: Into<String>>(mut self, rules: impl IntoIterator<Item = S>) -> Self {
        self.conflicts
            .push(rules.into_iter().map(Into::into).collect());
        self
    }

    /// A token produced by the language's external scanner.
    #[must_use]
    pub fn external(mut self, name: impl Into<String>) -> Self {
        self.externals.push(name.into());
        self
    }

    /// Fail on conflicts that precedence cannot resolve and that no
    /// [`conflict`](Self::conflict) set covers.
    #[must_use]
    pub const fn strict_conflicts(mut self, strict: bool) -> Self {
        self.strict_conflicts = strict;
        self
    }

    /// Compile the grammar.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] for an empty grammar, references to
    /// undefined rules, invalid or empty-matching tokens, grammars too big
    /// for the table format, and undeclared conflicts when
    /// [`strict_conflicts`](Self::strict_conflicts) is on.
    pub fn build(&self) -> Result<LanguageTables, GrammarError> {
        let grammar = lower::lower(self)?;
        let tables = lalr::build_tables(&grammar, self.strict_conflicts)?;
        log::debug!(
            "generated `{}`: {} symbols, {} productions, {} states, {} lex modes",
            tables.name,
            tables.symbols.len(),
            tables.productions.len(),
            tables.states.len(),
            tables.lex_modes.len()
        );
        Ok(tables)
    }

    /// Compile the grammar straight into a blob.
    ///
    /// # Errors
    ///
    /// Fails like [`build`](Self::build), or with
    /// [`GrammarError::Encode`].
    pub fn build_blob(&self) -> Result<Vec<u8>, GrammarError> {
        Ok(self.build()?.to_blob()?)
    }
}

impl LanguageTables {
    /// Serialize into a blob for [`Language::from_blob`](crate::language::Language::from_blob).
    ///
    /// # Errors
    ///
    /// Returns an error if the tables cannot be encoded.
    pub fn to_blob(&self) -> Result<Vec<u8>, serde_json::Error> {
        blob::encode(self, LANGUAGE_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{Language, ParseAction, Symbol};

    fn arithmetic() -> GrammarBuilder {
        GrammarBuilder::new("arith")
            .rule(
                "expression",
                choice([
                    sym("number"),
                    prec_left(1, seq([sym("expression"), lit("+"), sym("expression")])),
                    prec_left(2, seq([sym("expression"), lit("*"), sym("expression")])),
                ]),
            )
            .rule("number", pat("[0-9]+"))
            .extra(pat(r"\s+"))
    }

    #[test]
    fn test_symbol_layout() {
        let tables = arithmetic().build().unwrap();
        assert_eq!(tables.symbols[0].name, "end");
        assert_eq!(tables.symbols[1].name, "ERROR");
        let first_nonterminal = tables
            .symbols
            .iter()
            .position(|info| !info.terminal)
            .unwrap();
        assert!(tables.symbols[first_nonterminal..]
            .iter()
            .all(|info| !info.terminal));
        assert_eq!(tables.symbols[tables.start_symbol.index()].name, "expression");
    }

    #[test]
    fn test_precedence_resolves_conflicts() {
        let tables = arithmetic().build().unwrap();
        let conflicted = tables
            .states
            .iter()
            .flat_map(|row| &row.actions)
            .filter(|(_, actions)| actions.len() > 1)
            .count();
        assert_eq!(conflicted, 0);
    }

    #[test]
    fn test_ambiguity_kept_for_glr() {
        let tables = GrammarBuilder::new("ambiguous")
            .rule(
                "expression",
                choice([
                    sym("number"),
                    seq([sym("expression"), lit("+"), sym("expression")]),
                ]),
            )
            .rule("number", pat("[0-9]+"))
            .build()
            .unwrap();
        let cell = tables
            .states
            .iter()
            .flat_map(|row| &row.actions)
            .find(|(_, actions)| actions.len() > 1)
            .map(|(_, actions)| actions.clone())
            .unwrap();
        assert!(matches!(cell[0], ParseAction::Shift(_)));
        assert!(matches!(cell[1], ParseAction::Reduce(_)));
    }

    #[test]
    fn test_strict_conflicts() {
        let ambiguous = GrammarBuilder::new("ambiguous")
            .rule(
                "expression",
                choice([
                    sym("number"),
                    seq([sym("expression"), lit("+"), sym("expression")]),
                ]),
            )
            .rule("number", pat("[0-9]+"))
            .strict_conflicts(true);
        assert!(matches!(
            ambiguous.build(),
            Err(GrammarError::UnresolvedConflict { .. })
        ));
        assert!(ambiguous.conflict(["expression"]).build().is_ok());
    }

    #[test]
    fn test_undefined_rule() {
        let error = GrammarBuilder::new("broken")
            .rule("start", seq([lit("a"), sym("missing")]))
            .build()
            .unwrap_err();
        assert!(matches!(error, GrammarError::UndefinedRule { name } if name == "missing"));
    }

    #[test]
    fn test_empty_grammar() {
        assert!(matches!(
            GrammarBuilder::new("nothing").build(),
            Err(GrammarError::EmptyGrammar)
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        let error = GrammarBuilder::new("empty")
            .rule("start", seq([lit("a"), pat("b*")]))
            .build()
            .unwrap_err();
        assert!(matches!(error, GrammarError::EmptyToken { .. }));
    }

    #[test]
    fn test_keywords_follow_word_token() {
        let tables = GrammarBuilder::new("keywords")
            .rule("start", repeat(choice([sym("identifier"), lit("if")])))
            .rule("identifier", pat("[a-z]+"))
            .word("identifier")
            .extra(pat(r"\s+"))
            .build()
            .unwrap();
        let language = Language::from_tables(tables).unwrap();
        let keyword = language.symbol_for_name("if", false).unwrap();
        assert!(language.is_keyword(keyword));
        assert_eq!(language.word_token(), language.symbol_for_name("identifier", true));
        assert!(!language.is_keyword(Symbol::ERROR));
    }

    #[test]
    fn test_blob_roundtrip_loads() {
        let blob = arithmetic().build_blob().unwrap();
        let language = Language::from_blob(&blob).unwrap();
        assert_eq!(language.version(), LANGUAGE_VERSION);
        assert_eq!(language.tables(), &arithmetic().build().unwrap());
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(arithmetic().build().unwrap(), arithmetic().build().unwrap());
    }
}
