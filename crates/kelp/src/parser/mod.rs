//! # GLR Parser
//!
//! Table-driven generalized LR parsing with incremental reuse and error
//! recovery.
//!
//! ## Overview
//!
//! The parser reads tokens from the [`Lexer`](crate::lexer::Lexer) one at a
//! time and runs the LR automaton from the language's tables. When a table
//! cell holds more than one action the stack forks; forks that reach the
//! same state sequence are merged again, and the width and lifetime of a
//! fork are bounded by [`ParserConfig`].
//!
//! Parsing never fails. Unexpected input is repaired by inserting a
//! zero-width `MISSING` token, wrapping a damaged region in an `ERROR` node
//! or skipping the offending token, and each repair is reported as a
//! [`ParseWarning`](crate::error::ParseWarning).
//!
//! ## Example
//!
//! ```rust,ignore
//! use kelp::parser::Parser;
//!
//! let parser = Parser::new(language);
//! let first = parser.parse(b"def x = y", None);
//! let edit = kelp::incremental::InputEdit::from_texts(b"def x = y", b"def x = yz");
//! let second = parser.parse(b"def x = yz", Some(&first.tree.edit(&edit)));
//! assert!(second.tree.structurally_equal(&parser.parse(b"def x = yz", None).tree));
//! ```

mod disambiguation;
mod driver;
mod recovery;
mod stack;

use crate::error::ParseWarning;
use crate::language::Language;
use crate::syntax::Tree;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Parser limits. Every limit degrades gracefully: hitting one never makes
/// a parse fail, it only makes the result less precise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum number of live stacks.
    pub max_stacks: usize,
    /// Maximum number of tokens a fork may stay unresolved.
    pub max_ambiguity_depth: usize,
    /// Consecutive tokens recovery may skip before the rest of the input is
    /// sealed under one ERROR node.
    pub max_skip_tokens: usize,
    /// Non-consuming repairs allowed at one input position.
    pub max_recovery_attempts: usize,
    /// Reductions allowed while processing one lookahead token.
    pub max_reductions_per_token: usize,
    /// Stack entries the pop-to-ancestor repair may discard.
    pub max_recovery_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_stacks: 16,
            max_ambiguity_depth: 32,
            max_skip_tokens: 64,
            max_recovery_attempts: 4,
            max_reductions_per_token: 4096,
            max_recovery_depth: 8,
        }
    }
}

impl ParserConfig {
    #[must_use]
    pub const fn with_max_stacks(mut self, max_stacks: usize) -> Self {
        self.max_stacks = max_stacks;
        self
    }

    #[must_use]
    pub const fn with_max_ambiguity_depth(mut self, depth: usize) -> Self {
        self.max_ambiguity_depth = depth;
        self
    }

    #[must_use]
    pub const fn with_max_skip_tokens(mut self, tokens: usize) -> Self {
        self.max_skip_tokens = tokens;
        self
    }

    #[must_use]
    pub const fn with_max_recovery_attempts(mut self, attempts: usize) -> Self {
        self.max_recovery_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_max_reductions_per_token(mut self, reductions: usize) -> Self {
        self.max_reductions_per_token = reductions;
        self
    }

    #[must_use]
    pub const fn with_max_recovery_depth(mut self, depth: usize) -> Self {
        self.max_recovery_depth = depth;
        self
    }
}

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    cancellation: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl ParseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop as soon as `flag` is set. Checked between tokens.
    #[must_use]
    pub fn with_cancellation_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Parse statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseMetrics {
    pub tokens_consumed: usize,
    pub nodes_created: usize,
    /// Subtrees taken over from the previous tree, leaves included.
    pub nodes_reused: usize,
    pub errors_recovered: usize,
    pub max_stack_count: usize,
    pub parse_time: Duration,
}

/// Outcome of one parse. There is always a tree.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub tree: Tree,
    pub warnings: Vec<ParseWarning>,
    pub metrics: ParseMetrics,
    /// The parse was stopped early; the unparsed tail is one ERROR leaf.
    pub cancelled: bool,
}

impl ParseResult {
    /// Whether the tree contains ERROR or MISSING nodes.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.tree.has_error()
    }
}

/// A parser for one language. Cheap to clone and `Send + Sync`; every call
/// to [`Parser::parse`] is independent.
#[derive(Debug, Clone)]
pub struct Parser {
    language: Language,
    config: ParserConfig,
}

impl Parser {
    #[must_use]
    pub fn new(language: Language) -> Self {
        Self::with_config(language, ParserConfig::default())
    }

    #[must_use]
    pub fn with_config(language: Language, config: ParserConfig) -> Self {
        Self { language, config }
    }

    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse `text`. If `old_tree` is given it must be the previous tree
    /// with every edit since applied through [`Tree::edit`]; its undamaged
    /// subtrees are reused.
    #[must_use]
    pub fn parse(&self, text: &[u8], old_tree: Option<&Tree>) -> ParseResult {
        self.parse_with_options(text, old_tree, &ParseOptions::default())
    }

    #[must_use]
    pub fn parse_with_options(
        &self,
        text: &[u8],
        old_tree: Option<&Tree>,
        options: &ParseOptions,
    ) -> ParseResult {
        let started = Instant::now();
        let old_root = old_tree.and_then(|tree| {
            if tree.language() == &self.language {
                Some(tree.root_green().clone())
            } else {
                log::warn!(
                    "ignoring previous tree for `{}` while parsing `{}`",
                    tree.language().name(),
                    self.language.name()
                );
                None
            }
        });

        let outcome = driver::Run::new(&self.language, &self.config, options, text, old_root).run();
        let mut metrics = outcome.metrics;
        metrics.parse_time = started.elapsed();
        log::debug!(
            "parsed {} bytes of `{}`: {} tokens, {} nodes created, {} reused, {} recoveries",
            text.len(),
            self.language.name(),
            metrics.tokens_consumed,
            metrics.nodes_created,
            metrics.nodes_reused,
            metrics.errors_recovered
        );

        ParseResult {
            tree: Tree::new(outcome.root, self.language.clone()),
            warnings: outcome.warnings,
            metrics,
            cancelled: outcome.cancelled,
        }
    }

    /// Parse independent texts in parallel.
    #[cfg(feature = "parallel")]
    #[must_use]
    pub fn parse_batch(&self, texts: &[&[u8]]) -> Vec<ParseResult> {
        use rayon::prelude::*;

        texts.par_iter().map(|text| self.parse(text, None)).collect()
    }
}

/// Parse `text` with default settings.
#[must_use]
pub fn parse_text(language: &Language, text: &str, old_tree: Option<&Tree>) -> ParseResult {
    Parser::new(language.clone()).parse(text.as_bytes(), old_tree)
}
