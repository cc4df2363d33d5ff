//! # Error Types
//!
//! Error types and diagnostics for loading languages, generating tables and
//! parsing.
//!
//! ## Overview
//!
//! Only language loading can fail outright. Everything that goes wrong while
//! parsing degrades into the returned tree (ERROR and MISSING nodes) and is
//! reported as a [`ParseWarning`]:
//!
//! - [`LoadError`]: a table blob that cannot be used
//! - [`GrammarError`]: a grammar the table generator rejects
//! - [`ParseWarning`]: recoverable anomalies seen during a parse
//!
//! ## Diagnostics Support
//!
//! When the `diagnostics` feature is enabled, errors integrate with
//! [`miette`] for rich error reporting.

use crate::syntax::TextRange;
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// A compiled language blob that cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum LoadError {
    #[error("incompatible language version {found}, expected {min}..={max}")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(kelp::load::incompatible_version),
            help("regenerate the language with a matching version of the generator")
        )
    )]
    IncompatibleVersion { found: u32, min: u32, max: u32 },

    #[error("corrupt language blob: {reason}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::load::corrupt_blob)))]
    CorruptBlob { reason: String },

    #[error("invalid pattern for token `{symbol}`: {reason}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::load::invalid_pattern)))]
    InvalidTokenPattern { symbol: String, reason: String },

    #[error("unknown language `{id}`")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::load::unknown_language)))]
    UnknownLanguage { id: String },
}

impl LoadError {
    #[must_use]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptBlob {
            reason: reason.into(),
        }
    }
}

/// A grammar the table generator cannot compile.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum GrammarError {
    #[error("grammar has no rules")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::grammar::empty)))]
    EmptyGrammar,

    #[error("rule `{name}` is referenced but never defined")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::grammar::undefined_rule)))]
    UndefinedRule { name: String },

    #[error("token `{name}` can match the empty string")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::grammar::empty_token)))]
    EmptyToken { name: String },

    #[error("invalid pattern in `{name}`: {reason}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::grammar::invalid_pattern)))]
    InvalidPattern { name: String, reason: String },

    #[error("unresolved conflict in state {state} on `{symbol}`: {actions}")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(kelp::grammar::conflict),
            help("add precedence, or list the rules in a conflict set")
        )
    )]
    UnresolvedConflict {
        state: usize,
        symbol: String,
        actions: String,
    },

    #[error("grammar exceeds the table id space: {what}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::grammar::too_large)))]
    TooLarge { what: &'static str },

    #[error("failed to encode tables")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(kelp::grammar::encode)))]
    Encode(#[from] serde_json::Error),
}

/// Severity level for warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// What kind of anomaly a warning reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// No token matched; the bytes became an ERROR token.
    LexFailure,
    /// Input was skipped, inserted or wrapped to resynchronize.
    Recovered,
    /// The skip budget ran out and the rest of the input was sealed.
    RecoveryOverflow,
    /// A fork, depth or step ceiling forced a deterministic fallback.
    InternalLimitExceeded,
    /// The parse was cancelled before it finished.
    Cancelled,
}

/// A recoverable problem encountered while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub span: TextRange,
    pub kind: WarningKind,
    pub message: String,
    pub severity: Severity,
}

impl ParseWarning {
    #[must_use]
    pub fn new(span: TextRange, kind: WarningKind, message: impl Into<String>) -> Self {
        let severity = match kind {
            WarningKind::LexFailure | WarningKind::Recovered | WarningKind::RecoveryOverflow => {
                Severity::Error
            }
            WarningKind::InternalLimitExceeded => Severity::Warning,
            WarningKind::Cancelled => Severity::Info,
        };
        Self {
            span,
            kind,
            message: message.into(),
            severity,
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at {}: {}", self.kind, self.span, self.message)
    }
}
