//! # Kelp
//!
//! A table-driven, incremental GLR parsing engine producing concrete syntax
//! trees.
//!
//! ## Overview
//!
//! Kelp parses text with grammar-specific tables generated ahead of time.
//! It is built for editors and other tools that re-parse the same document
//! after every keystroke:
//!
//! - **Table-driven lexing**: the lexer only considers tokens the parser
//!   can accept in its current state
//! - **GLR parsing**: ambiguous grammars are explored with parallel stacks
//!   that fork and merge
//! - **Incremental re-parsing**: unchanged subtrees of the previous tree are
//!   reused after an edit
//! - **Error recovery**: every input produces a tree; errors become `ERROR`
//!   and `MISSING` nodes
//! - **Persistent trees**: tree versions share unchanged nodes and can be
//!   read from any thread
//!
//! ## Quick Start
//!
//! ```rust
//! use kelp::generate::{GrammarBuilder, choice, lit, pat, prec_left, repeat, seq, sym};
//! use kelp::incremental::InputEdit;
//! use kelp::language::Language;
//! use kelp::parser::Parser;
//!
//! let tables = GrammarBuilder::new("sums")
//!     .rule("program", repeat(sym("sum")))
//!     .rule(
//!         "sum",
//!         choice([
//!             sym("number"),
//!             prec_left(1, seq([sym("sum"), lit("+"), sym("sum")])),
//!         ]),
//!     )
//!     .rule("number", pat("[0-9]+"))
//!     .extra(pat(r"\s+"))
//!     .build()
//!     .unwrap();
//! let language = Language::from_tables(tables).unwrap();
//! let parser = Parser::new(language);
//!
//! let first = parser.parse(b"1 + 2", None);
//! assert!(!first.has_errors());
//! assert_eq!(
//!     first.tree.to_sexp(),
//!     "(program (sum (sum (number)) (sum (number))))"
//! );
//!
//! let edit = InputEdit::from_texts(b"1 + 2", b"1 + 23");
//! let edited = first.tree.edit(&edit);
//! let second = parser.parse(b"1 + 23", Some(&edited));
//! assert!(second.tree.structurally_equal(&parser.parse(b"1 + 23", None).tree));
//! ```
//!
//! ## Modules
//!
//! - [`language`]: loading and querying compiled tables
//! - [`lexer`]: context-sensitive tokenization
//! - [`parser`]: the GLR driver, limits and parse results
//! - [`syntax`]: green nodes, syntax nodes and trees
//! - [`incremental`]: edits and subtree reuse
//! - [`generate`]: building tables from a grammar
//! - [`error`]: error and warning types

pub mod error;
pub mod generate;
pub mod incremental;
pub mod language;
pub mod lexer;
pub mod parser;
pub mod syntax;

pub use error::{GrammarError, LoadError, ParseWarning, Severity, WarningKind};
pub use incremental::InputEdit;
pub use language::{Language, LanguageRegistry, Symbol};
pub use parser::{ParseMetrics, ParseOptions, ParseResult, Parser, ParserConfig, parse_text};
pub use syntax::{Point, SyntaxNode, TextRange, TextSize, Tree};
