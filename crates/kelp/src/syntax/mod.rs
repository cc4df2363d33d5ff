//! # Syntax Trees
//!
//! Immutable, persistent concrete syntax trees.
//!
//! ## Overview
//!
//! Trees come in two layers:
//!
//! - **Green nodes** ([`GreenNode`]) are immutable, reference counted and
//!   position independent. They are what the parser builds and what tree
//!   versions share after an edit.
//! - **Syntax nodes** ([`SyntaxNode`]) are lightweight cursors created on
//!   demand. They add an absolute position and a link to the nearest visible
//!   ancestor.
//!
//! A [`Tree`] owns a root green node plus the language that produced it.
//! Trees are `Send + Sync` and cheap to clone.
//!
//! ## Visibility
//!
//! Hidden nonterminals (rule names starting with `_`) are flattened away
//! when walking children, and hidden terminals (anonymous patterns such as
//! the whitespace extra) are skipped. [`Tree::leaves`] still exposes every
//! leaf, so the leaves always partition the source text.

mod diff;
pub mod green;
mod pretty;
mod red;
mod text;
mod tree;

pub use green::{GreenNode, LeafSpec, NO_PRODUCTION, NodeFlags, NodeSpec};
pub use red::SyntaxNode;
pub use text::{Point, TextRange, TextSize};
pub use tree::Tree;
