//! GLR parser stacks.
//!
//! Each stack is a persistent linked list: forking copies one pointer and
//! the forks share every entry below the fork point. Popping never mutates
//! shared entries.

use crate::language::StateId;
use crate::syntax::{GreenNode, Point, TextSize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Absolute source position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Position {
    pub(crate) offset: TextSize,
    pub(crate) point: Point,
}

impl Position {
    pub(crate) fn advanced(self, node: &GreenNode) -> Self {
        Self {
            offset: self.offset + node.text_len(),
            point: self.point.advance(node.extent()),
        }
    }
}

/// One stack entry: a node and the state reached after pushing it.
#[derive(Debug, Clone)]
pub(crate) struct StackEntry {
    pub(crate) state: StateId,
    pub(crate) node: GreenNode,
    /// Position just past the node.
    pub(crate) end: Position,
    /// Pushed without a state change (extras, error nodes).
    pub(crate) extra: bool,
}

struct Link {
    entry: StackEntry,
    prev: Option<Arc<Link>>,
    depth: usize,
}

impl Drop for Link {
    fn drop(&mut self) {
        // Unlink iteratively so long uniquely owned stacks don't recurse.
        let mut prev = self.prev.take();
        while let Some(link) = prev {
            match Arc::try_unwrap(link) {
                Ok(mut link) => prev = link.prev.take(),
                Err(_) => break,
            }
        }
    }
}

/// One GLR stack plus the bookkeeping used to rank it.
#[derive(Clone, Default)]
pub(crate) struct GlrStack {
    head: Option<Arc<Link>>,
    pub(crate) error_cost: u32,
    pub(crate) dynamic_precedence: i32,
    /// Sum of the action indices taken in conflict cells; lower means the
    /// grammar's preferred reading.
    pub(crate) preference: u32,
    /// Forked during the current step.
    pub(crate) forked: bool,
}

impl GlrStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// State on top of the stack. The bottom is state 0.
    pub(crate) fn state(&self) -> StateId {
        self.head.as_ref().map_or(0, |link| link.entry.state)
    }

    pub(crate) fn position(&self) -> Position {
        self.head
            .as_ref()
            .map_or_else(Position::default, |link| link.entry.end)
    }

    pub(crate) fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |link| link.depth)
    }

    pub(crate) fn top(&self) -> Option<&StackEntry> {
        self.head.as_ref().map(|link| &link.entry)
    }

    pub(crate) fn push(&mut self, entry: StackEntry) {
        let prev = self.head.take();
        let depth = prev.as_ref().map_or(1, |link| link.depth + 1);
        self.head = Some(Arc::new(Link { entry, prev, depth }));
    }

    pub(crate) fn pop(&mut self) -> Option<StackEntry> {
        let link = self.head.take()?;
        self.head.clone_from(&link.prev);
        Some(link.entry.clone())
    }

    /// Entries from the top down.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &StackEntry> {
        std::iter::successors(self.head.as_deref(), |link| link.prev.as_deref())
            .map(|link| &link.entry)
    }

    /// Nodes from the bottom up.
    pub(crate) fn nodes(&self) -> Vec<GreenNode> {
        let mut nodes: Vec<GreenNode> = self.iter().map(|entry| entry.node.clone()).collect();
        nodes.reverse();
        nodes
    }

    /// Whether both stacks went through the same states with the same
    /// extra markers. Shared links are compared by pointer.
    pub(crate) fn same_states(&self, other: &Self) -> bool {
        if self.depth() != other.depth() {
            return false;
        }
        let mut left = self.head.as_ref();
        let mut right = other.head.as_ref();
        loop {
            match (left, right) {
                (None, None) => return true,
                (Some(a), Some(b)) => {
                    if Arc::ptr_eq(a, b) {
                        return true;
                    }
                    if a.entry.state != b.entry.state || a.entry.extra != b.entry.extra {
                        return false;
                    }
                    left = a.prev.as_ref();
                    right = b.prev.as_ref();
                }
                _ => return false,
            }
        }
    }

    /// Ranking used whenever stacks compete: fewer errors, then higher
    /// dynamic precedence, then the preferred conflict resolution.
    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        self.error_cost
            .cmp(&other.error_cost)
            .then(other.dynamic_precedence.cmp(&self.dynamic_precedence))
            .then(self.preference.cmp(&other.preference))
    }
}

impl std::fmt::Debug for GlrStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlrStack")
            .field("state", &self.state())
            .field("depth", &self.depth())
            .field("error_cost", &self.error_cost)
            .field("dynamic_precedence", &self.dynamic_precedence)
            .field("preference", &self.preference)
            .finish()
    }
}
