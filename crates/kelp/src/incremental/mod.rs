//! # Incremental Parsing
//!
//! Support for re-parsing after an edit while reusing unaffected subtrees.
//!
//! ## Overview
//!
//! Re-parsing is a two step process:
//!
//! 1. [`Tree::edit`](crate::syntax::Tree::edit) applies an [`InputEdit`] to
//!    the previous tree. Every node whose text, or whose lookahead region,
//!    overlaps the edited range is resized and flagged as damaged. All
//!    other nodes are shared untouched.
//! 2. The parser is given the edited tree. Whenever it is in a position
//!    where an undamaged subtree of the old tree starts, and the parse state
//!    matches the one the subtree was built in, it pushes the whole subtree
//!    instead of re-lexing and re-reducing it.
//!
//! The result is structurally identical to parsing the new text from
//! scratch; reuse only saves work.
//!
//! ## Damage rule
//!
//! A node starting at `start` and ending at `end` that examined `lookahead`
//! bytes past its end is damaged by an edit of `[edit_start, old_end)` if
//!
//! ```text
//! start <= old_end && end + lookahead >= edit_start
//! ```

mod reuse;

pub(crate) use reuse::ReuseCursor;

use crate::syntax::{GreenNode, NodeFlags, Point, TextSize};
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Description of one text change, in bytes and rows/columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct InputEdit {
    pub start_byte: u32,
    pub old_end_byte: u32,
    pub new_end_byte: u32,
    pub start_point: Point,
    pub old_end_point: Point,
    pub new_end_point: Point,
}

impl InputEdit {
    /// Edit replacing `old[start..old_end]` with `replacement`.
    ///
    /// Offsets are clamped to `old`.
    #[must_use]
    pub fn replace(old: &[u8], start: usize, old_end: usize, replacement: &[u8]) -> Self {
        let start = start.min(old.len());
        let old_end = old_end.clamp(start, old.len());
        let start_point = Point::extent_of(&old[..start]);
        Self {
            start_byte: to_u32(start),
            old_end_byte: to_u32(old_end),
            new_end_byte: to_u32(start + replacement.len()),
            start_point,
            old_end_point: start_point.advance(Point::extent_of(&old[start..old_end])),
            new_end_point: start_point.advance(Point::extent_of(replacement)),
        }
    }

    /// Minimal single edit turning `old` into `new`: the differing middle
    /// after stripping the common prefix and suffix.
    #[must_use]
    pub fn from_texts(old: &[u8], new: &[u8]) -> Self {
        let prefix = old
            .iter()
            .zip(new)
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();
        Self::replace(old, prefix, old.len() - suffix, &new[prefix..new.len() - suffix])
    }

    /// Whether the edit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_byte == self.old_end_byte && self.start_byte == self.new_end_byte
    }

    /// Map an offset in the old text to the new text. Offsets inside the
    /// replaced range collapse onto the end of the replacement.
    #[must_use]
    pub fn map_offset(&self, offset: u32) -> u32 {
        if offset <= self.start_byte {
            offset
        } else if offset >= self.old_end_byte {
            offset - self.old_end_byte + self.new_end_byte
        } else {
            self.new_end_byte
        }
    }

    /// Map a position like [`InputEdit::map_offset`].
    #[must_use]
    pub fn map_point(&self, point: Point) -> Point {
        if point <= self.start_point {
            point
        } else if point >= self.old_end_point {
            self.new_end_point
                .advance(self.old_end_point.extent_to(point))
        } else {
            self.new_end_point
        }
    }

    fn damages(&self, start: u32, end: u32, lookahead: u32) -> bool {
        start <= self.old_end_byte && u64::from(end) + u64::from(lookahead) >= u64::from(self.start_byte)
    }
}

fn to_u32(offset: usize) -> u32 {
    u32::try_from(offset).unwrap_or(u32::MAX)
}

/// Apply `edit` to a green tree. Only the damaged spine is copied.
pub(crate) fn edit_green(root: &GreenNode, edit: &InputEdit) -> GreenNode {
    enum Task<'a> {
        Visit(&'a GreenNode, u32, Point),
        Rebuild(&'a GreenNode),
    }

    let mut boundaries = Boundaries {
        edit,
        doc_end: root.text_len().into(),
        doc_end_point: root.extent(),
        appended: false,
    };
    let mut done: Vec<GreenNode> = Vec::new();
    let mut pending = vec![Task::Visit(root, 0, Point::ZERO)];

    while let Some(task) = pending.pop() {
        match task {
            Task::Visit(node, start, position) => {
                let end = start + node.text_len().into();
                if !edit.damages(start, end, node.lookahead_bytes()) {
                    done.push(node.clone());
                } else if node.child_count() == 0 {
                    let (new_start, new_position) = boundaries.start(start, position);
                    let (new_end, new_end_position) =
                        boundaries.end(end, position.advance(node.extent()));
                    done.push(node.resized(
                        TextSize::from(new_end.saturating_sub(new_start)),
                        new_position.extent_to(new_end_position),
                        NodeFlags::DAMAGED,
                    ));
                } else {
                    pending.push(Task::Rebuild(node));
                    let mut offset = start;
                    let mut child_position = position;
                    let mut visits = Vec::with_capacity(node.child_count());
                    for child in node.children() {
                        visits.push(Task::Visit(child, offset, child_position));
                        offset += child.text_len().into();
                        child_position = child_position.advance(child.extent());
                    }
                    pending.extend(visits.into_iter().rev());
                }
            }
            Task::Rebuild(node) => {
                let children = done.split_off(done.len() - node.child_count());
                done.push(node.with_children(children, NodeFlags::DAMAGED));
            }
        }
    }

    done.pop().unwrap_or_else(|| root.clone())
}

/// Maps old leaf boundaries, visited in document order, to new ones. Text
/// appended at the very end of the document goes to the first leaf ending
/// there; leaves starting at the old end afterwards start at the new end.
struct Boundaries<'e> {
    edit: &'e InputEdit,
    doc_end: u32,
    doc_end_point: Point,
    appended: bool,
}

impl Boundaries<'_> {
    fn new_doc_end(&self) -> (u32, Point) {
        (
            (self.doc_end + self.edit.new_end_byte).saturating_sub(self.edit.old_end_byte),
            self.edit
                .new_end_point
                .advance(self.edit.old_end_point.extent_to(self.doc_end_point)),
        )
    }

    fn start(&self, offset: u32, point: Point) -> (u32, Point) {
        if self.appended && offset == self.doc_end {
            self.new_doc_end()
        } else {
            (self.edit.map_offset(offset), self.edit.map_point(point))
        }
    }

    fn end(&mut self, offset: u32, point: Point) -> (u32, Point) {
        if offset == self.doc_end {
            self.appended = true;
            self.new_doc_end()
        } else {
            (self.edit.map_offset(offset), self.edit.map_point(point))
        }
    }
}
