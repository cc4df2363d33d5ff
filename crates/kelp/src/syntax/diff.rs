//! # Tree Comparison
//!
//! Comparing two versions of a tree: the byte ranges whose structure
//! changed, and structural equality restricted to a range.
//!
//! Both walks skip subtrees shared by pointer, so comparing a tree with its
//! incremental successor only visits the rebuilt spine.

use crate::syntax::{GreenNode, NodeFlags, TextRange, TextSize};

/// Byte ranges (in `new` coordinates) where the structure of `new` differs
/// from `old`. `old` is expected to have been edited into the coordinates
/// of `new`. Ranges are sorted and disjoint.
pub(crate) fn changed_ranges(old: &GreenNode, new: &GreenNode) -> Vec<TextRange> {
    let mut ranges = Vec::new();
    let mut pending = vec![(old, TextSize::zero(), new, TextSize::zero())];

    while let Some((old, old_start, new, new_start)) = pending.pop() {
        if old_start == new_start && old.ptr_eq(new) {
            continue;
        }
        let comparable = old_start == new_start
            && old.symbol() == new.symbol()
            && old.text_len() == new.text_len()
            && old.child_count() == new.child_count()
            && shape_flags(old) == shape_flags(new);
        if !comparable {
            let old_range = TextRange::at(old_start, old.text_len());
            let new_range = TextRange::at(new_start, new.text_len());
            ranges.push(old_range.cover(new_range));
            continue;
        }

        let mut old_offset = old_start;
        let mut new_offset = new_start;
        for (old_child, new_child) in old.children().iter().zip(new.children()) {
            pending.push((old_child, old_offset, new_child, new_offset));
            old_offset += old_child.text_len();
            new_offset += new_child.text_len();
        }
    }

    merge(ranges)
}

fn shape_flags(node: &GreenNode) -> NodeFlags {
    node.flags()
        .intersection(NodeFlags::EXTRA | NodeFlags::MISSING | NodeFlags::HAS_ERROR)
}

fn merge(mut ranges: Vec<TextRange>) -> Vec<TextRange> {
    ranges.sort_by_key(|range| (range.start(), range.end()));
    let mut merged: Vec<TextRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start() <= last.end() => *last = last.cover(range),
            _ => merged.push(range),
        }
    }
    merged
}

#[derive(Debug, PartialEq, Eq)]
struct Visit {
    start: TextSize,
    len: TextSize,
    depth: usize,
    symbol: u16,
    flags: NodeFlags,
}

/// Pre-order list of the nodes overlapping `range`, with their depth.
fn overlapping(root: &GreenNode, range: TextRange) -> Vec<Visit> {
    let mut out = Vec::new();
    let mut pending = vec![(root, TextSize::zero(), 0usize)];
    while let Some((node, start, depth)) = pending.pop() {
        let node_range = TextRange::at(start, node.text_len());
        if !node_range.overlaps(range) {
            continue;
        }
        out.push(Visit {
            start,
            len: node.text_len(),
            depth,
            symbol: node.symbol().id(),
            flags: shape_flags(node),
        });
        let mut offset = start;
        let mut children = Vec::with_capacity(node.child_count());
        for child in node.children() {
            children.push((child, offset, depth + 1));
            offset += child.text_len();
        }
        pending.extend(children.into_iter().rev());
    }
    out
}

/// Whether every node overlapping `range` has an identical counterpart (same
/// symbol, position, length, shape flags and depth) in the other tree.
pub(crate) fn structurally_equal_in(left: &GreenNode, right: &GreenNode, range: TextRange) -> bool {
    left.ptr_eq(right) || overlapping(left, range) == overlapping(right, range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Symbol;
    use crate::syntax::{LeafSpec, NodeSpec, Point};

    fn leaf(symbol: u16, len: u32) -> GreenNode {
        GreenNode::leaf(LeafSpec {
            symbol: Symbol(symbol),
            text_len: TextSize::from(len),
            extent: Point::new(0, len),
            lookahead: 1,
            parse_state: 0,
            lex_mode: 0,
            flags: NodeFlags::NONE,
        })
    }

    fn node(symbol: u16, children: Vec<GreenNode>) -> GreenNode {
        GreenNode::node(
            NodeSpec {
                symbol: Symbol(symbol),
                production: 0,
                parse_state: 0,
                lookahead: 0,
                dynamic_precedence: 0,
                flags: NodeFlags::NONE,
            },
            children,
        )
    }

    #[test]
    fn test_identical_trees_have_no_changes() {
        let a = leaf(2, 3);
        let old = node(5, vec![a.clone(), leaf(3, 1)]);
        let new = node(5, vec![a, leaf(3, 1)]);
        assert!(changed_ranges(&old, &new).is_empty());
    }

    #[test]
    fn test_changed_child_is_reported() {
        let shared = leaf(2, 3);
        let old = node(5, vec![shared.clone(), leaf(3, 1)]);
        let new = node(5, vec![shared, leaf(4, 1)]);
        assert_eq!(
            changed_ranges(&old, &new),
            vec![TextRange::new(TextSize::from(3), TextSize::from(4))]
        );
    }

    #[test]
    fn test_length_change_covers_node() {
        let old = node(5, vec![leaf(2, 3)]);
        let new = node(5, vec![leaf(2, 5)]);
        assert_eq!(
            changed_ranges(&old, &new),
            vec![TextRange::new(TextSize::zero(), TextSize::from(5))]
        );
    }

    #[test]
    fn test_equal_in_range() {
        let old = node(5, vec![node(6, vec![leaf(2, 3)]), leaf(3, 2)]);
        let new = node(5, vec![node(6, vec![leaf(2, 3)]), leaf(4, 2)]);
        let head = TextRange::new(TextSize::from(1), TextSize::from(2));
        let tail = TextRange::new(TextSize::from(3), TextSize::from(5));
        assert!(structurally_equal_in(&old, &new, head));
        assert!(!structurally_equal_in(&old, &new, tail));
    }
}
