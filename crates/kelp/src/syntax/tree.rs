use crate::incremental::{self, InputEdit};
use crate::language::Language;
use crate::syntax::{GreenNode, Point, SyntaxNode, TextRange, TextSize, diff, pretty};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A parsed syntax tree.
///
/// Immutable and cheap to clone; clones share every node. Editing returns a
/// new tree that shares all nodes the edit could not have affected with this
/// one.
#[derive(Clone)]
pub struct Tree {
    root: GreenNode,
    language: Language,
    leaves: Arc<OnceLock<Vec<SyntaxNode>>>,
}

impl Tree {
    #[must_use]
    pub fn new(root: GreenNode, language: Language) -> Self {
        Self {
            root,
            language,
            leaves: Arc::new(OnceLock::new()),
        }
    }

    #[must_use]
    pub fn root_node(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.root.clone(), self.language.clone())
    }

    #[must_use]
    pub fn root_green(&self) -> &GreenNode {
        &self.root
    }

    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    #[must_use]
    pub fn text_len(&self) -> TextSize {
        self.root.text_len()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.root.has_error()
    }

    /// Every leaf in document order, hidden ones included. Their ranges
    /// partition the source text. Built once per tree on first use.
    #[must_use]
    pub fn leaves(&self) -> &[SyntaxNode] {
        self.leaves.get_or_init(|| collect_leaves(&self.root, &self.language))
    }

    /// Leaf with a non-zero length containing `offset`.
    #[must_use]
    pub fn leaf_at(&self, offset: TextSize) -> Option<SyntaxNode> {
        let leaves = self.leaves();
        let after = leaves.partition_point(|leaf| leaf.start_byte() <= offset);
        leaves[..after]
            .iter()
            .rev()
            .find(|leaf| leaf.byte_range().contains(offset))
            .cloned()
    }

    /// Smallest visible node containing `offset`.
    #[must_use]
    pub fn node_at(&self, offset: TextSize) -> Option<SyntaxNode> {
        let leaf = self.leaf_at(offset)?;
        if leaf.is_visible() {
            Some(leaf)
        } else {
            leaf.parent()
        }
    }

    /// Apply a text edit: every node the edit may have influenced is
    /// resized and marked damaged, everything else is shared with `self`.
    /// Feed the result to the parser as the previous tree.
    #[must_use]
    pub fn edit(&self, edit: &InputEdit) -> Self {
        let root = incremental::edit_green(&self.root, edit);
        Self::new(root, self.language.clone())
    }

    /// Byte ranges where the structure of `other` differs from `self`.
    /// `self` should be the edited previous version of `other`.
    #[must_use]
    pub fn changed_ranges(&self, other: &Self) -> Vec<TextRange> {
        diff::changed_ranges(&self.root, &other.root)
    }

    /// Whole-tree structural equality: symbols, lengths, shape flags and
    /// nesting. Parser bookkeeping is ignored.
    #[must_use]
    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.root.same_shape(&other.root)
    }

    /// Structural equality of the nodes overlapping `range`.
    #[must_use]
    pub fn structurally_equal_in(&self, other: &Self, range: TextRange) -> bool {
        diff::structurally_equal_in(&self.root, &other.root, range)
    }

    #[must_use]
    pub fn to_sexp(&self) -> String {
        self.root_node().to_sexp()
    }

    /// Indented dump of every visible node with its range and leaf text.
    #[must_use]
    pub fn debug_dump(&self, source: &[u8]) -> String {
        pretty::debug_dump(&self.root_node(), source)
    }
}

fn collect_leaves(root: &GreenNode, language: &Language) -> Vec<SyntaxNode> {
    let root_node = SyntaxNode::new_root(root.clone(), language.clone());
    if root.is_leaf() {
        return vec![root_node];
    }

    let mut leaves = Vec::new();
    // (green, offset, position, nearest visible ancestor)
    let mut pending: Vec<(&GreenNode, TextSize, Point, SyntaxNode)> = Vec::new();
    push_children(&mut pending, root, TextSize::zero(), Point::ZERO, &root_node);

    while let Some((green, offset, position, parent)) = pending.pop() {
        if green.is_leaf() {
            leaves.push(SyntaxNode::new(
                green.clone(),
                Some(parent),
                offset,
                position,
                language.clone(),
            ));
        } else if language.is_visible(green.symbol()) {
            let node = SyntaxNode::new(green.clone(), Some(parent), offset, position, language.clone());
            push_children(&mut pending, green, offset, position, &node);
        } else {
            push_children(&mut pending, green, offset, position, &parent);
        }
    }
    leaves
}

fn push_children<'g>(
    pending: &mut Vec<(&'g GreenNode, TextSize, Point, SyntaxNode)>,
    green: &'g GreenNode,
    offset: TextSize,
    position: Point,
    parent: &SyntaxNode,
) {
    let start = pending.len();
    let mut offset = offset;
    let mut position = position;
    for child in green.children() {
        pending.push((child, offset, position, parent.clone()));
        offset += child.text_len();
        position = position.advance(child.extent());
    }
    pending[start..].reverse();
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("language", &self.language.name())
            .field("root", &self.root_node())
            .finish()
    }
}
