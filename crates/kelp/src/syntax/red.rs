use crate::language::{Language, Symbol};
use crate::syntax::{GreenNode, Point, TextRange, TextSize};
use std::fmt;
use std::sync::Arc;

/// Positioned view of a green node.
///
/// Syntax nodes are created on demand while walking a tree and are cheap to
/// clone. Each one holds its nearest visible ancestor, so walking up never
/// needs the tree.
#[derive(Clone)]
pub struct SyntaxNode(Arc<NodeData>);

struct NodeData {
    green: GreenNode,
    parent: Option<SyntaxNode>,
    offset: TextSize,
    position: Point,
    language: Language,
}

impl SyntaxNode {
    #[must_use]
    pub fn new_root(green: GreenNode, language: Language) -> Self {
        Self::new(green, None, TextSize::zero(), Point::ZERO, language)
    }

    pub(crate) fn new(
        green: GreenNode,
        parent: Option<Self>,
        offset: TextSize,
        position: Point,
        language: Language,
    ) -> Self {
        Self(Arc::new(NodeData {
            green,
            parent,
            offset,
            position,
            language,
        }))
    }

    #[inline]
    #[must_use]
    pub fn green(&self) -> &GreenNode {
        &self.0.green
    }

    #[must_use]
    pub fn language(&self) -> &Language {
        &self.0.language
    }

    #[inline]
    #[must_use]
    pub fn symbol(&self) -> Symbol {
        self.0.green.symbol()
    }

    /// Kind name, e.g. `"identifier"`, `";"` or `"ERROR"`.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.0.language.symbol_name(self.symbol())
    }

    #[must_use]
    pub fn is_named(&self) -> bool {
        self.0.language.is_named(self.symbol())
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.0.language.is_visible(self.symbol())
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.0.green.is_error()
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.0.green.is_missing()
    }

    #[must_use]
    pub fn is_extra(&self) -> bool {
        self.0.green.is_extra()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.green.has_error()
    }

    /// Whether the node was touched by an edit since it was parsed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.0.green.is_damaged()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.0.green.is_leaf()
    }

    #[inline]
    #[must_use]
    pub fn byte_range(&self) -> TextRange {
        TextRange::at(self.0.offset, self.0.green.text_len())
    }

    #[must_use]
    pub fn start_byte(&self) -> TextSize {
        self.0.offset
    }

    #[must_use]
    pub fn end_byte(&self) -> TextSize {
        self.byte_range().end()
    }

    #[must_use]
    pub fn start_position(&self) -> Point {
        self.0.position
    }

    #[must_use]
    pub fn end_position(&self) -> Point {
        self.0.position.advance(self.0.green.extent())
    }

    /// Nearest visible ancestor.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.parent.clone()
    }

    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut ancestors = Vec::new();
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            ancestors.push(node);
        }
        ancestors
    }

    /// Visible children. Hidden nonterminals are replaced by their own
    /// visible children; hidden terminals are skipped.
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        let mut children = Vec::new();
        let mut pending: Vec<(&GreenNode, TextSize, Point)> = Vec::new();
        push_children(&mut pending, &self.0.green, self.0.offset, self.0.position);

        while let Some((green, offset, position)) = pending.pop() {
            let visible = self.0.language.is_visible(green.symbol());
            if visible {
                children.push(Self::new(
                    green.clone(),
                    Some(self.clone()),
                    offset,
                    position,
                    self.0.language.clone(),
                ));
            } else if !green.is_leaf() {
                push_children(&mut pending, green, offset, position);
            }
        }
        children
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    #[must_use]
    pub fn child(&self, index: usize) -> Option<Self> {
        self.children().into_iter().nth(index)
    }

    #[must_use]
    pub fn named_children(&self) -> Vec<Self> {
        self.children()
            .into_iter()
            .filter(Self::is_named)
            .collect()
    }

    #[must_use]
    pub fn named_child_count(&self) -> usize {
        self.named_children().len()
    }

    #[must_use]
    pub fn named_child(&self, index: usize) -> Option<Self> {
        self.named_children().into_iter().nth(index)
    }

    #[must_use]
    pub fn first_child(&self) -> Option<Self> {
        self.children().into_iter().next()
    }

    #[must_use]
    pub fn last_child(&self) -> Option<Self> {
        self.children().pop()
    }

    /// First visible child whose kind is `kind`.
    #[must_use]
    pub fn child_by_kind(&self, kind: &str) -> Option<Self> {
        self.children().into_iter().find(|child| child.kind() == kind)
    }

    #[must_use]
    pub fn next_sibling(&self) -> Option<Self> {
        let siblings = self.parent()?.children();
        let index = siblings.iter().position(|sibling| sibling == self)?;
        siblings.into_iter().nth(index + 1)
    }

    #[must_use]
    pub fn prev_sibling(&self) -> Option<Self> {
        let siblings = self.parent()?.children();
        let index = siblings.iter().position(|sibling| sibling == self)?;
        index.checked_sub(1).and_then(|index| siblings.into_iter().nth(index))
    }

    /// Visible descendants in document order, starting with `self`.
    #[must_use]
    pub fn descendants(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut pending = vec![self.clone()];
        while let Some(node) = pending.pop() {
            pending.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Smallest visible node that contains `range`.
    #[must_use]
    pub fn descendant_for_byte_range(&self, range: TextRange) -> Option<Self> {
        if !self.byte_range().contains_range(range) {
            return None;
        }
        let mut node = self.clone();
        'descend: loop {
            for child in node.children() {
                let child_range = child.byte_range();
                let fits = child_range.contains_range(range)
                    && (!range.is_empty() || child_range.contains(range.start()));
                if fits && !child_range.is_empty() {
                    node = child;
                    continue 'descend;
                }
            }
            return Some(node);
        }
    }

    /// Source text covered by the node.
    #[must_use]
    pub fn utf8_text<'s>(&self, source: &'s [u8]) -> Option<&'s str> {
        let bytes = source.get(self.byte_range().as_usize_range())?;
        std::str::from_utf8(bytes).ok()
    }

    /// S-expression of the named structure under this node.
    #[must_use]
    pub fn to_sexp(&self) -> String {
        super::pretty::to_sexp(self)
    }
}

fn push_children<'g>(
    pending: &mut Vec<(&'g GreenNode, TextSize, Point)>,
    green: &'g GreenNode,
    offset: TextSize,
    position: Point,
) {
    let start = pending.len();
    let mut offset = offset;
    let mut position = position;
    for child in green.children() {
        pending.push((child, offset, position));
        offset += child.text_len();
        position = position.advance(child.extent());
    }
    pending[start..].reverse();
}

impl PartialEq for SyntaxNode {
    fn eq(&self, other: &Self) -> bool {
        self.0.offset == other.0.offset && self.0.green.ptr_eq(&other.0.green)
    }
}

impl Eq for SyntaxNode {}

impl fmt::Debug for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind(), self.byte_range())
    }
}
