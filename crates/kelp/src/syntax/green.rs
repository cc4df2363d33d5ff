use crate::language::{StateId, Symbol};
use crate::syntax::{Point, TextSize};
use smallvec::SmallVec;
use std::sync::Arc;

/// Immutable, shareable green tree node.
///
/// Green nodes know their length but not their absolute position, so the
/// same node can be shared between tree versions after text before it has
/// been edited. They never store source text.
#[derive(Clone)]
pub struct GreenNode(Arc<GreenNodeData>);

struct GreenNodeData {
    symbol: Symbol,
    text_len: TextSize,
    extent: Point,
    /// Bytes past the end of the node that influenced how it was built.
    lookahead: u32,
    parse_state: StateId,
    lex_mode: u16,
    production: u16,
    dynamic_precedence: i32,
    flags: NodeFlags,
    children: GreenChildren,
}

/// Children storage optimized for different sizes
///
/// - Empty: leaves, and nonterminals produced by empty reductions
/// - One: single child stored inline (common for wrapper rules)
/// - Inline: small number of children stored inline
/// - Many: boxed slice for wide nodes
enum GreenChildren {
    Empty,
    One(GreenNode),
    Inline(SmallVec<[GreenNode; INLINE_CHILDREN_THRESHOLD]>),
    Many(Box<[GreenNode]>),
}

/// Threshold for switching from inline to boxed storage
const INLINE_CHILDREN_THRESHOLD: usize = 8;

/// Production id stored on leaves.
pub const NO_PRODUCTION: u16 = u16::MAX;

/// Node flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: Self = Self(0);
    /// Shifted without a state change (whitespace, comments, error nodes).
    pub const EXTRA: Self = Self(1);
    /// Zero-width token inserted by error recovery.
    pub const MISSING: Self = Self(1 << 1);
    /// Built while the parse was ambiguous; never reused.
    pub const FRAGILE: Self = Self(1 << 2);
    /// Overlaps an edit; never reused.
    pub const DAMAGED: Self = Self(1 << 3);
    /// The node or a descendant is an ERROR or MISSING node.
    pub const HAS_ERROR: Self = Self(1 << 4);

    /// Flags that are part of a node's shape.
    const SHAPE: Self = Self(Self::EXTRA.0 | Self::MISSING.0 | Self::HAS_ERROR.0);
    /// Flags a parent inherits from its children.
    const INHERITED: Self = Self(Self::FRAGILE.0 | Self::HAS_ERROR.0);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Parameters for a new leaf.
#[derive(Debug, Clone, Copy)]
pub struct LeafSpec {
    pub symbol: Symbol,
    pub text_len: TextSize,
    pub extent: Point,
    pub lookahead: u32,
    pub parse_state: StateId,
    pub lex_mode: u16,
    pub flags: NodeFlags,
}

/// Parameters for a new interior node; length and extent come from the
/// children.
#[derive(Debug, Clone, Copy)]
pub struct NodeSpec {
    pub symbol: Symbol,
    pub production: u16,
    pub parse_state: StateId,
    pub lookahead: u32,
    pub dynamic_precedence: i32,
    pub flags: NodeFlags,
}

impl GreenNode {
    #[must_use]
    pub fn leaf(spec: LeafSpec) -> Self {
        let mut flags = spec.flags;
        if spec.symbol == Symbol::ERROR || flags.contains(NodeFlags::MISSING) {
            flags = flags | NodeFlags::HAS_ERROR;
        }
        Self(Arc::new(GreenNodeData {
            symbol: spec.symbol,
            text_len: spec.text_len,
            extent: spec.extent,
            lookahead: spec.lookahead,
            parse_state: spec.parse_state,
            lex_mode: spec.lex_mode,
            production: NO_PRODUCTION,
            dynamic_precedence: 0,
            flags,
            children: GreenChildren::Empty,
        }))
    }

    /// Build an interior node over `children`.
    #[must_use]
    pub fn node(spec: NodeSpec, children: Vec<Self>) -> Self {
        let mut text_len = TextSize::zero();
        let mut extent = Point::ZERO;
        let mut flags = spec.flags;
        let mut dynamic_precedence = spec.dynamic_precedence;
        for child in &children {
            text_len += child.text_len();
            extent = extent.advance(child.extent());
            flags = flags | child.flags().intersection(NodeFlags::INHERITED);
            dynamic_precedence += child.dynamic_precedence();
        }
        if spec.symbol == Symbol::ERROR {
            flags = flags | NodeFlags::HAS_ERROR;
        }

        Self(Arc::new(GreenNodeData {
            symbol: spec.symbol,
            text_len,
            extent,
            lookahead: spec.lookahead,
            parse_state: spec.parse_state,
            lex_mode: first_lex_mode(&children),
            production: spec.production,
            dynamic_precedence,
            flags,
            children: GreenChildren::from_vec(children),
        }))
    }

    #[inline]
    #[must_use]
    pub fn symbol(&self) -> Symbol {
        self.0.symbol
    }

    #[inline]
    #[must_use]
    pub fn text_len(&self) -> TextSize {
        self.0.text_len
    }

    /// Rows and columns spanned by the node.
    #[inline]
    #[must_use]
    pub fn extent(&self) -> Point {
        self.0.extent
    }

    #[inline]
    #[must_use]
    pub fn lookahead_bytes(&self) -> u32 {
        self.0.lookahead
    }

    /// State on top of the stack before this node was pushed.
    #[inline]
    #[must_use]
    pub fn parse_state(&self) -> StateId {
        self.0.parse_state
    }

    /// Lex mode the node's first token was lexed under.
    #[inline]
    #[must_use]
    pub fn lex_mode(&self) -> u16 {
        self.0.lex_mode
    }

    #[inline]
    #[must_use]
    pub fn production(&self) -> Option<u16> {
        (self.0.production != NO_PRODUCTION).then_some(self.0.production)
    }

    #[inline]
    #[must_use]
    pub fn dynamic_precedence(&self) -> i32 {
        self.0.dynamic_precedence
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.0.flags
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.0.symbol == Symbol::ERROR
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.0.flags.contains(NodeFlags::MISSING)
    }

    #[must_use]
    pub fn is_extra(&self) -> bool {
        self.0.flags.contains(NodeFlags::EXTRA)
    }

    #[must_use]
    pub fn is_fragile(&self) -> bool {
        self.0.flags.contains(NodeFlags::FRAGILE)
    }

    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.0.flags.contains(NodeFlags::DAMAGED)
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.0.flags.contains(NodeFlags::HAS_ERROR)
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match &self.0.children {
            GreenChildren::Empty => &[],
            GreenChildren::One(child) => std::slice::from_ref(child),
            GreenChildren::Inline(children) => children,
            GreenChildren::Many(children) => children,
        }
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.0.children, GreenChildren::Empty)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// First leaf with a non-zero length.
    #[must_use]
    pub fn first_leaf(&self) -> Option<&Self> {
        let mut node = self;
        loop {
            if node.text_len() == TextSize::zero() {
                return None;
            }
            if node.is_leaf() {
                return Some(node);
            }
            node = node
                .children()
                .iter()
                .find(|child| child.text_len() > TextSize::zero())?;
        }
    }

    /// Copy of the node with `flags` added.
    #[must_use]
    pub fn with_flags(&self, flags: NodeFlags) -> Self {
        if self.flags().contains(flags) {
            return self.clone();
        }
        let mut copy = self.shallow_copy();
        copy.flags = copy.flags | flags;
        Self(Arc::new(copy))
    }

    /// Copy of the node with a different lookahead.
    #[must_use]
    pub fn with_lookahead(&self, lookahead: u32) -> Self {
        if self.lookahead_bytes() == lookahead {
            return self.clone();
        }
        let mut copy = self.shallow_copy();
        copy.lookahead = lookahead;
        Self(Arc::new(copy))
    }

    /// Copy of an interior node over new children, keeping the metadata and
    /// adding `flags`. Length and extent are recomputed.
    #[must_use]
    pub fn with_children(&self, children: Vec<Self>, flags: NodeFlags) -> Self {
        let mut copy = self.shallow_copy();
        copy.text_len = children
            .iter()
            .fold(TextSize::zero(), |len, child| len + child.text_len());
        copy.extent = children
            .iter()
            .fold(Point::ZERO, |extent, child| extent.advance(child.extent()));
        copy.flags = flags
            | self.flags()
            | children
                .iter()
                .fold(NodeFlags::NONE, |acc, child| acc | child.flags().intersection(NodeFlags::INHERITED));
        copy.children = GreenChildren::from_vec(children);
        Self(Arc::new(copy))
    }

    /// Copy of a childless node resized to a new length and extent.
    #[must_use]
    pub fn resized(&self, text_len: TextSize, extent: Point, flags: NodeFlags) -> Self {
        let mut copy = self.shallow_copy();
        copy.text_len = text_len;
        copy.extent = extent;
        copy.flags = copy.flags | flags;
        Self(Arc::new(copy))
    }

    fn shallow_copy(&self) -> GreenNodeData {
        GreenNodeData {
            symbol: self.0.symbol,
            text_len: self.0.text_len,
            extent: self.0.extent,
            lookahead: self.0.lookahead,
            parse_state: self.0.parse_state,
            lex_mode: self.0.lex_mode,
            production: self.0.production,
            dynamic_precedence: self.0.dynamic_precedence,
            flags: self.0.flags,
            children: GreenChildren::from_vec(self.children().to_vec()),
        }
    }

    /// Structural comparison: symbols, lengths, shape flags and children,
    /// recursively. Parser bookkeeping (states, lookahead, fragility) is
    /// ignored. Shared subtrees are skipped by pointer.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        let mut pending: Vec<(&Self, &Self)> = vec![(self, other)];
        while let Some((left, right)) = pending.pop() {
            if left.ptr_eq(right) {
                continue;
            }
            if left.symbol() != right.symbol()
                || left.text_len() != right.text_len()
                || left.flags().intersection(NodeFlags::SHAPE)
                    != right.flags().intersection(NodeFlags::SHAPE)
                || left.child_count() != right.child_count()
            {
                return false;
            }
            pending.extend(left.children().iter().zip(right.children()));
        }
        true
    }

    /// Every leaf, in document order.
    #[must_use]
    pub fn leaves(&self) -> Vec<Self> {
        let mut leaves = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            if node.is_leaf() {
                leaves.push(node.clone());
            } else {
                pending.extend(node.children().iter().rev());
            }
        }
        leaves
    }
}

impl std::fmt::Debug for GreenNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GreenNode")
            .field("symbol", &self.symbol())
            .field("text_len", &self.text_len())
            .field("flags", &self.flags())
            .field("children", &self.child_count())
            .finish()
    }
}

impl GreenChildren {
    fn from_vec(children: Vec<GreenNode>) -> Self {
        match children.len() {
            0 => Self::Empty,
            1 => children
                .into_iter()
                .next()
                .map_or(Self::Empty, Self::One),
            2..=INLINE_CHILDREN_THRESHOLD => Self::Inline(SmallVec::from_vec(children)),
            _ => Self::Many(children.into_boxed_slice()),
        }
    }

    fn take(&mut self) -> Vec<GreenNode> {
        match std::mem::replace(self, Self::Empty) {
            Self::Empty => Vec::new(),
            Self::One(child) => vec![child],
            Self::Inline(children) => children.into_vec(),
            Self::Many(children) => children.into_vec(),
        }
    }
}

// Left-recursive repetitions produce deep spines; drop them iteratively.
impl Drop for GreenNodeData {
    fn drop(&mut self) {
        let mut pending = self.children.take();
        while let Some(node) = pending.pop() {
            if let Ok(mut data) = Arc::try_unwrap(node.0) {
                pending.extend(data.children.take());
            }
        }
    }
}

// Interior nodes already carry their first leaf's mode.
fn first_lex_mode(children: &[GreenNode]) -> u16 {
    children
        .iter()
        .find(|child| child.text_len() > TextSize::zero())
        .map_or(u16::MAX, GreenNode::lex_mode)
}
