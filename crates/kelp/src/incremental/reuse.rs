use crate::syntax::{GreenNode, TextSize};

#[derive(Debug, Clone)]
struct Frame {
    node: GreenNode,
    start: TextSize,
    /// Index in the parent's children.
    index: usize,
}

/// Forward-only walk over an edited tree, looking for subtrees that start
/// at the parser's current position.
///
/// The parser only moves forward, so the cursor does too: seeking skips
/// every node that ends at or before the target offset and descends into
/// nodes that straddle it.
#[derive(Debug)]
pub(crate) struct ReuseCursor {
    path: Vec<Frame>,
}

impl ReuseCursor {
    pub(crate) fn new(root: GreenNode) -> Self {
        Self {
            path: vec![Frame {
                node: root,
                start: TextSize::zero(),
                index: 0,
            }],
        }
    }

    fn current(&self) -> Option<&Frame> {
        self.path.last()
    }

    /// Move to the outermost non-empty node starting at `offset`, if any.
    /// Returns it.
    pub(crate) fn seek(&mut self, offset: TextSize) -> Option<&GreenNode> {
        loop {
            let frame = self.current()?;
            let start = frame.start;
            let end = start + frame.node.text_len();
            if end <= offset {
                self.advance();
            } else if start < offset {
                self.descend();
            } else if start == offset {
                break;
            } else {
                return None;
            }
        }
        self.current().map(|frame| &frame.node)
    }

    /// Step into the current node's first child. Leaves are skipped.
    pub(crate) fn descend(&mut self) {
        let Some(frame) = self.current() else {
            return;
        };
        match frame.node.children().first() {
            Some(first) => {
                let child = Frame {
                    node: first.clone(),
                    start: frame.start,
                    index: 0,
                };
                self.path.push(child);
            }
            None => self.advance(),
        }
    }

    /// Move past the current node.
    fn advance(&mut self) {
        while let Some(done) = self.path.pop() {
            let Some(parent) = self.path.last() else {
                return;
            };
            if let Some(next) = parent.node.children().get(done.index + 1) {
                let sibling = Frame {
                    node: next.clone(),
                    start: done.start + done.node.text_len(),
                    index: done.index + 1,
                };
                self.path.push(sibling);
                return;
            }
        }
    }
}
