//! Text renderings of syntax trees, used by tests and debugging tools.

use crate::syntax::SyntaxNode;
use std::fmt::Write;

enum Frame {
    Open(SyntaxNode, usize),
    Close,
}

/// Render the named structure as an S-expression:
/// `(source_file (def (identifier) (identifier)))`.
///
/// Anonymous nodes are left out unless they are `MISSING`.
pub(crate) fn to_sexp(root: &SyntaxNode) -> String {
    let mut out = String::new();
    let mut pending = vec![Frame::Open(root.clone(), 0)];
    while let Some(frame) = pending.pop() {
        match frame {
            Frame::Close => out.push(')'),
            Frame::Open(node, _) => {
                if !out.is_empty() && !out.ends_with('(') {
                    out.push(' ');
                }
                out.push('(');
                if node.is_missing() {
                    out.push_str("MISSING ");
                    push_kind(&mut out, &node);
                    out.push(')');
                    continue;
                }
                push_kind(&mut out, &node);
                pending.push(Frame::Close);
                let children: Vec<_> = node
                    .children()
                    .into_iter()
                    .filter(|child| child.is_named() || child.is_missing())
                    .collect();
                pending.extend(children.into_iter().rev().map(|child| Frame::Open(child, 0)));
            }
        }
    }
    out
}

fn push_kind(out: &mut String, node: &SyntaxNode) {
    if node.is_named() {
        out.push_str(node.kind());
    } else {
        let _ = write!(out, "{:?}", node.kind());
    }
}

/// One line per visible node, indented by depth, with byte ranges and the
/// text of leaves.
pub(crate) fn debug_dump(root: &SyntaxNode, source: &[u8]) -> String {
    let mut out = String::new();
    let mut pending = vec![Frame::Open(root.clone(), 0)];
    while let Some(frame) = pending.pop() {
        let Frame::Open(node, depth) = frame else {
            continue;
        };
        let _ = write!(out, "{:indent$}{} {}", "", node.kind(), node.byte_range(), indent = depth * 2);
        if node.is_missing() {
            out.push_str(" MISSING");
        }
        if node.is_leaf()
            && let Some(text) = node.utf8_text(source)
        {
            let _ = write!(out, " {text:?}");
        }
        out.push('\n');
        let children = node.children();
        pending.extend(
            children
                .into_iter()
                .rev()
                .map(|child| Frame::Open(child, depth + 1)),
        );
    }
    out
}
