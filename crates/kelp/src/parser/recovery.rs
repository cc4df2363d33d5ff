//! Error repairs.
//!
//! Each repair takes the best failed stack and returns a new stack; the
//! original is never modified, so a repair that turns out useless costs
//! nothing. Costs are added to the stack's error cost and steer the choice
//! between competing stacks afterwards.

use crate::language::{Language, ParseAction, Symbol};
use crate::parser::stack::{GlrStack, Position, StackEntry};
use crate::syntax::{GreenNode, LeafSpec, NO_PRODUCTION, NodeFlags, NodeSpec, Point, TextSize};

pub(crate) const MISSING_COST: u32 = 110;
pub(crate) const SKIP_COST: u32 = 100;
pub(crate) const POP_COST: u32 = 500;
/// Added per discarded stack entry on top of [`POP_COST`].
const POP_ENTRY_COST: u32 = 10;
/// Reductions a missing-token repair may perform before its shift.
const MAX_REPAIR_REDUCTIONS: usize = 64;

/// ERROR node over `children`, with nested ERROR nodes flattened.
pub(crate) fn error_node(children: Vec<GreenNode>) -> GreenNode {
    let mut flat = Vec::with_capacity(children.len());
    for child in children {
        if child.is_error() && !child.is_leaf() {
            flat.extend(child.children().iter().cloned());
        } else {
            flat.push(child);
        }
    }
    GreenNode::node(
        NodeSpec {
            symbol: Symbol::ERROR,
            production: NO_PRODUCTION,
            parse_state: 0,
            lookahead: 0,
            dynamic_precedence: 0,
            flags: NodeFlags::NONE,
        },
        flat,
    )
}

/// ERROR leaf over raw bytes nobody will tokenize.
pub(crate) fn error_leaf(text: &[u8]) -> GreenNode {
    GreenNode::leaf(LeafSpec {
        symbol: Symbol::ERROR,
        text_len: TextSize::of(text),
        extent: Point::extent_of(text),
        lookahead: 1,
        parse_state: 0,
        lex_mode: crate::language::LEX_MODE_ERROR,
        flags: NodeFlags::NONE,
    })
}

/// Insert a zero-width token that lets `lookahead` continue: the first
/// terminal, by id, that the current state can reach a shift of (after any
/// reductions it implies) into a state with an action for `lookahead`.
/// `reduce` applies one reduction to a stack; nodes it builds only exist
/// because of the repair and must be marked fragile.
pub(crate) fn insert_missing(
    language: &Language,
    stack: &GlrStack,
    lookahead: Symbol,
    at: Position,
    mut reduce: impl FnMut(GlrStack, u16) -> Option<GlrStack>,
) -> Option<(GlrStack, Symbol)> {
    'symbols: for (symbol, _) in language.state_actions(stack.state()) {
        let symbol = *symbol;
        if symbol == Symbol::END || symbol == lookahead || language.is_extra(symbol) {
            continue;
        }

        let mut candidate = stack.clone();
        let mut reductions = 0;
        let next = loop {
            match language.actions(candidate.state(), symbol).first() {
                Some(&ParseAction::Shift(next)) => break next,
                Some(&ParseAction::Reduce(production)) if reductions < MAX_REPAIR_REDUCTIONS => {
                    reductions += 1;
                    let Some(reduced) = reduce(candidate, production) else {
                        continue 'symbols;
                    };
                    candidate = reduced;
                }
                _ => continue 'symbols,
            }
        };
        if !language.has_actions(next, lookahead) {
            continue;
        }

        let state = candidate.state();
        let missing = GreenNode::leaf(LeafSpec {
            symbol,
            text_len: TextSize::zero(),
            extent: Point::ZERO,
            lookahead: 0,
            parse_state: state,
            lex_mode: language.lex_mode(state),
            flags: NodeFlags::MISSING,
        });
        candidate.push(StackEntry {
            state: next,
            node: missing,
            end: at,
            extra: false,
        });
        candidate.error_cost += MISSING_COST;
        return Some((candidate, symbol));
    }
    None
}

/// Discard up to `max_depth` entries until a state with an action for
/// `lookahead` is on top. The discarded nodes are kept, wrapped in an ERROR
/// node pushed as an extra. Returns the new stack and the start of the
/// wrapped region.
pub(crate) fn pop_to_ancestor(
    language: &Language,
    stack: &GlrStack,
    lookahead: Symbol,
    max_depth: usize,
) -> Option<(GlrStack, TextSize)> {
    let end = stack.position();
    let mut popped = stack.clone();
    let mut nodes = Vec::new();
    for depth in 1..=max_depth {
        let entry = popped.pop()?;
        nodes.push(entry.node);
        if !language.has_actions(popped.state(), lookahead) {
            continue;
        }

        nodes.reverse();
        let start = popped.position().offset;
        let state = popped.state();
        popped.push(StackEntry {
            state,
            node: error_node(nodes),
            end,
            extra: true,
        });
        let depth = u32::try_from(depth).unwrap_or(u32::MAX);
        popped.error_cost += POP_COST.saturating_add(POP_ENTRY_COST.saturating_mul(depth));
        return Some((popped, start));
    }
    None
}

/// Push `leaf` inside an ERROR node. A previous ERROR node separated from
/// the top only by extras absorbs it, so runs of skipped tokens become one
/// node.
pub(crate) fn skip_token(stack: &GlrStack, leaf: GreenNode, end: Position, cost: u32) -> GlrStack {
    let mut base = stack.clone();
    let mut extras = Vec::new();
    while let Some(top) = base.top()
        && top.extra
        && !top.node.is_error()
    {
        extras.extend(base.pop());
    }

    let absorbs = base
        .top()
        .is_some_and(|top| top.extra && top.node.is_error() && !top.node.is_leaf());
    let mut children = Vec::new();
    let mut stack = match base.pop() {
        Some(previous) if absorbs => {
            children.extend(previous.node.children().iter().cloned());
            children.extend(extras.into_iter().rev().map(|entry| entry.node));
            base
        }
        _ => stack.clone(),
    };
    children.push(leaf);

    let state = stack.state();
    stack.push(StackEntry {
        state,
        node: error_node(children),
        end,
        extra: true,
    });
    stack.error_cost += cost;
    stack
}
