//! Choosing between competing stacks.
//!
//! Stacks that reach the same state sequence are merged, keeping the best
//! ranked one; the frontier is capped at a configured width; and a fork
//! that stays unresolved for too long is collapsed onto its best stack.
//! Every choice is a pure function of the stacks, so identical input always
//! yields the identical tree.

use crate::language::StateId;
use crate::parser::stack::GlrStack;
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;

/// Merge stacks with identical state sequences. The survivor of each group
/// is the best ranked stack; ties keep the earliest. Order is otherwise
/// preserved.
pub(crate) fn merge_stacks(stacks: Vec<GlrStack>) -> Vec<GlrStack> {
    if stacks.len() < 2 {
        return stacks;
    }
    let mut merged: Vec<GlrStack> = Vec::with_capacity(stacks.len());
    let mut by_top: HashMap<(StateId, usize), SmallVec<[usize; 2]>, ahash::RandomState> =
        HashMap::default();

    for stack in stacks {
        let key = (stack.state(), stack.depth());
        let candidates = by_top.entry(key).or_default();
        let twin = candidates
            .iter()
            .copied()
            .find(|&index| merged[index].same_states(&stack));
        match twin {
            Some(index) => {
                log::trace!("merging stacks at state {}", key.0);
                if stack.compare(&merged[index]) == Ordering::Less {
                    merged[index] = stack;
                }
            }
            None => {
                candidates.push(merged.len());
                merged.push(stack);
            }
        }
    }
    merged
}

/// Keep at most `max` stacks, dropping the worst ranked. Returns whether
/// anything was dropped.
pub(crate) fn prune_stacks(stacks: &mut Vec<GlrStack>, max: usize) -> bool {
    if stacks.len() <= max {
        return false;
    }
    stacks.sort_by(GlrStack::compare);
    stacks.truncate(max.max(1));
    true
}

/// Index of the best ranked stack; ties go to the earliest.
pub(crate) fn best_index(stacks: &[GlrStack]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, stack) in stacks.iter().enumerate() {
        if best.is_none_or(|current| stack.compare(&stacks[current]) == Ordering::Less) {
            best = Some(index);
        }
    }
    best
}

/// Reduce the frontier to its best stack.
pub(crate) fn collapse(stacks: &mut Vec<GlrStack>) {
    if let Some(best) = best_index(stacks) {
        let winner = stacks.swap_remove(best);
        stacks.clear();
        stacks.push(winner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Symbol;
    use crate::parser::stack::{Position, StackEntry};
    use crate::syntax::{GreenNode, LeafSpec, NodeFlags, Point, TextSize};

    fn push(stack: &mut GlrStack, state: StateId) {
        let node = GreenNode::leaf(LeafSpec {
            symbol: Symbol(2),
            text_len: TextSize::from(1),
            extent: Point::new(0, 1),
            lookahead: 1,
            parse_state: 0,
            lex_mode: 0,
            flags: NodeFlags::NONE,
        });
        stack.push(StackEntry {
            state,
            node,
            end: Position::default(),
            extra: false,
        });
    }

    #[test]
    fn test_merge_keeps_best() {
        let mut a = GlrStack::new();
        push(&mut a, 1);
        push(&mut a, 2);
        a.preference = 1;
        let mut b = GlrStack::new();
        push(&mut b, 1);
        push(&mut b, 2);
        let mut c = GlrStack::new();
        push(&mut c, 3);
        push(&mut c, 2);

        let merged = merge_stacks(vec![a, b, c]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].preference, 0);
    }

    #[test]
    fn test_prune_drops_worst() {
        let mut stacks: Vec<GlrStack> = (0..5)
            .map(|cost| {
                let mut stack = GlrStack::new();
                stack.error_cost = 10 * (5 - cost);
                stack
            })
            .collect();
        assert!(prune_stacks(&mut stacks, 2));
        assert_eq!(
            stacks.iter().map(|stack| stack.error_cost).collect::<Vec<_>>(),
            vec![10, 20]
        );
        assert!(!prune_stacks(&mut stacks, 2));
    }

    #[test]
    fn test_collapse_prefers_dynamic_precedence() {
        let mut preferred = GlrStack::new();
        preferred.dynamic_precedence = 2;
        let mut stacks = vec![GlrStack::new(), preferred];
        collapse(&mut stacks);
        assert_eq!(stacks.len(), 1);
        assert_eq!(stacks[0].dynamic_precedence, 2);
    }
}
