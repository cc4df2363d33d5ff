//! The parse loop.
//!
//! One iteration handles one lookahead token for every live stack: reduce
//! as far as the tables allow, shift, then merge, prune and collapse the
//! frontier. Recovery only runs once every stack has failed on the same
//! token.

use crate::error::{ParseWarning, WarningKind};
use crate::incremental::ReuseCursor;
use crate::language::{LEX_MODE_UNION, Language, ParseAction, StateId, Symbol};
use crate::lexer::{Lexer, Token};
use crate::parser::disambiguation::{best_index, collapse, merge_stacks, prune_stacks};
use crate::parser::recovery::{self, SKIP_COST};
use crate::parser::stack::{GlrStack, Position, StackEntry};
use crate::parser::{ParseMetrics, ParseOptions, ParserConfig};
use crate::syntax::{GreenNode, LeafSpec, NodeFlags, NodeSpec, TextRange, TextSize};
use smallvec::SmallVec;
use std::collections::VecDeque;

pub(crate) struct Outcome {
    pub(crate) root: GreenNode,
    pub(crate) warnings: Vec<ParseWarning>,
    pub(crate) metrics: ParseMetrics,
    pub(crate) cancelled: bool,
}

struct Lookahead {
    token: Token,
    /// Leaf taken from the previous tree instead of lexing.
    reused: Option<GreenNode>,
    start: Position,
    end: Position,
}

enum Flow {
    Continue,
    Done(GreenNode),
}

#[derive(Default)]
struct Phase {
    shifts: Vec<(GlrStack, StateId)>,
    accepted: Vec<GlrStack>,
    failed: Vec<GlrStack>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RecoveryBudget {
    at: TextSize,
    attempts: usize,
    skipped: usize,
}

/// Limits that have already produced a warning in this parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Limit {
    Stacks = 1,
    Ambiguity = 1 << 1,
    Reductions = 1 << 2,
    Steps = 1 << 3,
}

pub(crate) struct Run<'a> {
    language: &'a Language,
    lexer: Lexer<'a>,
    config: &'a ParserConfig,
    options: &'a ParseOptions,
    text: &'a [u8],
    stacks: Vec<GlrStack>,
    position: Position,
    reuse: Option<ReuseCursor>,
    warnings: Vec<ParseWarning>,
    metrics: ParseMetrics,
    ambiguous_for: usize,
    recovery: RecoveryBudget,
    reported: u8,
    union_set: Vec<bool>,
}

impl<'a> Run<'a> {
    pub(crate) fn new(
        language: &'a Language,
        config: &'a ParserConfig,
        options: &'a ParseOptions,
        text: &'a [u8],
        old_root: Option<GreenNode>,
    ) -> Self {
        Self {
            language,
            lexer: Lexer::new(language),
            config,
            options,
            text,
            stacks: vec![GlrStack::new()],
            position: Position::default(),
            reuse: old_root.map(ReuseCursor::new),
            warnings: Vec::new(),
            metrics: ParseMetrics {
                max_stack_count: 1,
                ..ParseMetrics::default()
            },
            ambiguous_for: 0,
            recovery: RecoveryBudget::default(),
            reported: 0,
            union_set: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> Outcome {
        let per_byte = self.config.max_recovery_attempts.max(2) + 2;
        let budget = (self.text.len() + 1)
            .saturating_mul(per_byte)
            .saturating_add(1024);
        let mut steps = 0usize;
        let mut cancelled = false;

        let root = loop {
            if self.options.is_cancelled() {
                cancelled = true;
                break self.cancel();
            }
            steps += 1;
            if steps > budget {
                self.report_limit(Limit::Steps, format!("gave up after {budget} steps"));
                break self.abandon();
            }
            let lookahead = self.lookahead();
            if let Flow::Done(root) = self.step(&lookahead) {
                break root;
            }
        };

        Outcome {
            root,
            warnings: self.warnings,
            metrics: self.metrics,
            cancelled,
        }
    }

    fn lookahead(&mut self) -> Lookahead {
        let start = self.position;
        if let Some(reused) = self.reusable_leaf() {
            let token = Token {
                symbol: reused.symbol(),
                range: TextRange::at(start.offset, reused.text_len()),
                extent: reused.extent(),
                lookahead: reused.lookahead_bytes(),
                lex_mode: reused.lex_mode(),
                is_error: false,
            };
            log::trace!(
                "reusing token `{}` at {}",
                self.language.symbol_name(token.symbol),
                token.range
            );
            return Lookahead {
                token,
                end: start.advanced(&reused),
                reused: Some(reused),
                start,
            };
        }

        let offset = start.offset.to_usize();
        let token = match self.shared_lex_mode() {
            Some(mode) => self.lexer.next_token(self.text, offset, mode),
            None => {
                self.build_union_set();
                self.lexer
                    .next_token_in(self.text, offset, &self.union_set, LEX_MODE_UNION)
            }
        };
        Lookahead {
            end: Position {
                offset: token.range.end(),
                point: start.point.advance(token.extent),
            },
            token,
            reused: None,
            start,
        }
    }

    /// First leaf of the previous tree at the current position, if a single
    /// stack is alive and the leaf was lexed under the same mode.
    fn reusable_leaf(&mut self) -> Option<GreenNode> {
        let [stack] = self.stacks.as_slice() else {
            return None;
        };
        let mode = self.language.lex_mode(stack.state());
        let cursor = self.reuse.as_mut()?;
        let leaf = cursor.seek(self.position.offset)?.first_leaf()?;
        let usable = !leaf.is_damaged()
            && !leaf.has_error()
            && !leaf.is_fragile()
            && leaf.lex_mode() == mode;
        usable.then(|| leaf.clone())
    }

    fn shared_lex_mode(&self) -> Option<u16> {
        let mut modes = self
            .stacks
            .iter()
            .map(|stack| self.language.lex_mode(stack.state()));
        let first = modes.next()?;
        modes.all(|mode| mode == first).then_some(first)
    }

    fn build_union_set(&mut self) {
        let language = self.language;
        self.union_set.clear();
        self.union_set.resize(language.symbol_count(), false);
        for stack in &self.stacks {
            let valid = language.valid_set(language.lex_mode(stack.state()));
            for (slot, &on) in self.union_set.iter_mut().zip(valid) {
                *slot |= on;
            }
        }
    }

    fn step(&mut self, la: &Lookahead) -> Flow {
        let language = self.language;
        let symbol = la.token.symbol;

        if la.token.is_error {
            self.metrics.errors_recovered += 1;
            let snippet = String::from_utf8_lossy(&self.text[la.token.range.as_usize_range()]);
            self.warn(
                WarningKind::LexFailure,
                la.token.range,
                format!("unrecognized input {snippet:?}"),
            );
            self.shift_extra(la, SKIP_COST);
            return Flow::Continue;
        }
        if symbol != Symbol::END
            && language.is_extra(symbol)
            && !self
                .stacks
                .iter()
                .any(|stack| language.has_actions(stack.state(), symbol))
        {
            self.shift_extra(la, 0);
            return Flow::Continue;
        }

        let mut phase = self.reduce_all(la);
        if symbol == Symbol::END
            && let Some(best) = best_index(&phase.accepted)
        {
            let stack = phase.accepted.swap_remove(best);
            return Flow::Done(self.accept(&stack));
        }
        if !phase.shifts.is_empty() {
            self.shift_all(la, phase.shifts);
            return Flow::Continue;
        }
        self.recover(phase.failed, la)
    }

    fn reduce_all(&mut self, la: &Lookahead) -> Phase {
        let language = self.language;
        let ambiguous = self.stacks.len() > 1;
        let mut work: VecDeque<GlrStack> = self.stacks.drain(..).collect();
        let mut phase = Phase::default();
        let mut budget = self.config.max_reductions_per_token;

        while let Some(stack) = work.pop_front() {
            let actions = language.actions(stack.state(), la.token.symbol);
            if actions.is_empty() {
                phase.failed.push(stack);
                continue;
            }
            let forks = actions.len() > 1;
            if forks {
                log::debug!(
                    "forking on `{}` in state {} ({} actions)",
                    language.symbol_name(la.token.symbol),
                    stack.state(),
                    actions.len()
                );
            }

            for (index, &action) in actions.iter().enumerate() {
                let mut branch = stack.clone();
                if forks {
                    branch.forked = true;
                    branch.preference += u32::try_from(index).unwrap_or(u32::MAX);
                }
                match action {
                    ParseAction::Shift(next) => phase.shifts.push((branch, next)),
                    ParseAction::Accept => phase.accepted.push(branch),
                    ParseAction::Reduce(production) => {
                        if budget == 0 {
                            self.report_limit(
                                Limit::Reductions,
                                format!(
                                    "more than {} reductions for one token",
                                    self.config.max_reductions_per_token
                                ),
                            );
                            continue;
                        }
                        budget -= 1;
                        let fragile = ambiguous || branch.forked;
                        if let Some(reduced) = self.reduce(branch, production, la, fragile) {
                            work.push_back(reduced);
                        }
                    }
                }
            }
        }
        phase
    }

    fn reduce(
        &mut self,
        mut stack: GlrStack,
        production_id: u16,
        la: &Lookahead,
        fragile: bool,
    ) -> Option<GlrStack> {
        let language = self.language;
        let Some(production) = language.production(production_id) else {
            log::warn!("dropping branch: unknown production {production_id}");
            return None;
        };

        let mut trailing: SmallVec<[StackEntry; 4]> = SmallVec::new();
        while stack.top().is_some_and(|entry| entry.extra) {
            trailing.extend(stack.pop());
        }
        let end = stack.position();

        let mut children = Vec::with_capacity(usize::from(production.len));
        let mut remaining = production.len;
        while remaining > 0 {
            let Some(entry) = stack.pop() else {
                log::warn!(
                    "dropping branch: stack underflow reducing `{}`",
                    language.symbol_name(production.lhs)
                );
                return None;
            };
            if !entry.extra {
                remaining -= 1;
            }
            children.push(entry.node);
        }
        children.reverse();

        let state = stack.state();
        let Some(goto) = language.goto(state, production.lhs) else {
            log::warn!(
                "dropping branch: no goto for `{}` in state {state}",
                language.symbol_name(production.lhs)
            );
            return None;
        };

        let node_len: u32 = children.iter().map(|child| child.text_len().into()).sum();
        let end_offset = u64::from(end.offset.into());
        let mut reach =
            u64::from(la.token.range.end().into()) + u64::from(la.token.lookahead);
        let mut child_end = end_offset - u64::from(node_len);
        for child in &children {
            child_end += u64::from(child.text_len().into());
            reach = reach.max(child_end + u64::from(child.lookahead_bytes()));
        }
        let lookahead = u32::try_from(reach.saturating_sub(end_offset)).unwrap_or(u32::MAX);

        let node = GreenNode::node(
            NodeSpec {
                symbol: production.lhs,
                production: production_id,
                parse_state: state,
                lookahead,
                dynamic_precedence: production.dynamic_precedence,
                flags: if fragile {
                    NodeFlags::FRAGILE
                } else {
                    NodeFlags::NONE
                },
            },
            children,
        );
        log::trace!(
            "reduced `{}` ({} children) in state {state} -> {goto}",
            language.symbol_name(production.lhs),
            node.child_count()
        );
        self.metrics.nodes_created += 1;
        stack.dynamic_precedence += production.dynamic_precedence;
        stack.push(StackEntry {
            state: goto,
            node,
            end,
            extra: false,
        });
        for entry in trailing.into_iter().rev() {
            stack.push(StackEntry {
                state: goto,
                ..entry
            });
        }
        Some(stack)
    }

    fn shift_all(&mut self, la: &Lookahead, shifts: Vec<(GlrStack, StateId)>) {
        self.recovery.skipped = 0;
        let ambiguous = shifts.len() > 1;

        if let [(stack, _)] = shifts.as_slice()
            && !stack.forked
            && la.reused.is_some()
            && let Some((node, next)) = self.reusable_node(stack, la)
        {
            log::debug!(
                "reusing `{}` ({} bytes) at {}",
                self.language.symbol_name(node.symbol()),
                node.text_len(),
                la.start.offset
            );
            let mut stack = stack.clone();
            let end = la.start.advanced(&node);
            stack.dynamic_precedence += node.dynamic_precedence();
            stack.push(StackEntry {
                state: next,
                node,
                end,
                extra: false,
            });
            self.metrics.nodes_reused += 1;
            self.position = end;
            self.stacks = vec![stack];
            self.finish_step();
            return;
        }

        let fragile = ambiguous || shifts.iter().any(|(stack, _)| stack.forked);
        let parse_state = shifts.first().map_or(0, |(stack, _)| stack.state());
        let flags = if fragile {
            NodeFlags::FRAGILE
        } else {
            NodeFlags::NONE
        };
        let leaf = self.make_leaf(la, parse_state, flags);
        self.stacks = shifts
            .into_iter()
            .map(|(mut stack, next)| {
                stack.push(StackEntry {
                    state: next,
                    node: leaf.clone(),
                    end: la.end,
                    extra: false,
                });
                stack
            })
            .collect();
        self.advance(la);
        self.finish_step();
    }

    /// Outermost subtree of the previous tree at the lookahead position that
    /// can be pushed as-is onto `stack`.
    fn reusable_node(&mut self, stack: &GlrStack, la: &Lookahead) -> Option<(GreenNode, StateId)> {
        let language = self.language;
        let state = stack.state();
        let reused_leaf = la.reused.as_ref()?;
        let cursor = self.reuse.as_mut()?;

        loop {
            let candidate = cursor.seek(la.start.offset)?;
            if candidate.is_leaf() {
                return None;
            }
            let usable = !candidate.is_damaged()
                && !candidate.has_error()
                && !candidate.is_fragile()
                && candidate.parse_state() == state
                && candidate
                    .first_leaf()
                    .is_some_and(|first| first.ptr_eq(reused_leaf) && !first.is_extra());
            if usable && let Some(next) = language.goto(state, candidate.symbol()) {
                return Some((candidate.clone(), next));
            }
            cursor.descend();
        }
    }

    fn shift_extra(&mut self, la: &Lookahead, cost: u32) {
        let mut flags = NodeFlags::EXTRA;
        if self.stacks.len() > 1 {
            flags = flags | NodeFlags::FRAGILE;
        }
        let parse_state = self.stacks.first().map_or(0, GlrStack::state);
        let leaf = self.make_leaf(la, parse_state, flags);
        for stack in &mut self.stacks {
            let state = stack.state();
            stack.push(StackEntry {
                state,
                node: leaf.clone(),
                end: la.end,
                extra: true,
            });
            stack.error_cost += cost;
        }
        self.advance(la);
    }

    /// Leaf for the lookahead token. A reused leaf is kept when its extra
    /// marker matches; a fragile copy is made if needed.
    fn make_leaf(&mut self, la: &Lookahead, parse_state: StateId, flags: NodeFlags) -> GreenNode {
        if let Some(reused) = &la.reused
            && reused.is_extra() == flags.contains(NodeFlags::EXTRA)
        {
            self.metrics.nodes_reused += 1;
            return reused.with_flags(flags);
        }
        self.metrics.nodes_created += 1;
        GreenNode::leaf(LeafSpec {
            symbol: la.token.symbol,
            text_len: la.token.range.len(),
            extent: la.token.extent,
            lookahead: la.token.lookahead,
            parse_state,
            lex_mode: la.token.lex_mode,
            flags,
        })
    }

    fn advance(&mut self, la: &Lookahead) {
        self.position = la.end;
        self.metrics.tokens_consumed += 1;
    }

    fn finish_step(&mut self) {
        for stack in &mut self.stacks {
            stack.forked = false;
        }
        self.stacks = merge_stacks(std::mem::take(&mut self.stacks));
        if prune_stacks(&mut self.stacks, self.config.max_stacks) {
            self.report_limit(
                Limit::Stacks,
                format!("more than {} parallel stacks", self.config.max_stacks),
            );
        }
        self.metrics.max_stack_count = self.metrics.max_stack_count.max(self.stacks.len());

        if self.stacks.len() > 1 {
            self.ambiguous_for += 1;
            if self.ambiguous_for > self.config.max_ambiguity_depth {
                self.report_limit(
                    Limit::Ambiguity,
                    format!(
                        "ambiguity unresolved after {} tokens",
                        self.config.max_ambiguity_depth
                    ),
                );
                collapse(&mut self.stacks);
                self.ambiguous_for = 0;
            }
        } else {
            self.ambiguous_for = 0;
        }
    }

    fn accept(&mut self, stack: &GlrStack) -> GreenNode {
        let language = self.language;
        let mut entries: Vec<&StackEntry> = stack.iter().collect();
        entries.reverse();

        let mut significant = entries.iter().enumerate().filter(|(_, entry)| !entry.extra);
        let main = match (significant.next(), significant.next()) {
            (Some((index, entry)), None) if entry.node.symbol() == language.start_symbol() => index,
            _ => {
                log::warn!("accepted a stack without a single root node");
                return recovery::error_node(stack.nodes());
            }
        };
        if entries.len() == 1 {
            return entries[main].node.clone();
        }

        let node = &entries[main].node;
        let mut children: Vec<GreenNode> = entries[..main]
            .iter()
            .map(|entry| entry.node.clone())
            .collect();
        children.extend(node.children().iter().cloned());
        children.extend(entries[main + 1..].iter().map(|entry| entry.node.clone()));
        // Extras spliced in at the edges; such a root is never reused.
        node.with_children(children, NodeFlags::FRAGILE)
    }

    fn recover(&mut self, mut failed: Vec<GlrStack>, la: &Lookahead) -> Flow {
        let language = self.language;
        let Some(best) = best_index(&failed) else {
            log::warn!("every branch died at {}", la.start.offset);
            return Flow::Done(self.abandon());
        };
        let stack = failed.swap_remove(best);
        let symbol = la.token.symbol;
        let name = language.symbol_name(symbol).to_owned();

        if self.recovery.at != la.start.offset {
            self.recovery.at = la.start.offset;
            self.recovery.attempts = 0;
        }

        if self.recovery.attempts < self.config.max_recovery_attempts {
            self.recovery.attempts += 1;
            let repair = recovery::insert_missing(language, &stack, symbol, la.start, |base, production| {
                self.reduce(base, production, la, true)
            });
            if let Some((repaired, missing)) = repair {
                let missing = language.symbol_name(missing).to_owned();
                self.note_recovery(
                    TextRange::empty(la.start.offset),
                    format!("inserted missing `{missing}` before `{name}`"),
                );
                self.stacks = vec![repaired];
                return Flow::Continue;
            }
            // At the end of input the whole stack may be wrapped.
            let depth = if symbol == Symbol::END {
                stack.depth()
            } else {
                self.config.max_recovery_depth
            };
            if let Some((repaired, start)) =
                recovery::pop_to_ancestor(language, &stack, symbol, depth)
            {
                self.note_recovery(
                    TextRange::new(start, la.start.offset),
                    format!("unexpected input before `{name}`"),
                );
                self.stacks = vec![repaired];
                return Flow::Continue;
            }
        }

        if symbol == Symbol::END {
            // Out of repairs: wrap whatever is left so the root keeps its kind.
            if let Some((repaired, start)) =
                recovery::pop_to_ancestor(language, &stack, symbol, stack.depth())
            {
                self.note_recovery(
                    TextRange::new(start, la.start.offset),
                    format!("unexpected input before `{name}`"),
                );
                self.stacks = vec![repaired];
                return Flow::Continue;
            }
            self.stacks = vec![stack];
            return Flow::Done(self.abandon());
        }

        if self.recovery.skipped >= self.config.max_skip_tokens {
            let start = la.start.offset.to_usize().min(self.text.len());
            let rest = &self.text[start..];
            let range = TextRange::at(la.start.offset, TextSize::of(rest));
            log::warn!(
                "skipped {} tokens in a row; sealing {range} as an error",
                self.recovery.skipped
            );
            self.metrics.errors_recovered += 1;
            self.warn(
                WarningKind::RecoveryOverflow,
                range,
                format!("gave up recovering after {} skipped tokens", self.recovery.skipped),
            );
            let leaf = recovery::error_leaf(rest);
            let end = la.start.advanced(&leaf);
            self.stacks = vec![recovery::skip_token(&stack, leaf, end, SKIP_COST)];
            self.position = end;
            return Flow::Continue;
        }

        self.recovery.skipped += 1;
        self.note_recovery(la.token.range, format!("skipped unexpected `{name}`"));
        let leaf = self.make_leaf(la, stack.state(), NodeFlags::NONE);
        self.stacks = vec![recovery::skip_token(&stack, leaf, la.end, SKIP_COST)];
        self.advance(la);
        Flow::Continue
    }

    /// Root for a parse that cannot complete: an ERROR node over everything
    /// on the best stack plus the unconsumed input.
    fn abandon(&mut self) -> GreenNode {
        let mut nodes = best_index(&self.stacks)
            .map(|best| self.stacks[best].nodes())
            .unwrap_or_default();
        let start = self.position.offset.to_usize().min(self.text.len());
        if start < self.text.len() {
            nodes.push(recovery::error_leaf(&self.text[start..]));
        }
        self.warn(
            WarningKind::RecoveryOverflow,
            TextRange::new(self.position.offset, TextSize::of(self.text)),
            "no valid completion of the input",
        );
        self.metrics.errors_recovered += 1;
        recovery::error_node(nodes)
    }

    fn cancel(&mut self) -> GreenNode {
        log::debug!("parse cancelled at {}", self.position.offset);
        let mut nodes = best_index(&self.stacks)
            .map(|best| self.stacks[best].nodes())
            .unwrap_or_default();
        let start = self.position.offset.to_usize().min(self.text.len());
        if start < self.text.len() {
            nodes.push(recovery::error_leaf(&self.text[start..]));
        }
        self.warn(
            WarningKind::Cancelled,
            TextRange::new(self.position.offset, TextSize::of(self.text)),
            "parse cancelled",
        );
        recovery::error_node(nodes)
    }

    fn note_recovery(&mut self, range: TextRange, message: String) {
        log::debug!("recovery at {range}: {message}");
        self.metrics.errors_recovered += 1;
        self.warn(WarningKind::Recovered, range, message);
    }

    fn report_limit(&mut self, limit: Limit, message: String) {
        let bit = limit as u8;
        if self.reported & bit != 0 {
            return;
        }
        self.reported |= bit;
        log::warn!("{message}; continuing with reduced precision");
        self.warn(
            WarningKind::InternalLimitExceeded,
            TextRange::empty(self.position.offset),
            message,
        );
    }

    fn warn(&mut self, kind: WarningKind, span: TextRange, message: impl Into<String>) {
        self.warnings.push(ParseWarning::new(span, kind, message));
    }
}
