//! LALR(1) table construction.
//!
//! States are identified by their LR(0) kernel. When a transition reaches an
//! existing kernel its lookaheads are merged in, and the state is processed
//! again if that added anything, until no lookahead set changes. All maps
//! are ordered so the same grammar always yields the same tables.

use super::lower::Grammar;
use crate::error::GrammarError;
use crate::language::{
    Associativity, LanguageTables, LexModeTable, ParseAction, ParseStateRow, Production, StateId,
    Symbol,
};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Item {
    production: usize,
    dot: usize,
}

type Lookaheads = BTreeSet<Symbol>;
type ItemSet = BTreeMap<Item, Lookaheads>;

/// Everything a state knows about one terminal before conflicts are
/// resolved.
#[derive(Debug, Default)]
struct Cell {
    shift: Option<StateId>,
    /// Highest precedence among the items that shift the terminal.
    shift_precedence: i32,
    shift_rules: BTreeSet<Symbol>,
    reduces: Vec<usize>,
    accept: bool,
}

struct Automaton<'g> {
    grammar: &'g Grammar,
    /// Production ids per left-hand side symbol.
    by_lhs: Vec<Vec<usize>>,
    first: Vec<Lookaheads>,
    nullable: Vec<bool>,
    /// Index of the implicit `start' -> start` production.
    augmented: usize,
    augmented_rhs: [Symbol; 1],
}

/// Build parse tables for `grammar`.
pub(crate) fn build_tables(grammar: &Grammar, strict: bool) -> Result<LanguageTables, GrammarError> {
    let automaton = Automaton::new(grammar);
    let (kernels, index) = automaton.states()?;
    log::debug!(
        "built {} LALR(1) states for `{}`",
        kernels.len(),
        grammar.name
    );

    let mut states = Vec::with_capacity(kernels.len());
    let mut lex_modes: Vec<LexModeTable> = Vec::new();
    let mut mode_ids: BTreeMap<Vec<Symbol>, u16> = BTreeMap::new();
    let mut conflicts = 0usize;

    for (state, kernel) in kernels.iter().enumerate() {
        let closure = automaton.closure(kernel);
        let mut cells: BTreeMap<Symbol, Cell> = BTreeMap::new();
        let mut gotos = Vec::new();

        for (symbol, core) in automaton.moves(&closure) {
            let Some(&target) = index.get(&core) else {
                continue;
            };
            if grammar.is_terminal(symbol) {
                cells.entry(symbol).or_default().shift = Some(target);
            } else {
                gotos.push((symbol, target));
            }
        }

        for (item, lookaheads) in &closure {
            match automaton.rhs(item.production).get(item.dot) {
                Some(&next) if grammar.is_terminal(next) => {
                    let production = &grammar.productions[item.production];
                    let cell = cells.entry(next).or_default();
                    cell.shift_precedence = cell.shift_precedence.max(production.precedence);
                    cell.shift_rules
                        .insert(grammar.origin[production.lhs.index()]);
                }
                Some(_) => {}
                None if item.production == automaton.augmented => {
                    cells.entry(Symbol::END).or_default().accept = true;
                }
                None => {
                    for &lookahead in lookaheads {
                        cells
                            .entry(lookahead)
                            .or_default()
                            .reduces
                            .push(item.production);
                    }
                }
            }
        }

        let mut actions = Vec::with_capacity(cells.len());
        for (symbol, cell) in cells {
            let resolved = automaton.resolve(state, symbol, cell, strict)?;
            if resolved.len() > 1 {
                conflicts += 1;
            }
            if !resolved.is_empty() {
                actions.push((symbol, resolved));
            }
        }

        let valid: Vec<Symbol> = actions
            .iter()
            .map(|(symbol, _)| *symbol)
            .filter(|&symbol| symbol != Symbol::END)
            .collect();
        let next_mode = u16::try_from(lex_modes.len()).map_err(|_| GrammarError::TooLarge {
            what: "lex mode count",
        })?;
        let lex_mode = *mode_ids.entry(valid.clone()).or_insert_with(|| {
            lex_modes.push(LexModeTable { valid });
            next_mode
        });

        states.push(ParseStateRow {
            actions,
            gotos,
            lex_mode,
        });
    }

    if conflicts > 0 {
        log::debug!("{conflicts} table cells keep several actions for runtime forking");
    }

    Ok(LanguageTables {
        name: grammar.name.clone(),
        symbols: grammar.symbols.clone(),
        productions: grammar
            .productions
            .iter()
            .map(|production| Production {
                lhs: production.lhs,
                len: u16::try_from(production.rhs.len()).unwrap_or(u16::MAX),
                precedence: production.precedence,
                associativity: production.associativity,
                dynamic_precedence: production.dynamic_precedence,
            })
            .collect(),
        states,
        lex_modes,
        tokens: grammar.tokens.clone(),
        extras: grammar.extras.clone(),
        word_token: grammar.word,
        external_tokens: grammar.externals.clone(),
        start_symbol: grammar.start,
    })
}

impl<'g> Automaton<'g> {
    fn new(grammar: &'g Grammar) -> Self {
        let symbol_count = grammar.symbols.len();
        let mut by_lhs = vec![Vec::new(); symbol_count];
        for (id, production) in grammar.productions.iter().enumerate() {
            by_lhs[production.lhs.index()].push(id);
        }

        let mut first: Vec<Lookaheads> = (0..symbol_count)
            .map(|index| {
                let mut set = Lookaheads::new();
                if grammar.symbols[index].terminal
                    && let Ok(id) = u16::try_from(index)
                {
                    set.insert(Symbol(id));
                }
                set
            })
            .collect();
        let mut nullable = vec![false; symbol_count];

        let mut changed = true;
        while changed {
            changed = false;
            for production in &grammar.productions {
                let lhs = production.lhs.index();
                let mut all_nullable = true;
                for symbol in &production.rhs {
                    if symbol.index() != lhs {
                        let (target, source) = pick_two(&mut first, lhs, symbol.index());
                        let before = target.len();
                        target.extend(source.iter().copied());
                        changed |= target.len() != before;
                    }
                    if !nullable[symbol.index()] {
                        all_nullable = false;
                        break;
                    }
                }
                if all_nullable && !nullable[lhs] {
                    nullable[lhs] = true;
                    changed = true;
                }
            }
        }

        Self {
            grammar,
            by_lhs,
            first,
            nullable,
            augmented: grammar.productions.len(),
            augmented_rhs: [grammar.start],
        }
    }

    fn rhs(&self, production: usize) -> &[Symbol] {
        if production == self.augmented {
            &self.augmented_rhs
        } else {
            &self.grammar.productions[production].rhs
        }
    }

    /// FIRST of `symbols` followed by any of `tail`.
    fn first_of(&self, symbols: &[Symbol], tail: &Lookaheads) -> Lookaheads {
        let mut set = Lookaheads::new();
        for symbol in symbols {
            set.extend(self.first[symbol.index()].iter().copied());
            if !self.nullable[symbol.index()] {
                return set;
            }
        }
        set.extend(tail.iter().copied());
        set
    }

    fn closure(&self, kernel: &ItemSet) -> ItemSet {
        let mut items = kernel.clone();
        let mut queue: VecDeque<Item> = items.keys().copied().collect();

        while let Some(item) = queue.pop_front() {
            let rhs = self.rhs(item.production);
            let Some(&next) = rhs.get(item.dot) else {
                continue;
            };
            if self.grammar.is_terminal(next) {
                continue;
            }
            let lookaheads = match items.get(&item) {
                Some(current) => self.first_of(&rhs[item.dot + 1..], current),
                None => continue,
            };
            for &production in &self.by_lhs[next.index()] {
                let start = Item { production, dot: 0 };
                let changed = match items.entry(start) {
                    Entry::Vacant(slot) => {
                        slot.insert(lookaheads.clone());
                        true
                    }
                    Entry::Occupied(mut slot) => {
                        let before = slot.get().len();
                        slot.get_mut().extend(lookaheads.iter().copied());
                        slot.get().len() != before
                    }
                };
                if changed {
                    queue.push_back(start);
                }
            }
        }
        items
    }

    /// Kernels reached from `closure`, keyed by transition symbol.
    fn transitions(&self, closure: &ItemSet) -> BTreeMap<Symbol, ItemSet> {
        let mut moves: BTreeMap<Symbol, ItemSet> = BTreeMap::new();
        for (item, lookaheads) in closure {
            if let Some(&next) = self.rhs(item.production).get(item.dot) {
                moves
                    .entry(next)
                    .or_default()
                    .entry(Item {
                        production: item.production,
                        dot: item.dot + 1,
                    })
                    .or_default()
                    .extend(lookaheads.iter().copied());
            }
        }
        moves
    }

    /// Transition symbols with the LR(0) core they lead to.
    fn moves(&self, closure: &ItemSet) -> Vec<(Symbol, Vec<Item>)> {
        self.transitions(closure)
            .into_iter()
            .map(|(symbol, kernel)| (symbol, kernel.into_keys().collect()))
            .collect()
    }

    #[allow(clippy::type_complexity)]
    fn states(&self) -> Result<(Vec<ItemSet>, BTreeMap<Vec<Item>, StateId>), GrammarError> {
        let start = Item {
            production: self.augmented,
            dot: 0,
        };
        let mut kernels = vec![ItemSet::from([(start, Lookaheads::from([Symbol::END]))])];
        let mut index = BTreeMap::from([(vec![start], 0 as StateId)]);
        let mut queued = vec![true];
        let mut queue = VecDeque::from([0usize]);

        while let Some(state) = queue.pop_front() {
            queued[state] = false;
            let closure = self.closure(&kernels[state]);
            for (_, kernel) in self.transitions(&closure) {
                let core: Vec<Item> = kernel.keys().copied().collect();
                if let Some(&target) = index.get(&core) {
                    let target = usize::from(target);
                    let mut grew = false;
                    for (item, lookaheads) in kernel {
                        let slot = kernels[target].entry(item).or_default();
                        let before = slot.len();
                        slot.extend(lookaheads);
                        grew |= slot.len() != before;
                    }
                    if grew && !queued[target] {
                        queued[target] = true;
                        queue.push_back(target);
                    }
                    continue;
                }

                let id = StateId::try_from(kernels.len())
                    .ok()
                    .filter(|&id| id < StateId::MAX)
                    .ok_or(GrammarError::TooLarge {
                        what: "parse state count",
                    })?;
                index.insert(core, id);
                kernels.push(kernel);
                queued.push(true);
                queue.push_back(usize::from(id));
            }
        }
        Ok((kernels, index))
    }

    /// Apply precedence and associativity to one cell. Actions that survive
    /// are ordered shift first, then reductions by production id.
    fn resolve(
        &self,
        state: usize,
        symbol: Symbol,
        mut cell: Cell,
        strict: bool,
    ) -> Result<Vec<ParseAction>, GrammarError> {
        let productions = &self.grammar.productions;

        if cell.reduces.len() > 1 {
            cell.reduces.sort_unstable();
            cell.reduces.dedup();
            let best = cell
                .reduces
                .iter()
                .map(|&id| productions[id].precedence)
                .max()
                .unwrap_or(0);
            cell.reduces.retain(|&id| productions[id].precedence == best);
        }

        let mut keep_shift = cell.shift.is_some();
        if cell.shift.is_some() {
            let mut kept = Vec::with_capacity(cell.reduces.len());
            for &id in &cell.reduces {
                let production = &productions[id];
                match production.precedence.cmp(&cell.shift_precedence) {
                    Ordering::Greater => keep_shift = false,
                    Ordering::Less => continue,
                    Ordering::Equal => match production.associativity {
                        Associativity::Left => keep_shift = false,
                        Associativity::Right => continue,
                        Associativity::None => {}
                    },
                }
                kept.push(id);
            }
            cell.reduces = kept;
        }

        let mut actions = Vec::with_capacity(cell.reduces.len() + 2);
        if cell.accept {
            actions.push(ParseAction::Accept);
        }
        if keep_shift && let Some(target) = cell.shift {
            actions.push(ParseAction::Shift(target));
        }
        actions.extend(
            cell.reduces
                .iter()
                .filter_map(|&id| u16::try_from(id).ok())
                .map(ParseAction::Reduce),
        );

        if actions.len() > 1 {
            let mut rules: BTreeSet<Symbol> = cell
                .reduces
                .iter()
                .map(|&id| self.grammar.origin[productions[id].lhs.index()])
                .collect();
            if keep_shift {
                rules.extend(cell.shift_rules.iter().copied());
            }
            let declared = self
                .grammar
                .conflicts
                .iter()
                .any(|set| rules.is_subset(set));
            let names = rules
                .iter()
                .map(|&rule| self.grammar.name_of(rule))
                .collect::<Vec<_>>()
                .join(", ");
            if declared {
                log::trace!(
                    "state {state}: declared conflict on `{}` between {names}",
                    self.grammar.name_of(symbol)
                );
            } else if strict {
                return Err(GrammarError::UnresolvedConflict {
                    state,
                    symbol: self.grammar.name_of(symbol).to_owned(),
                    actions: format!("{actions:?} in {names}"),
                });
            } else {
                log::debug!(
                    "state {state}: undeclared conflict on `{}` between {names}",
                    self.grammar.name_of(symbol)
                );
            }
        }
        Ok(actions)
    }
}

/// Mutable access to `sets[target]` alongside shared access to
/// `sets[source]`. The indices must differ.
fn pick_two(sets: &mut [Lookaheads], target: usize, source: usize) -> (&mut Lookaheads, &Lookaheads) {
    if target < source {
        let (left, right) = sets.split_at_mut(source);
        (&mut left[target], &right[0])
    } else {
        let (left, right) = sets.split_at_mut(target);
        (&mut right[0], &left[source])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::lower::lower;
    use crate::generate::{GrammarBuilder, choice, lit, optional, pat, prec, repeat, seq, sym};

    fn tables(builder: &GrammarBuilder) -> LanguageTables {
        build_tables(&lower(builder).unwrap(), false).unwrap()
    }

    #[test]
    fn test_accept_after_start_symbol() {
        let tables = tables(
            &GrammarBuilder::new("t")
                .rule("start", seq([lit("a"), lit("b")]))
        );
        let start = tables.start_symbol;
        let after_start = tables.states[0].goto(start).unwrap();
        assert_eq!(
            tables.states[usize::from(after_start)].actions(Symbol::END),
            &[ParseAction::Accept]
        );
    }

    #[test]
    fn test_nullable_start_reduces_on_end() {
        let tables = tables(
            &GrammarBuilder::new("t")
                .rule("start", repeat(sym("word")))
                .rule("word", pat("[a-z]+")),
        );
        assert!(matches!(
            tables.states[0].actions(Symbol::END),
            [ParseAction::Reduce(_)]
        ));
    }

    #[test]
    fn test_lex_modes_follow_valid_terminals() {
        let tables = tables(
            &GrammarBuilder::new("t")
                .rule("start", seq([lit("a"), optional(lit("b")), lit("c")])),
        );
        let initial = &tables.lex_modes[usize::from(tables.states[0].lex_mode)];
        assert_eq!(initial.valid.len(), 1);
        let names: BTreeSet<&str> = tables
            .lex_modes
            .iter()
            .flat_map(|mode| mode.valid.iter())
            .map(|symbol| tables.symbols[symbol.index()].name.as_str())
            .collect();
        assert_eq!(names, BTreeSet::from(["a", "b", "c"]));
    }

    #[test]
    fn test_reduce_reduce_keeps_both_without_precedence() {
        let tables = tables(
            &GrammarBuilder::new("t")
                .rule("start", choice([sym("left"), sym("right")]))
                .rule("left", seq([lit("x")]))
                .rule("right", seq([lit("x")])),
        );
        let x = Symbol(2);
        let Some(&ParseAction::Shift(after_x)) = tables.states[0].actions(x).first() else {
            panic!("expected a shift on `x`");
        };
        let actions = tables.states[usize::from(after_x)].actions(Symbol::END);
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|action| matches!(action, ParseAction::Reduce(_))));
    }

    #[test]
    fn test_higher_precedence_wins_reduce_reduce() {
        let tables = tables(
            &GrammarBuilder::new("t")
                .rule("start", choice([sym("left"), sym("right")]))
                .rule("left", seq([lit("x")]))
                .rule("right", prec(1, seq([lit("x")]))),
        );
        let x = Symbol(2);
        let Some(&ParseAction::Shift(after_x)) = tables.states[0].actions(x).first() else {
            panic!("expected a shift on `x`");
        };
        let actions = tables.states[usize::from(after_x)].actions(Symbol::END);
        let [ParseAction::Reduce(id)] = actions else {
            panic!("expected one reduction, got {actions:?}");
        };
        assert_eq!(tables.productions[usize::from(*id)].precedence, 1);
    }

    #[test]
    fn test_lalr_lookaheads_split_reductions() {
        // S -> a A d | b B d | a B e | b A e ; A -> c ; B -> c
        // LALR(1) merges the two `c` states and reports a conflict.
        let builder = GrammarBuilder::new("t")
            .rule(
                "s",
                choice([
                    seq([lit("a"), sym("a_rule"), lit("d")]),
                    seq([lit("b"), sym("b_rule"), lit("d")]),
                    seq([lit("a"), sym("b_rule"), lit("e")]),
                    seq([lit("b"), sym("a_rule"), lit("e")]),
                ]),
            )
            .rule("a_rule", seq([lit("c")]))
            .rule("b_rule", seq([lit("c")]));
        let tables = tables(&builder);
        let conflicted = tables
            .states
            .iter()
            .flat_map(|row| &row.actions)
            .filter(|(_, actions)| actions.len() > 1)
            .count();
        assert_eq!(conflicted, 2);
    }
}
