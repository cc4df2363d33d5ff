//! Multi-pattern DFA over every token pattern of a language.
//!
//! All patterns are compiled into one anchored dense DFA with
//! [`MatchKind::All`], so a single forward run reports every pattern that
//! matches at every end offset. The caller decides which matches are valid
//! in the current parse state.

use crate::error::LoadError;
use crate::language::{Symbol, TokenDef};
use regex_automata::{
    Anchored, Input, MatchKind,
    dfa::{Automaton, StartKind, dense},
};

#[derive(Debug, Clone, Copy)]
struct PatternInfo {
    symbol: Symbol,
    literal: bool,
}

#[derive(Clone)]
pub(crate) struct TokenMatcher {
    dfa: Option<dense::DFA<Vec<u32>>>,
    patterns: Vec<PatternInfo>,
}

impl TokenMatcher {
    /// Compile token definitions. `name_of` is used for error messages.
    pub(crate) fn new(
        tokens: &[TokenDef],
        name_of: impl Fn(Symbol) -> String,
    ) -> Result<Self, LoadError> {
        let mut sources = Vec::with_capacity(tokens.len());
        let mut patterns = Vec::with_capacity(tokens.len());
        for token in tokens {
            let source = token.pattern.to_regex();
            if let Err(error) = regex_syntax::Parser::new().parse(&source) {
                return Err(LoadError::InvalidTokenPattern {
                    symbol: name_of(token.symbol),
                    reason: error.to_string(),
                });
            }
            sources.push(source);
            patterns.push(PatternInfo {
                symbol: token.symbol,
                literal: token.pattern.is_literal(),
            });
        }

        if sources.is_empty() {
            return Ok(Self {
                dfa: None,
                patterns,
            });
        }

        let dfa = dense::Builder::new()
            .configure(
                dense::DFA::config()
                    .match_kind(MatchKind::All)
                    .start_kind(StartKind::Anchored),
            )
            .build_many(&sources)
            .map_err(|error| LoadError::InvalidTokenPattern {
                symbol: "<token set>".into(),
                reason: error.to_string(),
            })?;
        log::debug!(
            "compiled {} token patterns into a {} byte DFA",
            patterns.len(),
            dfa.memory_usage()
        );

        Ok(Self {
            dfa: Some(dfa),
            patterns,
        })
    }

    /// Run the DFA from `offset`, reporting `(end, symbol, is_literal)` for
    /// every match. Returns the end of the examined region: one past the
    /// last byte read, or `text.len() + 1` if the run reached the end of
    /// input.
    pub(crate) fn scan(
        &self,
        text: &[u8],
        offset: usize,
        mut on_match: impl FnMut(usize, Symbol, bool),
    ) -> usize {
        let Some(dfa) = &self.dfa else {
            return offset + 1;
        };
        let input = Input::new(text).range(offset..).anchored(Anchored::Yes);
        let Ok(mut state) = dfa.start_state_forward(&input) else {
            return offset + 1;
        };

        let mut report = |state, end: usize| {
            for index in 0..dfa.match_len(state) {
                let info = self.patterns[dfa.match_pattern(state, index).as_usize()];
                on_match(end, info.symbol, info.literal);
            }
        };

        let mut at = offset;
        while at < text.len() {
            state = dfa.next_state(state, text[at]);
            if dfa.is_special_state(state) {
                if dfa.is_match_state(state) {
                    // Matches are delayed by one byte.
                    report(state, at);
                } else if dfa.is_dead_state(state) || dfa.is_quit_state(state) {
                    return at + 1;
                }
            }
            at += 1;
        }
        state = dfa.next_eoi_state(state);
        if dfa.is_match_state(state) {
            report(state, text.len());
        }
        text.len() + 1
    }

    /// Whether pattern `symbol` matches all of `text`.
    pub(crate) fn matches_whole(&self, text: &[u8], symbol: Symbol) -> bool {
        let mut whole = false;
        self.scan(text, 0, |end, matched, _| {
            if matched == symbol && end == text.len() {
                whole = true;
            }
        });
        whole
    }
}
