//! # Lexer
//!
//! Context-sensitive tokenization driven by the parse tables.
//!
//! ## Overview
//!
//! The parser asks for one token at a time, passing the lex mode of its
//! current state. Only terminals valid in that mode (plus the language's
//! extras) are candidates, which lets a grammar reuse the same characters
//! for different tokens in different places.
//!
//! Selection among candidates:
//!
//! 1. The longest match wins.
//! 2. On equal length, a literal beats a pattern, then the lower symbol id
//!    wins.
//! 3. If a keyword wins but the language's word token matches a longer
//!    prefix, the word token is used instead (`iffy` is an identifier, not
//!    `if` followed by `fy`).
//!
//! Lexing never fails. With no valid candidate the lexer retries with every
//! literal and named token enabled (anonymous patterns such as the body of
//! a raw block would swallow arbitrary text); if still nothing matches it
//! skips characters up to the next position where something does and
//! returns an `ERROR` token.
//!
//! The lexer can be restarted at any character boundary, and each token
//! records how many bytes beyond its end were examined to produce it. The
//! incremental re-parser relies on both.

pub(crate) mod dfa;
mod external;

pub use external::{ExternalScanner, LexInput, ValidSymbols};

use crate::language::{LEX_MODE_ERROR, Language, Symbol};
use crate::syntax::{Point, TextRange, TextSize};
use external::utf8_width;

/// One lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: Symbol,
    pub range: TextRange,
    pub extent: Point,
    /// Bytes past `range.end()` the lexer examined.
    pub lookahead: u32,
    /// Lex mode the token was produced under.
    pub lex_mode: u16,
    pub is_error: bool,
}

impl Token {
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.symbol == Symbol::END
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    end: usize,
    symbol: Symbol,
    literal: bool,
}

impl Candidate {
    fn beats(self, other: Self) -> bool {
        self.end > other.end
            || (self.end == other.end
                && (self.literal, std::cmp::Reverse(self.symbol))
                    > (other.literal, std::cmp::Reverse(other.symbol)))
    }
}

/// Table-driven lexer for one language.
#[derive(Debug, Clone, Copy)]
pub struct Lexer<'l> {
    language: &'l Language,
}

impl<'l> Lexer<'l> {
    #[must_use]
    pub const fn new(language: &'l Language) -> Self {
        Self { language }
    }

    /// Lex one token at `offset` under `lex_mode`.
    #[must_use]
    pub fn next_token(&self, text: &[u8], offset: usize, lex_mode: u16) -> Token {
        self.next_token_in(text, offset, self.language.valid_set(lex_mode), lex_mode)
    }

    /// Lex one token with an explicit valid set (indexed by symbol).
    /// `lex_mode` is only recorded on the token.
    #[must_use]
    pub fn next_token_in(&self, text: &[u8], offset: usize, valid: &[bool], lex_mode: u16) -> Token {
        let offset = offset.min(text.len());
        let mut examined = offset + 1;

        if let Some(token) = self.scan_external(text, offset, valid, lex_mode, &mut examined) {
            return token;
        }

        if offset >= text.len() {
            return self.token(text, Symbol::END, offset, offset, examined, lex_mode, false);
        }

        if let Some(best) = self.longest_match(text, offset, valid, &mut examined) {
            log::trace!(
                "lexed `{}` at {offset}..{}",
                self.language.symbol_name(best.symbol),
                best.end
            );
            return self.token(text, best.symbol, offset, best.end, examined, lex_mode, false);
        }

        // Nothing valid here: let the parser see whatever token is present.
        let everything = self.language.recovery_terminals();
        if let Some(best) = self.longest_match(text, offset, everything, &mut examined) {
            log::trace!(
                "lexed out-of-place `{}` at {offset}..{}",
                self.language.symbol_name(best.symbol),
                best.end
            );
            return self.token(text, best.symbol, offset, best.end, examined, LEX_MODE_ERROR, false);
        }

        let mut end = offset;
        while end < text.len() {
            end = (end + utf8_width(text[end])).min(text.len());
            if end == text.len() || self.longest_match(text, end, everything, &mut examined).is_some()
            {
                break;
            }
        }
        log::debug!("no token matches at {offset}..{end}");
        self.token(text, Symbol::ERROR, offset, end, examined, LEX_MODE_ERROR, true)
    }

    fn scan_external(
        &self,
        text: &[u8],
        offset: usize,
        valid: &[bool],
        lex_mode: u16,
        examined: &mut usize,
    ) -> Option<Token> {
        let scanner = self.language.external_scanner()?;
        let wanted = self
            .language
            .tables()
            .external_tokens
            .iter()
            .any(|symbol| valid.get(symbol.index()).copied().unwrap_or(false));
        if !wanted {
            return None;
        }

        let mut input = LexInput::new(text, offset);
        let result = scanner.scan(&mut input, &ValidSymbols(valid));
        *examined = (*examined).max(input.examined_end());
        let symbol = result.filter(|symbol| {
            self.language.is_external(*symbol) && valid.get(symbol.index()).copied().unwrap_or(false)
        })?;
        let end = input.token_end().clamp(offset, text.len());
        log::trace!("external scanner produced `{}` at {offset}..{end}", self.language.symbol_name(symbol));
        Some(self.token(text, symbol, offset, end, *examined, lex_mode, false))
    }

    /// Best valid candidate at `offset`. A keyword that is only a prefix of
    /// a longer word yields the word token or nothing at all, never the
    /// keyword: when the word token is not valid here the caller falls back
    /// to error mode, where it is.
    fn longest_match(
        &self,
        text: &[u8],
        offset: usize,
        valid: &[bool],
        examined: &mut usize,
    ) -> Option<Candidate> {
        let language = self.language;
        let word = language.word_token();
        let is_valid = |symbol: Symbol| {
            valid.get(symbol.index()).copied().unwrap_or(false) || language.is_extra(symbol)
        };

        let mut best: Option<Candidate> = None;
        let mut word_end = None;
        let reached = language.matcher().scan(text, offset, |end, symbol, literal| {
            if end == offset {
                return;
            }
            if Some(symbol) == word {
                word_end = Some(end);
            }
            if !is_valid(symbol) {
                return;
            }
            let candidate = Candidate { end, symbol, literal };
            if best.is_none_or(|current| candidate.beats(current)) {
                best = Some(candidate);
            }
        });
        *examined = (*examined).max(reached);

        let best = best?;
        match (word, word_end) {
            (Some(word), Some(word_end)) if language.is_keyword(best.symbol) && word_end > best.end => {
                is_valid(word).then_some(Candidate {
                    end: word_end,
                    symbol: word,
                    literal: false,
                })
            }
            _ => Some(best),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn token(
        &self,
        text: &[u8],
        symbol: Symbol,
        start: usize,
        end: usize,
        examined: usize,
        lex_mode: u16,
        is_error: bool,
    ) -> Token {
        let range = TextRange::new(offset_size(start), offset_size(end));
        Token {
            symbol,
            range,
            extent: Point::extent_of(&text[start..end]),
            lookahead: u32::try_from(examined.saturating_sub(end)).unwrap_or(u32::MAX),
            lex_mode,
            is_error,
        }
    }
}

fn offset_size(offset: usize) -> TextSize {
    TextSize::from(u32::try_from(offset).unwrap_or(u32::MAX))
}
