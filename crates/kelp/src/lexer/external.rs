use crate::language::Symbol;
use std::cell::Cell;

/// Hand-written tokenizer consulted before the table-driven lexer.
///
/// Scanners handle tokens a regular pattern cannot describe (indentation,
/// heredocs, nested comments). They are plain synchronous calls and must be
/// stateless: everything they need has to be recoverable from the input, so
/// that lexing at a given offset always gives the same answer.
pub trait ExternalScanner: Send + Sync {
    /// Try to recognize one of the `valid` external tokens at the start of
    /// `input`. On success, advance `input` (and optionally
    /// [`LexInput::mark_end`]) and return the symbol.
    fn scan(&self, input: &mut LexInput<'_>, valid: &ValidSymbols<'_>) -> Option<Symbol>;
}

/// Set of symbols the current parse state accepts.
#[derive(Debug, Clone, Copy)]
pub struct ValidSymbols<'a>(pub(crate) &'a [bool]);

impl ValidSymbols<'_> {
    #[must_use]
    pub fn contains(&self, symbol: Symbol) -> bool {
        self.0.get(symbol.index()).copied().unwrap_or(false)
    }
}

/// Cursor handed to an [`ExternalScanner`].
///
/// Every byte the scanner looks at is recorded, so the engine knows how far
/// an edit can reach back into this token.
#[derive(Debug)]
pub struct LexInput<'t> {
    text: &'t [u8],
    start: usize,
    position: usize,
    token_end: Option<usize>,
    furthest: Cell<usize>,
}

impl<'t> LexInput<'t> {
    pub(crate) fn new(text: &'t [u8], start: usize) -> Self {
        Self {
            text,
            start,
            position: start,
            token_end: None,
            furthest: Cell::new(start),
        }
    }

    /// Next byte, without consuming it.
    #[must_use]
    pub fn lookahead(&self) -> Option<u8> {
        self.touch(self.position);
        self.text.get(self.position).copied()
    }

    /// Next character, without consuming it.
    #[must_use]
    pub fn lookahead_char(&self) -> Option<char> {
        let rest = self.text.get(self.position..)?;
        let width = utf8_width(*rest.first()?).min(rest.len());
        self.touch(self.position + width - 1);
        std::str::from_utf8(&rest[..width]).ok()?.chars().next()
    }

    /// Consume one character.
    pub fn advance(&mut self) {
        if let Some(&first) = self.text.get(self.position) {
            self.position = (self.position + utf8_width(first)).min(self.text.len());
            self.touch(self.position.saturating_sub(1));
        }
    }

    /// End the token at the current position; later advances only look
    /// ahead.
    pub fn mark_end(&mut self) {
        self.token_end = Some(self.position);
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.touch(self.position);
        self.position >= self.text.len()
    }

    pub(crate) fn token_end(&self) -> usize {
        self.token_end.unwrap_or(self.position)
    }

    /// One past the last byte examined.
    pub(crate) fn examined_end(&self) -> usize {
        self.furthest.get() + 1
    }

    fn touch(&self, at: usize) {
        if at > self.furthest.get() {
            self.furthest.set(at);
        }
    }
}

/// Width of the UTF-8 sequence introduced by `first`.
pub(crate) const fn utf8_width(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}
