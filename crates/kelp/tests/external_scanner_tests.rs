//! Tokens produced by a hand-written scanner alongside the generated lexer.

mod common;

use common::{assert_leaves_partition, init_logging};
use kelp::generate::{GrammarBuilder, lit, pat, repeat, seq, sym};
use kelp::lexer::{ExternalScanner, LexInput, ValidSymbols};
use kelp::{InputEdit, Language, Parser, Symbol};

/// `{ ... }` with balanced nested braces, which no regular pattern can
/// describe.
struct NestedBraces {
    symbol: Symbol,
}

impl ExternalScanner for NestedBraces {
    fn scan(&self, input: &mut LexInput<'_>, valid: &ValidSymbols<'_>) -> Option<Symbol> {
        if !valid.contains(self.symbol) || input.lookahead() != Some(b'{') {
            return None;
        }
        let mut depth = 0usize;
        while let Some(byte) = input.lookahead() {
            input.advance();
            match byte {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        input.mark_end();
                        return Some(self.symbol);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

fn assignments() -> Language {
    let tables = GrammarBuilder::new("assignments")
        .rule("program", repeat(sym("item")))
        .rule("item", seq([sym("name"), lit("="), sym("block_text")]))
        .rule("name", pat("[a-z]+"))
        .external("block_text")
        .extra(pat(r"\s+"))
        .build()
        .unwrap();
    Language::from_tables(tables).unwrap()
}

fn with_scanner(language: &Language) -> Language {
    let symbol = language.symbol_for_name("block_text", true).unwrap();
    language.with_external_scanner(NestedBraces { symbol })
}

#[test]
fn test_external_token_is_scanned() {
    init_logging();
    let base = assignments();
    let language = with_scanner(&base);
    let symbol = language.symbol_for_name("block_text", true).unwrap();
    assert!(language.is_external(symbol));

    let text = "a = {x {y} z}\nb = {}";
    let result = Parser::new(language).parse(text.as_bytes(), None);
    assert!(!result.has_errors(), "{}", result.tree.to_sexp());
    assert_eq!(
        result.tree.to_sexp(),
        "(program (item (name) (block_text)) (item (name) (block_text)))"
    );
    let block = result.tree.root_node().named_child(0).unwrap().child_by_kind("block_text").unwrap();
    assert_eq!(block.utf8_text(text.as_bytes()), Some("{x {y} z}"));
}

#[test]
fn test_without_scanner_external_tokens_never_appear() {
    let text = "a = {x}";
    let result = Parser::new(assignments()).parse(text.as_bytes(), None);
    assert!(result.has_errors());
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_scanner_declining_falls_back_to_tables() {
    let language = with_scanner(&assignments());
    let text = "a = {x";
    let result = Parser::new(language).parse(text.as_bytes(), None);
    assert!(result.has_errors());
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_edit_inside_external_token() {
    let language = with_scanner(&assignments());
    let parser = Parser::new(language);
    let old = "a = {x}\nb = {y {z}}\nc = {w}";
    let new = "a = {x}\nb = {y {zz}}\nc = {w}";

    let first = parser.parse(old.as_bytes(), None);
    let edited = first.tree.edit(&InputEdit::from_texts(old.as_bytes(), new.as_bytes()));
    let incremental = parser.parse(new.as_bytes(), Some(&edited));
    let fresh = parser.parse(new.as_bytes(), None);

    assert!(!incremental.has_errors());
    assert!(incremental.tree.structurally_equal(&fresh.tree));
    assert!(incremental.metrics.nodes_reused > 0);
}
