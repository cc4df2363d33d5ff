//! Property-based tests for the parser
//!
//! Random inputs, valid or not, must always produce a tree that covers the
//! text exactly, and incremental re-parsing must agree with parsing from
//! scratch.

#![cfg(test)]

mod common;

use common::{assert_leaves_partition, statements, sums};
use kelp::{InputEdit, Language, Parser, ParserConfig};
use proptest::prelude::*;
use std::sync::OnceLock;

fn statements_language() -> &'static Language {
    static LANGUAGE: OnceLock<Language> = OnceLock::new();
    LANGUAGE.get_or_init(statements)
}

fn sums_language() -> &'static Language {
    static LANGUAGE: OnceLock<Language> = OnceLock::new();
    LANGUAGE.get_or_init(sums)
}

/// Valid statement sources.
fn statement_source() -> impl Strategy<Value = String> {
    let atom = prop_oneof![
        "[a-z][a-z0-9_]{0,4}".prop_filter("not a keyword", |name| name != "let"),
        "[0-9]{1,4}",
    ];
    let expression = atom.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} + {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} * {b}")),
            inner.prop_map(|a| format!("({a})")),
        ]
    });
    prop::collection::vec(
        ("[a-z]{1,4}".prop_filter("not a keyword", |name| name != "let"), expression),
        0..6,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .map(|(name, value)| format!("let {name} = {value};\n"))
            .collect::<String>()
    })
}

/// Arbitrary text built from the grammar's characters and some noise.
fn noisy_source() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            prop::sample::select(vec!["let", "=", ";", "+", "*", "(", ")", " ", "\n", "# c\n"])
                .prop_map(str::to_owned),
            "[a-z]{1,3}",
            "[0-9]{1,3}",
            "[@!?ü]{1,2}",
        ],
        0..40,
    )
    .prop_map(|parts| parts.concat())
}

/// A source plus an edit expressed as a byte range and replacement.
fn edited_source(
    source: impl Strategy<Value = String>,
) -> impl Strategy<Value = (String, usize, usize, String)> {
    source.prop_flat_map(|text| {
        let len = text.len();
        let insert = noisy_source().prop_map(|s| s.chars().take(6).collect::<String>());
        (Just(text), 0..=len, 0..=len, insert).prop_map(|(text, a, b, insert)| {
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            (text, start, end, insert)
        })
    })
}

fn char_boundary(text: &str, mut offset: usize) -> usize {
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

fn check_incremental(language: &Language, old: &str, start: usize, end: usize, insert: &str) {
    let start = char_boundary(old, start);
    let end = char_boundary(old, end).max(start);
    let new = format!("{}{insert}{}", &old[..start], &old[end..]);

    let parser = Parser::new(language.clone());
    let first = parser.parse(old.as_bytes(), None);
    let edit = InputEdit::replace(old.as_bytes(), start, end, insert.as_bytes());
    let edited = first.tree.edit(&edit);
    let incremental = parser.parse(new.as_bytes(), Some(&edited));
    let fresh = parser.parse(new.as_bytes(), None);

    assert_same_tree(&incremental.tree, &fresh.tree, &new);
    assert_leaves_partition(&incremental.tree, new.len());
}

/// Apply each edit to the result of the previous one, always re-parsing
/// incrementally from the last incremental tree.
fn check_chained(
    language: &Language,
    base: &str,
    edits: &[(prop::sample::Index, prop::sample::Index, String)],
) {
    let parser = Parser::new(language.clone());
    let mut text = base.to_owned();
    let mut tree = parser.parse(text.as_bytes(), None).tree;

    for (a, b, insert) in edits {
        let a = char_boundary(&text, a.index(text.len() + 1));
        let b = char_boundary(&text, b.index(text.len() + 1));
        let (start, end) = (a.min(b), a.max(b));
        let new = format!("{}{insert}{}", &text[..start], &text[end..]);

        let edit = InputEdit::replace(text.as_bytes(), start, end, insert.as_bytes());
        let edited = tree.edit(&edit);
        assert_eq!(edited.text_len().to_usize(), new.len());
        let incremental = parser.parse(new.as_bytes(), Some(&edited));
        let fresh = parser.parse(new.as_bytes(), None);
        assert_same_tree(&incremental.tree, &fresh.tree, &new);
        assert_leaves_partition(&incremental.tree, new.len());

        text = new;
        tree = incremental.tree;
    }
}

fn assert_same_tree(left: &kelp::Tree, right: &kelp::Tree, text: &str) {
    assert!(
        left.structurally_equal(right),
        "trees differ for {text:?}:\n{}\nvs\n{}",
        left.debug_dump(text.as_bytes()),
        right.debug_dump(text.as_bytes())
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn valid_statements_parse_cleanly(text in statement_source()) {
        let result = Parser::new(statements_language().clone()).parse(text.as_bytes(), None);
        prop_assert!(!result.has_errors(), "{}", result.tree.debug_dump(text.as_bytes()));
        prop_assert!(result.warnings.is_empty());
        assert_leaves_partition(&result.tree, text.len());
    }

    #[test]
    fn any_input_is_covered(text in noisy_source()) {
        let result = Parser::new(statements_language().clone()).parse(text.as_bytes(), None);
        prop_assert!(!result.cancelled);
        assert_leaves_partition(&result.tree, text.len());
    }

    #[test]
    fn recovery_terminates_under_tight_limits(text in noisy_source()) {
        let config = ParserConfig::default()
            .with_max_skip_tokens(2)
            .with_max_recovery_attempts(1)
            .with_max_recovery_depth(2);
        let result = Parser::with_config(statements_language().clone(), config)
            .parse(text.as_bytes(), None);
        assert_leaves_partition(&result.tree, text.len());
    }

    #[test]
    fn parsing_is_deterministic(text in noisy_source()) {
        let parser = Parser::new(statements_language().clone());
        let first = parser.parse(text.as_bytes(), None);
        let second = parser.parse(text.as_bytes(), None);
        prop_assert!(first.tree.structurally_equal(&second.tree));
        prop_assert_eq!(first.tree.to_sexp(), second.tree.to_sexp());
    }

    #[test]
    fn incremental_matches_fresh_on_valid_input(
        (text, start, end, insert) in edited_source(statement_source())
    ) {
        check_incremental(statements_language(), &text, start, end, &insert);
    }

    #[test]
    fn incremental_matches_fresh_on_noise(
        (text, start, end, insert) in edited_source(noisy_source())
    ) {
        check_incremental(statements_language(), &text, start, end, &insert);
    }

    #[test]
    fn incremental_sums(
        (text, start, end, insert) in edited_source("[0-9]{1,3}( \\+ [0-9]{1,3}){0,6}")
    ) {
        check_incremental(sums_language(), &text, start, end, &insert);
    }

    #[test]
    fn incremental_matches_fresh_across_chained_edits(
        base in noisy_source(),
        edits in prop::collection::vec(
            (
                any::<prop::sample::Index>(),
                any::<prop::sample::Index>(),
                noisy_source().prop_map(|s| s.chars().take(6).collect::<String>()),
            ),
            1..5,
        )
    ) {
        check_chained(statements_language(), &base, &edits);
    }

    #[test]
    fn reparsing_unchanged_text_is_idempotent(text in statement_source()) {
        let parser = Parser::new(statements_language().clone());
        let first = parser.parse(text.as_bytes(), None);
        let second = parser.parse(text.as_bytes(), Some(&first.tree));
        prop_assert!(first.tree.structurally_equal(&second.tree));
    }
}
