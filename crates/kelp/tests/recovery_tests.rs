//! Error recovery: every input yields a tree covering the whole text.

mod common;

use common::{assert_leaves_partition, init_logging, named_kinds, parse, statements};
use kelp::{ParseOptions, Parser, ParserConfig, WarningKind};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

fn has_warning(result: &kelp::ParseResult, kind: WarningKind) -> bool {
    result.warnings.iter().any(|warning| warning.kind == kind)
}

#[test]
fn test_missing_expression_is_inserted() {
    let text = "let x = ;";
    let result = parse(&statements(), text);
    assert!(result.has_errors());
    assert_eq!(
        result.tree.to_sexp(),
        "(program (statement (identifier) (expression (MISSING identifier))))"
    );
    assert!(has_warning(&result, WarningKind::Recovered));
    assert_eq!(result.metrics.errors_recovered, 1);
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_missing_terminator_between_statements() {
    let text = "let x = 1 let y = 2;";
    let result = parse(&statements(), text);
    assert_eq!(
        result.tree.to_sexp(),
        "(program (statement (identifier) (expression (number)) (MISSING \";\")) \
         (statement (identifier) (expression (number))))"
    );
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_missing_terminator_at_end() {
    let result = parse(&statements(), "let x = 1");
    assert_eq!(
        result.tree.to_sexp(),
        "(program (statement (identifier) (expression (number)) (MISSING \";\")))"
    );
}

#[test]
fn test_missing_node_is_zero_width() {
    let text = "let x = 1";
    let result = parse(&statements(), text);
    let missing = result
        .tree
        .leaves()
        .iter()
        .find(|leaf| leaf.is_missing())
        .cloned()
        .unwrap();
    assert!(missing.byte_range().is_empty());
    assert_eq!(missing.start_byte().to_usize(), text.len());
}

#[test]
fn test_unrecognized_characters_become_error_leaves() {
    init_logging();
    let text = "let x = 1; @@@ let y = 2;";
    let result = parse(&statements(), text);
    assert!(result.has_errors());
    assert!(has_warning(&result, WarningKind::LexFailure));
    assert_eq!(named_kinds(&result.tree), vec!["statement", "ERROR", "statement"]);

    let error = result.tree.root_node().named_child(1).unwrap();
    assert_eq!(error.utf8_text(text.as_bytes()), Some("@@@"));
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_unexpected_token_is_skipped() {
    let text = "let x = 1; ) let y = 2;";
    let result = parse(&statements(), text);
    assert!(result.has_errors());
    assert_eq!(named_kinds(&result.tree), vec!["statement", "ERROR", "statement"]);
    assert!(
        result
            .warnings
            .iter()
            .any(|warning| warning.message.contains("skipped unexpected"))
    );
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_truncated_input_keeps_root_kind() {
    let text = "let x = 1 + ";
    let result = parse(&statements(), text);
    assert!(result.has_errors());
    assert_eq!(result.tree.root_node().kind(), "program");
    assert_eq!(named_kinds(&result.tree), vec!["ERROR"]);
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_skip_limit_seals_the_rest() {
    let config = ParserConfig::default().with_max_skip_tokens(1);
    let parser = Parser::with_config(statements(), config);
    let text = "let x = 1; ) ) ) ) let y = 2;";
    let result = parser.parse(text.as_bytes(), None);
    assert!(has_warning(&result, WarningKind::RecoveryOverflow));
    assert_eq!(named_kinds(&result.tree), vec!["statement", "ERROR"]);
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_without_repairs_input_is_still_covered() {
    let config = ParserConfig::default().with_max_recovery_attempts(0);
    let parser = Parser::with_config(statements(), config);
    for text in ["let x = ;", "let = 2;", "= = =", "let x = (1;"] {
        let result = parser.parse(text.as_bytes(), None);
        assert!(result.has_errors(), "{text}");
        assert_leaves_partition(&result.tree, text.len());
    }
}

#[test]
fn test_recovery_prefers_cheap_repairs() {
    // One missing token is cheaper than discarding the statement.
    let result = parse(&statements(), "let x = 1 let y = 2;");
    let missing = result
        .tree
        .leaves()
        .iter()
        .filter(|leaf| leaf.is_missing())
        .count();
    assert_eq!(missing, 1);
    assert!(!named_kinds(&result.tree).contains(&"ERROR".to_owned()));
}

#[test]
fn test_cancellation_returns_partial_tree() {
    let flag = Arc::new(AtomicBool::new(true));
    let options = ParseOptions::new().with_cancellation_flag(flag);
    let parser = Parser::new(statements());
    let text = "let x = 1; let y = 2;";
    let result = parser.parse_with_options(text.as_bytes(), None, &options);

    assert!(result.cancelled);
    assert!(result.has_errors());
    assert!(has_warning(&result, WarningKind::Cancelled));
    assert_leaves_partition(&result.tree, text.len());
}

#[test]
fn test_expired_deadline_cancels() {
    let options = ParseOptions::new().with_deadline(Instant::now());
    let parser = Parser::new(statements());
    let result = parser.parse_with_options(b"let x = 1;", None, &options);
    assert!(result.cancelled);
    assert_leaves_partition(&result.tree, 10);
}

#[test]
fn test_warnings_carry_spans() {
    let text = "let x = 1; @@@";
    let result = parse(&statements(), text);
    let warning = result
        .warnings
        .iter()
        .find(|warning| warning.kind == WarningKind::LexFailure)
        .unwrap();
    assert_eq!(warning.span.as_usize_range(), 11..14);
    assert!(warning.message.contains("@@@"));
}

#[test]
fn test_nodes_reduced_for_a_repair_are_fragile() {
    let text = "let a = b c;";
    let result = parse(&statements(), text);
    assert!(
        result
            .tree
            .to_sexp()
            .contains("(expression (expression (identifier)) (MISSING"),
        "{}",
        result.tree.to_sexp()
    );

    let expression_at = |start: usize| {
        result
            .tree
            .root_node()
            .descendants()
            .into_iter()
            .find(|node| {
                node.kind() == "expression"
                    && node.byte_range().as_usize_range() == (start..start + 1)
            })
            .unwrap()
    };
    // `b` only became an expression so the missing operator could follow.
    assert!(expression_at(8).green().is_fragile());
    assert!(!expression_at(10).green().is_fragile());
}
