//! Re-parsing after edits: reuse, equivalence with fresh parses and
//! changed ranges.

mod common;

use common::{assert_leaves_partition, init_logging, parse, statements, sums};
use kelp::{InputEdit, Language, ParseResult, Parser, TextRange, TextSize};

fn document(statements: usize) -> String {
    (0..statements)
        .map(|index| format!("let v{index} = {index} + x;\n"))
        .collect()
}

/// Parse `old`, apply `edit`, re-parse, and check against a fresh parse.
fn reparse(language: &Language, old: &str, new: &str) -> (ParseResult, ParseResult, kelp::Tree) {
    let parser = Parser::new(language.clone());
    let first = parser.parse(old.as_bytes(), None);
    let edit = InputEdit::from_texts(old.as_bytes(), new.as_bytes());
    let edited = first.tree.edit(&edit);
    assert_eq!(edited.text_len().to_usize(), new.len());

    let incremental = parser.parse(new.as_bytes(), Some(&edited));
    let fresh = parser.parse(new.as_bytes(), None);
    assert!(
        incremental.tree.structurally_equal(&fresh.tree),
        "incremental:\n{}\nfresh:\n{}",
        incremental.tree.debug_dump(new.as_bytes()),
        fresh.tree.debug_dump(new.as_bytes())
    );
    assert_leaves_partition(&incremental.tree, new.len());
    (incremental, fresh, edited)
}

#[test]
fn test_edit_inside_number_reuses_neighbours() {
    init_logging();
    let old = document(40);
    let new = old.replacen("let v20 = 20", "let v20 = 2077", 1);
    let (incremental, fresh, _) = reparse(&statements(), &old, &new);

    assert!(incremental.metrics.nodes_reused > 0);
    assert!(incremental.metrics.nodes_created < fresh.metrics.nodes_created);
    assert!(incremental.metrics.tokens_consumed < fresh.metrics.tokens_consumed);
}

#[test]
fn test_unchanged_text_reuses_everything() {
    let text = document(10);
    let language = statements();
    let parser = Parser::new(language);
    let first = parser.parse(text.as_bytes(), None);
    let again = parser.parse(text.as_bytes(), Some(&first.tree));

    assert!(again.tree.structurally_equal(&first.tree));
    assert!(again.metrics.nodes_reused > 0);
    assert!(again.metrics.nodes_created < first.metrics.nodes_created);
}

#[test]
fn test_insert_and_delete_statements() {
    let language = statements();
    let old = document(8);

    let appended = format!("{old}let tail = 1;\n");
    reparse(&language, &old, &appended);

    let prepended = format!("let head = 2;\n{old}");
    reparse(&language, &old, &prepended);

    let removed = old.replacen("let v3 = 3 + x;\n", "", 1);
    reparse(&language, &old, &removed);
}

#[test]
fn test_edits_through_comments() {
    let language = statements();
    let old = "let a = 1; # note\nlet b = 2;";
    reparse(&language, old, "let a = 1; # longer note\nlet b = 2;");
    // Deleting the newline pulls the next statement into the comment.
    reparse(&language, old, "let a = 1; # notelet b = 2;");
}

#[test]
fn test_break_and_repair() {
    let language = statements();
    let valid = "let a = 1;\nlet b = 2;\nlet c = 3;";
    let broken = "let a = 1;\nlet b = ;\nlet c = 3;";

    let (damaged, _, _) = reparse(&language, valid, broken);
    assert!(damaged.has_errors());

    let (repaired, _, _) = reparse(&language, broken, valid);
    assert!(!repaired.has_errors());
}

#[test]
fn test_token_merging_edit() {
    // Removing the space joins two numbers into one.
    let (result, _, _) = reparse(&sums(), "12 34 + 5", "1234 + 5");
    assert_eq!(
        result.tree.to_sexp(),
        "(program (sum (sum (number)) (sum (number))))"
    );
}

#[test]
fn test_appending_at_document_end() {
    let language = sums();
    reparse(&language, "1 + 2", "1 + 23");
    reparse(&language, "1 + 2", "1 + 2 + 3");
    reparse(&language, "1", "");
    reparse(&language, "", "7");
}

#[test]
fn test_reparse_of_repaired_text_matches_fresh() {
    let language = statements();
    for text in ["let a = b c;", "let a = b c d;\nlet e = 1;", "let x = ;\nlet y = (1;"] {
        let parser = Parser::new(language.clone());
        let first = parser.parse(text.as_bytes(), None);
        assert!(first.has_errors());
        let edited = first.tree.edit(&InputEdit::replace(text.as_bytes(), 0, 0, b""));
        let again = parser.parse(text.as_bytes(), Some(&edited));
        assert!(
            again.tree.structurally_equal(&first.tree),
            "{text:?}:\n{}\nvs\n{}",
            again.tree.debug_dump(text.as_bytes()),
            first.tree.debug_dump(text.as_bytes())
        );
    }
    reparse(&language, "let a = b c;\nlet d = 1;", "let a = b c;\nlet d = 12;");
}

#[test]
fn test_old_tree_of_another_language_is_ignored() {
    let text = "1 + 2";
    let other = Parser::new(sums()).parse(text.as_bytes(), None);
    let parser = Parser::new(statements());
    let result = parser.parse(text.as_bytes(), Some(&other.tree));
    assert_eq!(result.metrics.nodes_reused, 0);
    assert!(result.has_errors());
}

#[test]
fn test_edit_marks_damage() {
    let text = "let a = 1;\nlet b = 2;";
    let result = parse(&statements(), text);
    let edit = InputEdit::replace(text.as_bytes(), 19, 20, b"42");
    let edited = result.tree.edit(&edit);

    let root = edited.root_node();
    assert!(root.has_changes());
    let first = root.named_child(0).unwrap();
    assert!(!first.has_changes());
    let second = root.named_child(1).unwrap();
    assert!(second.has_changes());
    assert_eq!(second.byte_range(), TextRange::new(TextSize::from(11), TextSize::from(22)));
}

#[test]
fn test_changed_ranges() {
    let language = statements();
    let parser = Parser::new(language);
    let old = "let a = 1;\nlet b = 2;";
    let new = "let a = 1;\nlet b = (2);";

    let first = parser.parse(old.as_bytes(), None);
    let edited = first.tree.edit(&InputEdit::from_texts(old.as_bytes(), new.as_bytes()));
    let second = parser.parse(new.as_bytes(), Some(&edited));

    let ranges = edited.changed_ranges(&second.tree);
    assert!(!ranges.is_empty());
    let covered = ranges
        .iter()
        .copied()
        .reduce(TextRange::cover)
        .unwrap();
    assert!(covered.contains(TextSize::from(19)));
    assert!(covered.start() >= TextSize::from(11));

    assert!(edited.structurally_equal_in(&second.tree, TextRange::new(TextSize::zero(), TextSize::from(10))));
    assert!(second.tree.changed_ranges(&second.tree).is_empty());
}

#[test]
fn test_same_shape_edit_has_no_changed_ranges() {
    let parser = Parser::new(statements());
    let old = "let a = 1;";
    let new = "let a = 7;";
    let first = parser.parse(old.as_bytes(), None);
    let edited = first.tree.edit(&InputEdit::from_texts(old.as_bytes(), new.as_bytes()));
    let second = parser.parse(new.as_bytes(), Some(&edited));
    assert!(edited.changed_ranges(&second.tree).is_empty());
}

#[test]
fn test_input_edit_helpers() {
    let edit = InputEdit::from_texts(b"let a = 1;", b"let abc = 1;");
    assert_eq!(edit.start_byte, 5);
    assert_eq!(edit.old_end_byte, 5);
    assert_eq!(edit.new_end_byte, 7);
    assert_eq!(edit.map_offset(2), 2);
    assert_eq!(edit.map_offset(9), 11);
    assert!(InputEdit::from_texts(b"same", b"same").is_empty());
}
