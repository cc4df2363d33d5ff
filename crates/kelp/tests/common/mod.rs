//! Grammars and helpers shared by the integration tests.

#![allow(dead_code)]

use kelp::generate::{
    GrammarBuilder, blank, choice, lit, optional, pat, prec_dynamic, prec_left, repeat, seq, sym,
    token,
};
use kelp::{Language, ParseResult, Parser, Tree};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn load(builder: &GrammarBuilder) -> Language {
    let tables = builder.build().expect("grammar should generate");
    Language::from_tables(tables).expect("generated tables should load")
}

/// `1 + 2 + 3`: left-associative sums separated by whitespace.
pub fn sums_grammar() -> GrammarBuilder {
    GrammarBuilder::new("sums")
        .rule("program", repeat(sym("sum")))
        .rule(
            "sum",
            choice([
                sym("number"),
                prec_left(1, seq([sym("sum"), lit("+"), sym("sum")])),
            ]),
        )
        .rule("number", pat("[0-9]+"))
        .extra(pat(r"\s+"))
}

pub fn sums() -> Language {
    load(&sums_grammar())
}

/// Sums without any precedence: every chain of `+` is ambiguous.
pub fn ambiguous_sums() -> Language {
    load(
        &GrammarBuilder::new("ambiguous_sums")
            .rule("program", sym("expr"))
            .rule(
                "expr",
                choice([sym("number"), seq([sym("expr"), lit("+"), sym("expr")])]),
            )
            .rule("number", pat("[0-9]+"))
            .extra(pat(r"\s+"))
            .conflict(["expr"]),
    )
}

/// `f(x)` is both a `call` and a `cast`; `cast_precedence` is the dynamic
/// precedence of the cast reading.
pub fn calls(cast_precedence: i32) -> Language {
    load(
        &GrammarBuilder::new("calls")
            .rule("program", sym("expr"))
            .rule("expr", choice([sym("call"), sym("cast"), sym("name")]))
            .rule(
                "call",
                seq([sym("name"), lit("("), sym("name"), lit(")")]),
            )
            .rule(
                "cast",
                prec_dynamic(
                    cast_precedence,
                    seq([sym("name"), lit("("), sym("name"), lit(")")]),
                ),
            )
            .rule("name", pat("[a-z]+"))
            .extra(pat(r"\s+"))
            .conflict(["call", "cast"]),
    )
}

/// `let x = a + 1 * b; # comment` statements with keywords.
pub fn statements_grammar() -> GrammarBuilder {
    GrammarBuilder::new("statements")
        .rule("program", repeat(sym("statement")))
        .rule(
            "statement",
            seq([
                lit("let"),
                sym("identifier"),
                lit("="),
                sym("expression"),
                lit(";"),
            ]),
        )
        .rule(
            "expression",
            choice([
                sym("identifier"),
                sym("number"),
                prec_left(1, seq([sym("expression"), lit("+"), sym("expression")])),
                prec_left(2, seq([sym("expression"), lit("*"), sym("expression")])),
                seq([lit("("), sym("expression"), lit(")")]),
            ]),
        )
        .rule("identifier", pat("[a-z_][a-z0-9_]*"))
        .rule("number", pat("[0-9]+"))
        .rule("comment", token(seq([lit("#"), pat("[^\n]*")])))
        .extra(sym("comment"))
        .extra(pat(r"\s+"))
        .word("identifier")
}

pub fn statements() -> Language {
    load(&statements_grammar())
}

/// Lists with optional trailing commas: `[a, b,]`, `[]`.
pub fn lists() -> Language {
    load(
        &GrammarBuilder::new("lists")
            .rule("list", seq([lit("["), optional(sym("items")), lit("]")]))
            .rule(
                "items",
                seq([
                    sym("item"),
                    repeat(seq([lit(","), sym("item")])),
                    choice([lit(","), blank()]),
                ]),
            )
            .rule("item", choice([sym("word"), sym("list")]))
            .rule("word", pat("[a-z]+"))
            .extra(pat(r"\s+")),
    )
}

pub fn parse(language: &Language, text: &str) -> ParseResult {
    Parser::new(language.clone()).parse(text.as_bytes(), None)
}

/// Leaves are contiguous and cover exactly `len` bytes.
pub fn assert_leaves_partition(tree: &Tree, len: usize) {
    let mut expected = 0u32;
    for leaf in tree.leaves() {
        let range = leaf.byte_range();
        assert_eq!(
            range.start().into(),
            expected,
            "gap or overlap before `{}` at {range}",
            leaf.kind()
        );
        expected = range.end().into();
    }
    assert_eq!(expected as usize, len, "leaves do not cover the input");
    assert_eq!(tree.text_len().to_usize(), len);
}

/// Kinds of the root's named children, in order.
pub fn named_kinds(tree: &Tree) -> Vec<String> {
    tree.root_node()
        .named_children()
        .iter()
        .map(|child| child.kind().to_owned())
        .collect()
}
