//! # Sea grammar
//!
//! The grammar of the Sea programming language for the [`kelp`] parsing
//! engine.
//!
//! The grammar is compiled on first use and cached for the lifetime of the
//! process; every call to [`language`] after the first is a clone of an
//! `Arc`.
//!
//! ```rust
//! let language = kelp_sea::language().unwrap();
//! let parser = kelp::Parser::new(language);
//! let result = parser.parse(b"fun main() { ret 0 }", None);
//! assert!(!result.has_errors());
//! assert_eq!(result.tree.root_node().kind(), "source_file");
//! ```
//!
//! ## Node kinds
//!
//! Top level items are `top_use`, `top_fun`, `top_rec`, `top_def`,
//! `top_tag`, `top_tag_rec`, `top_pragma`, `raw` and `hashtag`. Statements
//! are `statement_ret`, `statement_if`, `statement_switch` and
//! `statement_for`; any expression may also stand as a statement.
//! Expression nodes are named `expr_*`, `unary_expression` and
//! `binary_expression`. `_top_level_statement`, `_statement` and
//! `_expression` are hidden, so their children appear directly under the
//! enclosing node.

use kelp::generate::{
    Expr, GrammarBuilder, choice, lit, optional, pat, prec, prec_left, prec_right, repeat,
    repeat1, seq, sym, token,
};
use kelp::{GrammarError, Language, LoadError, Parser};
use std::sync::OnceLock;
use thiserror::Error;

/// Failure to produce the Sea language.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to generate the sea grammar: {0}")]
    Grammar(#[from] GrammarError),
    #[error("failed to load the sea grammar: {0}")]
    Load(#[from] LoadError),
}

/// Precedence of prefix and postfix operators.
const UNARY: i32 = 100_000;

/// Comma separated expressions, possibly none.
fn arguments() -> Expr {
    optional(seq([
        sym("_expression"),
        repeat(seq([lit(","), sym("_expression")])),
    ]))
}

fn binary(level: i32, operator: &str, right: bool) -> Expr {
    let body = seq([sym("_expression"), lit(operator), sym("_expression")]);
    if right {
        prec_right(level, body)
    } else {
        prec_left(level, body)
    }
}

/// The Sea grammar.
#[must_use]
pub fn grammar() -> GrammarBuilder {
    GrammarBuilder::new("sea")
        .extra(sym("comment"))
        .extra(pat(r"\s+"))
        .conflict(["unary_expression"])
        .conflict(["expr_identifier", "expr_invoke"])
        .conflict(["binary_expression", "expr_var"])
        .conflict(["binary_expression", "expr_let"])
        .conflict(["statement_if"])
        .conflict(["_statement", "binary_expression"])
        .conflict(["statement_ret", "binary_expression"])
        .word("identifier")
        .rule("source_file", repeat(sym("_top_level_statement")))
        .rule(
            "comment",
            token(choice([
                seq([lit("//"), pat(r"[^\n]*")]),
                pat(r"/\*([^*]|\*+[^*/])*\*+/"),
            ])),
        )
        // Top level
        .rule(
            "_top_level_statement",
            choice([
                sym("top_use"),
                sym("top_fun"),
                sym("top_rec"),
                sym("top_def"),
                sym("top_tag"),
                sym("top_tag_rec"),
                sym("top_pragma"),
                sym("raw"),
                sym("hashtag"),
            ]),
        )
        .rule(
            "top_use",
            seq([
                lit("use"),
                repeat(sym("identifier")),
                repeat(seq([lit("/"), sym("identifier")])),
                optional(seq([lit("["), repeat(sym("identifier")), lit("]")])),
            ]),
        )
        .rule(
            "top_fun",
            seq([
                lit("fun"),
                sym("identifier"),
                sym("definition_list"),
                optional(seq([lit(":"), sym("type")])),
                sym("block"),
            ]),
        )
        .rule(
            "top_rec",
            seq([lit("rec"), sym("identifier"), sym("definition_list")]),
        )
        .rule(
            "top_def",
            seq([lit("def"), sym("identifier"), lit("="), sym("type")]),
        )
        .rule(
            "top_tag",
            seq([
                lit("tag"),
                sym("identifier"),
                lit("("),
                repeat(seq([sym("identifier"), optional(lit(","))])),
                lit(")"),
            ]),
        )
        .rule(
            "top_tag_rec",
            seq([
                lit("tag"),
                lit("rec"),
                sym("identifier"),
                lit("("),
                repeat(seq([sym("identifier"), optional(sym("definition_list"))])),
                lit(")"),
            ]),
        )
        .rule(
            "top_pragma",
            seq([
                lit("pragma"),
                sym("identifier"),
                lit("("),
                arguments(),
                lit(")"),
            ]),
        )
        // Statements
        .rule(
            "_statement",
            choice([
                sym("statement_ret"),
                sym("statement_if"),
                sym("statement_switch"),
                sym("statement_for"),
                sym("_expression"),
                sym("raw"),
            ]),
        )
        .rule("statement_ret", seq([lit("ret"), sym("_expression")]))
        .rule(
            "statement_if",
            seq([
                lit("if"),
                sym("_expression"),
                sym("block"),
                optional(seq([
                    lit("else"),
                    choice([sym("statement_if"), sym("block")]),
                ])),
            ]),
        )
        .rule(
            "statement_switch",
            seq([
                lit("switch"),
                sym("_expression"),
                lit("{"),
                repeat(seq([
                    optional(lit("fall")),
                    lit("case"),
                    sym("_expression"),
                    sym("block"),
                ])),
                lit("}"),
            ]),
        )
        .rule(
            "statement_for",
            seq([
                lit("for"),
                choice([
                    seq([
                        sym("_expression"),
                        lit(";"),
                        sym("_expression"),
                        lit(";"),
                        sym("_expression"),
                    ]),
                    sym("_expression"),
                    seq([
                        sym("identifier"),
                        lit("in"),
                        sym("_expression"),
                        lit("to"),
                        sym("_expression"),
                    ]),
                ]),
                sym("block"),
            ]),
        )
        // Expressions
        .rule(
            "_expression",
            choice([
                sym("expr_group"),
                sym("expr_number"),
                sym("expr_string"),
                sym("expr_c_string"),
                sym("expr_char"),
                sym("expr_bool"),
                sym("expr_identifier"),
                sym("expr_new"),
                sym("expr_invoke"),
                sym("expr_list"),
                sym("expr_var"),
                sym("expr_let"),
                sym("unary_expression"),
                sym("binary_expression"),
            ]),
        )
        .rule("expr_group", seq([lit("("), sym("_expression"), lit(")")]))
        .rule("expr_number", sym("number"))
        .rule("expr_string", sym("string"))
        .rule("expr_c_string", sym("c_string"))
        .rule("expr_char", sym("char"))
        .rule("expr_bool", choice([lit("true"), lit("false")]))
        .rule("expr_identifier", sym("identifier"))
        .rule(
            "expr_new",
            seq([
                lit("new"),
                sym("identifier"),
                lit("("),
                arguments(),
                lit(")"),
            ]),
        )
        .rule("expr_list", seq([lit("["), arguments(), lit("]")]))
        .rule(
            "expr_invoke",
            seq([sym("identifier"), lit("("), arguments(), lit(")")]),
        )
        .rule("expr_var", binding("var"))
        .rule("expr_let", binding("let"))
        .rule(
            "unary_expression",
            prec(
                UNARY,
                choice([
                    seq([lit("-"), sym("_expression")]),
                    seq([lit("not"), sym("_expression")]),
                    seq([lit("ref"), sym("_expression")]),
                    seq([sym("_expression"), lit("^")]),
                ]),
            ),
        )
        .rule(
            "binary_expression",
            choice([
                binary(0, "=", true),
                binary(1, ">", false),
                binary(1, ">=", false),
                binary(1, "<", false),
                binary(2, "<=", false),
                binary(3, "==", false),
                binary(3, "!=", false),
                binary(4, "and", false),
                binary(4, "or", false),
                binary(5, "+", true),
                binary(5, "-", true),
                binary(6, "*", false),
                binary(6, "/", false),
                binary(6, "%", false),
                binary(7, ".", true),
                binary(7, "as", true),
                seq([
                    sym("_expression"),
                    lit("["),
                    sym("_expression"),
                    lit("]"),
                ]),
            ]),
        )
        // Misc
        .rule(
            "block",
            choice([
                seq([lit("{"), repeat(sym("_statement")), lit("}")]),
                seq([lit("->"), sym("_statement")]),
            ]),
        )
        .rule(
            "hashtag",
            seq([
                lit("#"),
                choice([
                    sym("identifier"),
                    seq([
                        lit("("),
                        repeat(seq([
                            sym("identifier"),
                            repeat(seq([lit(","), sym("identifier")])),
                        ])),
                        lit(")"),
                    ]),
                ]),
            ]),
        )
        .rule(
            "raw",
            seq([
                lit("raw"),
                lit("["),
                // One level of nested brackets fits inside a raw block.
                repeat1(choice([pat(r"\[[^\[\]\n]*\]"), pat(r"[^\[\]]+")])),
                lit("]"),
            ]),
        )
        .rule(
            "type",
            choice([
                seq([
                    repeat(lit("^")),
                    sym("identifier"),
                    repeat(seq([lit("["), optional(sym("number")), lit("]")])),
                ]),
                seq([
                    lit("fun"),
                    lit("("),
                    repeat(sym("type")),
                    lit(")"),
                    optional(seq([lit(":"), sym("type")])),
                ]),
            ]),
        )
        .rule("identifier", pat(r"[a-zA-Z_$][a-zA-Z_$0-9]*"))
        .rule("number", pat(r"[0-9_]+(\.[0-9_]+)?"))
        .rule("string", pat(r#""(?:[^"\\\n]|\\.)*""#))
        .rule("c_string", pat(r#"c"(?:[^"\\\n]|\\.)*""#))
        .rule("char", pat(r"`[^`\n]*`"))
        .rule(
            "definition_list",
            seq([
                lit("("),
                optional(seq([
                    sym("identifier"),
                    lit(":"),
                    sym("type"),
                    repeat(seq([
                        lit(","),
                        sym("identifier"),
                        lit(":"),
                        sym("type"),
                    ])),
                ])),
                lit(")"),
            ]),
        )
}

/// `var name: type = value` and `let name: type = value`.
fn binding(keyword: &str) -> Expr {
    seq([
        lit(keyword),
        sym("identifier"),
        optional(seq([lit(":"), sym("type")])),
        lit("="),
        sym("_expression"),
    ])
}

/// The compiled tables of [`grammar`], encoded once per process.
///
/// # Errors
///
/// Returns an error if the grammar fails to compile or encode.
pub fn language_blob() -> Result<&'static [u8], Error> {
    static BLOB: OnceLock<Vec<u8>> = OnceLock::new();
    if let Some(blob) = BLOB.get() {
        return Ok(blob);
    }
    let blob = grammar().build_blob()?;
    log::debug!("built sea language blob ({} bytes)", blob.len());
    Ok(BLOB.get_or_init(|| blob))
}

/// The Sea language, loaded once per process.
///
/// # Errors
///
/// Returns an error if the grammar fails to compile or its blob fails to
/// load. Failures are not cached.
pub fn language() -> Result<Language, Error> {
    static LANGUAGE: OnceLock<Language> = OnceLock::new();
    if let Some(language) = LANGUAGE.get() {
        return Ok(language.clone());
    }
    let language = Language::from_blob(language_blob()?)?;
    Ok(LANGUAGE.get_or_init(|| language).clone())
}

/// A parser for Sea with the default configuration.
///
/// # Errors
///
/// Fails like [`language`].
pub fn parser() -> Result<Parser, Error> {
    Ok(Parser::new(language()?))
}
