//! Helpers shared by the Sea integration tests.

#![allow(dead_code)]

use kelp::{Language, ParseResult, Parser, Tree};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn sea() -> Language {
    kelp_sea::language().expect("sea grammar should load")
}

pub fn parse(text: &str) -> ParseResult {
    Parser::new(sea()).parse(text.as_bytes(), None)
}

/// Parse `text` and fail with the tree dump if it contains errors.
pub fn parse_clean(text: &str) -> ParseResult {
    let result = parse(text);
    assert!(
        !result.has_errors(),
        "unexpected errors in {text:?}:\n{}",
        result.tree.debug_dump(text.as_bytes())
    );
    assert_leaves_partition(&result.tree, text.len());
    result
}

/// Leaves are contiguous and cover exactly `len` bytes.
pub fn assert_leaves_partition(tree: &Tree, len: usize) {
    let mut expected = 0u32;
    for leaf in tree.leaves() {
        let range = leaf.byte_range();
        assert_eq!(range.start().into(), expected, "gap or overlap at {range}");
        expected = range.end().into();
    }
    assert_eq!(expected as usize, len, "leaves do not cover the input");
}

/// Kinds of the root's named children, in order.
pub fn named_kinds(tree: &Tree) -> Vec<String> {
    tree.root_node()
        .named_children()
        .iter()
        .map(|child| child.kind().to_owned())
        .collect()
}

/// A program touching every top level form.
pub const PROGRAM: &str = r#"// Sample program
use std/io [print]

#inline
fun add(a: i32, b: i32): i32 -> ret a + b

rec Point (x: f32, y: f32)

tag Color (Red, Green, Blue)

tag rec Shape (Circle (r: f32) Square (side: f32))

def Bytes = ^u8[16]

def Callback = fun(i32 ^u8): i32

pragma link("c", 2)

/* entry point */
fun main() {
    let count: i32 = 0
    var total = 1_000.5
    for i in 0 to 10 {
        count = count + i * 2
    }
    for let j = 0; j < 3; j = j + 1 -> print(j)
    if count >= 10 and not done {
        ret count
    } else if count == 0 {
        ret -1
    } else {
        print("small\n")
    }
    switch count {
        case 1 -> ret 1
        fall case 2 { print(c"two") }
    }
    let p = new Point(1, 2)
    let xs = [1, 2, 3]
    let first = xs[0]
    p.x = `a` as f32
    ref p
    p^
    ret true
}

raw [ int legacy = table[1]; ]
"#;
