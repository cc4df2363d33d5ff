#![no_main]
use kelp::{InputEdit, Parser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Layout: two offsets, then the old text and the replacement split at
    // the first NUL byte.
    let [a, b, rest @ ..] = data else {
        return;
    };
    let (old, insert) = match rest.iter().position(|&byte| byte == 0) {
        Some(split) => (&rest[..split], &rest[split + 1..]),
        None => (rest, &[][..]),
    };
    let Ok(language) = kelp_sea::language() else {
        return;
    };

    let start = usize::from(*a.min(b)).min(old.len());
    let end = usize::from(*a.max(b)).min(old.len());
    let mut new = old[..start].to_vec();
    new.extend_from_slice(insert);
    new.extend_from_slice(&old[end..]);

    let parser = Parser::new(language);
    let first = parser.parse(old, None);
    let edited = first.tree.edit(&InputEdit::replace(old, start, end, insert));
    let incremental = parser.parse(&new, Some(&edited));
    let fresh = parser.parse(&new, None);

    assert!(
        incremental.tree.structurally_equal(&fresh.tree),
        "incremental and full parse disagree"
    );
});
