#![no_main]
use kelp::Parser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(language) = kelp_sea::language() else {
        return;
    };
    let result = Parser::new(language).parse(data, None);

    // Every byte belongs to exactly one leaf, in order.
    let mut expected = 0u32;
    for leaf in result.tree.leaves() {
        let range = leaf.byte_range();
        assert_eq!(range.start().into(), expected);
        expected = range.end().into();
    }
    assert_eq!(expected as usize, data.len());
});
