#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_bridge::core::codec::decode;
use packet_bridge::core::format::parse;

// First byte picks a specifier, the rest is the payload
const SPECS: &[&str] = &["i", "S", "[i]", "{i:S}", "b(hH)[{L:d}]", "[[S]]", "(fS)[(bcC)]"];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let Ok(descriptors) = parse(SPECS[selector as usize % SPECS.len()]) else {
        return;
    };
    if let Ok((_, consumed)) = decode(&descriptors, payload) {
        assert!(consumed <= payload.len());
    }
});
