#![no_main]

use knote_tree::dnd::percent_decode;
use knote_tree::parse_uri_list;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Never panics; at most one path per line.
    let paths = parse_uri_list(text);
    assert!(paths.len() <= text.lines().count());

    // Decoding never grows the input.
    let decoded = percent_decode(text);
    if !decoded.contains('\u{FFFD}') {
        assert!(decoded.len() <= text.len());
    }

    // Text without escapes decodes to itself.
    if !text.contains('%') {
        assert_eq!(decoded, text);
    }
});
