#![no_main]

use knote_tree::{ClipboardKind, ClipboardPayload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    for kind in [ClipboardKind::Copy, ClipboardKind::CopyTree, ClipboardKind::Cut] {
        // Whatever decodes must survive a second trip unchanged.
        if let Ok(payload) = ClipboardPayload::decode(kind, text) {
            let again = ClipboardPayload::decode(kind, &payload.encode())
                .expect("re-encoded payload must decode");
            assert_eq!(again, payload);
        }
    }
});
