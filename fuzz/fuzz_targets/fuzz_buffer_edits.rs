#![no_main]

use arbitrary::Arbitrary;
use knote_text::{HistoryConfig, RichTextBuffer};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Insert { at: u16, text: String },
    Delete { start: u16, len: u8 },
    Undo,
    Redo,
    Group(Vec<(u16, char)>),
}

fuzz_target!(|ops: Vec<Op>| {
    let mut buf = RichTextBuffer::with_history_config(HistoryConfig::new(16, 4096));
    for op in ops.iter().take(256) {
        let len = buf.len();
        match op {
            Op::Insert { at, text } => {
                let at = usize::from(*at) % (len + 1);
                let _ = buf.insert(at, text);
            }
            Op::Delete { start, len: n } => {
                let start = usize::from(*start) % (len + 1);
                let end = (start + usize::from(*n)).min(len);
                let _ = buf.delete(start, end);
            }
            Op::Undo => {
                let _ = buf.undo();
            }
            Op::Redo => {
                let _ = buf.redo();
            }
            Op::Group(chars) => {
                buf.begin_user_action();
                for (at, c) in chars.iter().take(32) {
                    let at = usize::from(*at) % (buf.len() + 1);
                    let _ = buf.insert(at, &c.to_string());
                }
                buf.end_user_action();
            }
        }

        // Limits hold after every step.
        assert!(buf.history().undo_depth() <= 16);
        assert_eq!(buf.text().chars().count(), buf.len());
    }

    // Undoing everything that is left never fails.
    while let Some(result) = buf.undo() {
        assert!(result.is_ok());
    }
});
