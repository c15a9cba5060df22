#![forbid(unsafe_code)]

//! Property tests for undo history invariants.
//!
//! Validates:
//! - A grouped burst of inserts/deletes undoes and redoes byte-for-byte.
//! - Random edit/undo/redo sequences track a reference model of snapshots.
//! - The depth limit is never exceeded.
//! - A fresh edit after undo always empties the redo stack.

use proptest::prelude::*;

use knote_text::{HistoryConfig, RichTextBuffer};

// ============================================================================
// Strategy helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Edit {
    /// Insert text at a position taken modulo `len + 1`.
    Insert(usize, String),
    /// Delete a range whose start is taken modulo `len` and width clamped.
    Delete(usize, usize),
}

#[derive(Debug, Clone)]
enum Op {
    Edit(Edit),
    Undo,
    Redo,
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), "[a-z \n]{1,6}").prop_map(|(p, s)| Edit::Insert(p, s)),
        2 => (any::<usize>(), 1usize..4).prop_map(|(p, w)| Edit::Delete(p, w)),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => edit_strategy().prop_map(Op::Edit),
        2 => Just(Op::Undo),
        2 => Just(Op::Redo),
    ]
}

/// Apply `edit` to the buffer. Returns false when the buffer was empty and
/// the edit was a delete (nothing recorded).
fn apply_edit(buf: &mut RichTextBuffer, edit: &Edit) -> bool {
    let len = buf.len();
    match edit {
        Edit::Insert(p, s) => {
            buf.insert(p % (len + 1), s).unwrap();
            true
        }
        Edit::Delete(p, w) => {
            if len == 0 {
                return false;
            }
            let start = p % len;
            let end = (start + w).min(len);
            buf.delete(start, end).unwrap();
            true
        }
    }
}

// ============================================================================
// Invariant 1: grouped undo/redo round-trip
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn grouped_undo_redo_round_trip(
        seed in "[a-z]{0,12}",
        edits in prop::collection::vec(edit_strategy(), 1..20)
    ) {
        let mut buf = RichTextBuffer::new();
        buf.load_text(&seed);

        buf.begin_user_action();
        for edit in &edits {
            apply_edit(&mut buf, edit);
        }
        buf.end_user_action();
        let after = buf.fragment(0, buf.len()).unwrap();

        if buf.can_undo() {
            prop_assert_eq!(buf.history().undo_depth(), 1);
            buf.undo().unwrap().unwrap();
            prop_assert_eq!(buf.text(), seed.clone());
            buf.redo().unwrap().unwrap();
        }
        prop_assert_eq!(buf.fragment(0, buf.len()).unwrap(), after);
    }
}

// ============================================================================
// Invariant 2: history tracks a snapshot model
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn history_matches_snapshot_model(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut buf = RichTextBuffer::with_history_config(HistoryConfig::unlimited());
        // states[cursor] is the current text; states beyond cursor are redoable
        let mut states = vec![String::new()];
        let mut cursor = 0usize;

        for op in &ops {
            match op {
                Op::Edit(edit) => {
                    if apply_edit(&mut buf, edit) {
                        states.truncate(cursor + 1);
                        states.push(buf.text());
                        cursor += 1;
                        prop_assert!(!buf.can_redo());
                    }
                }
                Op::Undo => {
                    let did = buf.undo().is_some();
                    prop_assert_eq!(did, cursor > 0);
                    if did {
                        cursor -= 1;
                    }
                }
                Op::Redo => {
                    let did = buf.redo().is_some();
                    prop_assert_eq!(did, cursor + 1 < states.len());
                    if did {
                        cursor += 1;
                    }
                }
            }
            prop_assert_eq!(buf.text(), states[cursor].clone());
        }
    }
}

// ============================================================================
// Invariant 3: depth limit
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn depth_never_exceeds_limit(
        max_depth in 1usize..10,
        edits in prop::collection::vec(edit_strategy(), 1..40)
    ) {
        let mut buf = RichTextBuffer::with_history_config(HistoryConfig::new(max_depth, 0));
        for edit in &edits {
            apply_edit(&mut buf, edit);
            prop_assert!(buf.history().undo_depth() <= max_depth);
        }
    }
}
