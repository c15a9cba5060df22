#![forbid(unsafe_code)]

//! One undo step made of several primitive edits.

use std::fmt;

use crate::action::{ActionMetadata, EditAction, EditResult, EditTarget};

/// An ordered sequence of [`EditAction`]s undone and redone as a unit.
///
/// Undo reverts actions in strict reverse order so that edits depending on
/// earlier positions (a delete inside freshly inserted text) unwind
/// correctly. Redo re-applies them in recording order.
#[derive(Clone)]
pub struct CompositeAction {
    actions: Vec<EditAction>,
    metadata: ActionMetadata,
    /// True when opened implicitly for a single un-bracketed edit.
    implicit: bool,
    /// Take the description from the first recorded action.
    auto_describe: bool,
}

impl fmt::Debug for CompositeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAction")
            .field("actions_count", &self.actions.len())
            .field("metadata", &self.metadata)
            .field("implicit", &self.implicit)
            .field("auto_describe", &self.auto_describe)
            .finish()
    }
}

impl CompositeAction {
    /// Start an empty composite.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            metadata: ActionMetadata::new(description),
            implicit: false,
            auto_describe: false,
        }
    }

    /// Composite opened by an unnamed group bracket.
    pub(crate) fn grouped() -> Self {
        let mut composite = Self::new("Edit");
        composite.auto_describe = true;
        composite
    }

    /// Composite opened for a single un-bracketed edit.
    pub(crate) fn implicit() -> Self {
        let mut composite = Self::grouped();
        composite.implicit = true;
        composite
    }

    /// Append a recorded action.
    pub fn push(&mut self, action: EditAction) {
        if self.auto_describe && self.actions.is_empty() {
            self.metadata.description = action.description().to_string();
        }
        self.metadata.last_edit = web_time::Instant::now();
        self.actions.push(action);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn actions(&self) -> &[EditAction] {
        &self.actions
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    #[must_use]
    pub fn metadata(&self) -> &ActionMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub(crate) fn last_action_mut(&mut self) -> Option<&mut EditAction> {
        self.actions.last_mut()
    }

    pub(crate) fn touch(&mut self) {
        self.metadata.last_edit = web_time::Instant::now();
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + self.actions.iter().map(EditAction::size_bytes).sum::<usize>()
    }

    /// Revert every action, newest first.
    ///
    /// If an inverse fails, the actions already reverted are re-applied so the
    /// target is left as it was before the call.
    pub fn undo(&self, target: &mut dyn EditTarget) -> EditResult {
        for (done, action) in self.actions.iter().rev().enumerate() {
            if let Err(e) = action.revert(target) {
                let reverted = &self.actions[self.actions.len() - done..];
                for redo in reverted {
                    let _ = redo.apply(target);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Re-apply every action in recording order.
    pub fn redo(&self, target: &mut dyn EditTarget) -> EditResult {
        for (i, action) in self.actions.iter().enumerate() {
            if let Err(e) = action.apply(target) {
                for undo in self.actions[..i].iter().rev() {
                    let _ = undo.revert(target);
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RichTextBuffer;
    use crate::fragment::Fragment;

    #[test]
    fn undo_runs_in_reverse_order() {
        let mut buf = RichTextBuffer::new();
        let mut composite = CompositeAction::new("Replace");

        // insert "hello", then delete "he" from the freshly inserted text
        let insert = EditAction::Insert {
            position: 0,
            content: Fragment::from_text("hello"),
        };
        insert.apply(&mut buf).unwrap();
        composite.push(insert);
        let delete = EditAction::Delete {
            start: 0,
            end: 2,
            removed: Fragment::from_text("he"),
        };
        delete.apply(&mut buf).unwrap();
        composite.push(delete);
        assert_eq!(buf.text(), "llo");

        composite.undo(&mut buf).unwrap();
        assert_eq!(buf.text(), "");

        composite.redo(&mut buf).unwrap();
        assert_eq!(buf.text(), "llo");
    }

    #[test]
    fn failed_undo_rolls_back() {
        let mut buf = RichTextBuffer::new();
        buf.load_text("abc");
        let mut composite = CompositeAction::new("Broken");
        composite.push(EditAction::Insert {
            position: 10,
            content: Fragment::from_text("zz"),
        });
        composite.push(EditAction::Insert {
            position: 0,
            content: Fragment::from_text("a"),
        });

        let err = composite.undo(&mut buf);
        assert!(err.is_err());
        assert_eq!(buf.text(), "abc");
    }

    #[test]
    fn description_follows_first_action() {
        let mut composite = CompositeAction::implicit();
        assert!(composite.is_empty());
        composite.push(EditAction::Delete {
            start: 0,
            end: 1,
            removed: Fragment::from_text("x"),
        });
        assert_eq!(composite.description(), "Delete text");
        assert_eq!(composite.len(), 1);
        assert!(composite.size_bytes() > 0);
    }
}
