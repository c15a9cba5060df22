#![forbid(unsafe_code)]

//! Reversible edit records.
//!
//! Every primitive mutation of a rich-text buffer is captured once as an
//! [`EditAction`]. An action stores enough to be reversed exactly: inserts
//! keep their content, deletes keep the removed fragment with its tags, and
//! tag changes keep the previous presence of the tag per sub-range.
//!
//! # Invariants
//!
//! - `apply()` followed by `revert()` restores the prior content exactly
//! - `revert()` followed by `apply()` restores the edited content exactly
//! - Actions are never mutated after they are committed to history; merging
//!   only happens while the owning composite is still the newest entry
//!
//! # Failure Modes
//!
//! - **State drift**: the target changed behind the history's back, so a
//!   stored range no longer fits. Reported as [`EditError::PositionOutOfBounds`]
//!   or [`EditError::StateDrift`]; the caller decides whether to reset history.

use std::fmt;

use web_time::Instant;

use crate::fragment::{Fragment, TagId, TagRun};

/// Result of applying or reverting an action.
pub type EditResult = Result<(), EditError>;

/// Errors raised by edit targets and actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// Position is past the end of the content.
    PositionOutOfBounds { position: usize, length: usize },
    /// Range is reversed or extends past the end of the content.
    InvalidRange { start: usize, end: usize, length: usize },
    /// Content at a range differs from what the action recorded.
    StateDrift { expected: String, actual: String },
    /// The buffer's insert filter refused an interactive insert.
    InsertRejected { position: usize },
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PositionOutOfBounds { position, length } => {
                write!(f, "position {position} out of bounds (length {length})")
            }
            Self::InvalidRange { start, end, length } => {
                write!(f, "invalid range {start}..{end} (length {length})")
            }
            Self::StateDrift { expected, actual } => {
                write!(f, "state drift: expected '{expected}', got '{actual}'")
            }
            Self::InsertRejected { position } => {
                write!(f, "insert not allowed at position {position}")
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Raw, non-recording mutation surface of an editable buffer.
///
/// History replays actions through this trait; implementations must not
/// record anything themselves.
pub trait EditTarget {
    /// Number of positions in the content.
    fn content_len(&self) -> usize;

    /// Insert `content` before `position`.
    fn insert_fragment(&mut self, position: usize, content: &Fragment) -> EditResult;

    /// Remove `start..end` and return what was there.
    fn remove_range(&mut self, start: usize, end: usize) -> Result<Fragment, EditError>;

    /// Force presence of `tag` over `start..end`.
    fn set_tag(&mut self, start: usize, end: usize, tag: TagId, present: bool) -> EditResult;

    /// Current presence of `tag` over `start..end`, one flag per position.
    fn tag_flags(&self, start: usize, end: usize, tag: TagId) -> Result<Vec<bool>, EditError>;
}

/// Who triggered an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionSource {
    /// Direct user action (typing, paste, toolbar).
    #[default]
    User,
    /// Application code (auto-formatting, link detection).
    Programmatic,
}

/// Metadata shared by a composite and its actions.
#[derive(Debug, Clone)]
pub struct ActionMetadata {
    /// Human-readable description ("Insert text", "Bold").
    pub description: String,
    /// When the first action of the unit was recorded.
    pub created: Instant,
    /// When the most recent action was recorded or merged.
    pub last_edit: Instant,
    pub source: ActionSource,
}

impl ActionMetadata {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            description: description.into(),
            created: now,
            last_edit: now,
            source: ActionSource::User,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: ActionSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.description.len()
    }
}

impl Default for ActionMetadata {
    fn default() -> Self {
        Self::new("Edit")
    }
}

/// Configuration for coalescing consecutive typing into one undo step.
#[derive(Debug, Clone, Copy)]
pub struct MergeConfig {
    /// Whether implicit single-edit groups may merge at all.
    pub enabled: bool,
    /// Maximum time between edits to allow merging (milliseconds).
    pub max_delay_ms: u64,
    /// Whether to merge across word boundaries.
    pub merge_across_words: bool,
    /// Maximum merged content size before forcing a split.
    pub max_merged_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_delay_ms: 500,
            merge_across_words: false,
            max_merged_size: 1024,
        }
    }
}

/// One primitive, reversible buffer mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    /// Text or object inserted at `position`.
    Insert { position: usize, content: Fragment },
    /// `start..end` removed; `removed` holds the exact content with tags.
    Delete {
        start: usize,
        end: usize,
        removed: Fragment,
    },
    /// `tag` applied over `start..end`; `previous` is the prior state.
    ApplyTag {
        start: usize,
        end: usize,
        tag: TagId,
        previous: Vec<TagRun>,
    },
    /// `tag` removed over `start..end`; `previous` is the prior state.
    RemoveTag {
        start: usize,
        end: usize,
        tag: TagId,
        previous: Vec<TagRun>,
    },
}

impl EditAction {
    /// Short description for history display.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "Insert text",
            Self::Delete { .. } => "Delete text",
            Self::ApplyTag { .. } => "Apply formatting",
            Self::RemoveTag { .. } => "Remove formatting",
        }
    }

    /// Number of positions touched.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Insert { content, .. } => content.len(),
            Self::Delete { start, end, .. }
            | Self::ApplyTag { start, end, .. }
            | Self::RemoveTag { start, end, .. } => end - start,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes for history budgeting.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Self::Insert { content, .. } => content.size_bytes(),
                Self::Delete { removed, .. } => removed.size_bytes(),
                Self::ApplyTag { previous, .. } | Self::RemoveTag { previous, .. } => {
                    previous.len() * std::mem::size_of::<TagRun>()
                }
            }
    }

    /// Perform the action against `target`.
    pub fn apply(&self, target: &mut dyn EditTarget) -> EditResult {
        match self {
            Self::Insert { position, content } => target.insert_fragment(*position, content),
            Self::Delete {
                start,
                end,
                removed,
            } => {
                let actual = target.remove_range(*start, *end)?;
                if actual.text() != removed.text() {
                    // put it back before reporting
                    target.insert_fragment(*start, &actual)?;
                    return Err(EditError::StateDrift {
                        expected: removed.text(),
                        actual: actual.text(),
                    });
                }
                Ok(())
            }
            Self::ApplyTag { start, end, tag, .. } => target.set_tag(*start, *end, *tag, true),
            Self::RemoveTag { start, end, tag, .. } => target.set_tag(*start, *end, *tag, false),
        }
    }

    /// Reverse the action against `target`.
    pub fn revert(&self, target: &mut dyn EditTarget) -> EditResult {
        match self {
            Self::Insert { position, content } => {
                target.remove_range(*position, position + content.len())?;
                Ok(())
            }
            Self::Delete { start, removed, .. } => target.insert_fragment(*start, removed),
            Self::ApplyTag { tag, previous, .. } | Self::RemoveTag { tag, previous, .. } => {
                for run in previous {
                    target.set_tag(run.start, run.end, *tag, run.present)?;
                }
                Ok(())
            }
        }
    }

    /// Whether `next` directly continues this action (typing or repeated
    /// backspace/delete) and may be folded into it.
    #[must_use]
    pub fn can_merge(&self, next: &EditAction, config: &MergeConfig) -> bool {
        match (self, next) {
            (
                Self::Insert { position, content },
                Self::Insert {
                    position: next_pos,
                    content: next_content,
                },
            ) => {
                *next_pos == position + content.len()
                    && content.len() + next_content.len() <= config.max_merged_size
                    && (config.merge_across_words || !content.ends_with_whitespace())
                    && !next_content.contains_newline()
            }
            (
                Self::Delete { start, removed, .. },
                Self::Delete {
                    start: next_start,
                    end: next_end,
                    removed: next_removed,
                },
            ) => {
                let is_backspace = *next_end == *start;
                let is_forward = *next_start == *start;
                (is_backspace || is_forward)
                    && removed.len() + next_removed.len() <= config.max_merged_size
            }
            _ => false,
        }
    }

    /// Fold `next` into this action. Returns false if the shapes differ.
    pub fn accept_merge(&mut self, next: &EditAction) -> bool {
        match (self, next) {
            (
                Self::Insert { content, .. },
                Self::Insert {
                    content: next_content,
                    ..
                },
            ) => {
                content.extend(next_content);
                true
            }
            (
                Self::Delete {
                    start,
                    end,
                    removed,
                },
                Self::Delete {
                    start: next_start,
                    end: next_end,
                    removed: next_removed,
                },
            ) => {
                if *next_end == *start {
                    // backspace: the new deletion sits before ours
                    let mut merged = next_removed.clone();
                    merged.extend(removed);
                    *removed = merged;
                    *start = *next_start;
                    *end = *start + removed.len();
                    true
                } else if *next_start == *start {
                    removed.extend(next_removed);
                    *end = *start + removed.len();
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Cell;

    /// Minimal target: a vector of cells.
    #[derive(Default)]
    struct Cells(Vec<Cell>);

    impl EditTarget for Cells {
        fn content_len(&self) -> usize {
            self.0.len()
        }

        fn insert_fragment(&mut self, position: usize, content: &Fragment) -> EditResult {
            if position > self.0.len() {
                return Err(EditError::PositionOutOfBounds {
                    position,
                    length: self.0.len(),
                });
            }
            self.0
                .splice(position..position, content.cells().iter().cloned());
            Ok(())
        }

        fn remove_range(&mut self, start: usize, end: usize) -> Result<Fragment, EditError> {
            if start > end || end > self.0.len() {
                return Err(EditError::InvalidRange {
                    start,
                    end,
                    length: self.0.len(),
                });
            }
            Ok(Fragment::from_cells(self.0.drain(start..end).collect()))
        }

        fn set_tag(&mut self, start: usize, end: usize, tag: TagId, present: bool) -> EditResult {
            for cell in &mut self.0[start..end] {
                if present {
                    cell.tags.insert(tag);
                } else {
                    cell.tags.remove(&tag);
                }
            }
            Ok(())
        }

        fn tag_flags(&self, start: usize, end: usize, tag: TagId) -> Result<Vec<bool>, EditError> {
            Ok(self.0[start..end].iter().map(|c| c.tags.contains(&tag)).collect())
        }
    }

    fn text(cells: &Cells) -> String {
        Fragment::from_cells(cells.0.clone()).text()
    }

    #[test]
    fn insert_apply_revert() {
        let mut target = Cells::default();
        let action = EditAction::Insert {
            position: 0,
            content: Fragment::from_text("hello"),
        };
        action.apply(&mut target).unwrap();
        assert_eq!(text(&target), "hello");
        action.revert(&mut target).unwrap();
        assert_eq!(text(&target), "");
    }

    #[test]
    fn delete_revert_restores_tags() {
        let mut target = Cells::default();
        target
            .insert_fragment(0, &Fragment::from_text("abc"))
            .unwrap();
        target.set_tag(1, 2, TagId(3), true).unwrap();

        let removed = target.remove_range(0, 3).unwrap();
        let action = EditAction::Delete {
            start: 0,
            end: 3,
            removed,
        };
        action.revert(&mut target).unwrap();
        assert_eq!(target.tag_flags(0, 3, TagId(3)).unwrap(), vec![false, true, false]);
    }

    #[test]
    fn tag_revert_uses_previous_runs() {
        let mut target = Cells::default();
        target
            .insert_fragment(0, &Fragment::from_text("abcd"))
            .unwrap();
        target.set_tag(0, 1, TagId(1), true).unwrap();

        let flags = target.tag_flags(0, 4, TagId(1)).unwrap();
        let action = EditAction::ApplyTag {
            start: 0,
            end: 4,
            tag: TagId(1),
            previous: crate::fragment::runs_from_flags(0, &flags),
        };
        action.apply(&mut target).unwrap();
        assert_eq!(target.tag_flags(0, 4, TagId(1)).unwrap(), vec![true; 4]);

        action.revert(&mut target).unwrap();
        assert_eq!(
            target.tag_flags(0, 4, TagId(1)).unwrap(),
            vec![true, false, false, false]
        );
    }

    #[test]
    fn delete_detects_drift() {
        let mut target = Cells::default();
        target
            .insert_fragment(0, &Fragment::from_text("xyz"))
            .unwrap();
        let action = EditAction::Delete {
            start: 0,
            end: 3,
            removed: Fragment::from_text("abc"),
        };
        let err = action.apply(&mut target).unwrap_err();
        assert!(matches!(err, EditError::StateDrift { .. }));
        assert_eq!(text(&target), "xyz");
    }

    #[test]
    fn insert_merge_consecutive() {
        let config = MergeConfig::default();
        let mut first = EditAction::Insert {
            position: 0,
            content: Fragment::from_text("a"),
        };
        let next = EditAction::Insert {
            position: 1,
            content: Fragment::from_text("b"),
        };
        assert!(first.can_merge(&next, &config));
        assert!(first.accept_merge(&next));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn insert_no_merge_after_space() {
        let config = MergeConfig::default();
        let first = EditAction::Insert {
            position: 0,
            content: Fragment::from_text("a "),
        };
        let next = EditAction::Insert {
            position: 2,
            content: Fragment::from_text("b"),
        };
        assert!(!first.can_merge(&next, &config));
    }

    #[test]
    fn delete_merge_backspace_prepends() {
        let mut first = EditAction::Delete {
            start: 4,
            end: 5,
            removed: Fragment::from_text("b"),
        };
        let next = EditAction::Delete {
            start: 3,
            end: 4,
            removed: Fragment::from_text("a"),
        };
        assert!(first.can_merge(&next, &MergeConfig::default()));
        assert!(first.accept_merge(&next));
        match first {
            EditAction::Delete { start, end, removed } => {
                assert_eq!((start, end), (3, 5));
                assert_eq!(removed.text(), "ab");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn error_display() {
        let err = EditError::PositionOutOfBounds {
            position: 10,
            length: 5,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('5'));
    }
}
