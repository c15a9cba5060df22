#![forbid(unsafe_code)]

//! Editable rich-text content with recorded history.
//!
//! [`RichTextBuffer`] owns its cells and an [`UndoStack`]. Every interactive
//! mutation goes through one of the editing methods, which apply the change,
//! record exactly one [`EditAction`] for it and publish a [`BufferEvent`].
//!
//! Two counters make re-entrant use safe:
//!
//! - the **user action** depth brackets a burst of edits into one undo step
//! - the **non-interactive** depth suspends recording entirely (undo/redo
//!   replay, bulk load, programmatic fix-ups)
//!
//! # Example
//!
//! ```
//! use knote_text::RichTextBuffer;
//!
//! let mut buf = RichTextBuffer::new();
//! buf.insert(0, "hello").unwrap();
//! buf.replace(0, 2, "HI").unwrap();
//! assert_eq!(buf.text(), "HIllo");
//!
//! buf.undo();
//! assert_eq!(buf.text(), "hello");
//! ```

use std::collections::BTreeSet;
use std::fmt;

use knote_core::Signal;
use tracing::{trace, warn};

use crate::action::{EditAction, EditError, EditResult, EditTarget};
use crate::fragment::{Cell, Fragment, ObjectId, TagId, runs_from_flags};
use crate::history::{HistoryConfig, UndoStack};

/// What kind of mutation produced a [`BufferEvent::Changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
    Format,
    Load,
    Undo,
    Redo,
}

/// Notifications published by a [`RichTextBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEvent {
    Changed { kind: ChangeKind },
    /// An insert introduced a line break inside `start..end`.
    ParagraphSplit { start: usize, end: usize },
    /// A delete removed a line break that lay inside `start..end`.
    ParagraphMerge { start: usize, end: usize },
    /// The outermost user action is about to close.
    EndingUserAction,
    HistoryChanged { can_undo: bool, can_redo: bool },
}

type InsertFilter = Box<dyn Fn(usize, &Fragment) -> bool>;

/// Rich-text content plus its undo history.
pub struct RichTextBuffer {
    cells: Vec<Cell>,
    history: UndoStack,
    noninteractive: usize,
    user_action_depth: usize,
    ending_user_action: bool,
    modified: bool,
    insert_filter: Option<InsertFilter>,
    last_history: (bool, bool),
    events: Signal<BufferEvent>,
}

impl fmt::Debug for RichTextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RichTextBuffer")
            .field("len", &self.cells.len())
            .field("history", &self.history)
            .field("noninteractive", &self.noninteractive)
            .field("user_action_depth", &self.user_action_depth)
            .field("modified", &self.modified)
            .field("has_insert_filter", &self.insert_filter.is_some())
            .finish()
    }
}

impl Default for RichTextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RichTextBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_config(HistoryConfig::default())
    }

    #[must_use]
    pub fn with_history_config(config: HistoryConfig) -> Self {
        Self {
            cells: Vec::new(),
            history: UndoStack::new(config),
            noninteractive: 0,
            user_action_depth: 0,
            ending_user_action: false,
            modified: false,
            insert_filter: None,
            last_history: (false, false),
            events: Signal::new(),
        }
    }

    /// Event stream for this buffer.
    #[must_use]
    pub fn events(&self) -> &Signal<BufferEvent> {
        &self.events
    }

    #[must_use]
    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    /// Veto interactive inserts. The filter sees the position and content.
    pub fn set_insert_filter(&mut self, filter: impl Fn(usize, &Fragment) -> bool + 'static) {
        self.insert_filter = Some(Box::new(filter));
    }

    pub fn clear_insert_filter(&mut self) {
        self.insert_filter = None;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Plain text; embedded objects render as U+FFFC.
    #[must_use]
    pub fn text(&self) -> String {
        self.cells.iter().map(|c| c.piece.as_char()).collect()
    }

    /// Copy of `start..end` with its tags.
    pub fn fragment(&self, start: usize, end: usize) -> Result<Fragment, EditError> {
        self.check_range(start, end)?;
        Ok(Fragment::from_cells(self.cells[start..end].to_vec()))
    }

    /// Tags applied at `position`, if in range.
    #[must_use]
    pub fn tags_at(&self, position: usize) -> Option<&BTreeSet<TagId>> {
        self.cells.get(position).map(|c| &c.tags)
    }

    /// True when content changed since load or the last `set_modified(false)`.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.noninteractive == 0
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ========================================================================
    // Editing
    // ========================================================================

    pub fn insert(&mut self, position: usize, text: &str) -> EditResult {
        self.insert_fragment(position, &Fragment::from_text(text))
    }

    pub fn insert_object(&mut self, position: usize, object: ObjectId) -> EditResult {
        self.insert_fragment(position, &Fragment::object(object))
    }

    /// Insert `content` before `position`, keeping its tags.
    pub fn insert_fragment(&mut self, position: usize, content: &Fragment) -> EditResult {
        if position > self.cells.len() {
            return Err(EditError::PositionOutOfBounds {
                position,
                length: self.cells.len(),
            });
        }
        if content.is_empty() {
            return Ok(());
        }
        self.check_filter(position, content)?;

        self.splice_in(position, content);
        self.record(EditAction::Insert {
            position,
            content: content.clone(),
        });
        self.events.emit(&BufferEvent::Changed {
            kind: ChangeKind::Insert,
        });
        if content.contains_newline() {
            self.events.emit(&BufferEvent::ParagraphSplit {
                start: position,
                end: position + content.len(),
            });
        }
        self.after_edit();
        Ok(())
    }

    /// Remove `start..end`.
    pub fn delete(&mut self, start: usize, end: usize) -> EditResult {
        self.check_range(start, end)?;
        if start == end {
            return Ok(());
        }
        let removed = Fragment::from_cells(self.cells.drain(start..end).collect());
        let merged = removed.contains_newline();
        self.record(EditAction::Delete {
            start,
            end,
            removed,
        });
        self.events.emit(&BufferEvent::Changed {
            kind: ChangeKind::Delete,
        });
        if merged {
            self.events.emit(&BufferEvent::ParagraphMerge {
                start: start.saturating_sub(1),
                end: (start + 1).min(self.cells.len()),
            });
        }
        self.after_edit();
        Ok(())
    }

    pub fn apply_tag(&mut self, start: usize, end: usize, tag: TagId) -> EditResult {
        self.change_tag(start, end, tag, true)
    }

    pub fn remove_tag(&mut self, start: usize, end: usize, tag: TagId) -> EditResult {
        self.change_tag(start, end, tag, false)
    }

    fn change_tag(&mut self, start: usize, end: usize, tag: TagId, present: bool) -> EditResult {
        let flags = self.tag_flags(start, end, tag)?;
        if flags.iter().all(|&f| f == present) {
            return Ok(());
        }
        let previous = runs_from_flags(start, &flags);
        self.set_tag(start, end, tag, present)?;
        let action = if present {
            EditAction::ApplyTag {
                start,
                end,
                tag,
                previous,
            }
        } else {
            EditAction::RemoveTag {
                start,
                end,
                tag,
                previous,
            }
        };
        self.record(action);
        self.events.emit(&BufferEvent::Changed {
            kind: ChangeKind::Format,
        });
        self.after_edit();
        Ok(())
    }

    fn check_filter(&self, position: usize, content: &Fragment) -> EditResult {
        if self.is_interactive()
            && let Some(filter) = &self.insert_filter
            && !filter(position, content)
        {
            trace!(position, "insert rejected by filter");
            return Err(EditError::InsertRejected { position });
        }
        Ok(())
    }

    /// Replace `start..end` with `text` as a single undo step. A rejected
    /// insert leaves the buffer untouched.
    pub fn replace(&mut self, start: usize, end: usize, text: &str) -> EditResult {
        self.check_range(start, end)?;
        let content = Fragment::from_text(text);
        if !content.is_empty() {
            self.check_filter(start, &content)?;
        }
        self.begin_user_action();
        let result = self
            .delete(start, end)
            .and_then(|()| self.insert(start, text));
        self.end_user_action();
        result
    }

    /// Delete everything. With `clear_undo` the deletion is not recorded and
    /// history is reset afterwards.
    pub fn clear(&mut self, clear_undo: bool) {
        if clear_undo {
            self.history.suppress();
        }
        self.begin_user_action();
        let len = self.cells.len();
        if let Err(e) = self.delete(0, len) {
            warn!(error = %e, "clear failed");
        }
        self.end_user_action();
        if clear_undo {
            self.history.resume();
            self.history.reset();
            self.publish_history();
        }
    }

    /// Replace the content without recording, then drop all history.
    pub fn load_text(&mut self, text: &str) {
        self.begin_noninteractive();
        self.cells = text.chars().map(Cell::plain).collect();
        self.end_noninteractive();
        self.history.reset();
        self.modified = false;
        self.events.emit(&BufferEvent::Changed {
            kind: ChangeKind::Load,
        });
        self.publish_history();
    }

    // ========================================================================
    // Bracketing
    // ========================================================================

    /// Start a user action; edits until the matching end form one undo step.
    pub fn begin_user_action(&mut self) {
        self.user_action_depth += 1;
        self.history.begin_group();
    }

    pub fn end_user_action(&mut self) {
        if self.user_action_depth == 0 {
            warn!("end_user_action without begin; ignored");
            return;
        }
        if self.user_action_depth == 1 && !self.ending_user_action {
            self.ending_user_action = true;
            self.events.emit(&BufferEvent::EndingUserAction);
            self.ending_user_action = false;
        }
        self.user_action_depth -= 1;
        self.history.end_group();
        self.publish_history();
    }

    /// Suspend recording. Nests.
    pub fn begin_noninteractive(&mut self) {
        self.noninteractive += 1;
    }

    pub fn end_noninteractive(&mut self) {
        if self.noninteractive == 0 {
            warn!("end_noninteractive without begin; ignored");
            return;
        }
        self.noninteractive -= 1;
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Undo the newest step. `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Result<String, EditError>> {
        self.replay(ChangeKind::Undo)
    }

    /// Redo the newest undone step. `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<Result<String, EditError>> {
        self.replay(ChangeKind::Redo)
    }

    fn replay(&mut self, kind: ChangeKind) -> Option<Result<String, EditError>> {
        // the stack replays against the buffer, so it is moved out for the call
        let mut history = std::mem::take(&mut self.history);
        self.begin_noninteractive();
        let result = match kind {
            ChangeKind::Redo => history.redo(self),
            _ => history.undo(self),
        };
        self.end_noninteractive();
        self.history = history;

        if matches!(result, Some(Ok(_))) {
            self.modified = true;
            self.events.emit(&BufferEvent::Changed { kind });
        }
        self.publish_history();
        result
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn record(&mut self, action: EditAction) {
        if self.is_interactive() {
            self.history.record(action);
        }
    }

    fn after_edit(&mut self) {
        self.modified = true;
        self.publish_history();
    }

    fn publish_history(&mut self) {
        let now = (self.history.can_undo(), self.history.can_redo());
        if now != self.last_history {
            self.last_history = now;
            self.events.emit(&BufferEvent::HistoryChanged {
                can_undo: now.0,
                can_redo: now.1,
            });
        }
    }

    fn splice_in(&mut self, position: usize, content: &Fragment) {
        self.cells
            .splice(position..position, content.cells().iter().cloned());
    }

    fn check_range(&self, start: usize, end: usize) -> EditResult {
        if start > end || end > self.cells.len() {
            return Err(EditError::InvalidRange {
                start,
                end,
                length: self.cells.len(),
            });
        }
        Ok(())
    }
}

/// Raw access used by history replay. Nothing here records.
impl EditTarget for RichTextBuffer {
    fn content_len(&self) -> usize {
        self.cells.len()
    }

    fn insert_fragment(&mut self, position: usize, content: &Fragment) -> EditResult {
        if position > self.cells.len() {
            return Err(EditError::PositionOutOfBounds {
                position,
                length: self.cells.len(),
            });
        }
        self.splice_in(position, content);
        Ok(())
    }

    fn remove_range(&mut self, start: usize, end: usize) -> Result<Fragment, EditError> {
        self.check_range(start, end)?;
        Ok(Fragment::from_cells(self.cells.drain(start..end).collect()))
    }

    fn set_tag(&mut self, start: usize, end: usize, tag: TagId, present: bool) -> EditResult {
        self.check_range(start, end)?;
        for cell in &mut self.cells[start..end] {
            if present {
                cell.tags.insert(tag);
            } else {
                cell.tags.remove(&tag);
            }
        }
        Ok(())
    }

    fn tag_flags(&self, start: usize, end: usize, tag: TagId) -> Result<Vec<bool>, EditError> {
        self.check_range(start, end)?;
        Ok(self.cells[start..end]
            .iter()
            .map(|c| c.tags.contains(&tag))
            .collect())
    }
}
