#![forbid(unsafe_code)]

//! Undo/redo history for a rich-text buffer.
//!
//! [`UndoStack`] keeps two stacks of [`CompositeAction`]s and the grouping
//! state that decides which composite a freshly recorded action lands in:
//!
//! - **Grouping**: `begin_group`/`end_group` nest via a depth counter; only
//!   the outermost end commits
//! - **Implicit groups**: an action recorded outside any group becomes its own
//!   single-action composite
//! - **Linear history**: recording while redo entries exist discards them
//! - **Bounded**: oldest entries are evicted past `max_depth` or `max_bytes`
//!
//! # Invariants
//!
//! 1. `total_bytes` equals the sum of `size_bytes()` over both stacks
//! 2. `undo_depth() <= config.max_depth` after any operation
//! 3. No empty composite is ever pushed onto either stack
//! 4. Nothing is recorded while suppressed or while replaying
//!
//! # State machine
//!
//! ```text
//!            undo() [stack non-empty]
//!   Idle ─────────────────────────────▶ Undoing
//!    ▲  ◀──────────────────────────────  │
//!    │          replay finished          │
//!    │                                   │
//!    └──── redo() ──▶ Redoing ──────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, debug_span, trace, warn};

use crate::action::{EditAction, EditError, EditTarget, MergeConfig};
use crate::composite::CompositeAction;

/// Limits and merge behaviour for an [`UndoStack`].
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Maximum number of composites kept for undo.
    pub max_depth: usize,
    /// Maximum total bytes across both stacks (0 = unlimited).
    pub max_bytes: usize,
    pub merge_config: MergeConfig,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_bytes: 10 * 1024 * 1024,
            merge_config: MergeConfig::default(),
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn new(max_depth: usize, max_bytes: usize) -> Self {
        Self {
            max_depth,
            max_bytes,
            merge_config: MergeConfig::default(),
        }
    }

    #[must_use]
    pub fn with_merge_config(mut self, config: MergeConfig) -> Self {
        self.merge_config = config;
        self
    }

    /// No depth or memory limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
            max_bytes: 0,
            merge_config: MergeConfig::default(),
        }
    }
}

/// Replay state of the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryState {
    #[default]
    Idle,
    Undoing,
    Redoing,
}

/// Two-stack undo history with nested grouping.
pub struct UndoStack {
    /// Committed composites, newest at back.
    undo_stack: VecDeque<CompositeAction>,
    /// Undone composites, newest at back.
    redo_stack: VecDeque<CompositeAction>,
    /// Composite collecting actions inside an explicit group.
    open: Option<CompositeAction>,
    group_depth: usize,
    suppress_depth: usize,
    state: HistoryState,
    config: HistoryConfig,
    total_bytes: usize,
}

impl fmt::Debug for UndoStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoStack")
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("group_depth", &self.group_depth)
            .field("suppress_depth", &self.suppress_depth)
            .field("state", &self.state)
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl UndoStack {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            open: None,
            group_depth: 0,
            suppress_depth: 0,
            state: HistoryState::Idle,
            config,
            total_bytes: 0,
        }
    }

    // ========================================================================
    // Grouping
    // ========================================================================

    /// Open a group, or nest inside the one already open.
    pub fn begin_group(&mut self) {
        self.begin_group_inner(CompositeAction::grouped());
    }

    /// Open a group with a fixed description.
    ///
    /// The description is ignored when nesting inside an open group.
    pub fn begin_named_group(&mut self, description: impl Into<String>) {
        self.begin_group_inner(CompositeAction::new(description));
    }

    fn begin_group_inner(&mut self, composite: CompositeAction) {
        if self.group_depth == 0 {
            self.open = Some(composite);
        }
        self.group_depth += 1;
        trace!(depth = self.group_depth, "begin group");
    }

    /// Close the innermost group. The outermost close commits the composite.
    pub fn end_group(&mut self) {
        if self.group_depth == 0 {
            warn!("end_group called with no open group; ignored");
            return;
        }
        self.group_depth -= 1;
        trace!(depth = self.group_depth, "end group");
        if self.group_depth == 0 {
            if let Some(composite) = self.open.take() {
                self.commit(composite);
            }
        }
    }

    #[must_use]
    pub fn group_depth(&self) -> usize {
        self.group_depth
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Stop recording until a matching [`resume`](Self::resume).
    pub fn suppress(&mut self) {
        self.suppress_depth += 1;
    }

    pub fn resume(&mut self) {
        if self.suppress_depth == 0 {
            warn!("resume called while not suppressed; ignored");
            return;
        }
        self.suppress_depth -= 1;
    }

    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppress_depth > 0
    }

    /// Record an action that has already been applied to the buffer.
    ///
    /// Returns false when the action was dropped because recording is
    /// suppressed or a replay is running.
    pub fn record(&mut self, action: EditAction) -> bool {
        if self.suppress_depth > 0 || self.state != HistoryState::Idle {
            trace!(state = ?self.state, "record skipped");
            return false;
        }

        self.clear_redo();

        if let Some(open) = self.open.as_mut() {
            open.push(action);
            trace!(actions = open.len(), "recorded into group");
            return true;
        }

        let action = match self.try_merge(action) {
            Ok(()) => {
                self.enforce_limits();
                return true;
            }
            Err(action) => action,
        };

        let mut composite = CompositeAction::implicit();
        composite.push(action);
        self.commit(composite);
        true
    }

    fn commit(&mut self, composite: CompositeAction) {
        if composite.is_empty() {
            debug!("discarding empty group");
            return;
        }
        self.clear_redo();
        debug!(
            description = composite.description(),
            actions = composite.len(),
            "commit"
        );
        self.total_bytes += composite.size_bytes();
        self.undo_stack.push_back(composite);
        self.enforce_limits();
    }

    /// Fold an implicit single edit into the newest implicit composite when it
    /// directly continues it within the merge window.
    fn try_merge(&mut self, action: EditAction) -> Result<(), EditAction> {
        let config = self.config.merge_config;
        if !config.enabled {
            return Err(action);
        }
        let Some(last) = self.undo_stack.back_mut() else {
            return Err(action);
        };
        if !last.is_implicit() || last.len() != 1 {
            return Err(action);
        }
        let elapsed = last.metadata().last_edit.elapsed();
        if elapsed.as_millis() > u128::from(config.max_delay_ms) {
            return Err(action);
        }

        let old_size = last.size_bytes();
        let Some(prev) = last.last_action_mut() else {
            return Err(action);
        };
        if !prev.can_merge(&action, &config) || !prev.accept_merge(&action) {
            return Err(action);
        }
        last.touch();
        let new_size = last.size_bytes();
        self.total_bytes = self.total_bytes.saturating_sub(old_size) + new_size;
        trace!("merged into previous edit");
        Ok(())
    }

    // ========================================================================
    // Replay
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> HistoryState {
        self.state
    }

    /// Revert the newest composite against `target`.
    ///
    /// - `None` when there is nothing to undo (or a replay/group is running)
    /// - `Some(Ok(description))` on success; the composite moves to redo
    /// - `Some(Err(_))` on failure; the composite stays on the undo stack
    pub fn undo(&mut self, target: &mut dyn EditTarget) -> Option<Result<String, EditError>> {
        if !self.replay_allowed("undo") {
            return None;
        }
        let Some(composite) = self.undo_stack.pop_back() else {
            debug!("nothing to undo");
            return None;
        };
        let description = composite.description().to_string();
        let _span = debug_span!("undo", description = %description, actions = composite.len())
            .entered();

        self.state = HistoryState::Undoing;
        let result = composite.undo(target);
        self.state = HistoryState::Idle;

        match result {
            Ok(()) => {
                self.redo_stack.push_back(composite);
                Some(Ok(description))
            }
            Err(e) => {
                warn!(error = %e, "undo failed; history kept");
                self.undo_stack.push_back(composite);
                Some(Err(e))
            }
        }
    }

    /// Re-apply the newest undone composite against `target`.
    pub fn redo(&mut self, target: &mut dyn EditTarget) -> Option<Result<String, EditError>> {
        if !self.replay_allowed("redo") {
            return None;
        }
        let Some(composite) = self.redo_stack.pop_back() else {
            debug!("nothing to redo");
            return None;
        };
        let description = composite.description().to_string();
        let _span = debug_span!("redo", description = %description, actions = composite.len())
            .entered();

        self.state = HistoryState::Redoing;
        let result = composite.redo(target);
        self.state = HistoryState::Idle;

        match result {
            Ok(()) => {
                self.undo_stack.push_back(composite);
                Some(Ok(description))
            }
            Err(e) => {
                warn!(error = %e, "redo failed; history kept");
                self.redo_stack.push_back(composite);
                Some(Err(e))
            }
        }
    }

    fn replay_allowed(&self, op: &str) -> bool {
        if self.state != HistoryState::Idle {
            warn!(op, state = ?self.state, "replay requested during replay; ignored");
            return false;
        }
        if self.group_depth > 0 {
            warn!(op, depth = self.group_depth, "replay requested inside open group; ignored");
            return false;
        }
        true
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    // ========================================================================
    // Info
    // ========================================================================

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Descriptions of undo entries, most recent first.
    pub fn undo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.undo_stack
            .iter()
            .rev()
            .take(limit)
            .map(CompositeAction::description)
            .collect()
    }

    #[must_use]
    pub fn next_undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(CompositeAction::description)
    }

    #[must_use]
    pub fn next_redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(CompositeAction::description)
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop all history. An open group stays open but loses its actions.
    pub fn reset(&mut self) {
        debug!(
            undo = self.undo_stack.len(),
            redo = self.redo_stack.len(),
            "reset history"
        );
        self.undo_stack.clear();
        self.redo_stack.clear();
        if self.open.is_some() {
            self.open = Some(CompositeAction::grouped());
        }
        self.total_bytes = 0;
    }

    /// Discard every redo entry.
    pub fn clear_redo(&mut self) {
        if self.redo_stack.is_empty() {
            return;
        }
        trace!(dropped = self.redo_stack.len(), "clear redo");
        for composite in self.redo_stack.drain(..) {
            self.total_bytes = self.total_bytes.saturating_sub(composite.size_bytes());
        }
    }

    fn enforce_limits(&mut self) {
        while self.undo_stack.len() > self.config.max_depth {
            if let Some(composite) = self.undo_stack.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(composite.size_bytes());
                debug!(description = composite.description(), "evicted (depth)");
            }
        }

        if self.config.max_bytes > 0 {
            while self.total_bytes > self.config.max_bytes {
                if let Some(composite) = self.redo_stack.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(composite.size_bytes());
                    continue;
                }
                if let Some(composite) = self.undo_stack.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(composite.size_bytes());
                    debug!(description = composite.description(), "evicted (memory)");
                } else {
                    break;
                }
            }
        }
    }
}
