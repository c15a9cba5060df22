#![forbid(unsafe_code)]

//! Identity-keyed tree view state.
//!
//! [`TreeView`] holds what a tree widget would: which rows are expanded,
//! which nodes are selected, the scroll anchor, the row being edited and
//! the current drop target. All of it is keyed by [`NodeId`]; positions are
//! recomputed from the projection whenever they are needed.
//!
//! The view registers as a [`NodeChangeObserver`] and forwards both halves
//! of every change bracket to its [`TreeProjection`]. On the start half it
//! snapshots selection and scroll anchor; on the end half it restores them,
//! re-expands rows whose `expanded` attribute is set, and fires an empty
//! [`TreeViewEvent::SelectNodes`] if none of the selection survived.
//!
//! Requests that would mutate the notebook (rename, delete) are surfaced as
//! events or return values. The view never mutates the store from inside
//! an observer callback.

use ahash::AHashSet;
use knote_core::Signal;
use tracing::{debug, trace};

use crate::broadcast::NodeChangeObserver;
use crate::dnd::{DropPosition, DropTarget, ReorderMode, check_drop, resolve_drop};
use crate::node::{AttrValue, NodeError, NodeId, attr};
use crate::notebook::Notebook;
use crate::projection::{TreePath, TreeProjection};

/// Outgoing view notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeViewEvent {
    /// Selection changed; empty means nothing is selected.
    SelectNodes(Vec<NodeId>),
    GotoNode(NodeId),
    ActivateNode(NodeId),
    DeleteNodes(Vec<NodeId>),
    /// A title edit was accepted.
    EditNode { node: NodeId, title: String },
    Error(String),
}

/// A validated title edit for the caller to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub node: NodeId,
    pub title: String,
}

impl Rename {
    pub fn apply(&self, nb: &mut Notebook) -> Result<(), NodeError> {
        nb.rename(self.node, &self.title)
    }
}

#[derive(Debug)]
pub struct TreeView {
    projection: TreeProjection,
    master: Option<NodeId>,
    has_notebook: bool,
    expanded: AHashSet<NodeId>,
    selection: Vec<NodeId>,
    saved_selection: Vec<NodeId>,
    suppress_selection: bool,
    scroll: usize,
    saved_anchor: Option<NodeId>,
    editing: Option<NodeId>,
    reorder: ReorderMode,
    drag_dest: Option<DropTarget>,
    events: Signal<TreeViewEvent>,
}

impl Default for TreeView {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeView {
    #[must_use]
    pub fn new() -> Self {
        Self::with_projection(TreeProjection::standard())
    }

    #[must_use]
    pub fn with_projection(projection: TreeProjection) -> Self {
        Self {
            projection,
            master: None,
            has_notebook: false,
            expanded: AHashSet::new(),
            selection: Vec::new(),
            saved_selection: Vec::new(),
            suppress_selection: false,
            scroll: 0,
            saved_anchor: None,
            editing: None,
            reorder: ReorderMode::All,
            drag_dest: None,
            events: Signal::new(),
        }
    }

    #[must_use]
    pub fn events(&self) -> &Signal<TreeViewEvent> {
        &self.events
    }

    #[must_use]
    pub fn projection(&self) -> &TreeProjection {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut TreeProjection {
        &mut self.projection
    }

    fn emit(&self, event: TreeViewEvent) {
        trace!(?event, "tree view event");
        self.events.emit(&event);
    }

    // ========================================================================
    // Notebook and roots
    // ========================================================================

    /// Show `nb` (or nothing). Resets selection, scroll and editing state
    /// and rebuilds row expansion from node attributes.
    pub fn set_notebook(&mut self, nb: Option<&Notebook>) {
        self.selection.clear();
        self.saved_selection.clear();
        self.editing = None;
        self.drag_dest = None;
        self.scroll = 0;
        self.master = None;
        self.has_notebook = nb.is_some();
        match nb {
            Some(nb) => {
                self.refresh_roots(nb);
                self.rebuild_expansion(nb);
                debug!(root = %nb.root(), "tree view notebook set");
            }
            None => {
                self.projection.set_root_nodes(Vec::new());
                self.expanded.clear();
            }
        }
    }

    /// Show the children of `master` as top-level rows (the notebook root
    /// itself when `None`).
    pub fn set_master_node(&mut self, nb: &Notebook, master: Option<NodeId>) {
        self.master = master;
        self.refresh_roots(nb);
        self.rebuild_expansion(nb);
    }

    #[must_use]
    pub fn master_node(&self) -> Option<NodeId> {
        self.master
    }

    fn refresh_roots(&mut self, nb: &Notebook) {
        let roots = match self.master {
            Some(master) => nb.children(master).to_vec(),
            None if self.has_notebook => vec![nb.root()],
            None => Vec::new(),
        };
        self.projection.set_root_nodes(roots);
    }

    /// Rows in display order, descending only into expanded rows.
    #[must_use]
    pub fn visible_rows(&self, nb: &Notebook) -> Vec<(TreePath, NodeId)> {
        let mut rows = Vec::new();
        for (i, id) in self.projection.top_level(nb).into_iter().enumerate() {
            self.collect_rows(nb, TreePath::new(vec![i]), id, &mut rows);
        }
        rows
    }

    fn collect_rows(&self, nb: &Notebook, path: TreePath, id: NodeId, rows: &mut Vec<(TreePath, NodeId)>) {
        rows.push((path.clone(), id));
        if self.expanded.contains(&id) {
            for (i, child) in self.projection.children(nb, id).into_iter().enumerate() {
                self.collect_rows(nb, path.child(i), child, rows);
            }
        }
    }

    fn row_of(&self, nb: &Notebook, id: NodeId) -> Option<usize> {
        self.visible_rows(nb).iter().position(|(_, n)| *n == id)
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    /// Persisted expansion flag of a node.
    #[must_use]
    pub fn is_node_expanded(&self, nb: &Notebook, id: NodeId) -> bool {
        nb.get_attr(id, attr::EXPANDED)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }

    /// Whether the row is currently expanded in the view.
    #[must_use]
    pub fn is_row_expanded(&self, id: NodeId) -> bool {
        self.expanded.contains(&id)
    }

    fn set_node_expanded(nb: &mut Notebook, id: NodeId, expand: bool) -> Result<(), NodeError> {
        nb.set_attr(id, attr::EXPANDED, AttrValue::Bool(expand))
    }

    /// Expand a row, persist the flag, and re-expand descendants that were
    /// expanded before.
    pub fn expand_node(&mut self, nb: &mut Notebook, id: NodeId) -> Result<(), NodeError> {
        Self::set_node_expanded(nb, id, true)?;
        self.expanded.insert(id);
        self.smart_expand(nb, id);
        Ok(())
    }

    fn smart_expand(&mut self, nb: &Notebook, id: NodeId) {
        for child in self.projection.children(nb, id) {
            if self.is_node_expanded(nb, child) {
                self.expanded.insert(child);
                self.smart_expand(nb, child);
            }
        }
    }

    /// Collapse a row and persist the flag. Descendant flags are kept.
    pub fn collapse_node(&mut self, nb: &mut Notebook, id: NodeId) -> Result<(), NodeError> {
        Self::set_node_expanded(nb, id, false)?;
        self.expanded.remove(&id);
        Ok(())
    }

    /// Expand every ancestor row of `id` and persist their flags.
    pub fn expand_to_node(&mut self, nb: &mut Notebook, id: NodeId) -> Result<(), NodeError> {
        let Some(path) = self.projection.path_for_node(nb, id) else {
            return Ok(());
        };
        let mut prefix = Vec::new();
        for index in &path.indices()[..path.depth().saturating_sub(1)] {
            prefix.push(*index);
            if let Some(row) = self.projection.node_at_path(nb, &TreePath::new(prefix.clone())) {
                self.expand_node(nb, row)?;
            }
        }
        Ok(())
    }

    /// Widget expansion rebuilt from node attributes.
    fn rebuild_expansion(&mut self, nb: &Notebook) {
        self.expanded.clear();
        for id in self.projection.top_level(nb) {
            if self.is_node_expanded(nb, id) {
                self.expanded.insert(id);
                self.smart_expand(nb, id);
            }
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Select the first of `nodes`, expanding its ancestors and scrolling to
    /// it. An empty slice clears the selection.
    pub fn select_nodes(&mut self, nb: &mut Notebook, nodes: &[NodeId]) -> Result<(), NodeError> {
        match nodes.first() {
            Some(first) => {
                if self.projection.path_for_node(nb, *first).is_none() {
                    return Ok(());
                }
                self.expand_to_node(nb, *first)?;
                self.selection = vec![*first];
                self.scroll_to_node(nb, *first);
            }
            None => self.selection.clear(),
        }
        if !self.suppress_selection {
            self.emit(TreeViewEvent::SelectNodes(self.selection.clone()));
        }
        Ok(())
    }

    /// Selected nodes; the node being edited when nothing is selected.
    #[must_use]
    pub fn selected_nodes(&self) -> Vec<NodeId> {
        if self.selection.is_empty()
            && let Some(editing) = self.editing
        {
            return vec![editing];
        }
        self.selection.clone()
    }

    /// Ask for the node to become the current one.
    pub fn goto_node(&self, id: NodeId) {
        self.emit(TreeViewEvent::GotoNode(id));
    }

    pub fn activate_node(&self, id: NodeId) {
        self.emit(TreeViewEvent::ActivateNode(id));
    }

    /// Ask for the selected nodes to be deleted.
    pub fn delete_selected(&self) {
        let nodes = self.selected_nodes();
        if !nodes.is_empty() {
            self.emit(TreeViewEvent::DeleteNodes(nodes));
        }
    }

    // ========================================================================
    // Scrolling
    // ========================================================================

    pub fn scroll_to(&mut self, row: usize) {
        self.scroll = row;
    }

    pub fn scroll_to_node(&mut self, nb: &Notebook, id: NodeId) {
        if let Some(row) = self.row_of(nb, id) {
            self.scroll = row;
        }
    }

    /// First visible row.
    #[must_use]
    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Begin editing a title. Returns false when the node has no row.
    pub fn start_editing(&mut self, nb: &Notebook, id: NodeId) -> bool {
        if self.projection.path_for_node(nb, id).is_none() {
            return false;
        }
        self.editing = Some(id);
        true
    }

    pub fn cancel_editing(&mut self) {
        self.editing = None;
    }

    #[must_use]
    pub fn editing_node(&self) -> Option<NodeId> {
        self.editing
    }

    /// Finish editing with `text`. A blank title is reported as an
    /// [`TreeViewEvent::Error`] and nothing changes.
    pub fn commit_edit(&mut self, nb: &Notebook, text: &str) -> Option<Rename> {
        let node = self.editing.take()?;
        if !nb.is_valid(node) {
            return None;
        }
        let title = text.trim();
        if title.is_empty() {
            self.emit(TreeViewEvent::Error(NodeError::EmptyTitle.to_string()));
            return None;
        }
        self.emit(TreeViewEvent::EditNode {
            node,
            title: title.to_string(),
        });
        Some(Rename {
            node,
            title: title.to_string(),
        })
    }

    // ========================================================================
    // Drag and drop
    // ========================================================================

    pub fn set_reorder(&mut self, mode: ReorderMode) {
        self.reorder = mode;
    }

    #[must_use]
    pub fn reorder(&self) -> ReorderMode {
        self.reorder
    }

    /// Track a drag over `path`. Returns the drop target when every source
    /// may be dropped there; `sources` empty means external data.
    pub fn drag_motion(
        &mut self,
        nb: &Notebook,
        sources: &[NodeId],
        path: &TreePath,
        position: DropPosition,
    ) -> Option<DropTarget> {
        self.drag_dest = self.drop_target(nb, sources, path, position);
        self.drag_dest.clone()
    }

    fn drop_target(
        &self,
        nb: &Notebook,
        sources: &[NodeId],
        path: &TreePath,
        position: DropPosition,
    ) -> Option<DropTarget> {
        let target = self.projection.node_at_path(nb, path)?;
        if sources.is_empty() {
            check_drop(nb, None, target, position, self.reorder).ok()?;
        }
        for source in sources {
            check_drop(nb, Some(*source), target, position, self.reorder).ok()?;
        }
        resolve_drop(nb, &self.projection, target, position).ok()
    }

    #[must_use]
    pub fn drag_dest(&self) -> Option<&DropTarget> {
        self.drag_dest.as_ref()
    }

    pub fn end_drag(&mut self) -> Option<DropTarget> {
        self.drag_dest.take()
    }
}

impl NodeChangeObserver for TreeView {
    fn on_changed_start(&mut self, nb: &Notebook, nodes: &[NodeId]) {
        self.projection.on_changed_start(nb, nodes);
        self.saved_selection = self.selection.clone();
        self.suppress_selection = true;
        self.cancel_editing();
        self.saved_anchor = self
            .visible_rows(nb)
            .get(self.scroll)
            .map(|(_, id)| *id);
    }

    fn on_changed_end(&mut self, nb: &Notebook, nodes: &[NodeId]) {
        if self.master.is_some_and(|m| nodes.contains(&m)) {
            self.refresh_roots(nb);
        }
        self.projection.on_changed_end(nb, nodes);
        self.expanded.retain(|id| nb.is_valid(*id));

        for node in nodes {
            if Some(*node) == self.master {
                for child in nb.children(*node) {
                    if self.is_node_expanded(nb, *child) {
                        self.expanded.insert(*child);
                    }
                }
                continue;
            }
            let Some(path) = self.projection.path_for_node(nb, *node) else {
                continue;
            };
            // a parent can lose its expanded row when its only child moves
            if let Some(parent) = nb.parent(*node)
                && path.depth() > 1
                && self.is_node_expanded(nb, parent)
            {
                self.expanded.insert(parent);
            }
            if self.is_node_expanded(nb, *node) {
                self.expanded.insert(*node);
            }
        }

        let saved = std::mem::take(&mut self.saved_selection);
        let restored: Vec<NodeId> = saved
            .iter()
            .copied()
            .filter(|id| {
                let Some(path) = self.projection.path_for_node(nb, *id) else {
                    return false;
                };
                match path.parent() {
                    None => true,
                    Some(parent_path) => self
                        .projection
                        .node_at_path(nb, &parent_path)
                        .is_some_and(|p| self.expanded.contains(&p)),
                }
            })
            .collect();
        self.selection = restored;

        let rows = self.visible_rows(nb);
        match self
            .saved_anchor
            .take()
            .and_then(|anchor| rows.iter().position(|(_, id)| *id == anchor))
        {
            Some(row) => self.scroll = row,
            None => self.scroll = self.scroll.min(rows.len().saturating_sub(1)),
        }
        self.suppress_selection = false;

        if self.selection.is_empty() {
            debug!(lost = saved.len(), "selection empty after change");
            self.emit(TreeViewEvent::SelectNodes(Vec::new()));
        }
    }
}
