#![forbid(unsafe_code)]

//! Application wiring.
//!
//! [`App`] owns the open [`Notebook`], the [`TreeView`] observing it, the
//! [`ContentEditor`] showing the selection, the clipboard and the icon
//! cache. Tree view events are queued by a subscription and drained by
//! [`App::pump_events`] once the view borrow is released, so no store
//! mutation ever happens inside an observer callback.
//!
//! Validation failures (cycles, forbidden parents, blank titles) are
//! returned to the caller and also reported on [`App::errors`]; they never
//! leave the notebook half-changed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, debug_span, info, warn};

use knote_core::{Signal, Subscription};
use knote_tree::{
    Clipboard, ClipboardKind, ClipboardPayload, DropError, DropPosition, IconCache, IconError,
    NodeError, NodeId, Notebook, PasteReport, Pixmap, TreeView, TreeViewEvent, observe, paste,
    perform_node_drop, resolve_drop,
};

use crate::config::AppConfig;
use crate::editor::{ContentEditor, Editor, EditorError, EditorRef};
use crate::loader::{LoadError, NotebookLoader, PendingLoad, spawn_load};

/// Anything an [`App`] command can fail with.
#[derive(Debug)]
pub enum AppError {
    /// The command needs an open notebook.
    NoNotebook,
    Node(NodeError),
    Drop(DropError),
    Editor(EditorError),
    Load(LoadError),
    Icon(IconError),
    /// Reported by the tree view.
    View(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNotebook => write!(f, "no notebook is open"),
            Self::Node(e) => write!(f, "{e}"),
            Self::Drop(e) => write!(f, "drop rejected: {e}"),
            Self::Editor(e) => write!(f, "editor: {e}"),
            Self::Load(e) => write!(f, "{e}"),
            Self::Icon(e) => write!(f, "icon: {e}"),
            Self::View(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Node(e) => Some(e),
            Self::Drop(e) => Some(e),
            Self::Editor(e) => Some(e),
            Self::Load(e) => Some(e),
            Self::Icon(e) => Some(e),
            Self::NoNotebook | Self::View(_) => None,
        }
    }
}

impl From<NodeError> for AppError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<DropError> for AppError {
    fn from(e: DropError) -> Self {
        Self::Drop(e)
    }
}

impl From<EditorError> for AppError {
    fn from(e: EditorError) -> Self {
        Self::Editor(e)
    }
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<IconError> for AppError {
    fn from(e: IconError) -> Self {
        Self::Icon(e)
    }
}

pub struct App {
    config: AppConfig,
    icons: IconCache,
    notebook: Option<Notebook>,
    view: Rc<RefCell<TreeView>>,
    editor: ContentEditor,
    clipboard: Clipboard,
    errors: Signal<AppError>,
    pending: Option<PendingLoad>,
    inbox: Rc<RefCell<VecDeque<TreeViewEvent>>>,
    _view_events: Subscription,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("notebook", &self.notebook.as_ref().map(Notebook::root))
            .field("editor", &self.editor)
            .field("clipboard", &self.clipboard)
            .field("loading", &self.pending.as_ref().map(PendingLoad::path))
            .finish()
    }
}

impl App {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let mut view = TreeView::new();
        view.set_reorder(config.tree.reorder);
        view.projection_mut()
            .set_date_formats(config.tree.date_formats.clone());

        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let sink = Rc::clone(&inbox);
        let view_events = view
            .events()
            .subscribe(move |event: &TreeViewEvent| sink.borrow_mut().push_back(event.clone()));

        Self {
            icons: IconCache::new(config.icons.dir.clone()),
            editor: ContentEditor::new(config.clone()),
            config,
            notebook: None,
            view: Rc::new(RefCell::new(view)),
            clipboard: Clipboard::new(),
            errors: Signal::new(),
            pending: None,
            inbox,
            _view_events: view_events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn icons(&self) -> &IconCache {
        &self.icons
    }

    #[must_use]
    pub fn notebook(&self) -> Option<&Notebook> {
        self.notebook.as_ref()
    }

    #[must_use]
    pub fn view(&self) -> &Rc<RefCell<TreeView>> {
        &self.view
    }

    #[must_use]
    pub fn content_editor(&self) -> &ContentEditor {
        &self.editor
    }

    /// Register an editor for content types starting with `prefix`.
    pub fn add_editor(&mut self, prefix: &str, editor: EditorRef) {
        self.editor.add_editor(prefix, editor);
    }

    pub fn set_default_editor(&mut self, editor: Option<EditorRef>) {
        self.editor.set_default_editor(editor);
    }

    #[must_use]
    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    /// Non-fatal errors for display.
    #[must_use]
    pub fn errors(&self) -> &Signal<AppError> {
        &self.errors
    }

    fn report(&self, err: AppError) -> AppError {
        warn!(%err, "command failed");
        self.errors.emit(&err);
        err
    }

    fn notebook_ref(&self) -> Result<&Notebook, AppError> {
        self.notebook.as_ref().ok_or(AppError::NoNotebook)
    }

    // ========================================================================
    // Notebook lifecycle
    // ========================================================================

    /// Start loading a notebook in the background. A load already in flight
    /// is abandoned.
    pub fn open_notebook(
        &mut self,
        loader: Arc<dyn NotebookLoader>,
        path: impl Into<PathBuf>,
    ) -> Result<(), AppError> {
        if let Some(old) = self.pending.take() {
            debug!(path = %old.path().display(), "pending load abandoned");
        }
        let pending = spawn_load(loader, path.into()).map_err(|e| self.report(e.into()))?;
        self.pending = Some(pending);
        Ok(())
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Install the loaded notebook if it has arrived. Returns true when a
    /// notebook was installed by this call.
    pub fn poll_open(&mut self) -> Result<bool, AppError> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(false);
        };
        let Some(result) = pending.poll() else {
            return Ok(false);
        };
        self.pending = None;
        self.finish_load(result).map(|()| true)
    }

    /// Block until the pending load finishes and install it.
    pub fn wait_open(&mut self) -> Result<(), AppError> {
        let pending = self.pending.take().ok_or(AppError::NoNotebook)?;
        let result = pending.wait();
        self.finish_load(result)
    }

    fn finish_load(&mut self, result: Result<knote_tree::NodeSnapshot, LoadError>) -> Result<(), AppError> {
        let notebook = result
            .and_then(|snapshot| Notebook::from_snapshot(snapshot).map_err(LoadError::from))
            .map_err(|e| self.report(e.into()))?;
        self.set_notebook(notebook)
    }

    /// Make `notebook` the open notebook, closing the current one first.
    pub fn set_notebook(&mut self, notebook: Notebook) -> Result<(), AppError> {
        self.close_notebook()?;
        observe(&notebook, &self.view);
        self.view.borrow_mut().set_notebook(Some(&notebook));
        self.editor.set_notebook(Some(&notebook));
        info!(root = %notebook.root(), nodes = notebook.len(), "notebook opened");
        self.notebook = Some(notebook);
        self.pump_events();
        Ok(())
    }

    /// Save and detach everything from the open notebook. Nothing to do
    /// when none is open.
    pub fn close_notebook(&mut self) -> Result<(), AppError> {
        let Some(notebook) = self.notebook.as_ref() else {
            return Ok(());
        };
        if self.editor.save_needed() {
            self.editor.save().map_err(|e| self.report(e.into()))?;
        }
        self.editor.view_nodes(notebook, &[])?;
        self.editor.set_notebook(None);
        self.view.borrow_mut().set_notebook(None);
        self.clipboard.clear();
        self.inbox.borrow_mut().clear();
        if let Some(notebook) = self.notebook.take() {
            info!(root = %notebook.root(), "notebook closed");
        }
        Ok(())
    }

    // ========================================================================
    // View events and navigation
    // ========================================================================

    /// Handle queued tree view events.
    pub fn pump_events(&mut self) {
        loop {
            let Some(event) = self.inbox.borrow_mut().pop_front() else {
                break;
            };
            let result = match event {
                TreeViewEvent::SelectNodes(nodes) => self.on_select(&nodes),
                TreeViewEvent::GotoNode(node) => self.select(&[node]),
                TreeViewEvent::ActivateNode(node) => {
                    debug!(%node, "node activated");
                    Ok(())
                }
                TreeViewEvent::DeleteNodes(nodes) => self.delete_nodes(&nodes),
                TreeViewEvent::EditNode { node, title } => {
                    debug!(%node, %title, "title edit accepted");
                    Ok(())
                }
                TreeViewEvent::Error(message) => Err(AppError::View(message)),
            };
            if let Err(err) = result {
                self.report(err);
            }
        }
    }

    /// Route a tree selection into the content editor.
    pub fn on_select(&mut self, nodes: &[NodeId]) -> Result<(), AppError> {
        let notebook = self.notebook.as_ref().ok_or(AppError::NoNotebook)?;
        self.editor.view_nodes(notebook, nodes)?;
        Ok(())
    }

    fn select(&mut self, nodes: &[NodeId]) -> Result<(), AppError> {
        let notebook = self.notebook.as_mut().ok_or(AppError::NoNotebook)?;
        if let Some(missing) = nodes.iter().find(|n| !notebook.is_valid(**n)) {
            return Err(NodeError::NotFound(*missing).into());
        }
        self.view.borrow_mut().select_nodes(notebook, nodes)?;
        Ok(())
    }

    /// Select `nodes` in the tree; an empty slice clears the selection.
    pub fn select_nodes(&mut self, nodes: &[NodeId]) -> Result<(), AppError> {
        self.select(nodes).map_err(|e| self.report(e))?;
        self.pump_events();
        Ok(())
    }

    /// Select `node` in the tree, expanding its ancestors, and show it.
    pub fn goto_node(&mut self, node: NodeId) -> Result<(), AppError> {
        self.select_nodes(&[node])
    }

    #[must_use]
    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.view.borrow().selected_nodes()
    }

    fn delete_nodes(&mut self, nodes: &[NodeId]) -> Result<(), AppError> {
        let notebook = self.notebook.as_mut().ok_or(AppError::NoNotebook)?;
        for node in nodes {
            // already gone with an ancestor deleted earlier in the list
            if !notebook.is_valid(*node) {
                continue;
            }
            notebook.delete(*node)?;
        }
        Ok(())
    }

    /// Finish a title edit started on the tree view.
    pub fn commit_edit(&mut self, text: &str) -> Result<(), AppError> {
        let notebook = self.notebook.as_mut().ok_or(AppError::NoNotebook)?;
        let rename = self.view.borrow_mut().commit_edit(notebook, text);
        let result = match rename {
            Some(rename) => rename.apply(notebook).map_err(AppError::from),
            None => Ok(()),
        };
        self.pump_events();
        result.map_err(|e| self.report(e))
    }

    /// Pixmap for a node's icon, faded while the node is cut.
    pub fn node_icon(&self, node: NodeId, open: bool) -> Result<Rc<Pixmap>, AppError> {
        let notebook = self.notebook_ref()?;
        let faded = self.view.borrow().projection().is_faded(node);
        Ok(self
            .icons
            .node_icon(notebook, node, open, faded, self.config.tree.icon_size)?)
    }

    // ========================================================================
    // Clipboard
    // ========================================================================

    fn put_selection(&mut self, kind: ClipboardKind) -> Option<ClipboardPayload> {
        let nodes = self.selected_nodes();
        if nodes.is_empty() {
            return None;
        }
        let payload = ClipboardPayload::new(kind, nodes);
        debug!(kind = ?kind, nodes = payload.nodes.len(), "clipboard set");
        self.clear_clipboard();
        self.clipboard.set(payload.clone());
        Some(payload)
    }

    /// Copy the selected nodes. Returns false when nothing is selected.
    pub fn copy(&mut self) -> bool {
        self.put_selection(ClipboardKind::Copy).is_some()
    }

    /// Copy the selected nodes with their subtrees.
    pub fn copy_tree(&mut self) -> bool {
        self.put_selection(ClipboardKind::CopyTree).is_some()
    }

    /// Cut the selected nodes; they are shown faded until pasted or the
    /// clipboard is cleared.
    pub fn cut(&mut self) -> bool {
        let Some(payload) = self.put_selection(ClipboardKind::Cut) else {
            return false;
        };
        if let Some(notebook) = self.notebook.as_ref() {
            self.view
                .borrow_mut()
                .projection_mut()
                .fade_nodes(notebook, &payload.nodes);
        }
        true
    }

    /// Paste into the first selected node, or the notebook root when nothing
    /// is selected. A pasted cut empties the clipboard.
    pub fn paste(&mut self) -> Result<PasteReport, AppError> {
        let Some(payload) = self.clipboard.request() else {
            return Ok(PasteReport::default());
        };
        let target = self.selected_nodes().first().copied();
        let notebook = self.notebook.as_mut().ok_or(AppError::NoNotebook)?;
        let parent = target.unwrap_or_else(|| notebook.root());
        let _span = debug_span!("paste", kind = ?payload.kind, %parent).entered();

        let report = paste(notebook, &payload, parent);
        if payload.kind == ClipboardKind::Cut {
            self.clear_clipboard();
        }
        for node in &report.failed {
            self.report(AppError::View(format!("could not paste node {node}")));
        }
        self.pump_events();
        Ok(report)
    }

    /// Empty the clipboard and un-fade any cut nodes.
    pub fn clear_clipboard(&mut self) {
        self.clipboard.clear();
        if let Some(notebook) = self.notebook.as_ref() {
            self.view.borrow_mut().projection_mut().clear_fading(notebook);
        }
    }

    // ========================================================================
    // Drag and drop
    // ========================================================================

    /// Drop `sources` relative to `target`. Returns the first moved node.
    pub fn drop_nodes(
        &mut self,
        sources: &[NodeId],
        target: NodeId,
        position: DropPosition,
    ) -> Result<Option<NodeId>, AppError> {
        let notebook = self.notebook.as_mut().ok_or(AppError::NoNotebook)?;
        let (drop, mode) = {
            let view = self.view.borrow();
            let drop = resolve_drop(notebook, view.projection(), target, position);
            (drop, view.reorder())
        };
        let moved = drop
            .and_then(|drop| perform_node_drop(notebook, sources, &drop, mode))
            .map_err(AppError::from);
        self.pump_events();
        moved.map_err(|e| self.report(e))
    }

    /// Drop `sources` on the target tracked by the last drag motion.
    pub fn finish_drag(&mut self, sources: &[NodeId]) -> Result<Option<NodeId>, AppError> {
        let Some(drop) = self.view.borrow_mut().end_drag() else {
            return Ok(None);
        };
        self.drop_nodes(sources, drop.target, drop.position)
    }

    // ========================================================================
    // Undo
    // ========================================================================

    /// Undo in the current editor. Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, AppError> {
        self.editor.undo().map_err(|e| self.report(e.into()))
    }

    pub fn redo(&mut self) -> Result<bool, AppError> {
        self.editor.redo().map_err(|e| self.report(e.into()))
    }

    /// Save the current page.
    pub fn save(&mut self) -> Result<(), AppError> {
        self.editor.save().map_err(|e| self.report(e.into()))
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Err(err) = self.close_notebook() {
            warn!(%err, "close on drop failed");
        }
    }
}
