#![forbid(unsafe_code)]

//! Editor capability trait and the content-type editor registry.
//!
//! [`ContentEditor`] maps content-type prefixes (`"text"`, `"text/xhtml+xml"`)
//! to editors and shows the selected node in the editor with the longest
//! matching prefix, falling back to a default editor. Switching editors
//! tears the old one down (clear view, save preferences, detach notebook)
//! before starting the new one (attach notebook, load preferences, view the
//! current nodes).
//!
//! [`TextEditor`] edits one page at a time in a [`RichTextBuffer`]; page
//! text comes from a [`PageStore`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, info, warn};

use knote_text::{EditError, HistoryConfig, RichTextBuffer};
use knote_tree::{NodeId, Notebook, content_type};

use crate::config::AppConfig;

/// Failure inside an editor.
#[derive(Debug)]
pub enum EditorError {
    /// The page store could not load or save a page.
    Store { page: NodeId, message: String },
    /// Undo or redo failed inside the buffer.
    Edit(EditError),
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store { page, message } => write!(f, "page {page}: {message}"),
            Self::Edit(e) => write!(f, "edit failed: {e}"),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Edit(e) => Some(e),
            Self::Store { .. } => None,
        }
    }
}

impl From<EditError> for EditorError {
    fn from(e: EditError) -> Self {
        Self::Edit(e)
    }
}

/// What every content editor can do.
pub trait Editor {
    fn name(&self) -> &str;

    /// Attach to a notebook, or detach with `None`.
    fn set_notebook(&mut self, notebook: Option<&Notebook>);

    /// Show `nodes`; an empty slice clears the view.
    fn view_nodes(&mut self, notebook: &Notebook, nodes: &[NodeId]) -> Result<(), EditorError>;

    fn clear_view(&mut self);

    fn save(&mut self) -> Result<(), EditorError>;

    fn save_needed(&self) -> bool;

    /// Returns false when there was nothing to undo.
    fn undo(&mut self) -> Result<bool, EditorError>;

    /// Returns false when there was nothing to redo.
    fn redo(&mut self) -> Result<bool, EditorError>;

    fn load_preferences(&mut self, _config: &AppConfig) {}

    fn save_preferences(&self, _config: &mut AppConfig) {}
}

/// Shared handle to a registered editor.
pub type EditorRef = Rc<RefCell<dyn Editor>>;

fn same_editor(a: Option<&EditorRef>, b: Option<&EditorRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

// ============================================================================
// ContentEditor
// ============================================================================

/// Editor registry selecting by content type.
pub struct ContentEditor {
    editors: AHashMap<String, EditorRef>,
    default_editor: Option<EditorRef>,
    current: Option<EditorRef>,
    nodes: Vec<NodeId>,
    notebook_open: bool,
    config: AppConfig,
}

impl fmt::Debug for ContentEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prefixes: Vec<&String> = self.editors.keys().collect();
        prefixes.sort();
        f.debug_struct("ContentEditor")
            .field("prefixes", &prefixes)
            .field("has_default", &self.default_editor.is_some())
            .field("current", &self.current.as_ref().map(|e| e.borrow().name().to_string()))
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl ContentEditor {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            editors: AHashMap::new(),
            default_editor: None,
            current: None,
            nodes: Vec::new(),
            notebook_open: false,
            config,
        }
    }

    /// Register `editor` for content types starting with `prefix`.
    pub fn add_editor(&mut self, prefix: impl Into<String>, editor: EditorRef) {
        let prefix = prefix.into();
        debug!(%prefix, editor = editor.borrow().name(), "editor registered");
        self.editors.insert(prefix, editor);
    }

    pub fn remove_editor(&mut self, prefix: &str) -> Option<EditorRef> {
        self.editors.remove(prefix)
    }

    pub fn set_default_editor(&mut self, editor: Option<EditorRef>) {
        self.default_editor = editor;
    }

    /// Editor for `content_type`: the longest registered prefix over
    /// `/`-separated segments, else the default editor.
    #[must_use]
    pub fn editor_for(&self, content_type: &str) -> Option<EditorRef> {
        let segments: Vec<&str> = content_type.split('/').collect();
        (1..=segments.len())
            .rev()
            .find_map(|n| self.editors.get(&segments[..n].join("/")))
            .or(self.default_editor.as_ref())
            .cloned()
    }

    #[must_use]
    pub fn current_editor(&self) -> Option<EditorRef> {
        self.current.clone()
    }

    /// Preferences as last saved by torn-down editors.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns true when a different editor took over. A failed teardown
    /// leaves the old editor current.
    fn switch_editor(&mut self, notebook: &Notebook, next: Option<EditorRef>) -> Result<bool, EditorError> {
        if same_editor(self.current.as_ref(), next.as_ref()) {
            return Ok(false);
        }
        if let Some(old) = &self.current {
            let mut old = old.borrow_mut();
            old.view_nodes(notebook, &[])?;
            debug!(editor = old.name(), "editor torn down");
            old.save_preferences(&mut self.config);
            old.set_notebook(None);
        }
        self.current = next;
        if let Some(new) = &self.current {
            let mut new = new.borrow_mut();
            debug!(editor = new.name(), "editor started");
            new.set_notebook(self.notebook_open.then_some(notebook));
            new.load_preferences(&self.config);
            new.view_nodes(notebook, &self.nodes)?;
        }
        Ok(true)
    }

    fn with_current<T>(&self, default: T, f: impl FnOnce(&mut dyn Editor) -> T) -> T {
        match &self.current {
            Some(editor) => f(&mut *editor.borrow_mut()),
            None => default,
        }
    }
}

impl Editor for ContentEditor {
    fn name(&self) -> &str {
        "content"
    }

    fn set_notebook(&mut self, notebook: Option<&Notebook>) {
        self.notebook_open = notebook.is_some();
        if notebook.is_none() {
            self.nodes.clear();
        }
        self.with_current((), |e| e.set_notebook(notebook));
    }

    /// Exactly one node selects an editor by its content type; anything else
    /// clears the current editor's view.
    fn view_nodes(&mut self, notebook: &Notebook, nodes: &[NodeId]) -> Result<(), EditorError> {
        if let [node] = nodes {
            let kind = notebook.content_type(*node);
            let next = self.editor_for(kind);
            if next.is_none() {
                info!(content_type = kind, "no editor for content type");
            }
            let previous = std::mem::replace(&mut self.nodes, vec![*node]);
            match self.switch_editor(notebook, next.clone()) {
                // startup already viewed the nodes
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(err) => {
                    if !same_editor(self.current.as_ref(), next.as_ref()) {
                        self.nodes = previous;
                    }
                    return Err(err);
                }
            }
            return self.with_current(Ok(()), |e| e.view_nodes(notebook, nodes));
        }
        self.nodes.clear();
        self.with_current(Ok(()), |e| e.view_nodes(notebook, &[]))
    }

    fn clear_view(&mut self) {
        self.with_current((), |e| e.clear_view());
    }

    fn save(&mut self) -> Result<(), EditorError> {
        self.with_current(Ok(()), |e| e.save())
    }

    fn save_needed(&self) -> bool {
        self.with_current(false, |e| e.save_needed())
    }

    fn undo(&mut self) -> Result<bool, EditorError> {
        self.with_current(Ok(false), |e| e.undo())
    }

    fn redo(&mut self) -> Result<bool, EditorError> {
        self.with_current(Ok(false), |e| e.redo())
    }

    fn load_preferences(&mut self, config: &AppConfig) {
        self.config = config.clone();
        self.with_current((), |e| e.load_preferences(config));
    }

    fn save_preferences(&self, config: &mut AppConfig) {
        self.with_current((), |e| e.save_preferences(config));
    }
}

// ============================================================================
// Page storage
// ============================================================================

/// Where page text lives.
pub trait PageStore {
    /// Text of `page`; `None` for a page never saved.
    fn load(&self, page: NodeId) -> Result<Option<String>, EditorError>;

    fn save(&mut self, page: NodeId, text: &str) -> Result<(), EditorError>;
}

/// In-memory page store. Clones share the same pages.
#[derive(Debug, Clone, Default)]
pub struct MemoryPageStore {
    pages: Rc<RefCell<AHashMap<NodeId, String>>>,
}

impl MemoryPageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, page: NodeId) -> Option<String> {
        self.pages.borrow().get(&page).cloned()
    }

    pub fn insert(&self, page: NodeId, text: impl Into<String>) {
        self.pages.borrow_mut().insert(page, text.into());
    }
}

impl PageStore for MemoryPageStore {
    fn load(&self, page: NodeId) -> Result<Option<String>, EditorError> {
        Ok(self.get(page))
    }

    fn save(&mut self, page: NodeId, text: &str) -> Result<(), EditorError> {
        self.insert(page, text);
        Ok(())
    }
}

// ============================================================================
// TextEditor
// ============================================================================

/// Rich-text page editor.
pub struct TextEditor {
    store: Box<dyn PageStore>,
    history: HistoryConfig,
    buffer: RichTextBuffer,
    page: Option<NodeId>,
    notebook_open: bool,
}

impl fmt::Debug for TextEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEditor")
            .field("page", &self.page)
            .field("modified", &self.buffer.is_modified())
            .field("notebook_open", &self.notebook_open)
            .finish()
    }
}

impl TextEditor {
    #[must_use]
    pub fn new(store: impl PageStore + 'static) -> Self {
        let history = HistoryConfig::default();
        Self {
            store: Box::new(store),
            buffer: RichTextBuffer::with_history_config(history.clone()),
            history,
            page: None,
            notebook_open: false,
        }
    }

    #[must_use]
    pub fn page(&self) -> Option<NodeId> {
        self.page
    }

    #[must_use]
    pub fn buffer(&self) -> &RichTextBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut RichTextBuffer {
        &mut self.buffer
    }

    fn open_page(&mut self, page: NodeId) -> Result<(), EditorError> {
        let text = self.store.load(page)?.unwrap_or_default();
        self.buffer = RichTextBuffer::with_history_config(self.history.clone());
        self.buffer.load_text(&text);
        self.page = Some(page);
        debug!(%page, chars = self.buffer.len(), "page opened");
        Ok(())
    }
}

impl Editor for TextEditor {
    fn name(&self) -> &str {
        "text"
    }

    fn set_notebook(&mut self, notebook: Option<&Notebook>) {
        if notebook.is_none()
            && let Err(err) = self.save()
        {
            warn!(%err, "save on detach failed");
        }
        self.notebook_open = notebook.is_some();
        if notebook.is_none() {
            self.clear_view();
        }
    }

    /// Saves the open page first. Only a single page node is opened.
    fn view_nodes(&mut self, notebook: &Notebook, nodes: &[NodeId]) -> Result<(), EditorError> {
        if let [node] = nodes
            && self.page == Some(*node)
        {
            return Ok(());
        }
        self.save()?;
        match nodes {
            [node] if notebook.content_type(*node) == content_type::PAGE => self.open_page(*node),
            _ => {
                self.clear_view();
                Ok(())
            }
        }
    }

    fn clear_view(&mut self) {
        self.page = None;
        self.buffer = RichTextBuffer::with_history_config(self.history.clone());
    }

    fn save(&mut self) -> Result<(), EditorError> {
        let Some(page) = self.page else {
            return Ok(());
        };
        if !self.buffer.is_modified() {
            return Ok(());
        }
        self.store.save(page, &self.buffer.text())?;
        self.buffer.set_modified(false);
        debug!(%page, "page saved");
        Ok(())
    }

    fn save_needed(&self) -> bool {
        self.page.is_some() && self.buffer.is_modified()
    }

    fn undo(&mut self) -> Result<bool, EditorError> {
        match self.buffer.undo() {
            Some(result) => result.map(|_| true).map_err(EditorError::from),
            None => Ok(false),
        }
    }

    fn redo(&mut self) -> Result<bool, EditorError> {
        match self.buffer.redo() {
            Some(result) => result.map(|_| true).map_err(EditorError::from),
            None => Ok(false),
        }
    }

    fn load_preferences(&mut self, config: &AppConfig) {
        self.history = config.to_history_config();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knote_tree::content_type::{DIR, PAGE};

    /// Editor that records every call.
    struct Recorder {
        name: String,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &str, log: &Rc<RefCell<Vec<String>>>) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                name: name.into(),
                log: Rc::clone(log),
            }))
        }

        fn push(&self, what: String) {
            self.log.borrow_mut().push(format!("{}:{what}", self.name));
        }
    }

    impl Editor for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn set_notebook(&mut self, notebook: Option<&Notebook>) {
            self.push(format!("notebook={}", notebook.is_some()));
        }
        fn view_nodes(&mut self, _: &Notebook, nodes: &[NodeId]) -> Result<(), EditorError> {
            self.push(format!("view={}", nodes.len()));
            Ok(())
        }
        fn clear_view(&mut self) {}
        fn save(&mut self) -> Result<(), EditorError> {
            Ok(())
        }
        fn save_needed(&self) -> bool {
            false
        }
        fn undo(&mut self) -> Result<bool, EditorError> {
            self.push("undo".into());
            Ok(true)
        }
        fn redo(&mut self) -> Result<bool, EditorError> {
            Ok(false)
        }
        fn load_preferences(&mut self, _: &AppConfig) {
            self.push("load_prefs".into());
        }
        fn save_preferences(&self, _: &mut AppConfig) {
            self.push("save_prefs".into());
        }
    }

    fn name_of(editor: Option<EditorRef>) -> Option<String> {
        editor.map(|e| e.borrow().name().to_string())
    }

    #[test]
    fn longest_prefix_wins() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut ce = ContentEditor::new(AppConfig::default());
        ce.add_editor("text", Recorder::new("text", &log));
        ce.add_editor("text/xhtml+xml", Recorder::new("xhtml", &log));
        ce.set_default_editor(Some(Recorder::new("default", &log)));

        assert_eq!(name_of(ce.editor_for("text/xhtml+xml")), Some("xhtml".into()));
        assert_eq!(name_of(ce.editor_for("text/plain")), Some("text".into()));
        assert_eq!(name_of(ce.editor_for("text")), Some("text".into()));
        assert_eq!(name_of(ce.editor_for("image/png")), Some("default".into()));
        assert_eq!(name_of(ce.editor_for("textual/x")), Some("default".into()));

        ce.set_default_editor(None);
        assert_eq!(name_of(ce.editor_for("image/png")), None);
        assert!(ce.remove_editor("text").is_some());
        assert_eq!(name_of(ce.editor_for("text/plain")), None);
    }

    #[test]
    fn switching_tears_down_then_starts_up() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nb = Notebook::new("root");
        let root = nb.root();
        let page = nb.new_node(root, PAGE, "p", None).unwrap();
        let dir = nb.new_node(root, DIR, "d", None).unwrap();

        let mut ce = ContentEditor::new(AppConfig::default());
        ce.add_editor("text", Recorder::new("text", &log));
        ce.set_default_editor(Some(Recorder::new("default", &log)));
        ce.set_notebook(Some(&nb));

        ce.view_nodes(&nb, &[page]).unwrap();
        ce.view_nodes(&nb, &[dir]).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "text:notebook=true",
                "text:load_prefs",
                "text:view=1",
                "text:view=0",
                "text:save_prefs",
                "text:notebook=false",
                "default:notebook=true",
                "default:load_prefs",
                "default:view=1",
            ]
        );
    }

    #[test]
    fn multi_selection_clears_current_editor() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut nb = Notebook::new("root");
        let root = nb.root();
        let a = nb.new_node(root, PAGE, "a", None).unwrap();
        let b = nb.new_node(root, PAGE, "b", None).unwrap();

        let mut ce = ContentEditor::new(AppConfig::default());
        ce.add_editor("text", Recorder::new("text", &log));
        ce.view_nodes(&nb, &[a]).unwrap();
        log.borrow_mut().clear();
        ce.view_nodes(&nb, &[a, b]).unwrap();
        assert_eq!(*log.borrow(), vec!["text:view=0"]);
        assert_eq!(name_of(ce.current_editor()), Some("text".into()));
        assert!(ce.undo().unwrap());
    }

    #[test]
    fn no_editor_means_no_current() {
        let nb = Notebook::new("root");
        let mut ce = ContentEditor::new(AppConfig::default());
        ce.view_nodes(&nb, &[nb.root()]).unwrap();
        assert!(ce.current_editor().is_none());
        assert!(!ce.undo().unwrap());
        assert!(!ce.save_needed());
    }

    #[test]
    fn text_editor_loads_edits_and_saves() {
        let mut nb = Notebook::new("root");
        let root = nb.root();
        let page = nb.new_node(root, PAGE, "p", None).unwrap();
        let other = nb.new_node(root, PAGE, "q", None).unwrap();
        let store = MemoryPageStore::new();
        store.insert(page, "hello");

        let mut editor = TextEditor::new(store.clone());
        editor.set_notebook(Some(&nb));
        editor.view_nodes(&nb, &[page]).unwrap();
        assert_eq!(editor.buffer().text(), "hello");
        assert!(!editor.save_needed());
        assert!(!editor.undo().unwrap());

        editor.buffer_mut().insert(5, " world").unwrap();
        assert!(editor.save_needed());
        assert!(editor.undo().unwrap());
        assert_eq!(editor.buffer().text(), "hello");
        assert!(editor.redo().unwrap());

        // switching pages saves the open one
        editor.view_nodes(&nb, &[other]).unwrap();
        assert_eq!(store.get(page).as_deref(), Some("hello world"));
        assert_eq!(editor.page(), Some(other));
        assert_eq!(editor.buffer().text(), "");
    }

    /// Store whose saves always fail.
    struct ReadOnlyStore;

    impl PageStore for ReadOnlyStore {
        fn load(&self, _: NodeId) -> Result<Option<String>, EditorError> {
            Ok(None)
        }

        fn save(&mut self, page: NodeId, _: &str) -> Result<(), EditorError> {
            Err(EditorError::Store {
                page,
                message: "read-only".into(),
            })
        }
    }

    #[test]
    fn failed_teardown_keeps_dirty_editor_current() {
        let mut nb = Notebook::new("root");
        let root = nb.root();
        let page = nb.new_node(root, PAGE, "p", None).unwrap();
        let dir = nb.new_node(root, DIR, "d", None).unwrap();

        let text = Rc::new(RefCell::new(TextEditor::new(ReadOnlyStore)));
        let mut ce = ContentEditor::new(AppConfig::default());
        ce.add_editor("text", text.clone());
        ce.set_notebook(Some(&nb));
        ce.view_nodes(&nb, &[page]).unwrap();
        text.borrow_mut().buffer_mut().insert(0, "draft").unwrap();

        let err = ce.view_nodes(&nb, &[dir]).unwrap_err();
        assert!(matches!(err, EditorError::Store { page: p, .. } if p == page));
        assert_eq!(name_of(ce.current_editor()).as_deref(), Some("text"));
        assert!(ce.save_needed());
        assert_eq!(text.borrow().page(), Some(page));
        assert!(ce.save().is_err());
    }

    #[test]
    fn text_editor_ignores_folders() {
        let nb = Notebook::new("root");
        let mut editor = TextEditor::new(MemoryPageStore::new());
        editor.view_nodes(&nb, &[nb.root()]).unwrap();
        assert_eq!(editor.page(), None);
    }

    #[test]
    fn text_editor_takes_history_limits_from_config() {
        let mut nb = Notebook::new("root");
        let page = nb.new_node(nb.root(), PAGE, "p", None).unwrap();
        let mut config = AppConfig::default();
        config.history.max_depth = 2;

        let mut editor = TextEditor::new(MemoryPageStore::new());
        editor.load_preferences(&config);
        editor.view_nodes(&nb, &[page]).unwrap();
        for i in 0..5 {
            editor.buffer_mut().insert(i, "x").unwrap();
        }
        assert_eq!(editor.buffer().history().undo_depth(), 2);
    }
}
