#![forbid(unsafe_code)]

//! knote app
//!
//! Wires the tree and text layers into one application core.
//!
//! - [`config`] - [`AppConfig`], loaded from TOML or JSON
//! - [`editor`] - the [`Editor`] capability trait, [`ContentEditor`]
//!   selecting editors by content-type prefix, and [`TextEditor`]
//! - [`loader`] - background notebook loading handed back over a channel
//! - [`app`] - [`App`]: the open notebook, its tree view, clipboard and editor
//!
//! # Example
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use knote_app::{App, AppConfig, MemoryPageStore, TextEditor};
//! use knote_tree::{Notebook, content_type};
//!
//! let mut app = App::new(AppConfig::default());
//! app.add_editor("text", Rc::new(RefCell::new(TextEditor::new(MemoryPageStore::new()))));
//!
//! let mut nb = Notebook::new("notes");
//! let page = nb.new_node(nb.root(), content_type::PAGE, "todo", None).unwrap();
//! app.set_notebook(nb).unwrap();
//! app.goto_node(page).unwrap();
//! assert_eq!(app.selected_nodes(), vec![page]);
//! ```

pub mod app;
pub mod config;
pub mod editor;
pub mod loader;

pub use app::{App, AppError};
pub use config::{AppConfig, ConfigError};
pub use editor::{
    ContentEditor, Editor, EditorError, EditorRef, MemoryPageStore, PageStore, TextEditor,
};
#[cfg(feature = "config-files")]
pub use loader::JsonNotebookLoader;
pub use loader::{LoadError, NotebookLoader, PendingLoad, spawn_load};
