#![forbid(unsafe_code)]

//! knote tree
//!
//! The notebook node store and everything that keeps a tree presentation in
//! step with it.
//!
//! - [`node`] - ids, typed attributes, snapshots, store errors
//! - [`notebook`] - [`Notebook`]: structural operations with broadcasting
//! - [`broadcast`] - start/end change bracketing and observer registration
//! - [`projection`] - [`TreeProjection`]: paths, columns, sort, filter, fades
//! - [`view`] - [`TreeView`]: identity-keyed expansion, selection, scroll
//! - [`dnd`] - drop validation, resolution and multi-node moves
//! - [`clipboard`] - copy, tree copy, cut and paste of nodes
//! - [`icons`] - application-scoped [`IconCache`]
//!
//! # Role in knote
//! `knote-app` owns one [`Notebook`] and one [`TreeView`] registered as its
//! observer, and routes clipboard and drop commands through this crate.

pub mod broadcast;
pub mod clipboard;
pub mod dnd;
pub mod icons;
pub mod node;
pub mod notebook;
pub mod projection;
pub mod view;

pub use broadcast::{NodeChange, NodeChangeObserver, observe};
pub use clipboard::{Clipboard, ClipboardKind, ClipboardPayload, PasteReport, paste, preferred};
pub use dnd::{
    DropError, DropPosition, DropTarget, FileDrop, ReorderMode, check_drop, compute_new_path,
    parse_uri_list, perform_node_drop, plan_file_drop, resolve_drop,
};
pub use icons::{IconCache, IconError, Pixmap};
pub use node::{AttrValue, NodeError, NodeId, NodeSnapshot, attr, content_type};
pub use notebook::Notebook;
pub use projection::{
    ColumnDef, ColumnKind, ColumnValue, DateFormats, RowChange, SortKey, SortSpec, TreePath,
    TreeProjection,
};
pub use view::{Rename, TreeView, TreeViewEvent};
