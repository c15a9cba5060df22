#![forbid(unsafe_code)]

//! knote text
//!
//! The rich-text buffer behind the page editor and its action-log undo
//! engine.
//!
//! - [`fragment`] - cells, tags and owned content runs
//! - [`action`] - reversible primitive edits and the [`EditTarget`] surface
//! - [`composite`] - one undo step made of several edits
//! - [`history`] - [`UndoStack`]: grouping, linear history, eviction
//! - [`buffer`] - [`RichTextBuffer`]: recorded editing and buffer events
//!
//! # Role in knote
//! `knote-app`'s text editor owns one [`RichTextBuffer`] per viewed page and
//! routes the menu undo/redo commands to it.

pub mod action;
pub mod buffer;
pub mod composite;
pub mod fragment;
pub mod history;

pub use action::{
    ActionMetadata, ActionSource, EditAction, EditError, EditResult, EditTarget, MergeConfig,
};
pub use buffer::{BufferEvent, ChangeKind, RichTextBuffer};
pub use composite::CompositeAction;
pub use fragment::{Cell, Fragment, OBJECT_REPLACEMENT, ObjectId, Piece, TagId, TagRun};
pub use history::{HistoryConfig, HistoryState, UndoStack};
