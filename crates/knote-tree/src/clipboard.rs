#![forbid(unsafe_code)]

//! Node copy, cut and paste.
//!
//! A [`ClipboardPayload`] names nodes by id and a [`ClipboardKind`]. It
//! offers one node MIME target (two for a tree copy) plus `text/html` and
//! `text/plain` renderings. Pasting prefers cut, then tree copy, then copy.

use std::fmt;

use tracing::{debug, warn};

use crate::node::NodeId;
use crate::notebook::Notebook;

pub const MIME_NODE_COPY: &str = "application/x-keepnote-node-copy";
pub const MIME_TREE_COPY: &str = "application/x-keepnote-tree-copy";
pub const MIME_NODE_CUT: &str = "application/x-keepnote-node-cut";
pub const MIME_HTML: &str = "text/html";
pub const MIME_TEXT: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipboardKind {
    /// Shallow copy.
    Copy,
    /// Copy with descendants.
    CopyTree,
    /// Move on paste.
    Cut,
}

impl ClipboardKind {
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Copy => MIME_NODE_COPY,
            Self::CopyTree => MIME_TREE_COPY,
            Self::Cut => MIME_NODE_CUT,
        }
    }

    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            MIME_NODE_COPY => Some(Self::Copy),
            MIME_TREE_COPY => Some(Self::CopyTree),
            MIME_NODE_CUT => Some(Self::Cut),
            _ => None,
        }
    }
}

/// Node ids that could not be parsed from clipboard data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub item: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node id {:?} in clipboard data", self.item)
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub kind: ClipboardKind,
    pub nodes: Vec<NodeId>,
}

impl ClipboardPayload {
    #[must_use]
    pub fn new(kind: ClipboardKind, nodes: Vec<NodeId>) -> Self {
        Self { kind, nodes }
    }

    /// Targets offered, most specific first.
    #[must_use]
    pub fn targets(&self) -> Vec<&'static str> {
        match self.kind {
            ClipboardKind::CopyTree => vec![MIME_TREE_COPY, MIME_NODE_COPY, MIME_HTML, MIME_TEXT],
            kind => vec![kind.mime(), MIME_HTML, MIME_TEXT],
        }
    }

    /// `id;id;...`
    #[must_use]
    pub fn encode(&self) -> String {
        let ids: Vec<String> = self.nodes.iter().map(NodeId::to_string).collect();
        ids.join(";")
    }

    pub fn decode(kind: ClipboardKind, data: &str) -> Result<Self, DecodeError> {
        let nodes = data
            .split(';')
            .filter(|item| !item.trim().is_empty())
            .map(|item| {
                item.parse::<NodeId>().map_err(|_| DecodeError {
                    item: item.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { kind, nodes })
    }

    /// Links to each node, separated by spaces.
    #[must_use]
    pub fn to_html(&self, nb: &Notebook) -> String {
        let links: Vec<String> = self
            .nodes
            .iter()
            .filter(|id| nb.is_valid(**id))
            .map(|id| format!("<a href='{}'>{}</a>", nb.url(*id), escape_html(nb.title(*id))))
            .collect();
        links.join(" ")
    }

    /// Node urls, separated by spaces.
    #[must_use]
    pub fn to_plain_text(&self, nb: &Notebook) -> String {
        let urls: Vec<String> = self
            .nodes
            .iter()
            .filter(|id| nb.is_valid(**id))
            .map(|id| nb.url(*id))
            .collect();
        urls.join(" ")
    }

    /// Data for one offered target.
    #[must_use]
    pub fn data_for(&self, nb: &Notebook, mime: &str) -> Option<String> {
        if !self.targets().contains(&mime) {
            return None;
        }
        match mime {
            MIME_HTML => Some(self.to_html(nb)),
            MIME_TEXT => Some(self.to_plain_text(nb)),
            _ => Some(self.encode()),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Node kind to request when `targets` are on offer.
#[must_use]
pub fn preferred<'a>(targets: impl IntoIterator<Item = &'a str>) -> Option<ClipboardKind> {
    let kinds: Vec<ClipboardKind> = targets
        .into_iter()
        .filter_map(ClipboardKind::from_mime)
        .collect();
    [ClipboardKind::Cut, ClipboardKind::CopyTree, ClipboardKind::Copy]
        .into_iter()
        .find(|k| kinds.contains(k))
}

/// Outcome of [`paste`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteReport {
    /// Nodes created (copies) or moved (cut), in payload order.
    pub pasted: Vec<NodeId>,
    /// Payload nodes that were skipped.
    pub failed: Vec<NodeId>,
}

/// Paste `payload` as the last children of `parent`.
///
/// Each node is handled on its own; a failure is logged and skipped, and
/// nodes already pasted stay pasted.
pub fn paste(nb: &mut Notebook, payload: &ClipboardPayload, parent: NodeId) -> PasteReport {
    let mut report = PasteReport::default();
    for id in &payload.nodes {
        let result = match payload.kind {
            ClipboardKind::Cut => {
                let end = nb.children(parent).len();
                nb.move_node(*id, parent, end).map(|()| *id)
            }
            ClipboardKind::CopyTree => nb.duplicate(*id, parent, true),
            ClipboardKind::Copy => nb.duplicate(*id, parent, false),
        };
        match result {
            Ok(node) => report.pasted.push(node),
            Err(err) => {
                warn!(node = %id, %parent, %err, kind = ?payload.kind, "paste skipped node");
                report.failed.push(*id);
            }
        }
    }
    debug!(
        pasted = report.pasted.len(),
        failed = report.failed.len(),
        "paste finished"
    );
    report
}

/// Application clipboard holding at most one payload.
#[derive(Debug, Default)]
pub struct Clipboard {
    payload: Option<ClipboardPayload>,
}

impl Clipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents, returning the previous payload.
    pub fn set(&mut self, payload: ClipboardPayload) -> Option<ClipboardPayload> {
        self.payload.replace(payload)
    }

    pub fn clear(&mut self) -> Option<ClipboardPayload> {
        self.payload.take()
    }

    #[must_use]
    pub fn payload(&self) -> Option<&ClipboardPayload> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn targets(&self) -> Vec<&'static str> {
        self.payload
            .as_ref()
            .map(ClipboardPayload::targets)
            .unwrap_or_default()
    }

    /// Payload as it would be requested through its preferred node target.
    #[must_use]
    pub fn request(&self) -> Option<ClipboardPayload> {
        let payload = self.payload.as_ref()?;
        let kind = preferred(payload.targets())?;
        ClipboardPayload::decode(kind, &payload.encode()).ok()
    }
}
