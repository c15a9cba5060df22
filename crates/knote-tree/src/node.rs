#![forbid(unsafe_code)]

//! Node identities, attribute values and store errors.

use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of a notebook node. Never reused within a notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(NodeId)
    }
}

/// Typed attribute value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
}

impl AttrValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) | Self::Timestamp(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// Well-known attribute keys.
pub mod attr {
    pub const TITLE: &str = "title";
    pub const NODEID: &str = "nodeid";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const ICON: &str = "icon";
    pub const ICON_OPEN: &str = "icon_open";
    pub const EXPANDED: &str = "expanded";
    pub const CREATED_TIME: &str = "created_time";
    pub const MODIFIED_TIME: &str = "modified_time";
    pub const TITLE_FGCOLOR: &str = "title_fgcolor";
    pub const TITLE_BGCOLOR: &str = "title_bgcolor";
    pub const ALLOW_CHILDREN: &str = "allow_children";
}

/// Well-known content types.
pub mod content_type {
    pub const DIR: &str = "application/x-notebook-dir";
    pub const PAGE: &str = "text/xhtml+xml";
    pub const TRASH: &str = "application/x-notebook-trash";
}

/// Structural mutation refused by the store. State is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    NotFound(NodeId),
    /// The destination lies inside the moved subtree.
    WouldCreateCycle { node: NodeId, parent: NodeId },
    ForbidsChildren(NodeId),
    RootImmovable,
    EmptyTitle,
    IndexOutOfBounds { index: usize, len: usize },
    /// A snapshot used the same id twice.
    DuplicateId(NodeId),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "node {id} not found"),
            Self::WouldCreateCycle { node, parent } => {
                write!(f, "cannot move node {node} under its own descendant {parent}")
            }
            Self::ForbidsChildren(id) => write!(f, "node {id} does not allow children"),
            Self::RootImmovable => write!(f, "the notebook root cannot be moved or deleted"),
            Self::EmptyTitle => write!(f, "title must not be empty"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "child index {index} out of bounds ({len} children)")
            }
            Self::DuplicateId(id) => write!(f, "duplicate node id {id}"),
        }
    }
}

impl std::error::Error for NodeError {}

/// Plain, thread-safe copy of a subtree.
///
/// Produced by background loaders and turned into a [`Notebook`] on the UI
/// thread.
///
/// [`Notebook`]: crate::notebook::Notebook
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeSnapshot {
    pub id: NodeId,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attrs: BTreeMap<String, AttrValue>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Leaf snapshot with a title and content type.
    #[must_use]
    pub fn new(id: u64, title: &str, content_type: &str) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert(attr::TITLE.to_string(), AttrValue::from(title));
        attrs.insert(attr::CONTENT_TYPE.to_string(), AttrValue::from(content_type));
        Self {
            id: NodeId(id),
            attrs,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, child: NodeSnapshot) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_attr(mut self, key: &str, value: AttrValue) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    /// Number of nodes in this subtree.
    #[must_use]
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            total += 1;
            stack.extend(node.children.iter());
        }
        total
    }
}

impl Drop for NodeSnapshot {
    // flattened so deep trees do not recurse
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_parses_and_displays() {
        let id: NodeId = " 42 ".parse().unwrap();
        assert_eq!(id, NodeId(42));
        assert_eq!(id.to_string(), "42");
        assert!("x".parse::<NodeId>().is_err());
    }

    #[test]
    fn attr_accessors() {
        assert_eq!(AttrValue::from("a").as_str(), Some("a"));
        assert_eq!(AttrValue::Bool(true).as_bool(), Some(true));
        assert_eq!(AttrValue::Timestamp(5).as_int(), Some(5));
        assert_eq!(AttrValue::Int(5).as_timestamp(), None);
    }

    #[test]
    fn snapshot_count() {
        let snap = NodeSnapshot::new(1, "root", content_type::DIR)
            .with_child(NodeSnapshot::new(2, "a", content_type::PAGE))
            .with_child(
                NodeSnapshot::new(3, "b", content_type::DIR)
                    .with_child(NodeSnapshot::new(4, "c", content_type::PAGE)),
            );
        assert_eq!(snap.count(), 4);
    }

    #[test]
    fn error_messages_name_nodes() {
        let err = NodeError::WouldCreateCycle {
            node: NodeId(1),
            parent: NodeId(2),
        };
        assert!(err.to_string().contains('1'));
        assert!(err.to_string().contains('2'));
    }
}
