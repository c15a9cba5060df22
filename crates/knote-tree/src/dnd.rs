#![forbid(unsafe_code)]

//! Drag-and-drop re-parenting.
//!
//! A drop is described by a target row and a [`DropPosition`]. Resolution
//! turns that into a parent node and an index into the parent's actual
//! children ([`DropTarget`]); validation ([`check_drop`]) runs four
//! independent checks that must all pass.
//!
//! Resolution reads the projection, moving does not. Resolve first, release
//! any borrow of the projection, then call [`perform_node_drop`] so that the
//! projection observes the moves.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::node::{NodeError, NodeId};
use crate::notebook::Notebook;
use crate::projection::{TreePath, TreeProjection};

/// Drop indicator relative to the target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropPosition {
    Before,
    After,
    IntoOrBefore,
    IntoOrAfter,
}

impl DropPosition {
    #[must_use]
    pub fn is_into(self) -> bool {
        matches!(self, Self::IntoOrBefore | Self::IntoOrAfter)
    }
}

/// Which reorderings a view accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReorderMode {
    /// Dragging is disabled.
    None,
    /// Before/after drops must keep the parent. Drops into a node are allowed.
    SameParent,
    #[default]
    All,
}

/// Rejected drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropError {
    ReorderDisabled,
    /// Target is the source or lies inside it.
    IntoOwnDescendant { source: NodeId, target: NodeId },
    /// The notebook root would be moved or gain a sibling.
    RootDisplaced,
    ForbidsChildren(NodeId),
    /// Same-parent mode and the drop changes parent.
    CrossParent { source: NodeId },
    /// Node missing from the store or without a row.
    Unresolved(NodeId),
    /// The store refused a move.
    Move(NodeError),
}

impl fmt::Display for DropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReorderDisabled => write!(f, "reordering is disabled"),
            Self::IntoOwnDescendant { source, target } => {
                write!(f, "cannot drop node {source} onto its own descendant {target}")
            }
            Self::RootDisplaced => write!(f, "the notebook root cannot be displaced"),
            Self::ForbidsChildren(id) => write!(f, "node {id} does not allow children"),
            Self::CrossParent { source } => {
                write!(f, "node {source} may only be reordered within its parent")
            }
            Self::Unresolved(id) => write!(f, "node {id} is not shown"),
            Self::Move(err) => write!(f, "move failed: {err}"),
        }
    }
}

impl std::error::Error for DropError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Move(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NodeError> for DropError {
    fn from(err: NodeError) -> Self {
        Self::Move(err)
    }
}

/// Path the dropped row would take.
#[must_use]
pub fn compute_new_path(target: &TreePath, position: DropPosition) -> TreePath {
    match position {
        DropPosition::IntoOrBefore | DropPosition::IntoOrAfter => target.child(0),
        DropPosition::Before => target.clone(),
        DropPosition::After => target.with_last(target.last().map_or(0, |i| i + 1)),
    }
}

/// Validate dropping `source` (or external data when `None`) at `target`.
pub fn check_drop(
    nb: &Notebook,
    source: Option<NodeId>,
    target: NodeId,
    position: DropPosition,
    mode: ReorderMode,
) -> Result<(), DropError> {
    if mode == ReorderMode::None {
        return Err(DropError::ReorderDisabled);
    }
    if !nb.is_valid(target) {
        return Err(DropError::Unresolved(target));
    }
    let into = position.is_into();

    if let Some(source) = source {
        if !nb.is_valid(source) {
            return Err(DropError::Unresolved(source));
        }
        if source == nb.root() {
            return Err(DropError::RootDisplaced);
        }
        if source == target || nb.is_descendant(target, source) {
            return Err(DropError::IntoOwnDescendant { source, target });
        }
    }
    if target == nb.root() && !into {
        return Err(DropError::RootDisplaced);
    }
    if into && !nb.allows_children(target) {
        return Err(DropError::ForbidsChildren(target));
    }
    if let Some(source) = source
        && mode == ReorderMode::SameParent
        && !into
        && nb.parent(source) != nb.parent(target)
    {
        return Err(DropError::CrossParent { source });
    }
    Ok(())
}

/// A drop location resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub target: NodeId,
    pub position: DropPosition,
    /// Projected path the first dropped row would take.
    pub path: TreePath,
    pub parent: NodeId,
    /// Index into `parent`'s children, counted before any move.
    pub index: usize,
}

/// Resolve a drop on `target` into a parent and child index.
///
/// The projected index from the new path is mapped onto the parent's actual
/// children, so drops land correctly under sorting and filtering.
pub fn resolve_drop(
    nb: &Notebook,
    projection: &TreeProjection,
    target: NodeId,
    position: DropPosition,
) -> Result<DropTarget, DropError> {
    let target_path = projection
        .path_for_node(nb, target)
        .ok_or(DropError::Unresolved(target))?;
    let path = compute_new_path(&target_path, position);

    let (parent, siblings) = match path.parent() {
        Some(parent_path) => {
            let parent = projection
                .node_at_path(nb, &parent_path)
                .ok_or(DropError::Unresolved(target))?;
            (parent, projection.children(nb, parent))
        }
        None => {
            let parent = nb.parent(target).ok_or(DropError::RootDisplaced)?;
            (parent, projection.top_level(nb))
        }
    };
    let projected = path.last().unwrap_or(0);
    let index = actual_index(nb, parent, &siblings, projected);
    debug!(%target, ?position, %parent, index, "drop resolved");
    Ok(DropTarget {
        target,
        position,
        path,
        parent,
        index,
    })
}

fn actual_index(nb: &Notebook, parent: NodeId, siblings: &[NodeId], projected: usize) -> usize {
    let of = |id: NodeId| {
        if nb.parent(id) == Some(parent) {
            nb.index_in_parent(id)
        } else {
            None
        }
    };
    if let Some(index) = siblings.get(projected).copied().and_then(of) {
        return index;
    }
    if projected > 0
        && let Some(index) = siblings.get(projected - 1).copied().and_then(of)
    {
        return index + 1;
    }
    if projected == 0 {
        0
    } else {
        nb.children(parent).len()
    }
}

/// Move `sources` to `drop`, in order.
///
/// Every source is validated before anything moves. After each move the
/// next insertion index is recomputed from where the moved node actually
/// landed, so a multi-node drop keeps the sources' relative order. Returns
/// the first source for "goto node", or `None` when `sources` is empty.
///
/// A store failure mid-way stops the drop; nodes already moved stay moved.
pub fn perform_node_drop(
    nb: &mut Notebook,
    sources: &[NodeId],
    drop: &DropTarget,
    mode: ReorderMode,
) -> Result<Option<NodeId>, DropError> {
    for source in sources {
        check_drop(nb, Some(*source), drop.target, drop.position, mode)?;
    }
    let mut index = drop.index;
    for source in sources {
        if let Err(err) = nb.move_node(*source, drop.parent, index) {
            warn!(%source, parent = %drop.parent, index, %err, "drop aborted");
            return Err(err.into());
        }
        index = nb.index_in_parent(*source).map_or(index, |i| i + 1);
    }
    Ok(sources.first().copied())
}

// ============================================================================
// External file drops
// ============================================================================

/// One file to import at `parent`/`index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDrop {
    pub parent: NodeId,
    pub index: usize,
    pub path: PathBuf,
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` escapes; malformed escapes pass through.
#[must_use]
pub fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2]))
        {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse a `text/uri-list` payload into local paths.
///
/// Blank lines and `#` comments are skipped; `file://` is stripped.
#[must_use]
pub fn parse_uri_list(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(|line| percent_decode(line.trim()))
        .filter(|uri| !uri.is_empty() && !uri.starts_with('#'))
        .map(|uri| {
            let path = uri.strip_prefix("file://").unwrap_or(&uri);
            // file:///C:/x keeps a leading slash before the drive letter
            let path = if cfg!(windows) {
                path.strip_prefix('/').unwrap_or(path)
            } else {
                path
            };
            PathBuf::from(path)
        })
        .collect()
}

/// Plan importing a dropped uri-list at `drop`, one node per file in list order.
pub fn plan_file_drop(
    nb: &Notebook,
    drop: &DropTarget,
    mode: ReorderMode,
    uri_list: &str,
) -> Result<Vec<FileDrop>, DropError> {
    check_drop(nb, None, drop.target, drop.position, mode)?;
    Ok(parse_uri_list(uri_list)
        .into_iter()
        .enumerate()
        .map(|(offset, path)| FileDrop {
            parent: drop.parent,
            index: drop.index + offset,
            path,
        })
        .collect())
}
