#![forbid(unsafe_code)]

//! In-memory notebook node store.
//!
//! [`Notebook`] owns every node of one notebook, keyed by [`NodeId`]. Parents
//! are referenced by id, so a child never owns its parent. Every structural
//! mutation is validated first and, once it is known to succeed, bracketed by
//! a start/end change broadcast (see [`crate::broadcast`]).
//!
//! # Invariants
//!
//! 1. Exactly one node (the root) has no parent
//! 2. `parent(c) == Some(p)` iff `c` appears once in `children(p)`
//! 3. No node is its own ancestor
//! 4. Ids are never reused
//!
//! # Affected sets
//!
//! | operation   | broadcast ids                    |
//! |-------------|----------------------------------|
//! | `new_node`  | new node, parent                 |
//! | `move_node` | moved node, old parent, new parent |
//! | `duplicate` | copy, parent                     |
//! | `delete`    | deleted node, parent             |
//! | `rename`    | node                             |

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Weak;

use ahash::AHashMap;
use knote_core::Signal;
use tracing::{debug, debug_span, trace};

use crate::broadcast::{NodeChange, NodeChangeObserver, ObserverList, Phase};
use crate::node::{AttrValue, NodeError, NodeId, NodeSnapshot, attr, content_type};

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: BTreeMap<String, AttrValue>,
}

/// A tree of identity-keyed nodes with change broadcasting.
pub struct Notebook {
    nodes: AHashMap<NodeId, NodeData>,
    root: NodeId,
    next_id: u64,
    observers: ObserverList,
    changes: Signal<NodeChange>,
}

impl fmt::Debug for Notebook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notebook")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("observers", &self.observers)
            .finish()
    }
}

fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Notebook {
    /// Create a notebook holding only a folder root.
    #[must_use]
    pub fn new(title: &str) -> Self {
        let root = NodeId(1);
        let mut nb = Self {
            nodes: AHashMap::new(),
            root,
            next_id: 2,
            observers: ObserverList::default(),
            changes: Signal::new(),
        };
        let attrs = Self::fresh_attrs(root, title, content_type::DIR);
        nb.nodes.insert(
            root,
            NodeData {
                parent: None,
                children: Vec::new(),
                attrs,
            },
        );
        nb
    }

    /// Build a notebook from a loaded snapshot. The snapshot root becomes the
    /// notebook root.
    pub fn from_snapshot(snapshot: NodeSnapshot) -> Result<Self, NodeError> {
        let root = snapshot.id;
        let mut nb = Self {
            nodes: AHashMap::new(),
            root,
            next_id: 1,
            observers: ObserverList::default(),
            changes: Signal::new(),
        };
        nb.adopt_snapshot(snapshot)?;
        nb.next_id = nb.nodes.keys().map(|id| id.0).max().unwrap_or(0) + 1;
        debug!(nodes = nb.nodes.len(), %root, "notebook built from snapshot");
        Ok(nb)
    }

    fn adopt_snapshot(&mut self, snapshot: NodeSnapshot) -> Result<(), NodeError> {
        let mut stack = vec![(None, snapshot)];
        while let Some((parent, mut snapshot)) = stack.pop() {
            let id = snapshot.id;
            if self.nodes.contains_key(&id) {
                return Err(NodeError::DuplicateId(id));
            }
            let mut attrs = std::mem::take(&mut snapshot.attrs);
            attrs
                .entry(attr::NODEID.to_string())
                .or_insert_with(|| AttrValue::Str(id.to_string()));
            let children = std::mem::take(&mut snapshot.children);
            self.nodes.insert(
                id,
                NodeData {
                    parent,
                    children: children.iter().map(|c| c.id).collect(),
                    attrs,
                },
            );
            stack.extend(children.into_iter().map(|c| (Some(id), c)));
        }
        Ok(())
    }

    /// Plain copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> NodeSnapshot {
        // the root always exists
        self.subtree_snapshot(self.root, true)
            .unwrap_or_else(|| NodeSnapshot {
                id: self.root,
                attrs: BTreeMap::new(),
                children: Vec::new(),
            })
    }

    /// Plain copy of `id` and, with `recurse`, its descendants.
    #[must_use]
    pub fn subtree_snapshot(&self, id: NodeId, recurse: bool) -> Option<NodeSnapshot> {
        let data = self.nodes.get(&id)?;
        if !recurse {
            return Some(NodeSnapshot {
                id,
                attrs: data.attrs.clone(),
                children: Vec::new(),
            });
        }

        // pre-order with the slot of each node's parent
        let mut order: Vec<(NodeId, Option<usize>, &BTreeMap<String, AttrValue>)> = Vec::new();
        let mut stack = vec![(id, None)];
        while let Some((next, parent)) = stack.pop() {
            let Some(data) = self.nodes.get(&next) else {
                continue;
            };
            let slot = order.len();
            order.push((next, parent, &data.attrs));
            stack.extend(data.children.iter().rev().map(|c| (*c, Some(slot))));
        }

        // children complete before their parent when walked backwards
        let mut pending: Vec<Vec<NodeSnapshot>> = std::iter::repeat_with(Vec::new)
            .take(order.len())
            .collect();
        let mut top = None;
        for (slot, (node, parent, attrs)) in order.into_iter().enumerate().rev() {
            let mut children = std::mem::take(&mut pending[slot]);
            children.reverse();
            let snapshot = NodeSnapshot {
                id: node,
                attrs: attrs.clone(),
                children,
            };
            match parent {
                Some(parent) => pending[parent].push(snapshot),
                None => top = Some(snapshot),
            }
        }
        top
    }

    fn fresh_attrs(id: NodeId, title: &str, content_type: &str) -> BTreeMap<String, AttrValue> {
        let now = now_timestamp();
        let mut attrs = BTreeMap::new();
        attrs.insert(attr::NODEID.to_string(), AttrValue::Str(id.to_string()));
        attrs.insert(attr::TITLE.to_string(), AttrValue::from(title));
        attrs.insert(attr::CONTENT_TYPE.to_string(), AttrValue::from(content_type));
        attrs.insert(attr::CREATED_TIME.to_string(), AttrValue::Timestamp(now));
        attrs.insert(attr::MODIFIED_TIME.to_string(), AttrValue::Timestamp(now));
        attrs
    }

    fn allocate_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register a bracketing observer. Only a weak reference is kept.
    pub fn add_observer(&self, observer: Weak<RefCell<dyn NodeChangeObserver>>) {
        self.observers.add(observer);
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.live_count()
    }

    /// Id-only change events, delivered after the observers.
    #[must_use]
    pub fn changes(&self) -> &Signal<NodeChange> {
        &self.changes
    }

    /// Broadcast a start/end pair for changes made outside the store's own
    /// structural operations (attribute edits, fade changes).
    pub fn notify_change(&self, nodes: &[NodeId]) {
        self.broadcast(nodes, Phase::Start);
        self.broadcast(nodes, Phase::End);
    }

    fn broadcast(&self, nodes: &[NodeId], phase: Phase) {
        let _span = debug_span!("node_change", ?phase, count = nodes.len()).entered();
        self.observers.notify(self, nodes, phase);
        let event = match phase {
            Phase::Start => NodeChange::Start(nodes.to_vec()),
            Phase::End => NodeChange::End(nodes.to_vec()),
        };
        self.changes.emit(&event);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn is_valid(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn get_attr(&self, id: NodeId, key: &str) -> Option<&AttrValue> {
        self.nodes.get(&id)?.attrs.get(key)
    }

    /// Attribute value, or `default` when unset or the node is gone.
    #[must_use]
    pub fn attr_or(&self, id: NodeId, key: &str, default: AttrValue) -> AttrValue {
        self.get_attr(id, key).cloned().unwrap_or(default)
    }

    #[must_use]
    pub fn attrs(&self, id: NodeId) -> Option<&BTreeMap<String, AttrValue>> {
        self.nodes.get(&id).map(|d| &d.attrs)
    }

    /// Set an attribute. Does not broadcast; see [`notify_change`](Self::notify_change).
    pub fn set_attr(&mut self, id: NodeId, key: &str, value: AttrValue) -> Result<(), NodeError> {
        let data = self.nodes.get_mut(&id).ok_or(NodeError::NotFound(id))?;
        trace!(%id, key, "set attr");
        data.attrs.insert(key.to_string(), value);
        Ok(())
    }

    /// Title, or "" when unset or the node is gone.
    #[must_use]
    pub fn title(&self, id: NodeId) -> &str {
        self.get_attr(id, attr::TITLE)
            .and_then(AttrValue::as_str)
            .unwrap_or("")
    }

    #[must_use]
    pub fn content_type(&self, id: NodeId) -> &str {
        self.get_attr(id, attr::CONTENT_TYPE)
            .and_then(AttrValue::as_str)
            .unwrap_or("")
    }

    /// Children in order; empty for unknown ids.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|d| d.children.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id)?.parent
    }

    #[must_use]
    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// Ancestors of `id`, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut ptr = self.parent(id);
        while let Some(p) = ptr {
            out.push(p);
            ptr = self.parent(p);
        }
        out
    }

    /// True when `node` lies strictly below `ancestor`.
    #[must_use]
    pub fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut ptr = self.parent(node);
        while let Some(p) = ptr {
            if p == ancestor {
                return true;
            }
            ptr = self.parent(p);
        }
        false
    }

    /// False only when the node sets `allow_children` to `false`.
    #[must_use]
    pub fn allows_children(&self, id: NodeId) -> bool {
        self.get_attr(id, attr::ALLOW_CHILDREN)
            .and_then(AttrValue::as_bool)
            .unwrap_or(true)
    }

    /// Internal link for a node.
    #[must_use]
    pub fn url(&self, id: NodeId) -> String {
        format!("nbn:///{id}")
    }

    // ========================================================================
    // Structural operations
    // ========================================================================

    fn require(&self, id: NodeId) -> Result<&NodeData, NodeError> {
        self.nodes.get(&id).ok_or(NodeError::NotFound(id))
    }

    fn require_container(&self, parent: NodeId) -> Result<&NodeData, NodeError> {
        let data = self.require(parent)?;
        if !self.allows_children(parent) {
            return Err(NodeError::ForbidsChildren(parent));
        }
        Ok(data)
    }

    /// Create a child of `parent` at `index` (append when `None`).
    pub fn new_node(
        &mut self,
        parent: NodeId,
        content_type: &str,
        title: &str,
        index: Option<usize>,
    ) -> Result<NodeId, NodeError> {
        let len = self.require_container(parent)?.children.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(NodeError::IndexOutOfBounds { index, len });
        }

        let id = self.allocate_id();
        let affected = [id, parent];
        self.broadcast(&affected, Phase::Start);
        let attrs = Self::fresh_attrs(id, title, content_type);
        self.nodes.insert(
            id,
            NodeData {
                parent: Some(parent),
                children: Vec::new(),
                attrs,
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.insert(index, id);
        }
        debug!(%id, %parent, index, "new node");
        self.broadcast(&affected, Phase::End);
        Ok(id)
    }

    /// Move `id` under `new_parent` at `index`.
    ///
    /// `index` counts positions in `new_parent`'s children as they are before
    /// the move, so dropping "before" or "after" a sibling lands beside it
    /// even when the node moves within its own parent.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId, index: usize) -> Result<(), NodeError> {
        self.require(id)?;
        if id == self.root {
            return Err(NodeError::RootImmovable);
        }
        self.require(new_parent)?;
        if new_parent == id || self.is_descendant(new_parent, id) {
            return Err(NodeError::WouldCreateCycle {
                node: id,
                parent: new_parent,
            });
        }
        if !self.allows_children(new_parent) {
            return Err(NodeError::ForbidsChildren(new_parent));
        }
        let len = self.children(new_parent).len();
        if index > len {
            return Err(NodeError::IndexOutOfBounds { index, len });
        }
        let Some(old_parent) = self.parent(id) else {
            return Err(NodeError::RootImmovable);
        };
        let old_index = self.index_in_parent(id).unwrap_or(0);
        let mut index = index;
        if old_parent == new_parent {
            if index == old_index || index == old_index + 1 {
                trace!(%id, "move is a no-op");
                return Ok(());
            }
            if old_index < index {
                index -= 1;
            }
        }

        let affected: Vec<NodeId> = if old_parent == new_parent {
            vec![id, old_parent]
        } else {
            vec![id, old_parent, new_parent]
        };
        self.broadcast(&affected, Phase::Start);
        if let Some(p) = self.nodes.get_mut(&old_parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(p) = self.nodes.get_mut(&new_parent) {
            let at = index.min(p.children.len());
            p.children.insert(at, id);
        }
        if let Some(d) = self.nodes.get_mut(&id) {
            d.parent = Some(new_parent);
        }
        debug!(%id, from = %old_parent, to = %new_parent, index, "moved node");
        self.broadcast(&affected, Phase::End);
        Ok(())
    }

    /// Copy `id` (and its subtree when `recurse`) as the last child of `parent`.
    pub fn duplicate(&mut self, id: NodeId, parent: NodeId, recurse: bool) -> Result<NodeId, NodeError> {
        self.require(id)?;
        self.require_container(parent)?;
        // captured first so copying into its own subtree terminates
        let Some(snapshot) = self.subtree_snapshot(id, recurse) else {
            return Err(NodeError::NotFound(id));
        };

        let copy = NodeId(self.next_id);
        let affected = [copy, parent];
        self.broadcast(&affected, Phase::Start);
        let copy = self.insert_copy(parent, snapshot);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(copy);
        }
        debug!(source = %id, %copy, %parent, recurse, "duplicated node");
        self.broadcast(&affected, Phase::End);
        Ok(copy)
    }

    /// Insert a snapshot under fresh ids. The caller links the returned root.
    fn insert_copy(&mut self, parent: NodeId, mut snapshot: NodeSnapshot) -> NodeId {
        let now = now_timestamp();
        let top = self.insert_copied_node(parent, std::mem::take(&mut snapshot.attrs), now);
        let mut stack: Vec<(NodeId, NodeSnapshot)> = std::mem::take(&mut snapshot.children)
            .into_iter()
            .rev()
            .map(|c| (top, c))
            .collect();
        while let Some((parent, mut child)) = stack.pop() {
            let id = self.insert_copied_node(parent, std::mem::take(&mut child.attrs), now);
            if let Some(d) = self.nodes.get_mut(&parent) {
                d.children.push(id);
            }
            stack.extend(
                std::mem::take(&mut child.children)
                    .into_iter()
                    .rev()
                    .map(|c| (id, c)),
            );
        }
        top
    }

    fn insert_copied_node(
        &mut self,
        parent: NodeId,
        mut attrs: BTreeMap<String, AttrValue>,
        now: i64,
    ) -> NodeId {
        let id = self.allocate_id();
        attrs.insert(attr::NODEID.to_string(), AttrValue::Str(id.to_string()));
        attrs.insert(attr::CREATED_TIME.to_string(), AttrValue::Timestamp(now));
        attrs.insert(attr::MODIFIED_TIME.to_string(), AttrValue::Timestamp(now));
        self.nodes.insert(
            id,
            NodeData {
                parent: Some(parent),
                children: Vec::new(),
                attrs,
            },
        );
        id
    }

    /// Remove `id` and its whole subtree.
    pub fn delete(&mut self, id: NodeId) -> Result<(), NodeError> {
        self.require(id)?;
        let Some(parent) = self.parent(id) else {
            return Err(NodeError::RootImmovable);
        };

        let affected = [id, parent];
        self.broadcast(&affected, Phase::Start);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        let mut removed = 0usize;
        while let Some(next) = stack.pop() {
            if let Some(data) = self.nodes.remove(&next) {
                stack.extend(data.children);
                removed += 1;
            }
        }
        debug!(%id, removed, "deleted subtree");
        self.broadcast(&affected, Phase::End);
        Ok(())
    }

    /// Change a node's title. Blank titles are refused.
    pub fn rename(&mut self, id: NodeId, title: &str) -> Result<(), NodeError> {
        self.require(id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(NodeError::EmptyTitle);
        }

        let affected = [id];
        self.broadcast(&affected, Phase::Start);
        if let Some(d) = self.nodes.get_mut(&id) {
            d.attrs
                .insert(attr::TITLE.to_string(), AttrValue::from(title));
            d.attrs.insert(
                attr::MODIFIED_TIME.to_string(),
                AttrValue::Timestamp(now_timestamp()),
            );
        }
        self.broadcast(&affected, Phase::End);
        Ok(())
    }
}
