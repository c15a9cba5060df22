#![forbid(unsafe_code)]

//! Property tests for projection path invariants.
//!
//! Validates:
//! - Every retained node has a path that matches its actual sibling order.
//! - `node_at_path(path_for_node(id)) == id` for every retained node.
//! - Removed nodes (and their descendants) have no path.
//! - The observing projection stays consistent across random sequences of
//!   insert, remove, reorder and re-parent operations.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use knote_tree::{Notebook, NodeId, TreePath, TreeProjection, content_type, observe};

// ============================================================================
// Strategy helpers
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    /// Insert under the n-th live node at a position taken modulo len + 1.
    Insert(usize, usize),
    /// Remove the n-th live non-root node.
    Remove(usize),
    /// Move the n-th live non-root node within its parent.
    Reorder(usize, usize),
    /// Move the n-th live non-root node under the m-th live node.
    Reparent(usize, usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), any::<usize>()).prop_map(|(p, i)| Op::Insert(p, i)),
        2 => any::<usize>().prop_map(Op::Remove),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(n, i)| Op::Reorder(n, i)),
        2 => (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(n, p, i)| Op::Reparent(n, p, i)),
    ]
}

/// Live nodes in depth-first order, root first.
fn live_nodes(nb: &Notebook) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![nb.root()];
    while let Some(id) = stack.pop() {
        out.push(id);
        stack.extend(nb.children(id).iter().rev().copied());
    }
    out
}

/// Apply `op`; invalid picks are skipped. Returns nodes removed by the op.
fn apply(nb: &mut Notebook, op: &Op) -> Vec<NodeId> {
    let live = live_nodes(nb);
    let movable = &live[1..];
    match op {
        Op::Insert(p, i) => {
            let parent = live[p % live.len()];
            let len = nb.children(parent).len();
            nb.new_node(parent, content_type::PAGE, "n", Some(i % (len + 1)))
                .unwrap();
            Vec::new()
        }
        Op::Remove(n) => {
            if movable.is_empty() {
                return Vec::new();
            }
            let id = movable[n % movable.len()];
            let mut gone = vec![id];
            let mut stack = nb.children(id).to_vec();
            while let Some(c) = stack.pop() {
                gone.push(c);
                stack.extend(nb.children(c).iter().copied());
            }
            nb.delete(id).unwrap();
            gone
        }
        Op::Reorder(n, i) => {
            if movable.is_empty() {
                return Vec::new();
            }
            let id = movable[n % movable.len()];
            let parent = nb.parent(id).unwrap();
            let len = nb.children(parent).len();
            nb.move_node(id, parent, i % (len + 1)).unwrap();
            Vec::new()
        }
        Op::Reparent(n, p, i) => {
            if movable.is_empty() {
                return Vec::new();
            }
            let id = movable[n % movable.len()];
            let parent = live[p % live.len()];
            if parent == id || nb.is_descendant(parent, id) {
                return Vec::new();
            }
            let len = nb.children(parent).len();
            nb.move_node(id, parent, i % (len + 1)).unwrap();
            Vec::new()
        }
    }
}

/// Path built from the store alone.
fn expected_path(nb: &Notebook, id: NodeId) -> TreePath {
    let mut indices = vec![];
    let mut node = id;
    while let Some(i) = nb.index_in_parent(node) {
        indices.push(i);
        node = nb.parent(node).unwrap();
    }
    indices.push(0);
    indices.reverse();
    TreePath::new(indices)
}

// ============================================================================
// Invariant 1: paths follow sibling order under random mutation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn path_for_node_tracks_mutations(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut nb = Notebook::new("root");
        let projection = Rc::new(RefCell::new(TreeProjection::standard()));
        projection.borrow_mut().set_root_nodes(vec![nb.root()]);
        observe(&nb, &projection);

        let mut removed = Vec::new();
        for op in &ops {
            // warm the caches so stale entries would be observable
            for id in live_nodes(&nb) {
                let _ = projection.borrow().path_for_node(&nb, id);
            }
            removed.extend(apply(&mut nb, op));

            let proj = projection.borrow();
            for id in live_nodes(&nb) {
                let path = proj.path_for_node(&nb, id);
                prop_assert_eq!(path.clone(), Some(expected_path(&nb, id)));
                prop_assert_eq!(proj.node_at_path(&nb, &path.unwrap()), Some(id));
            }
            for id in &removed {
                prop_assert_eq!(proj.path_for_node(&nb, *id), None);
            }
        }
    }
}

// ============================================================================
// Invariant 2: every visible row resolves back to its node
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn projected_children_match_store(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let mut nb = Notebook::new("root");
        let projection = Rc::new(RefCell::new(TreeProjection::standard()));
        projection.borrow_mut().set_root_nodes(vec![nb.root()]);
        observe(&nb, &projection);

        for op in &ops {
            apply(&mut nb, op);
        }
        let proj = projection.borrow();
        for id in live_nodes(&nb) {
            prop_assert_eq!(proj.children(&nb, id), nb.children(id).to_vec());
        }
    }
}
