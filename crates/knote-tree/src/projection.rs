#![forbid(unsafe_code)]

//! Positional projection over the node tree.
//!
//! [`TreeProjection`] maps tree paths (sibling indices from a projected root)
//! to node identities and back. It owns no nodes: it is a read-through cache
//! over a [`Notebook`] plus derived column values.
//!
//! # Caches
//!
//! - projected child order per parent, after filter and sort
//! - column values per `(node, column)`, computed on first access
//!
//! Both are invalidated per node when a change bracket ends, so unrelated
//! rows keep their cached values.
//!
//! # Failure Modes
//!
//! A node that was removed, is filtered out, or whose ancestry no longer
//! reaches a projected root has no path. [`TreeProjection::path_for_node`]
//! returns `None` for it and never panics.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Write as _};

use ahash::{AHashMap, AHashSet};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, Local, TimeZone};
use knote_core::Signal;
use tracing::{debug, trace};

use crate::broadcast::NodeChangeObserver;
use crate::icons::node_icon_file;
use crate::node::{AttrValue, NodeId, attr};
use crate::notebook::Notebook;

// ============================================================================
// Paths
// ============================================================================

/// Sibling indices from a projected root down to a row.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    #[must_use]
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Path of the parent row; `None` for a top-level row.
    #[must_use]
    pub fn parent(&self) -> Option<TreePath> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    #[must_use]
    pub fn child(&self, index: usize) -> TreePath {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Same depth, last index replaced.
    #[must_use]
    pub fn with_last(&self, index: usize) -> TreePath {
        let mut indices = self.0.clone();
        if let Some(last) = indices.last_mut() {
            *last = index;
        }
        Self(indices)
    }
}

impl From<Vec<usize>> for TreePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&parts.join(":"))
    }
}

// ============================================================================
// Columns
// ============================================================================

/// How a column derives its value from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Title,
    /// Icon file name; `open` selects the expanded variant.
    Icon { open: bool },
    /// Attribute rendered as text.
    Text(String),
    /// Timestamp attribute formatted relative to now.
    Timestamp(String),
    /// Attribute as a sort key.
    SortKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Names of the columns added by [`TreeProjection::standard`].
pub mod column {
    pub const TITLE: &str = "title";
    pub const TITLE_SORT: &str = "title_sort";
    pub const ICON: &str = "icon";
    pub const ICON_OPEN: &str = "icon_open";
    pub const CREATED_TIME: &str = "created_time";
    pub const MODIFIED_TIME: &str = "modified_time";
    pub const CREATED_SORT: &str = "created_time_sort";
    pub const MODIFIED_SORT: &str = "modified_time_sort";
}

/// Orderable key. Missing values sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Missing,
    Int(i64),
    Text(String),
}

/// A computed column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Icon { file: String, faded: bool },
    Key(SortKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Name of the column providing keys.
    pub column: String,
    pub descending: bool,
}

/// strftime patterns picked by how far a timestamp lies from now.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DateFormats {
    pub same_day: String,
    pub same_month: String,
    pub same_year: String,
    pub diff_year: String,
}

impl Default for DateFormats {
    fn default() -> Self {
        Self {
            same_day: "%I:%M:%S %p".into(),
            same_month: "%a, %d %I:%M %p".into(),
            same_year: "%a, %b %d %I:%M %p".into(),
            diff_year: "%a, %b %d, %Y".into(),
        }
    }
}

impl DateFormats {
    /// Names of the patterns chrono cannot parse.
    #[must_use]
    pub fn invalid_patterns(&self) -> Vec<&'static str> {
        [
            ("same_day", &self.same_day),
            ("same_month", &self.same_month),
            ("same_year", &self.same_year),
            ("diff_year", &self.diff_year),
        ]
        .into_iter()
        .filter(|(_, pattern)| !is_valid_pattern(pattern))
        .map(|(name, _)| name)
        .collect()
    }
}

/// Whether every strftime specifier in `pattern` is known.
#[must_use]
pub fn is_valid_pattern(pattern: &str) -> bool {
    StrftimeItems::new(pattern).all(|item| !matches!(item, Item::Error))
}

/// Format `timestamp` (seconds since epoch) in `now`'s time zone, choosing
/// the pattern by calendar distance from `now`.
pub fn format_timestamp<Tz: TimeZone>(timestamp: i64, now: &DateTime<Tz>, formats: &DateFormats) -> String
where
    Tz::Offset: fmt::Display,
{
    let Some(when) = now.timezone().timestamp_opt(timestamp, 0).single() else {
        return String::new();
    };
    let pattern = if when.year() != now.year() {
        &formats.diff_year
    } else if when.month() != now.month() {
        &formats.same_year
    } else if when.day() != now.day() {
        &formats.same_month
    } else {
        &formats.same_day
    };
    let mut out = String::new();
    if write!(out, "{}", when.format(pattern)).is_err() {
        trace!(pattern = %pattern, "unformattable date pattern");
        return String::new();
    }
    out
}

fn attr_text(value: &AttrValue) -> String {
    match value {
        AttrValue::Str(s) => s.clone(),
        AttrValue::Int(i) | AttrValue::Timestamp(i) => i.to_string(),
        AttrValue::Float(f) => f.to_string(),
        AttrValue::Bool(b) => b.to_string(),
    }
}

fn attr_sort_key(value: Option<&AttrValue>) -> SortKey {
    match value {
        Some(AttrValue::Str(s)) => SortKey::Text(s.to_lowercase()),
        Some(AttrValue::Int(i) | AttrValue::Timestamp(i)) => SortKey::Int(*i),
        Some(AttrValue::Bool(b)) => SortKey::Int(i64::from(*b)),
        Some(AttrValue::Float(f)) => SortKey::Int(*f as i64),
        None => SortKey::Missing,
    }
}

// ============================================================================
// Row changes
// ============================================================================

/// Positional change notification for a presentation widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Deleted(TreePath),
    Inserted(TreePath),
    Changed(TreePath),
}

/// Visibility predicate over nodes.
pub type NodeFilter = Box<dyn Fn(&Notebook, NodeId) -> bool>;

/// Node state captured when a change bracket starts.
#[derive(Debug, Clone)]
struct Pending {
    id: NodeId,
    path: Option<TreePath>,
    parent: Option<NodeId>,
}

// ============================================================================
// Projection
// ============================================================================

/// Filtered, sorted positional view over a [`Notebook`].
pub struct TreeProjection {
    roots: Vec<NodeId>,
    filter: Option<NodeFilter>,
    sort: Option<SortSpec>,
    columns: Vec<ColumnDef>,
    date_formats: DateFormats,
    /// Projected children per parent; `None` keys the top level.
    order: RefCell<AHashMap<Option<NodeId>, Vec<NodeId>>>,
    values: RefCell<AHashMap<(NodeId, usize), ColumnValue>>,
    computed: Cell<u64>,
    fades: AHashSet<NodeId>,
    pending: Vec<Pending>,
    rows: Signal<RowChange>,
}

impl fmt::Debug for TreeProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeProjection")
            .field("roots", &self.roots)
            .field("has_filter", &self.filter.is_some())
            .field("sort", &self.sort)
            .field("columns", &self.columns.len())
            .field("cached_values", &self.values.borrow().len())
            .field("fades", &self.fades.len())
            .finish()
    }
}

impl Default for TreeProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeProjection {
    /// Empty projection with no columns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            filter: None,
            sort: None,
            columns: Vec::new(),
            date_formats: DateFormats::default(),
            order: RefCell::new(AHashMap::new()),
            values: RefCell::new(AHashMap::new()),
            computed: Cell::new(0),
            fades: AHashSet::new(),
            pending: Vec::new(),
            rows: Signal::new(),
        }
    }

    /// Projection with the title, icon and timestamp columns.
    #[must_use]
    pub fn standard() -> Self {
        let mut p = Self::new();
        p.add_column(ColumnDef::new(column::TITLE, ColumnKind::Title));
        p.add_column(ColumnDef::new(
            column::TITLE_SORT,
            ColumnKind::SortKey(attr::TITLE.into()),
        ));
        p.add_column(ColumnDef::new(column::ICON, ColumnKind::Icon { open: false }));
        p.add_column(ColumnDef::new(column::ICON_OPEN, ColumnKind::Icon { open: true }));
        p.add_column(ColumnDef::new(
            column::CREATED_TIME,
            ColumnKind::Timestamp(attr::CREATED_TIME.into()),
        ));
        p.add_column(ColumnDef::new(
            column::MODIFIED_TIME,
            ColumnKind::Timestamp(attr::MODIFIED_TIME.into()),
        ));
        p.add_column(ColumnDef::new(
            column::CREATED_SORT,
            ColumnKind::SortKey(attr::CREATED_TIME.into()),
        ));
        p.add_column(ColumnDef::new(
            column::MODIFIED_SORT,
            ColumnKind::SortKey(attr::MODIFIED_TIME.into()),
        ));
        p
    }

    /// Positional change stream.
    #[must_use]
    pub fn rows(&self) -> &Signal<RowChange> {
        &self.rows
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replace the projected top-level nodes.
    pub fn set_root_nodes(&mut self, roots: Vec<NodeId>) {
        debug!(count = roots.len(), "projection roots set");
        self.roots = roots;
        self.invalidate_all();
    }

    #[must_use]
    pub fn root_nodes(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn set_filter(&mut self, filter: Option<NodeFilter>) {
        self.filter = filter;
        self.order.borrow_mut().clear();
    }

    pub fn set_sort(&mut self, sort: Option<SortSpec>) {
        self.sort = sort;
        self.order.borrow_mut().clear();
    }

    #[must_use]
    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn set_date_formats(&mut self, formats: DateFormats) {
        self.date_formats = formats;
        self.values.borrow_mut().clear();
    }

    /// Append a column and return its index.
    pub fn add_column(&mut self, def: ColumnDef) -> usize {
        self.columns.push(def);
        self.columns.len() - 1
    }

    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Drop every cached order and value.
    pub fn invalidate_all(&mut self) {
        self.order.borrow_mut().clear();
        self.values.borrow_mut().clear();
    }

    // ========================================================================
    // Structure
    // ========================================================================

    fn passes(&self, nb: &Notebook, id: NodeId) -> bool {
        nb.is_valid(id) && self.filter.as_ref().is_none_or(|f| f(nb, id))
    }

    /// Projected top-level nodes after filtering.
    #[must_use]
    pub fn top_level(&self, nb: &Notebook) -> Vec<NodeId> {
        if let Some(hit) = self.order.borrow().get(&None) {
            return hit.clone();
        }
        let rows: Vec<NodeId> = self
            .roots
            .iter()
            .copied()
            .filter(|id| self.passes(nb, *id))
            .collect();
        self.order.borrow_mut().insert(None, rows.clone());
        rows
    }

    /// Projected children of `parent` after filtering and sorting.
    #[must_use]
    pub fn children(&self, nb: &Notebook, parent: NodeId) -> Vec<NodeId> {
        if let Some(hit) = self.order.borrow().get(&Some(parent)) {
            return hit.clone();
        }
        let mut rows: Vec<NodeId> = nb
            .children(parent)
            .iter()
            .copied()
            .filter(|id| self.passes(nb, *id))
            .collect();
        if let Some(sort) = &self.sort
            && let Some(col) = self.column_by_name(&sort.column)
        {
            let mut keyed: Vec<(SortKey, NodeId)> = rows
                .iter()
                .map(|id| (self.sort_key(nb, *id, col), *id))
                .collect();
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            if sort.descending {
                keyed.reverse();
            }
            rows = keyed.into_iter().map(|(_, id)| id).collect();
        }
        self.order.borrow_mut().insert(Some(parent), rows.clone());
        rows
    }

    fn sort_key(&self, nb: &Notebook, id: NodeId, column: usize) -> SortKey {
        match self.value(nb, id, column) {
            Some(ColumnValue::Key(key)) => key,
            Some(ColumnValue::Text(text)) => SortKey::Text(text.to_lowercase()),
            Some(ColumnValue::Icon { file, .. }) => SortKey::Text(file),
            None => SortKey::Missing,
        }
    }

    /// Path of `id`, or `None` when it has no row.
    #[must_use]
    pub fn path_for_node(&self, nb: &Notebook, id: NodeId) -> Option<TreePath> {
        let top = self.top_level(nb);
        let mut indices = Vec::new();
        let mut node = id;
        // bounded walk: a broken ancestry must not loop forever
        for _ in 0..=nb.len() {
            if !self.passes(nb, node) {
                trace!(%id, at = %node, "no path: filtered or removed");
                return None;
            }
            if let Some(pos) = top.iter().position(|r| *r == node) {
                indices.push(pos);
                indices.reverse();
                return Some(TreePath(indices));
            }
            let parent = nb.parent(node)?;
            let pos = self.children(nb, parent).iter().position(|c| *c == node)?;
            indices.push(pos);
            node = parent;
        }
        None
    }

    /// Node shown at `path`, if any.
    #[must_use]
    pub fn node_at_path(&self, nb: &Notebook, path: &TreePath) -> Option<NodeId> {
        let (first, rest) = path.indices().split_first()?;
        let mut node = *self.top_level(nb).get(*first)?;
        for index in rest {
            node = *self.children(nb, node).get(*index)?;
        }
        Some(node)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Value of `column` for `id`, computed on first access.
    #[must_use]
    pub fn value(&self, nb: &Notebook, id: NodeId, column: usize) -> Option<ColumnValue> {
        if !nb.is_valid(id) {
            return None;
        }
        if let Some(hit) = self.values.borrow().get(&(id, column)) {
            return Some(hit.clone());
        }
        let def = self.columns.get(column)?;
        let value = match &def.kind {
            ColumnKind::Title => ColumnValue::Text(nb.title(id).to_string()),
            ColumnKind::Icon { open } => ColumnValue::Icon {
                file: node_icon_file(nb, id, *open),
                faded: self.fades.contains(&id),
            },
            ColumnKind::Text(key) => {
                ColumnValue::Text(nb.get_attr(id, key).map(attr_text).unwrap_or_default())
            }
            ColumnKind::Timestamp(key) => ColumnValue::Text(
                nb.get_attr(id, key)
                    .and_then(AttrValue::as_int)
                    .map(|ts| format_timestamp(ts, &Local::now(), &self.date_formats))
                    .unwrap_or_default(),
            ),
            ColumnKind::SortKey(key) => ColumnValue::Key(attr_sort_key(nb.get_attr(id, key))),
        };
        self.computed.set(self.computed.get() + 1);
        self.values.borrow_mut().insert((id, column), value.clone());
        Some(value)
    }

    /// Value of the column called `name`.
    #[must_use]
    pub fn value_by_name(&self, nb: &Notebook, id: NodeId, name: &str) -> Option<ColumnValue> {
        self.value(nb, id, self.column_by_name(name)?)
    }

    /// How many values have been computed (cache misses) so far.
    #[must_use]
    pub fn computed_values(&self) -> u64 {
        self.computed.get()
    }

    /// Forget cached values of one node.
    pub fn invalidate_node(&self, id: NodeId) {
        self.values.borrow_mut().retain(|(node, _), _| *node != id);
    }

    fn invalidate_icons(&self, id: NodeId) {
        let icon_cols: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c.kind, ColumnKind::Icon { .. }))
            .map(|(i, _)| i)
            .collect();
        let mut values = self.values.borrow_mut();
        for col in icon_cols {
            values.remove(&(id, col));
        }
    }

    // ========================================================================
    // Fade set
    // ========================================================================

    /// Replace the faded set. Only icon columns change.
    pub fn fade_nodes(&mut self, nb: &Notebook, nodes: &[NodeId]) {
        let next: AHashSet<NodeId> = nodes.iter().copied().collect();
        let touched: Vec<NodeId> = self.fades.union(&next).copied().collect();
        self.fades = next;
        for id in &touched {
            self.invalidate_icons(*id);
        }
        debug!(count = self.fades.len(), "fade set replaced");
        for id in touched {
            if let Some(path) = self.path_for_node(nb, id) {
                self.rows.emit(&RowChange::Changed(path));
            }
        }
    }

    pub fn clear_fading(&mut self, nb: &Notebook) {
        self.fade_nodes(nb, &[]);
    }

    #[must_use]
    pub fn is_faded(&self, id: NodeId) -> bool {
        self.fades.contains(&id)
    }

    #[must_use]
    pub fn faded_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.fades.iter().copied().collect();
        nodes.sort();
        nodes
    }
}

impl NodeChangeObserver for TreeProjection {
    fn on_changed_start(&mut self, nb: &Notebook, nodes: &[NodeId]) {
        self.pending = nodes
            .iter()
            .map(|id| Pending {
                id: *id,
                path: self.path_for_node(nb, *id),
                parent: nb.parent(*id),
            })
            .collect();
    }

    fn on_changed_end(&mut self, nb: &Notebook, nodes: &[NodeId]) {
        let pending = std::mem::take(&mut self.pending);
        {
            let mut order = self.order.borrow_mut();
            order.remove(&None);
            for id in nodes {
                order.remove(&Some(*id));
                if let Some(parent) = nb.parent(*id) {
                    order.remove(&Some(parent));
                }
            }
            for p in &pending {
                if let Some(parent) = p.parent {
                    order.remove(&Some(parent));
                }
            }
            order.retain(|key, _| key.is_none_or(|id| nb.is_valid(id)));
        }
        {
            let mut values = self.values.borrow_mut();
            values.retain(|(id, _), _| nb.is_valid(*id) && !nodes.contains(id));
        }
        self.fades.retain(|id| nb.is_valid(*id));

        let old_path = |id: NodeId| {
            pending
                .iter()
                .find(|p| p.id == id)
                .and_then(|p| p.path.clone())
        };
        let mut deleted = Vec::new();
        let mut inserted = Vec::new();
        let mut changed = Vec::new();
        for id in nodes {
            let before = old_path(*id);
            let after = self.path_for_node(nb, *id);
            match (before, after) {
                (Some(b), Some(a)) if a == b => changed.push(a),
                (b, a) => {
                    deleted.extend(b);
                    inserted.extend(a);
                }
            }
        }
        // deepest and last rows first so earlier deletions do not shift later ones
        deleted.sort();
        deleted.dedup();
        inserted.sort();
        inserted.dedup();
        changed.sort();
        changed.dedup();
        for path in deleted.into_iter().rev() {
            self.rows.emit(&RowChange::Deleted(path));
        }
        for path in inserted {
            self.rows.emit(&RowChange::Inserted(path));
        }
        for path in changed {
            self.rows.emit(&RowChange::Changed(path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::observe;
    use crate::node::content_type::{DIR, PAGE};
    use chrono::Utc;
    use std::rc::Rc;

    /// root -> {a -> {a1, a2}, b}; projection rooted at root's children.
    fn sample() -> (Notebook, TreeProjection, [NodeId; 4]) {
        let mut nb = Notebook::new("root");
        let root = nb.root();
        let a = nb.new_node(root, DIR, "a", None).unwrap();
        let a1 = nb.new_node(a, PAGE, "a1", None).unwrap();
        let a2 = nb.new_node(a, PAGE, "a2", None).unwrap();
        let b = nb.new_node(root, PAGE, "b", None).unwrap();
        let mut proj = TreeProjection::standard();
        proj.set_root_nodes(vec![root]);
        (nb, proj, [a, a1, a2, b])
    }

    #[test]
    fn tree_path_helpers() {
        let path = TreePath::new(vec![0, 2, 1]);
        assert_eq!(path.parent(), Some(TreePath::new(vec![0, 2])));
        assert_eq!(path.child(4).indices(), &[0, 2, 1, 4]);
        assert_eq!(path.with_last(0).indices(), &[0, 2, 0]);
        assert_eq!(TreePath::new(vec![3]).parent(), None);
        assert_eq!(path.to_string(), "0:2:1");
    }

    #[test]
    fn paths_follow_sibling_order() {
        let (nb, proj, [a, a1, a2, b]) = sample();
        assert_eq!(proj.path_for_node(&nb, nb.root()), Some(TreePath::new(vec![0])));
        assert_eq!(proj.path_for_node(&nb, a), Some(TreePath::new(vec![0, 0])));
        assert_eq!(proj.path_for_node(&nb, a2), Some(TreePath::new(vec![0, 0, 1])));
        assert_eq!(proj.path_for_node(&nb, b), Some(TreePath::new(vec![0, 1])));
        assert_eq!(proj.node_at_path(&nb, &TreePath::new(vec![0, 0, 0])), Some(a1));
        assert_eq!(proj.node_at_path(&nb, &TreePath::new(vec![0, 5])), None);
    }

    #[test]
    fn removed_node_has_no_path() {
        let (mut nb, proj, [a, a1, _, _]) = sample();
        let proj = Rc::new(RefCell::new(proj));
        observe(&nb, &proj);
        nb.delete(a).unwrap();
        assert_eq!(proj.borrow().path_for_node(&nb, a1), None);
        assert_eq!(proj.borrow().path_for_node(&nb, a), None);
    }

    #[test]
    fn filtered_node_has_no_path() {
        let (nb, mut proj, [a, a1, a2, b]) = sample();
        proj.set_filter(Some(Box::new(move |_, id| id != a)));
        assert_eq!(proj.path_for_node(&nb, a), None);
        assert_eq!(proj.path_for_node(&nb, a1), None);
        assert_eq!(proj.path_for_node(&nb, a2), None);
        assert_eq!(proj.path_for_node(&nb, b), Some(TreePath::new(vec![0, 0])));
    }

    #[test]
    fn node_outside_roots_has_no_path() {
        let (nb, mut proj, [a, a1, _, b]) = sample();
        proj.set_root_nodes(vec![a]);
        assert_eq!(proj.path_for_node(&nb, a1), Some(TreePath::new(vec![0, 0])));
        assert_eq!(proj.path_for_node(&nb, b), None);
        assert_eq!(proj.path_for_node(&nb, nb.root()), None);
    }

    #[test]
    fn sort_by_title_descending() {
        let (nb, mut proj, [a, _, _, b]) = sample();
        proj.set_sort(Some(SortSpec {
            column: column::TITLE_SORT.into(),
            descending: true,
        }));
        assert_eq!(proj.children(&nb, nb.root()), vec![b, a]);
        assert_eq!(proj.path_for_node(&nb, a), Some(TreePath::new(vec![0, 1])));
    }

    #[test]
    fn values_are_lazy_and_memoized() {
        let (nb, proj, [a, ..]) = sample();
        assert_eq!(proj.computed_values(), 0);
        let title = proj.value_by_name(&nb, a, column::TITLE);
        assert_eq!(title, Some(ColumnValue::Text("a".into())));
        let _ = proj.value_by_name(&nb, a, column::TITLE);
        assert_eq!(proj.computed_values(), 1);
    }

    #[test]
    fn rename_invalidates_only_that_node() {
        let (mut nb, proj, [a, _, _, b]) = sample();
        let proj = Rc::new(RefCell::new(proj));
        observe(&nb, &proj);
        let _ = proj.borrow().value_by_name(&nb, a, column::TITLE);
        let _ = proj.borrow().value_by_name(&nb, b, column::TITLE);
        nb.rename(a, "renamed").unwrap();

        let p = proj.borrow();
        assert_eq!(
            p.value_by_name(&nb, a, column::TITLE),
            Some(ColumnValue::Text("renamed".into()))
        );
        let before = p.computed_values();
        let _ = p.value_by_name(&nb, b, column::TITLE);
        assert_eq!(p.computed_values(), before);
    }

    #[test]
    fn move_emits_delete_then_insert() {
        let (mut nb, proj, [a, a1, _, b]) = sample();
        let proj = Rc::new(RefCell::new(proj));
        observe(&nb, &proj);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = proj
            .borrow()
            .rows()
            .subscribe(move |c: &RowChange| sink.borrow_mut().push(c.clone()));

        nb.move_node(a1, b, 0).unwrap();
        let seen = seen.borrow();
        assert!(seen.contains(&RowChange::Deleted(TreePath::new(vec![0, 0, 0]))));
        assert!(seen.contains(&RowChange::Inserted(TreePath::new(vec![0, 1, 0]))));
        let del = seen
            .iter()
            .position(|c| matches!(c, RowChange::Deleted(_)))
            .unwrap();
        let ins = seen
            .iter()
            .position(|c| matches!(c, RowChange::Inserted(_)))
            .unwrap();
        assert!(del < ins);
        assert_eq!(proj.borrow().path_for_node(&nb, a1), Some(TreePath::new(vec![0, 1, 0])));
        assert_eq!(proj.borrow().path_for_node(&nb, a), Some(TreePath::new(vec![0, 0])));
    }

    #[test]
    fn fade_changes_icon_column_only() {
        let (nb, mut proj, [a, ..]) = sample();
        let icon = proj.value_by_name(&nb, a, column::ICON).unwrap();
        assert_eq!(
            icon,
            ColumnValue::Icon {
                file: "folder.png".into(),
                faded: false
            }
        );
        let _ = proj.value_by_name(&nb, a, column::TITLE);

        proj.fade_nodes(&nb, &[a]);
        assert!(proj.is_faded(a));
        let before = proj.computed_values();
        assert_eq!(
            proj.value_by_name(&nb, a, column::ICON),
            Some(ColumnValue::Icon {
                file: "folder.png".into(),
                faded: true
            })
        );
        let _ = proj.value_by_name(&nb, a, column::TITLE);
        assert_eq!(proj.computed_values(), before + 1);

        proj.clear_fading(&nb);
        assert!(!proj.is_faded(a));
        assert!(proj.faded_nodes().is_empty());
    }

    #[test]
    fn timestamp_formats_by_distance() {
        let formats = DateFormats::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
        let same_day = Utc.with_ymd_and_hms(2024, 5, 10, 9, 5, 7).unwrap();
        let same_month = Utc.with_ymd_and_hms(2024, 5, 2, 9, 5, 7).unwrap();
        let same_year = Utc.with_ymd_and_hms(2024, 1, 2, 9, 5, 7).unwrap();
        let other_year = Utc.with_ymd_and_hms(2021, 1, 2, 9, 5, 7).unwrap();

        assert_eq!(format_timestamp(same_day.timestamp(), &now, &formats), "09:05:07 AM");
        assert_eq!(format_timestamp(same_month.timestamp(), &now, &formats), "Thu, 02 09:05 AM");
        assert_eq!(
            format_timestamp(same_year.timestamp(), &now, &formats),
            "Tue, Jan 02 09:05 AM"
        );
        assert_eq!(format_timestamp(other_year.timestamp(), &now, &formats), "Sat, Jan 02, 2021");
    }

    #[test]
    fn bad_date_pattern_formats_empty() {
        let formats = DateFormats {
            same_day: "%Q".into(),
            ..DateFormats::default()
        };
        assert_eq!(formats.invalid_patterns(), vec!["same_day"]);
        assert!(DateFormats::default().invalid_patterns().is_empty());

        let now = Utc.with_ymd_and_hms(2024, 5, 10, 15, 30, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        assert_eq!(format_timestamp(earlier.timestamp(), &now, &formats), "");
    }

    #[test]
    fn bad_date_pattern_leaves_column_empty() {
        let (nb, mut proj, [a, ..]) = sample();
        proj.set_date_formats(DateFormats {
            same_day: "%Q".into(),
            same_month: "%Q".into(),
            same_year: "%Q".into(),
            diff_year: "%Q".into(),
        });
        assert_eq!(
            proj.value_by_name(&nb, a, column::CREATED_TIME),
            Some(ColumnValue::Text(String::new()))
        );
    }

    #[test]
    fn sort_keys_order_missing_first() {
        assert!(SortKey::Missing < SortKey::Int(0));
        assert!(SortKey::Int(5) < SortKey::Text(String::new()));
        assert_eq!(
            attr_sort_key(Some(&AttrValue::from("Zed"))),
            SortKey::Text("zed".into())
        );
    }
}
