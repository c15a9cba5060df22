#![forbid(unsafe_code)]

//! Application-scoped icon cache.
//!
//! One [`IconCache`] is built per application and handed to whoever renders
//! node icons. Lookups are get-or-load-and-memoize keyed by `(path, size)`;
//! faded variants (cut-pending feedback) are memoized separately.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, trace};

use crate::node::{AttrValue, NodeId, attr, content_type};
use crate::notebook::Notebook;

/// Alpha applied to faded icons.
pub const FADE_ALPHA: u8 = 128;

/// Loaded icon image data at one requested size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    /// Encoded image bytes as read from disk.
    pub data: Rc<[u8]>,
    pub size: u32,
    /// Overall opacity, 255 = opaque.
    pub alpha: u8,
}

impl Pixmap {
    /// Same image at reduced opacity.
    #[must_use]
    pub fn faded(&self, alpha: u8) -> Self {
        Self {
            data: Rc::clone(&self.data),
            size: self.size,
            alpha: ((u16::from(self.alpha) * u16::from(alpha)) / 255) as u8,
        }
    }
}

/// Icon loading failure.
#[derive(Debug)]
pub enum IconError {
    Io { path: PathBuf, source: std::io::Error },
    Empty(PathBuf),
}

impl fmt::Display for IconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read icon {}: {source}", path.display())
            }
            Self::Empty(path) => write!(f, "icon file {} is empty", path.display()),
        }
    }
}

impl std::error::Error for IconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Empty(_) => None,
        }
    }
}

type Loader = Box<dyn Fn(&Path) -> Result<Vec<u8>, IconError>>;

fn read_from_disk(path: &Path) -> Result<Vec<u8>, IconError> {
    let bytes = std::fs::read(path).map_err(|source| IconError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(IconError::Empty(path.to_path_buf()));
    }
    Ok(bytes)
}

type CacheKey = (PathBuf, u32);

/// Memoizing icon loader scoped to one application instance.
pub struct IconCache {
    base_dir: PathBuf,
    loader: Loader,
    plain: RefCell<AHashMap<CacheKey, Rc<Pixmap>>>,
    faded: RefCell<AHashMap<CacheKey, Rc<Pixmap>>>,
}

impl fmt::Debug for IconCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IconCache")
            .field("base_dir", &self.base_dir)
            .field("plain", &self.plain.borrow().len())
            .field("faded", &self.faded.borrow().len())
            .finish()
    }
}

impl IconCache {
    /// Cache reading files from disk; relative paths resolve against `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_loader(base_dir, read_from_disk)
    }

    /// Cache with a custom byte loader.
    #[must_use]
    pub fn with_loader(
        base_dir: impl Into<PathBuf>,
        loader: impl Fn(&Path) -> Result<Vec<u8>, IconError> + 'static,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            loader: Box::new(loader),
            plain: RefCell::new(AHashMap::new()),
            faded: RefCell::new(AHashMap::new()),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Icon at `size`, loading it on first use.
    pub fn get(&self, path: impl AsRef<Path>, size: u32) -> Result<Rc<Pixmap>, IconError> {
        self.load((self.resolve(path.as_ref()), size))
    }

    /// Faded variant of [`get`](Self::get), memoized separately.
    pub fn faded(&self, path: impl AsRef<Path>, size: u32) -> Result<Rc<Pixmap>, IconError> {
        let key = (self.resolve(path.as_ref()), size);
        if let Some(hit) = self.faded.borrow().get(&key) {
            return Ok(Rc::clone(hit));
        }
        let base = self.load(key.clone())?;
        let pixmap = Rc::new(base.faded(FADE_ALPHA));
        self.faded.borrow_mut().insert(key, Rc::clone(&pixmap));
        Ok(pixmap)
    }

    fn load(&self, key: CacheKey) -> Result<Rc<Pixmap>, IconError> {
        if let Some(hit) = self.plain.borrow().get(&key) {
            return Ok(Rc::clone(hit));
        }
        trace!(path = %key.0.display(), size = key.1, "icon cache miss");
        let data = (self.loader)(&key.0)?;
        let pixmap = Rc::new(Pixmap {
            data: data.into(),
            size: key.1,
            alpha: u8::MAX,
        });
        self.plain.borrow_mut().insert(key, Rc::clone(&pixmap));
        Ok(pixmap)
    }

    /// Seed the cache with an already decoded pixmap.
    pub fn insert(&self, path: impl AsRef<Path>, pixmap: Pixmap) {
        let key = (self.resolve(path.as_ref()), pixmap.size);
        self.plain.borrow_mut().insert(key, Rc::new(pixmap));
    }

    #[must_use]
    pub fn is_cached(&self, path: impl AsRef<Path>, size: u32) -> bool {
        let key = (self.resolve(path.as_ref()), size);
        self.plain.borrow().contains_key(&key)
    }

    /// Number of plain entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plain.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plain.borrow().is_empty()
    }

    pub fn clear(&self) {
        let dropped = self.plain.borrow().len() + self.faded.borrow().len();
        self.plain.borrow_mut().clear();
        self.faded.borrow_mut().clear();
        debug!(dropped, "icon cache cleared");
    }

    /// Pixmap for a node's icon, faded when `faded` is set.
    pub fn node_icon(
        &self,
        notebook: &Notebook,
        id: NodeId,
        open: bool,
        faded: bool,
        size: u32,
    ) -> Result<Rc<Pixmap>, IconError> {
        let file = node_icon_file(notebook, id, open);
        if faded {
            self.faded(file, size)
        } else {
            self.get(file, size)
        }
    }
}

/// Icon file name for a node: explicit `icon`/`icon_open` attributes first,
/// then a default by content type.
#[must_use]
pub fn node_icon_file(notebook: &Notebook, id: NodeId, open: bool) -> String {
    let explicit = |key: &str| {
        notebook
            .get_attr(id, key)
            .and_then(AttrValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    if open
        && let Some(file) = explicit(attr::ICON_OPEN)
    {
        return file;
    }
    if let Some(file) = explicit(attr::ICON) {
        return file;
    }
    default_icon_file(notebook.content_type(id), open).to_string()
}

/// Default icon for a content type.
#[must_use]
pub fn default_icon_file(kind: &str, open: bool) -> &'static str {
    match kind {
        content_type::DIR if open => "folder-open.png",
        content_type::DIR => "folder.png",
        content_type::TRASH => "trash.png",
        _ => "note.png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_cache() -> (IconCache, Rc<Cell<usize>>) {
        let loads = Rc::new(Cell::new(0));
        let counter = Rc::clone(&loads);
        let cache = IconCache::with_loader("/icons", move |path| {
            counter.set(counter.get() + 1);
            Ok(path.to_string_lossy().into_owned().into_bytes())
        });
        (cache, loads)
    }

    #[test]
    fn repeated_lookup_returns_same_rc() {
        let (cache, loads) = counting_cache();
        let a = cache.get("note.png", 16).unwrap();
        let b = cache.get("note.png", 16).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(loads.get(), 1);
        assert!(cache.is_cached("note.png", 16));
    }

    #[test]
    fn size_is_part_of_key() {
        let (cache, loads) = counting_cache();
        cache.get("note.png", 16).unwrap();
        cache.get("note.png", 32).unwrap();
        assert_eq!(loads.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn faded_is_memoized_separately() {
        let (cache, loads) = counting_cache();
        let plain = cache.get("folder.png", 16).unwrap();
        let faded = cache.faded("folder.png", 16).unwrap();
        assert_eq!(faded.alpha, FADE_ALPHA);
        assert_eq!(plain.alpha, u8::MAX);
        assert!(Rc::ptr_eq(&faded, &cache.faded("folder.png", 16).unwrap()));
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn load_errors_are_not_cached() {
        let cache = IconCache::with_loader("/icons", |path| Err(IconError::Empty(path.to_path_buf())));
        assert!(cache.get("missing.png", 16).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn disk_loader_reports_missing_file() {
        let cache = IconCache::new("/nonexistent-knote-icons");
        let err = cache.get("note.png", 16).unwrap_err();
        assert!(matches!(err, IconError::Io { .. }));
        assert!(err.to_string().contains("note.png"));
    }

    #[test]
    fn icon_file_by_attribute_then_content_type() {
        let mut nb = Notebook::new("root");
        let root = nb.root();
        let page = nb.new_node(root, content_type::PAGE, "p", None).unwrap();
        assert_eq!(node_icon_file(&nb, root, false), "folder.png");
        assert_eq!(node_icon_file(&nb, root, true), "folder-open.png");
        assert_eq!(node_icon_file(&nb, page, true), "note.png");

        nb.set_attr(page, attr::ICON, AttrValue::from("star.png"))
            .unwrap();
        assert_eq!(node_icon_file(&nb, page, true), "star.png");
        nb.set_attr(page, attr::ICON_OPEN, AttrValue::from("star-open.png"))
            .unwrap();
        assert_eq!(node_icon_file(&nb, page, true), "star-open.png");
        assert_eq!(node_icon_file(&nb, page, false), "star.png");
    }

    #[test]
    fn node_icon_uses_cache() {
        let (cache, loads) = counting_cache();
        let nb = Notebook::new("root");
        let a = cache.node_icon(&nb, nb.root(), false, false, 16).unwrap();
        let b = cache.node_icon(&nb, nb.root(), false, true, 16).unwrap();
        assert_eq!(a.alpha, u8::MAX);
        assert_eq!(b.alpha, FADE_ALPHA);
        assert_eq!(loads.get(), 1);
    }
}
