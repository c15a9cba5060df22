#![forbid(unsafe_code)]

//! Background notebook loading.
//!
//! A [`NotebookLoader`] reads a notebook into a plain [`NodeSnapshot`] on a
//! worker thread. The snapshot crosses back over an `mpsc` channel and the
//! UI thread turns it into a [`Notebook`](knote_tree::Notebook) when it
//! polls the [`PendingLoad`]. The worker never sees UI state.
//!
//! Each pending load delivers exactly one result: the snapshot, the
//! loader's error, or [`LoadError::Disconnected`] if the worker died.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info, warn};

use knote_tree::{NodeError, NodeSnapshot};

/// Errors from loading a notebook.
#[derive(Debug)]
pub enum LoadError {
    /// I/O error reading the notebook.
    Io(std::io::Error),
    /// The notebook data could not be parsed.
    Parse { path: PathBuf, message: String },
    /// The snapshot does not form a valid tree.
    Invalid(NodeError),
    /// The worker thread could not be started.
    Spawn(std::io::Error),
    /// The worker ended without sending a result.
    Disconnected,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "load I/O error: {e}"),
            Self::Parse { path, message } => {
                write!(f, "cannot parse notebook {}: {message}", path.display())
            }
            Self::Invalid(e) => write!(f, "invalid notebook: {e}"),
            Self::Spawn(e) => write!(f, "cannot start load thread: {e}"),
            Self::Disconnected => write!(f, "load thread ended without a result"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Spawn(e) => Some(e),
            Self::Invalid(e) => Some(e),
            Self::Parse { .. } | Self::Disconnected => None,
        }
    }
}

impl From<NodeError> for LoadError {
    fn from(e: NodeError) -> Self {
        Self::Invalid(e)
    }
}

/// Reads a notebook into a snapshot. Runs off the UI thread.
pub trait NotebookLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<NodeSnapshot, LoadError>;
}

impl<F> NotebookLoader for F
where
    F: Fn(&Path) -> Result<NodeSnapshot, LoadError> + Send + Sync,
{
    fn load(&self, path: &Path) -> Result<NodeSnapshot, LoadError> {
        self(path)
    }
}

/// Loads a snapshot serialized as JSON.
#[cfg(feature = "config-files")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNotebookLoader;

#[cfg(feature = "config-files")]
impl NotebookLoader for JsonNotebookLoader {
    fn load(&self, path: &Path) -> Result<NodeSnapshot, LoadError> {
        let content = std::fs::read_to_string(path).map_err(LoadError::Io)?;
        serde_json::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Start loading `path` on a worker thread.
pub fn spawn_load(loader: Arc<dyn NotebookLoader>, path: PathBuf) -> Result<PendingLoad, LoadError> {
    let (sender, receiver) = mpsc::channel();
    let worker_path = path.clone();
    let thread = thread::Builder::new()
        .name("knote-load".into())
        .spawn(move || {
            let result = loader.load(&worker_path);
            if let Ok(snapshot) = &result {
                debug!(path = %worker_path.display(), nodes = snapshot.count(), "snapshot read");
            }
            // the receiver may already be gone
            let _ = sender.send(result);
        })
        .map_err(LoadError::Spawn)?;
    info!(path = %path.display(), "notebook load started");
    Ok(PendingLoad {
        path,
        receiver,
        thread: Some(thread),
        done: false,
    })
}

/// Handle to an in-flight load.
pub struct PendingLoad {
    path: PathBuf,
    receiver: mpsc::Receiver<Result<NodeSnapshot, LoadError>>,
    thread: Option<thread::JoinHandle<()>>,
    done: bool,
}

impl fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLoad")
            .field("path", &self.path)
            .field("done", &self.done)
            .finish()
    }
}

impl PendingLoad {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the result has been delivered.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Non-blocking check. `Some` exactly once, then `None` forever.
    pub fn poll(&mut self) -> Option<Result<NodeSnapshot, LoadError>> {
        if self.done {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(mpsc::TryRecvError::Empty) => return None,
            Err(mpsc::TryRecvError::Disconnected) => Err(LoadError::Disconnected),
        };
        Some(self.finish(result))
    }

    /// Block until the result arrives.
    pub fn wait(mut self) -> Result<NodeSnapshot, LoadError> {
        if self.done {
            return Err(LoadError::Disconnected);
        }
        let result = self.receiver.recv().unwrap_or(Err(LoadError::Disconnected));
        self.finish(result)
    }

    fn finish(
        &mut self,
        result: Result<NodeSnapshot, LoadError>,
    ) -> Result<NodeSnapshot, LoadError> {
        self.done = true;
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            warn!(path = %self.path.display(), "load thread panicked");
        }
        match &result {
            Ok(snapshot) => {
                info!(path = %self.path.display(), nodes = snapshot.count(), "notebook load finished");
            }
            Err(err) => warn!(path = %self.path.display(), %err, "notebook load failed"),
        }
        result
    }
}
