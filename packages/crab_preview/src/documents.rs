//! Editor and filesystem collaborators the resolver reads from.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths;

/// The document attached to the live preview, possibly unsaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDocument {
    pub path: PathBuf,
    pub text: String,
}

/// Text the editor currently holds in memory.
pub trait DocumentSource: Send + Sync {
    /// Path attached to the live preview, whether or not the editor holds its
    /// text.
    fn live_path(&self) -> Option<PathBuf>;

    fn live_document(&self) -> Option<LiveDocument>;

    /// Text of `path` if it is open in any editor tab.
    fn open_document_text(&self, path: &Path) -> Option<String>;
}

#[derive(Debug, Default)]
struct OpenDocumentsInner {
    texts: HashMap<PathBuf, String>,
    live: Option<PathBuf>,
}

/// In-memory editor buffers fed by the editor API.
#[derive(Debug, Default)]
pub struct OpenDocuments {
    inner: RwLock<OpenDocumentsInner>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest text for `path`. Returns true when the text changed.
    pub fn update(&self, path: &Path, text: String) -> bool {
        let path = paths::normalize(path);
        let mut inner = self.inner.write();
        match inner.texts.get(&path) {
            Some(existing) if *existing == text => false,
            _ => {
                inner.texts.insert(path, text);
                true
            }
        }
    }

    pub fn close(&self, path: &Path) -> bool {
        let path = paths::normalize(path);
        let mut inner = self.inner.write();
        if inner.live.as_deref() == Some(path.as_path()) {
            inner.live = None;
        }
        inner.texts.remove(&path).is_some()
    }

    /// Attach (or detach) the live preview document.
    pub fn set_live(&self, path: Option<&Path>) {
        self.inner.write().live = path.map(paths::normalize);
    }

    pub fn text(&self, path: &Path) -> Option<String> {
        self.inner.read().texts.get(&paths::normalize(path)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentSource for OpenDocuments {
    fn live_path(&self) -> Option<PathBuf> {
        self.inner.read().live.clone()
    }

    fn live_document(&self) -> Option<LiveDocument> {
        let inner = self.inner.read();
        let path = inner.live.as_ref()?;
        let text = inner.texts.get(path)?;
        Some(LiveDocument {
            path: path.clone(),
            text: text.clone(),
        })
    }

    fn open_document_text(&self, path: &Path) -> Option<String> {
        self.text(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileReadError {
    /// Resolves (through a symlink) to somewhere outside the project root.
    #[error("resolves outside the project root")]
    Escapes,

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("not a regular file")]
    NotAFile,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read access to project files on disk.
pub trait ProjectFiles: Send + Sync {
    fn read(&self, root: &Path, path: &Path) -> Result<Vec<u8>, FileReadError>;
}

/// Reads from the real filesystem, refusing symlink escapes and oversized files.
#[derive(Debug, Clone)]
pub struct DiskFiles {
    max_bytes: u64,
}

impl DiskFiles {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl ProjectFiles for DiskFiles {
    fn read(&self, root: &Path, path: &Path) -> Result<Vec<u8>, FileReadError> {
        let canonical_root = root.canonicalize()?;
        let canonical_target = path.canonicalize()?;

        if !canonical_target.starts_with(&canonical_root) {
            return Err(FileReadError::Escapes);
        }

        let metadata = std::fs::metadata(&canonical_target)?;
        if !metadata.is_file() {
            return Err(FileReadError::NotAFile);
        }
        if metadata.len() > self.max_bytes {
            return Err(FileReadError::TooLarge {
                size: metadata.len(),
                limit: self.max_bytes,
            });
        }

        Ok(std::fs::read(&canonical_target)?)
    }
}
