//! External storage for backups.
//!
//! Backups are written into dated folders directly below the storage
//! root. Access may need to be granted (again) before writing.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error as ThisError;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(ThisError, Debug)]
pub enum StorageError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        let context = context.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(context),
            io::ErrorKind::NotFound => StorageError::NotFound(context),
            _ => StorageError::Io { context, source },
        }
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// An entry directly below the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Is writing currently allowed?
    async fn query_permission(&self) -> Result<bool>;

    /// Ask for write access without user interaction.
    async fn request_permission(&self) -> Result<bool>;

    /// Create a directory below the root. Existing directories are fine.
    async fn create_dir(&self, name: &str) -> Result<()>;

    /// Create or overwrite a file in a directory below the root.
    async fn write_file(&self, dir: &str, name: &str, data: &[u8]) -> Result<()>;

    /// Entries directly below the root.
    async fn list_entries(&self) -> Result<Vec<StorageEntry>>;

    /// Remove an entry below the root, recursively.
    async fn remove_entry(&self, name: &str) -> Result<()>;
}

/// A [`Storage`] in a directory of the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn query_permission(&self) -> Result<bool> {
        match fs::metadata(&self.root).await {
            Ok(meta) => Ok(meta.is_dir() && !meta.permissions().readonly()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io(self.root.display().to_string(), err)),
        }
    }

    async fn request_permission(&self) -> Result<bool> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            StorageError::io(format!("failed to create {}", self.root.display()), e)
        })?;
        self.query_permission().await
    }

    #[instrument(skip(self))]
    async fn create_dir(&self, name: &str) -> Result<()> {
        let path = self.root.join(name);
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io(format!("failed to create {}", path.display()), e))
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn write_file(&self, dir: &str, name: &str, data: &[u8]) -> Result<()> {
        let path = self.root.join(dir).join(name);
        fs::write(&path, data)
            .await
            .map_err(|e| StorageError::io(format!("failed to write {}", path.display()), e))?;
        debug!(path = %path.display(), "file written");
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<StorageEntry>> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            StorageError::io(format!("failed to read {}", self.root.display()), e)
        })?;
        let mut result = vec![];
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StorageError::io(format!("failed to read {}", self.root.display()), e)
        })? {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::io("failed to stat entry", e))?;
            result.push(StorageEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind: if file_type.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
            });
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn remove_entry(&self, name: &str) -> Result<()> {
        let path = self.root.join(name);
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        removed.map_err(|e| StorageError::io(format!("failed to remove {}", path.display()), e))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    denied: bool,
    grant_on_request: bool,
    fail_writes: bool,
    fail_removes: bool,
    dirs: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

/// A [`Storage`] held in memory. Clones share their content.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    /// Writable storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage without access. Access is granted on request
    /// only when `grant_on_request` is set.
    pub fn denied(grant_on_request: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                denied: true,
                grant_on_request,
                ..Default::default()
            })),
        }
    }

    pub async fn fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    pub async fn fail_removes(&self, fail: bool) {
        self.state.lock().await.fail_removes = fail;
    }

    /// Names of the directories, sorted.
    pub async fn dirs(&self) -> Vec<String> {
        self.state.lock().await.dirs.keys().cloned().collect()
    }

    pub async fn read_file(&self, dir: &str, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.dirs.get(dir)?.get(name).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn query_permission(&self) -> Result<bool> {
        Ok(!self.state.lock().await.denied)
    }

    async fn request_permission(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.grant_on_request {
            state.denied = false;
        }
        Ok(!state.denied)
    }

    async fn create_dir(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.denied {
            return Err(StorageError::PermissionDenied(name.to_string()));
        }
        state.dirs.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn write_file(&self, dir: &str, name: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.denied || state.fail_writes {
            return Err(StorageError::PermissionDenied(format!("{}/{}", dir, name)));
        }
        let files = state
            .dirs
            .get_mut(dir)
            .ok_or_else(|| StorageError::NotFound(dir.to_string()))?;
        files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<StorageEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .dirs
            .keys()
            .map(|name| StorageEntry {
                name: name.clone(),
                kind: EntryKind::Directory,
            })
            .collect())
    }

    async fn remove_entry(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_removes {
            return Err(StorageError::PermissionDenied(name.to_string()));
        }
        state
            .dirs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }
}
