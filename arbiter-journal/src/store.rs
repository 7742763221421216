//! Durable backends holding the persisted entry collection.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;

use crate::JournalResult;
use crate::entry::ConflictLogEntry;

/// Trait implemented by stores holding the persisted collection.
///
/// The logger always rewrites the whole collection, so implementations only
/// need whole-collection reads and writes.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Loads the persisted collection, oldest first.
    async fn load(&self) -> JournalResult<Vec<ConflictLogEntry>>;

    /// Replaces the persisted collection.
    async fn store(&self, entries: &[ConflictLogEntry]) -> JournalResult<()>;
}

/// File-backed store writing the collection as a JSON array.
#[derive(Debug)]
pub struct FileEntryStore {
    path: PathBuf,
}

impl FileEntryStore {
    /// Prepares a store at the provided path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while creating the parent directory.
    pub async fn open(path: impl Into<PathBuf>) -> JournalResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self { path })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl EntryStore for FileEntryStore {
    async fn load(&self) -> JournalResult<Vec<ConflictLogEntry>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    async fn store(&self, entries: &[ConflictLogEntry]) -> JournalResult<()> {
        let data = serde_json::to_vec(entries)?;
        let staging = self.staging_path();
        fs::write(&staging, &data).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

/// In-process store, useful for tests and embedding without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<Vec<ConflictLogEntry>>,
}

impl MemoryEntryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the persisted collection.
    pub async fn snapshot(&self) -> Vec<ConflictLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn load(&self) -> JournalResult<Vec<ConflictLogEntry>> {
        Ok(self.entries.read().await.clone())
    }

    async fn store(&self, entries: &[ConflictLogEntry]) -> JournalResult<()> {
        let mut guard = self.entries.write().await;
        guard.clear();
        guard.extend_from_slice(entries);
        Ok(())
    }
}
