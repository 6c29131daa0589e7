use std::collections::BTreeMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

use super::entry::{CacheEntry, EntryHeader};
use crate::types::CacheKey;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unreadable cache entry {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported cache format {found:?} at {} (expected {expected:?})", .path.display())]
    UnsupportedFormat {
        path: PathBuf,
        found: String,
        expected: String,
    },
    #[error("Cache location {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// The store's contents or layout cannot be understood, as opposed to a
    /// failed read or write.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            StoreError::Corrupt { .. }
                | StoreError::UnsupportedFormat { .. }
                | StoreError::NotADirectory(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The guard rejected the existing entry; nothing changed.
    Kept,
}

/// Key-value persistence for one storage location.
///
/// `put_if` is the only mutation on the resolution path. Implementations run
/// it as one read-modify-write cycle under an exclusive lock, so a single
/// `put` is atomically visible to concurrent readers.
pub trait CacheStore: Send + Sync {
    /// Human-readable location, used in error messages and reports.
    fn location(&self) -> String;

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Read only the header fields of an entry.
    fn get_header(&self, key: &CacheKey) -> Result<Option<EntryHeader>, StoreError>;

    fn put_if(
        &self,
        entry: CacheEntry,
        guard: &dyn Fn(Option<&EntryHeader>) -> bool,
    ) -> Result<PutOutcome, StoreError>;

    fn put(&self, entry: CacheEntry) -> Result<PutOutcome, StoreError> {
        self.put_if(entry, &|_| true)
    }

    /// All entries, sorted by key.
    fn entries(&self) -> Result<Vec<CacheEntry>, StoreError>;

    /// Remove every entry. Returns how many were removed.
    fn clear(&self) -> Result<usize, StoreError>;
}

/// In-process store. Nothing touches the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    entries: Mutex<BTreeMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn location(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn get_header(&self, key: &CacheKey) -> Result<Option<EntryHeader>, StoreError> {
        Ok(self.entries.lock().get(key).map(CacheEntry::header))
    }

    fn put_if(
        &self,
        mut entry: CacheEntry,
        guard: &dyn Fn(Option<&EntryHeader>) -> bool,
    ) -> Result<PutOutcome, StoreError> {
        let mut entries = self.entries.lock();
        let existing = entries.get(&entry.key).map(CacheEntry::header);
        if !guard(existing.as_ref()) {
            return Ok(PutOutcome::Kept);
        }
        entry.reconcile_with(existing.as_ref());
        entries.insert(entry.key.clone(), entry);
        Ok(PutOutcome::Written)
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(self.entries.lock().values().cloned().collect())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}
