use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::entry::{CacheEntry, EntryHeader};
use super::store::{CacheStore, PutOutcome, StoreError};
use super::versioning::{StoreManifest, STORE_FORMAT_VERSION};
use crate::types::CacheKey;

const ENTRIES_DIR: &str = "entries";
const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = ".lock";

/// Directory-backed store, one JSON file per key.
///
/// Layout:
/// ```text
/// <root>/manifest.json
/// <root>/.lock
/// <root>/entries/<sha256(key)[..24]>.json
/// ```
/// Nothing is created until the first write.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process; `.lock`
    // does the same across processes sharing the directory.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `root` and check its format if it already exists.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StoreError::NotADirectory(root));
        }

        let manifest_path = root.join(MANIFEST_FILE);
        match fs::read(&manifest_path) {
            Ok(bytes) => {
                let manifest: StoreManifest =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                        path: manifest_path.clone(),
                        source,
                    })?;
                if !manifest.is_supported() {
                    return Err(StoreError::UnsupportedFormat {
                        path: manifest_path,
                        found: manifest.format_version,
                        expected: STORE_FORMAT_VERSION.to_string(),
                    });
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(manifest_path, e)),
        }

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(ENTRIES_DIR)
            .join(format!("{}.json", key.file_stem()))
    }

    // Runs under the directory lock so concurrent writers never share a temp file.
    fn ensure_initialized(&self) -> Result<(), StoreError> {
        let entries_dir = self.root.join(ENTRIES_DIR);
        fs::create_dir_all(&entries_dir).map_err(|e| StoreError::io(&entries_dir, e))?;

        let manifest_path = self.root.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            debug!(root = %self.root.display(), "initializing cache store");
            write_atomically(&manifest_path, &serde_json::to_vec_pretty(&StoreManifest::current())?)?;
        }
        Ok(())
    }

    fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn read_header(&self, key: &CacheKey) -> Result<Option<EntryHeader>, StoreError> {
        let path = self.entry_path(key);
        let Some(bytes) = self.read_bytes(&path)? else {
            return Ok(None);
        };
        let header: EntryHeader =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if &header.key != key {
            // Truncated-hash collision: the file belongs to another key.
            warn!(key = %key, found = %header.key, path = %path.display(), "cache file key mismatch");
            return Ok(None);
        }
        Ok(Some(header))
    }

    fn lock_directory(&self) -> Result<File, StoreError> {
        let lock_path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| StoreError::io(&lock_path, e))?;
        Ok(file)
    }

    // Caller holds both locks.
    fn write_locked(
        &self,
        mut entry: CacheEntry,
        guard: &dyn Fn(Option<&EntryHeader>) -> bool,
    ) -> Result<PutOutcome, StoreError> {
        let existing = self.read_header(&entry.key)?;
        if !guard(existing.as_ref()) {
            return Ok(PutOutcome::Kept);
        }
        entry.reconcile_with(existing.as_ref());

        let bytes = serde_json::to_vec_pretty(&entry)?;
        write_atomically(&self.entry_path(&entry.key), &bytes)?;
        Ok(PutOutcome::Written)
    }

    fn remove_entries(&self, entries_dir: &Path) -> Result<usize, StoreError> {
        let mut removed = 0;
        for item in fs::read_dir(entries_dir).map_err(|e| StoreError::io(entries_dir, e))? {
            let path = item.map_err(|e| StoreError::io(entries_dir, e))?.path();
            let is_entry = path.extension().and_then(|e| e.to_str()) == Some("json");
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            if is_entry {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl CacheStore for FileStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.entry_path(key);
        let Some(bytes) = self.read_bytes(&path)? else {
            return Ok(None);
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if &entry.key != key {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn get_header(&self, key: &CacheKey) -> Result<Option<EntryHeader>, StoreError> {
        self.read_header(key)
    }

    fn put_if(
        &self,
        entry: CacheEntry,
        guard: &dyn Fn(Option<&EntryHeader>) -> bool,
    ) -> Result<PutOutcome, StoreError> {
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let lock_file = self.lock_directory()?;

        let outcome = self
            .ensure_initialized()
            .and_then(|()| self.write_locked(entry, guard));

        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!(root = %self.root.display(), error = %e, "failed to release cache lock");
        }
        outcome
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, StoreError> {
        let entries_dir = self.root.join(ENTRIES_DIR);
        let dir = match fs::read_dir(&entries_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&entries_dir, e)),
        };

        let mut entries = Vec::new();
        for item in dir {
            let path = item.map_err(|e| StoreError::io(&entries_dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
            let entry: CacheEntry =
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
            entries.push(entry);
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock();
        let entries_dir = self.root.join(ENTRIES_DIR);
        if !entries_dir.exists() {
            return Ok(0);
        }
        let lock_file = self.lock_directory()?;

        let removed = self.remove_entries(&entries_dir);

        if let Err(e) = FileExt::unlock(&lock_file) {
            warn!(root = %self.root.display(), error = %e, "failed to release cache lock");
        }
        removed
    }
}

/// Write to a sibling temp file, fsync, then rename over the target.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    {
        let mut f = File::create(&temp_path).map_err(|e| StoreError::io(&temp_path, e))?;
        std::io::Write::write_all(&mut f, bytes).map_err(|e| StoreError::io(&temp_path, e))?;
        f.sync_all().map_err(|e| StoreError::io(&temp_path, e))?;
    }
    fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))
}
