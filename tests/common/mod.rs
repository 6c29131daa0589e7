#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bibcache_core::cache::{CacheEntry, CacheStore, EntryHeader, PutOutcome, StoreError};
use bibcache_core::source::BackendResult;
use bibcache_core::types::CacheKey;
use bibcache_core::{Backend, BackendError, BackendRegistry, BibliographicRecord, ResolverConfig, RetryPolicy};
use parking_lot::Mutex;

/// Backend double that counts calls and can be scripted to fail.
pub struct MockBackend {
    name: String,
    records: Mutex<HashMap<(String, Option<u16>), BibliographicRecord>>,
    failures: Mutex<VecDeque<BackendError>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_record(self, body: &str, year: Option<u16>, record: BibliographicRecord) -> Self {
        self.set_record(body, year, record);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_record(&self, body: &str, year: Option<u16>, record: BibliographicRecord) {
        self.records.lock().insert((body.to_string(), year), record);
    }

    /// The next call fails with `error` instead of answering.
    pub fn fail_next(&self, error: BackendError) {
        self.failures.lock().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, body: &str, year: Option<u16>) -> BackendResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.records.lock().get(&(body.to_string(), year)).cloned())
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve_dated(&self, body: &str, year: u16) -> BackendResult {
        self.answer(body, Some(year)).await
    }

    async fn resolve_undated(&self, body: &str) -> BackendResult {
        self.answer(body, None).await
    }
}

/// Empty store whose every write fails, e.g. a full disk.
pub struct FailingStore;

impl CacheStore for FailingStore {
    fn location(&self) -> String {
        "failing".to_string()
    }

    fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(None)
    }

    fn get_header(&self, _key: &CacheKey) -> Result<Option<EntryHeader>, StoreError> {
        Ok(None)
    }

    fn put_if(
        &self,
        _entry: CacheEntry,
        _guard: &dyn Fn(Option<&EntryHeader>) -> bool,
    ) -> Result<PutOutcome, StoreError> {
        Err(StoreError::Io {
            path: "failing/entries".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"),
        })
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, StoreError> {
        Ok(Vec::new())
    }

    fn clear(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

pub fn iso_record(id: &str, title: &str) -> BibliographicRecord {
    BibliographicRecord::new(id, "ISO")
        .with_title(title, Some("en"))
        .with_contributor("International Organization for Standardization", "publisher")
        .with_date("published", "2001-05")
        .with_status("published")
}

pub fn registry_with(organization: &str, backend: Arc<MockBackend>) -> Arc<BackendRegistry> {
    Arc::new(BackendRegistry::new().with(organization, backend))
}

/// Global tier at `global`, optional local tier, millisecond backoff.
pub fn file_config(global: &Path, local: Option<&Path>) -> ResolverConfig {
    ResolverConfig {
        global_cache_path: Some(global.to_path_buf()),
        local_cache_path: local.map(Path::to_path_buf),
        retry: RetryPolicy::new(3, Duration::from_millis(1), 2),
        ..ResolverConfig::default()
    }
}
