use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BibliographicRecord, CacheKey};

/// One cached record as persisted in a single tier.
///
/// Each tier owns its own copy; nothing is shared between stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub fetched: DateTime<Utc>,
    pub dated: bool,
    pub record: BibliographicRecord,
}

impl CacheEntry {
    pub fn new(key: CacheKey, dated: bool, record: BibliographicRecord, fetched: DateTime<Utc>) -> Self {
        Self {
            key,
            fetched,
            dated,
            record,
        }
    }

    pub fn header(&self) -> EntryHeader {
        EntryHeader {
            key: self.key.clone(),
            fetched: self.fetched,
            dated: self.dated,
        }
    }

    /// Keep `fetched` monotonic when overwriting an existing entry.
    pub(crate) fn reconcile_with(&mut self, existing: Option<&EntryHeader>) {
        if let Some(existing) = existing {
            if existing.fetched > self.fetched {
                self.fetched = existing.fetched;
            }
        }
    }
}

/// The fields of an entry that are decodable without touching the record.
/// Unknown fields (including `record`) are skipped by serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub key: CacheKey,
    pub fetched: DateTime<Utc>,
    pub dated: bool,
}
