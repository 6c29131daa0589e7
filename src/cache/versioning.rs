use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::CacheKey;

/// On-disk layout version of a file-backed tier.
pub const STORE_FORMAT_VERSION: &str = "1";

/// Written once when a store directory is first used.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoreManifest {
    pub format_version: String,
    pub created_at: DateTime<Utc>, // informational only
}

impl StoreManifest {
    pub fn current() -> Self {
        Self {
            format_version: STORE_FORMAT_VERSION.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.format_version == STORE_FORMAT_VERSION
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportManifest {
    pub format_version: String,
    pub source: String,
    pub exported_at: DateTime<Utc>, // informational only
    pub entry_count: usize,
}

/// `index.json` of an export: cache key → relative entry file.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ExportIndex {
    entries: BTreeMap<CacheKey, String>,
}

impl ExportIndex {
    pub fn new(entries: BTreeMap<CacheKey, String>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
