//! Per-document resolver settings.
//!
//! A [`ResolverConfig`] is built once per compile and passed explicitly to
//! the resolver; nothing here is process-global.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheTier, FileStore, StoreError, TierChain, TierKind, DEFAULT_UNDATED_TTL_DAYS};
use crate::retry::RetryPolicy;

/// Overrides the default global cache location.
pub const GLOBAL_CACHE_ENV: &str = "BIBCACHE_DIR";

/// Project-relative directory used when the local cache is enabled without a path.
pub const DEFAULT_LOCAL_CACHE_DIR: &str = "bibcache";

const GLOBAL_CACHE_DIR: &str = "bibcache";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for document attribute `{attribute}`")]
    InvalidAttribute { attribute: String, value: String },
    #[error("Cannot open {kind} cache at {}: {source}", .path.display())]
    Store {
        kind: TierKind,
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("No global cache location available; set BIBCACHE_DIR")]
    NoGlobalLocation,
    #[error("Invalid resolver configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid resolver configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Use the per-environment global tier.
    pub cache_enabled: bool,
    /// Turn off every tier; nothing is read from or written to disk.
    pub disable_caching: bool,
    pub global_cache_path: Option<PathBuf>,
    pub global_read_only: bool,
    /// Enables the project-relative tier.
    pub local_cache_path: Option<PathBuf>,
    /// Use only the local tier and never touch the global one.
    pub local_cache_only: bool,
    /// Draft mode: do not fetch in-preparation references at all.
    pub no_fetch: bool,
    /// Clear every enabled tier before resolving.
    pub flush_caches: bool,
    pub undated_ttl_days: u32,
    pub max_concurrent_fetches: usize,
    pub retry: RetryPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            disable_caching: false,
            global_cache_path: None,
            global_read_only: false,
            local_cache_path: None,
            local_cache_only: false,
            no_fetch: false,
            flush_caches: false,
            undated_ttl_days: DEFAULT_UNDATED_TTL_DAYS,
            max_concurrent_fetches: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl ResolverConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from document attributes such as `:local-cache: refs` or
    /// `:no-cache:`. Unknown attributes are ignored.
    ///
    /// | attribute          | effect                                        |
    /// |--------------------|-----------------------------------------------|
    /// | `local-cache`      | enable local tier (value = path, empty = default) |
    /// | `local-cache-only` | local tier only; value = optional path        |
    /// | `no-cache`         | disable every tier                            |
    /// | `no-global-cache`  | disable the global tier                       |
    /// | `global-cache`     | global tier location                          |
    /// | `no-fetch`         | skip in-preparation references                |
    /// | `flush-caches`     | clear tiers before resolving                  |
    /// | `cache-ttl-days`   | TTL for undated entries                       |
    pub fn from_attributes<'a, I>(attributes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();

        for (name, value) in attributes {
            let value = value.trim();
            match name {
                "local-cache" => {
                    if flag(value).unwrap_or(true) {
                        config.local_cache_path = Some(path_or_default(value));
                    }
                }
                "local-cache-only" => {
                    if flag(value).unwrap_or(true) {
                        config.local_cache_only = true;
                        if config.local_cache_path.is_none() || !value.is_empty() {
                            config.local_cache_path = Some(path_or_default(value));
                        }
                    }
                }
                "no-cache" => config.disable_caching = require_flag(name, value)?,
                "no-global-cache" => config.cache_enabled = !require_flag(name, value)?,
                "global-cache" => {
                    if value.is_empty() {
                        return Err(invalid(name, value));
                    }
                    config.global_cache_path = Some(PathBuf::from(value));
                }
                "no-fetch" => config.no_fetch = require_flag(name, value)?,
                "flush-caches" => config.flush_caches = require_flag(name, value)?,
                "cache-ttl-days" => {
                    config.undated_ttl_days = value.parse().map_err(|_| invalid(name, value))?;
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".into(),
            ));
        }
        if self.retry.factor == 0 {
            return Err(ConfigError::Invalid("retry.factor must be at least 1".into()));
        }
        Ok(())
    }

    fn global_location(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.global_cache_path {
            return Ok(path.clone());
        }
        if let Some(dir) = std::env::var_os(GLOBAL_CACHE_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::cache_dir()
            .map(|dir| dir.join(GLOBAL_CACHE_DIR))
            .ok_or(ConfigError::NoGlobalLocation)
    }

    /// Open the tiers this configuration enables, in read priority order.
    pub fn build_tiers(&self) -> Result<TierChain, ConfigError> {
        if self.disable_caching {
            debug!("caching disabled");
            return Ok(TierChain::empty());
        }

        let mut tiers = Vec::new();

        if self.local_cache_only {
            let path = self.local_path();
            tiers.push(open_tier(TierKind::LocalOnly, &path)?);
            return Ok(TierChain::new(tiers));
        }

        if self.local_cache_path.is_some() {
            let path = self.local_path();
            tiers.push(open_tier(TierKind::Local, &path)?);
        }

        if self.cache_enabled {
            let path = self.global_location()?;
            let mut tier = open_tier(TierKind::Global, &path)?;
            if self.global_read_only {
                tier = tier.read_only();
            }
            tiers.push(tier);
        }

        Ok(TierChain::new(tiers))
    }

    fn local_path(&self) -> PathBuf {
        self.local_cache_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_CACHE_DIR))
    }
}

fn open_tier(kind: TierKind, path: &Path) -> Result<CacheTier, ConfigError> {
    let store = FileStore::open(path).map_err(|source| ConfigError::Store {
        kind,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(CacheTier::new(kind, Arc::new(store)).at(path))
}

fn flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "" | "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn require_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    flag(value).ok_or_else(|| invalid(name, value))
}

fn path_or_default(value: &str) -> PathBuf {
    match value {
        "" | "true" | "yes" => PathBuf::from(DEFAULT_LOCAL_CACHE_DIR),
        path => PathBuf::from(path),
    }
}

fn invalid(attribute: &str, value: &str) -> ConfigError {
    ConfigError::InvalidAttribute {
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}
