use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::entry::CacheEntry;
use super::staleness::StalenessPolicy;
use super::store::{CacheStore, PutOutcome, StoreError};
use crate::types::CacheKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierKind {
    LocalOnly,
    Local,
    Global,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierKind::LocalOnly => "local-only",
            TierKind::Local => "local",
            TierKind::Global => "global",
        };
        f.write_str(name)
    }
}

/// One configured cache level.
#[derive(Clone)]
pub struct CacheTier {
    kind: TierKind,
    location: Option<PathBuf>,
    enabled: bool,
    writable: bool,
    store: Arc<dyn CacheStore>,
}

impl fmt::Debug for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheTier")
            .field("kind", &self.kind)
            .field("location", &self.store.location())
            .field("enabled", &self.enabled)
            .field("writable", &self.writable)
            .finish()
    }
}

impl CacheTier {
    pub fn new(kind: TierKind, store: Arc<dyn CacheStore>) -> Self {
        Self {
            kind,
            location: None,
            enabled: true,
            writable: true,
            store,
        }
    }

    pub fn at(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn kind(&self) -> TierKind {
        self.kind
    }

    pub fn location(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}

/// Result of consulting the chain for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh { tier: TierKind, entry: CacheEntry },
    /// Only stale copies were found; this is the highest-priority one.
    Stale { tier: TierKind, entry: CacheEntry },
    Miss,
}

/// Ordered set of tiers in read priority: local-only, local, global.
#[derive(Debug, Clone, Default)]
pub struct TierChain {
    tiers: Vec<CacheTier>,
}

impl TierChain {
    pub fn new(mut tiers: Vec<CacheTier>) -> Self {
        tiers.sort_by_key(CacheTier::kind);
        let chain = Self { tiers };
        // Local-only excludes everything else.
        if chain.tiers.iter().any(|t| t.kind == TierKind::LocalOnly && t.enabled) {
            return Self {
                tiers: chain
                    .tiers
                    .into_iter()
                    .filter(|t| t.kind == TierKind::LocalOnly)
                    .collect(),
            };
        }
        chain
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tier(&self, kind: TierKind) -> Option<&CacheTier> {
        self.tiers.iter().find(|t| t.kind == kind)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &CacheTier> {
        self.tiers.iter().filter(|t| t.enabled)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled().next().is_none()
    }

    /// Consult enabled tiers in priority order. The first fresh hit wins and
    /// nothing is copied between tiers.
    pub fn lookup(
        &self,
        key: &CacheKey,
        policy: &StalenessPolicy,
        now: DateTime<Utc>,
    ) -> Result<Lookup, StoreError> {
        let mut stale = None;

        for tier in self.enabled() {
            let Some(header) = tier.store.get_header(key)? else {
                trace!(key = %key, tier = %tier.kind, "cache miss");
                continue;
            };

            if policy.is_stale(&header, now) {
                debug!(key = %key, tier = %tier.kind, fetched = %header.fetched, "stale cache entry");
                if stale.is_none() {
                    if let Some(entry) = tier.store.get(key)? {
                        stale = Some((tier.kind, entry));
                    }
                }
                continue;
            }

            if let Some(entry) = tier.store.get(key)? {
                debug!(key = %key, tier = %tier.kind, "cache hit");
                return Ok(Lookup::Fresh {
                    tier: tier.kind,
                    entry,
                });
            }
        }

        Ok(match stale {
            Some((tier, entry)) => Lookup::Stale { tier, entry },
            None => Lookup::Miss,
        })
    }

    /// Propagate a freshly fetched entry to every enabled, writable tier.
    ///
    /// A tier is written only when it has no entry for the key or its entry is
    /// stale; a tier holding a valid entry of its own is left as is. A failing
    /// tier does not stop the others.
    pub fn write_through(
        &self,
        entry: &CacheEntry,
        policy: &StalenessPolicy,
        now: DateTime<Utc>,
    ) -> WriteThrough {
        let mut result = WriteThrough::default();
        for tier in self.enabled().filter(|t| t.writable) {
            match tier.store.put_if(entry.clone(), &|existing| {
                existing.map_or(true, |header| policy.is_stale(header, now))
            }) {
                Ok(outcome) => {
                    debug!(key = %entry.key, tier = %tier.kind, ?outcome, "write-through");
                    result.outcomes.push((tier.kind, outcome));
                }
                Err(e) => {
                    warn!(key = %entry.key, tier = %tier.kind, error = %e, "write-through failed");
                    result.failures.push((tier.kind, e));
                }
            }
        }
        result
    }
}

/// Per-tier result of [`TierChain::write_through`].
#[derive(Debug, Default)]
pub struct WriteThrough {
    pub outcomes: Vec<(TierKind, PutOutcome)>,
    pub failures: Vec<(TierKind, StoreError)>,
}

impl WriteThrough {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
