//! Per-compile resolution of citation requests.

pub mod error;
pub mod report;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{
    export_store, CacheEntry, ExportSummary, Lookup, StalenessPolicy, StoreError, TierChain,
    TierKind,
};
use crate::config::{ConfigError, ResolverConfig};
use crate::source::{BackendRegistry, SourceAdapter};
use crate::types::{BibliographicRecord, CacheKey, CitationRequest, NormalizedIdentifier};

pub use error::{ErrorKind, MaintenanceError, ResolveError};
pub use report::{CitationOutcome, OutcomeStatus, ReportedError, ResolutionReport};

/// Where a resolved record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecordSource {
    Cache { tier: TierKind },
    Backend,
    /// Refresh failed; an expired copy was served instead.
    StaleCache { tier: TierKind },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    NotFound,
    /// In-preparation reference skipped in draft mode.
    NoFetch,
    /// In-preparation reference whose fetch failed.
    FetchFailed(String),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NotFound => f.write_str("no backend has this reference"),
            UnresolvedReason::NoFetch => f.write_str("in-preparation reference not fetched"),
            UnresolvedReason::FetchFailed(e) => write!(f, "fetch failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved {
        key: CacheKey,
        record: Arc<BibliographicRecord>,
        source: RecordSource,
        /// One per problem: a stale copy served, or a tier that could not be written.
        warnings: Vec<String>,
    },
    Unresolved {
        key: CacheKey,
        reason: UnresolvedReason,
    },
}

impl Resolution {
    pub fn record(&self) -> Option<&BibliographicRecord> {
        match self {
            Resolution::Resolved { record, .. } => Some(record),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn source(&self) -> Option<&RecordSource> {
        match self {
            Resolution::Resolved { source, .. } => Some(source),
            Resolution::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }
}

/// Resolves citations for one document compile.
///
/// Create one per compile: the set of fetches already issued lives here, so
/// a second request for the same identifier never reaches a backend again.
pub struct Resolver {
    config: ResolverConfig,
    tiers: Arc<TierChain>,
    policy: StalenessPolicy,
    adapter: SourceAdapter,
}

impl Resolver {
    /// Open the tiers named by `config`.
    pub fn new(config: ResolverConfig, registry: Arc<BackendRegistry>) -> Result<Self, ConfigError> {
        config.validate()?;
        let tiers = config.build_tiers()?;
        Self::with_tiers(config, tiers, registry)
    }

    /// Use an already assembled tier chain (e.g. in-memory stores).
    pub fn with_tiers(
        config: ResolverConfig,
        tiers: TierChain,
        registry: Arc<BackendRegistry>,
    ) -> Result<Self, ConfigError> {
        let policy = StalenessPolicy::from_days(config.undated_ttl_days);
        let adapter = SourceAdapter::new(registry, config.retry);

        if config.flush_caches {
            for tier in tiers.enabled() {
                let removed = tier.store().clear().map_err(|source| ConfigError::Store {
                    kind: tier.kind(),
                    path: tier_path(tier.location(), &tier.store().location()),
                    source,
                })?;
                info!(tier = %tier.kind(), removed, "flushed cache tier");
            }
        }

        Ok(Self {
            config,
            tiers: Arc::new(tiers),
            policy,
            adapter,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn tiers(&self) -> &TierChain {
        &self.tiers
    }

    /// Backend calls issued by this resolver, retries included.
    pub fn backend_calls(&self) -> usize {
        self.adapter.outbound_calls()
    }

    /// Resolve one citation. `Err` is fatal for this citation only, unless
    /// [`ResolveError::aborts_compile`] says otherwise.
    pub async fn resolve(&self, request: &CitationRequest) -> Result<Resolution, ResolveError> {
        let id = request.normalize()?;
        self.resolve_normalized(&id).await
    }

    /// Resolve every request, fetching distinct keys concurrently. Outcomes
    /// keep request order.
    pub async fn resolve_all(&self, requests: &[CitationRequest]) -> ResolutionReport {
        let mut report = ResolutionReport::default();

        if let Err(error) = check_anchors(requests) {
            report.abort(None, &error);
            return report;
        }

        let mut normalized = Vec::with_capacity(requests.len());
        for request in requests {
            match request.normalize() {
                Ok(id) => normalized.push((request, id)),
                Err(e) => report.abort(Some(&request.identifier), &ResolveError::from(e)),
            }
        }
        if report.aborted {
            return report;
        }

        let results = stream::iter(normalized)
            .map(|(request, id)| async move { (request, self.resolve_normalized(&id).await) })
            .buffered(self.config.max_concurrent_fetches);
        futures::pin_mut!(results);

        while let Some((request, result)) = results.next().await {
            match result {
                Err(error) if error.aborts_compile() => {
                    // Dropping the stream cancels whatever is still in flight.
                    report.abort(Some(&request.identifier), &error);
                    break;
                }
                result => report.record_outcome(request, result),
            }
        }
        report.backend_calls = self.backend_calls();

        info!(
            citations = report.citations.len(),
            unresolved = report.unresolved().count(),
            backend_calls = report.backend_calls,
            "resolution pass finished"
        );
        report
    }

    async fn resolve_normalized(&self, id: &NormalizedIdentifier) -> Result<Resolution, ResolveError> {
        let key = id.cache_key();

        if id.is_in_preparation() {
            return Ok(self.resolve_in_preparation(id, key).await);
        }

        let lookup = {
            let tiers = Arc::clone(&self.tiers);
            let policy = self.policy;
            let key = key.clone();
            blocking(move || tiers.lookup(&key, &policy, Utc::now())).await?
        };

        let stale = match lookup {
            Lookup::Fresh { tier, entry } => {
                return Ok(Resolution::Resolved {
                    key,
                    record: Arc::new(entry.record),
                    source: RecordSource::Cache { tier },
                    warnings: Vec::new(),
                });
            }
            Lookup::Stale { tier, entry } => Some((tier, entry)),
            Lookup::Miss => None,
        };

        match self.adapter.fetch(id).await {
            Ok(Some(record)) => {
                let warnings = self.write_through(&key, id, &record).await?;
                Ok(Resolution::Resolved {
                    key,
                    record,
                    source: RecordSource::Backend,
                    warnings,
                })
            }
            Ok(None) => match stale {
                Some((tier, entry)) => Ok(serve_stale(key, tier, entry, "reference no longer found")),
                None => {
                    warn!(key = %key, "reference not found");
                    Ok(Resolution::Unresolved {
                        key,
                        reason: UnresolvedReason::NotFound,
                    })
                }
            },
            Err(source) => match stale {
                Some((tier, entry)) => Ok(serve_stale(key, tier, entry, &source.to_string())),
                None => Err(ResolveError::Backend { key, source }),
            },
        }
    }

    /// In-preparation references never touch a tier.
    async fn resolve_in_preparation(&self, id: &NormalizedIdentifier, key: CacheKey) -> Resolution {
        if self.config.no_fetch {
            debug!(key = %key, "skipping in-preparation reference");
            return Resolution::Unresolved {
                key,
                reason: UnresolvedReason::NoFetch,
            };
        }

        match self.adapter.fetch(id).await {
            Ok(Some(record)) => Resolution::Resolved {
                key,
                record,
                source: RecordSource::Backend,
                warnings: Vec::new(),
            },
            Ok(None) => Resolution::Unresolved {
                key,
                reason: UnresolvedReason::NotFound,
            },
            Err(e) => {
                warn!(key = %key, error = %e, "in-preparation reference unresolved");
                Resolution::Unresolved {
                    key,
                    reason: UnresolvedReason::FetchFailed(e.to_string()),
                }
            }
        }
    }

    // A failed write does not undo a successful fetch; each failing tier is
    // surfaced as a warning.
    async fn write_through(
        &self,
        key: &CacheKey,
        id: &NormalizedIdentifier,
        record: &BibliographicRecord,
    ) -> Result<Vec<String>, StoreError> {
        let now = Utc::now();
        let entry = CacheEntry::new(key.clone(), id.is_dated(), record.clone(), now);
        let tiers = Arc::clone(&self.tiers);
        let policy = self.policy;

        let result = tokio::task::spawn_blocking(move || tiers.write_through(&entry, &policy, now)).await?;
        Ok(result
            .failures
            .into_iter()
            .map(|(tier, e)| format!("could not cache {key} in the {tier} tier: {e}"))
            .collect())
    }

    /// Dump a tier's entries into `output_dir`.
    pub fn export_tier(&self, kind: TierKind, output_dir: &Path) -> Result<ExportSummary, MaintenanceError> {
        let tier = self
            .tiers
            .tier(kind)
            .filter(|t| t.is_enabled())
            .ok_or(MaintenanceError::TierNotEnabled(kind))?;
        Ok(export_store(tier.store().as_ref(), output_dir)?)
    }

    /// Remove every entry from a tier. Returns how many were removed.
    pub fn flush_tier(&self, kind: TierKind) -> Result<usize, MaintenanceError> {
        let tier = self
            .tiers
            .tier(kind)
            .filter(|t| t.is_enabled())
            .ok_or(MaintenanceError::TierNotEnabled(kind))?;
        let removed = tier.store().clear()?;
        info!(tier = %kind, removed, "flushed cache tier");
        Ok(removed)
    }
}

fn serve_stale(key: CacheKey, tier: TierKind, entry: CacheEntry, cause: &str) -> Resolution {
    warn!(key = %key, tier = %tier, fetched = %entry.fetched, cause, "serving stale cache entry");
    let warning = format!(
        "refresh of {key} failed ({cause}); using copy fetched {}",
        entry.fetched.to_rfc3339()
    );
    Resolution::Resolved {
        key,
        record: Arc::new(entry.record),
        source: RecordSource::StaleCache { tier },
        warnings: vec![warning],
    }
}

/// Run a synchronous store operation off the async worker; file-backed
/// stores block on IO and on the cross-process lock.
async fn blocking<T, F>(operation: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(operation).await?
}

/// An anchor may be reused only for the very same citation.
fn check_anchors(requests: &[CitationRequest]) -> Result<(), ResolveError> {
    let mut seen: BTreeMap<&str, &CitationRequest> = BTreeMap::new();
    for request in requests {
        let Some(anchor) = request.anchor.as_deref() else {
            continue;
        };
        match seen.get(anchor) {
            Some(first) if !same_target(first, request) => {
                return Err(ResolveError::DuplicateIdentifier {
                    anchor: anchor.to_string(),
                    first: first.identifier.clone(),
                    second: request.identifier.clone(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(anchor, request);
            }
        }
    }
    Ok(())
}

fn same_target(a: &CitationRequest, b: &CitationRequest) -> bool {
    match (a.normalize(), b.normalize()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

fn tier_path(location: Option<&PathBuf>, fallback: &str) -> PathBuf {
    location
        .cloned()
        .unwrap_or_else(|| PathBuf::from(fallback))
}
