use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{ExportError, StoreError, TierKind};
use crate::config::ConfigError;
use crate::source::BackendError;
use crate::types::{CacheKey, IdentifierError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Malformed citation: {0}")]
    Identifier(#[from] IdentifierError),
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),
    #[error("Fetching {key} failed: {source}")]
    Backend {
        key: CacheKey,
        #[source]
        source: BackendError,
    },
    #[error("Anchor `{anchor}` cites both `{first}` and `{second}`")]
    DuplicateIdentifier {
        anchor: String,
        first: String,
        second: String,
    },
}

/// Error classes as they appear in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    /// A cache tier could not be read or written.
    CacheStore,
    TransientBackend,
    Backend,
    Configuration,
    DuplicateIdentifier,
    ValidationResourceExhaustion,
    Validation,
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Config(_) | ResolveError::Identifier(_) => ErrorKind::Configuration,
            ResolveError::Store(e) if e.is_unreadable() => ErrorKind::Configuration,
            ResolveError::Store(_) => ErrorKind::CacheStore,
            ResolveError::Backend { source, .. } if source.is_transient() => {
                ErrorKind::TransientBackend
            }
            ResolveError::Backend { .. } => ErrorKind::Backend,
            ResolveError::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
        }
    }

    /// Whether the whole compile must stop, rather than just this citation.
    /// An unreadable cache file aborts like any other configuration error; a
    /// failed read or write only fails its citation.
    pub fn aborts_compile(&self) -> bool {
        match self {
            ResolveError::Config(_)
            | ResolveError::Identifier(_)
            | ResolveError::DuplicateIdentifier { .. } => true,
            ResolveError::Store(e) => e.is_unreadable(),
            ResolveError::Backend { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("Cache tier {0} is not enabled for this document")]
    TierNotEnabled(TierKind),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),
}
