use async_trait::async_trait;
use thiserror::Error;

use crate::types::BibliographicRecord;

/// Failure talking to a backend. Absence of a record is not an error; see
/// [`Backend::resolve_dated`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network hiccup, timeout, 5xx. Retried.
    #[error("transient backend failure: {0}")]
    Transient(String),
    #[error("backend failure: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

pub type BackendResult = Result<Option<BibliographicRecord>, BackendError>;

/// A bibliographic data source for one organization.
///
/// `Ok(None)` means the backend has no such document.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve_dated(&self, body: &str, year: u16) -> BackendResult;

    async fn resolve_undated(&self, body: &str) -> BackendResult;
}
