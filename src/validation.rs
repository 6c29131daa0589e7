//! Retry glue for the external schema validator.
//!
//! Validation itself lives outside this crate. Its subprocess occasionally
//! fails for lack of resources (file handles, memory); those runs are retried
//! with the same backoff as backend fetches.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("validator ran out of resources: {0}")]
    ResourceExhausted(String),
    #[error("document is invalid: {0}")]
    Invalid(String),
    #[error("validator failed: {0}")]
    Process(String),
}

impl ValidationError {
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ValidationError::ResourceExhausted(_))
    }
}

#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate the document at `path`, returning non-fatal warnings.
    async fn validate(&self, path: &Path) -> Result<Vec<String>, ValidationError>;
}

pub async fn validate_with_retry<V>(
    validator: &V,
    path: &Path,
    policy: &RetryPolicy,
) -> Result<Vec<String>, ValidationError>
where
    V: Validator + ?Sized,
{
    let warnings = with_retry(
        policy,
        || validator.validate(path),
        ValidationError::is_resource_exhaustion,
    )
    .await?;
    info!(path = %path.display(), warnings = warnings.len(), "document validated");
    Ok(warnings)
}
