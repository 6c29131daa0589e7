use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{ErrorKind, ResolveError};
use super::{RecordSource, Resolution, UnresolvedReason};
use crate::types::{BibliographicRecord, CacheKey, CitationRequest, RecordDigest};
use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeStatus {
    Resolved,
    Unresolved,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CitationOutcome {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<CacheKey>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<RecordSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<RecordDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Handed back to the document compiler; not part of the report file.
    #[serde(skip)]
    pub record: Option<Arc<BibliographicRecord>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub message: String,
    pub fatal: bool,
}

/// Outcome of one resolution pass, written next to the compiled output.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub generated_at: DateTime<Utc>, // informational only
    pub aborted: bool,
    pub backend_calls: usize,
    pub citations: Vec<CitationOutcome>,
    pub warnings: Vec<String>,
    pub errors: Vec<ReportedError>,
}

impl Default for ResolutionReport {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            aborted: false,
            backend_calls: 0,
            citations: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl ResolutionReport {
    pub(crate) fn abort(&mut self, identifier: Option<&str>, error: &ResolveError) {
        self.aborted = true;
        self.push_error(identifier, error);
    }

    fn push_error(&mut self, identifier: Option<&str>, error: &ResolveError) {
        self.errors.push(ReportedError {
            kind: error.kind(),
            identifier: identifier.map(str::to_string),
            message: error.to_string(),
            fatal: true,
        });
    }

    pub(crate) fn record_outcome(
        &mut self,
        request: &CitationRequest,
        result: Result<Resolution, ResolveError>,
    ) {
        let mut outcome = CitationOutcome {
            identifier: request.identifier.clone(),
            anchor: request.anchor.clone(),
            key: None,
            status: OutcomeStatus::Failed,
            source: None,
            digest: None,
            message: None,
            record: None,
        };

        match result {
            Ok(Resolution::Resolved {
                key,
                record,
                source,
                warnings,
            }) => {
                for warning in &warnings {
                    self.warnings.push(format!("{}: {warning}", request.identifier));
                }
                outcome.key = Some(key);
                outcome.status = OutcomeStatus::Resolved;
                outcome.source = Some(source);
                outcome.digest = record.digest().ok();
                outcome.message = (!warnings.is_empty()).then(|| warnings.join("; "));
                outcome.record = Some(record);
            }
            Ok(Resolution::Unresolved { key, reason }) => {
                let message = reason.to_string();
                match reason {
                    UnresolvedReason::NotFound => self.errors.push(ReportedError {
                        kind: ErrorKind::NotFound,
                        identifier: Some(request.identifier.clone()),
                        message: message.clone(),
                        fatal: false,
                    }),
                    UnresolvedReason::FetchFailed(_) => {
                        self.warnings.push(format!("{}: {message}", request.identifier));
                    }
                    UnresolvedReason::NoFetch => {}
                }
                outcome.key = Some(key);
                outcome.status = OutcomeStatus::Unresolved;
                outcome.message = Some(message);
            }
            Err(error) => {
                outcome.message = Some(error.to_string());
                self.push_error(Some(&request.identifier), &error);
            }
        }

        self.citations.push(outcome);
    }

    /// Record a failed run of the schema validator.
    pub fn record_validation_failure(&mut self, path: &Path, error: &ValidationError) {
        let kind = if error.is_resource_exhaustion() {
            ErrorKind::ValidationResourceExhaustion
        } else {
            ErrorKind::Validation
        };
        self.errors.push(ReportedError {
            kind,
            identifier: Some(path.display().to_string()),
            message: error.to_string(),
            fatal: true,
        });
    }

    /// No fatal error was recorded.
    pub fn is_success(&self) -> bool {
        !self.aborted && self.errors.iter().all(|e| !e.fatal)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &CitationOutcome> {
        self.citations
            .iter()
            .filter(|c| c.status == OutcomeStatus::Unresolved)
    }

    pub fn record_for(&self, identifier: &str) -> Option<&BibliographicRecord> {
        self.citations
            .iter()
            .find(|c| c.identifier == identifier)
            .and_then(|c| c.record.as_deref())
    }

    /// Write the report as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let f = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(&f, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        f.sync_all()
    }
}
