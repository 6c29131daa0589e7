mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bibcache_core::cache::{
    CacheEntry, CacheStore, CacheTier, FileStore, MemoryStore, TierChain, TierKind,
};
use bibcache_core::resolve::{ErrorKind, OutcomeStatus, RecordSource};
use bibcache_core::types::NormalizedIdentifier;
use bibcache_core::validation::ValidationError;
use bibcache_core::{
    BackendError, BackendRegistry, BibliographicRecord, CitationRequest, ConfigError, Resolver,
};
use chrono::{Duration, Utc};
use common::{file_config, iso_record, registry_with, FailingStore, MockBackend};
use tempfile::tempdir;

fn rfc_record(id: &str, title: &str) -> BibliographicRecord {
    BibliographicRecord::new(id, "IETF")
        .with_title(title, Some("en"))
        .with_status("best-current-practice")
}

#[tokio::test]
async fn not_found_is_reported_without_failing_the_pass() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(MockBackend::new("iso"));
    let resolver = Resolver::new(
        file_config(&dir.path().join("global"), None),
        registry_with("ISO", backend),
    )
    .unwrap();

    let report = resolver
        .resolve_all(&[CitationRequest::new("ISO 404:2020")])
        .await;

    assert!(report.is_success());
    assert_eq!(report.unresolved().count(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::NotFound);
    assert!(!report.errors[0].fatal);
}

#[tokio::test]
async fn a_failed_citation_does_not_block_its_siblings() {
    let dir = tempdir().unwrap();
    let iso = Arc::new(MockBackend::new("iso"));
    iso.fail_next(BackendError::Fatal("service rejected the query".into()));
    let ietf = Arc::new(
        MockBackend::new("ietf").with_record("2119", None, rfc_record("RFC 2119", "Key words")),
    );
    let registry = Arc::new(
        BackendRegistry::new()
            .with("ISO", iso.clone())
            .with("RFC", ietf.clone()),
    );
    let resolver = Resolver::new(file_config(&dir.path().join("global"), None), registry).unwrap();

    let report = resolver
        .resolve_all(&[
            CitationRequest::new("ISO 123:2001").with_anchor("iso123"),
            CitationRequest::new("RFC 2119").with_anchor("rfc2119"),
        ])
        .await;

    assert!(!report.aborted);
    assert!(!report.is_success());
    assert_eq!(report.citations[0].status, OutcomeStatus::Failed);
    assert_eq!(report.citations[1].status, OutcomeStatus::Resolved);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Backend);
    assert_eq!(report.errors[0].identifier.as_deref(), Some("ISO 123:2001"));
    assert_eq!(
        report.record_for("RFC 2119").unwrap().titles[0].content,
        "Key words"
    );
    assert_eq!(report.backend_calls, 2);
}

#[tokio::test]
async fn stale_copy_is_served_when_refresh_fails() {
    let dir = tempdir().unwrap();
    let global = dir.path().join("global");
    let id = NormalizedIdentifier::parse("ISO 123").unwrap();
    FileStore::open(&global)
        .unwrap()
        .put(CacheEntry::new(
            id.cache_key(),
            false,
            iso_record("ISO 123", "Stale"),
            Utc::now() - Duration::days(120),
        ))
        .unwrap();

    let backend = Arc::new(MockBackend::new("iso"));
    backend.fail_next(BackendError::Fatal("gone".into()));
    let resolver = Resolver::new(file_config(&global, None), registry_with("ISO", backend)).unwrap();

    let report = resolver.resolve_all(&[CitationRequest::new("ISO 123")]).await;

    assert!(report.is_success());
    let outcome = &report.citations[0];
    assert_eq!(outcome.status, OutcomeStatus::Resolved);
    assert_eq!(
        outcome.source,
        Some(RecordSource::StaleCache {
            tier: TierKind::Global
        })
    );
    assert!(outcome.message.as_deref().unwrap().contains("gone"));
    assert_eq!(report.warnings.len(), 1);
}

#[tokio::test]
async fn stale_copy_is_served_when_reference_disappears() {
    let dir = tempdir().unwrap();
    let global = dir.path().join("global");
    let id = NormalizedIdentifier::parse("ISO 123").unwrap();
    FileStore::open(&global)
        .unwrap()
        .put(CacheEntry::new(
            id.cache_key(),
            false,
            iso_record("ISO 123", "Withdrawn"),
            Utc::now() - Duration::days(120),
        ))
        .unwrap();

    let resolver = Resolver::new(
        file_config(&global, None),
        registry_with("ISO", Arc::new(MockBackend::new("iso"))),
    )
    .unwrap();

    let resolution = resolver.resolve(&CitationRequest::new("ISO 123")).await.unwrap();
    assert!(matches!(
        resolution.source(),
        Some(RecordSource::StaleCache { .. })
    ));
}

#[tokio::test]
async fn failed_cache_write_is_a_warning_on_the_citation() {
    let dir = tempdir().unwrap();
    let global = Arc::new(MemoryStore::new("global"));
    let tiers = TierChain::new(vec![
        CacheTier::new(TierKind::Local, Arc::new(FailingStore)),
        CacheTier::new(TierKind::Global, global.clone()),
    ]);
    let backend = Arc::new(
        MockBackend::new("iso").with_record("123", Some(2001), iso_record("ISO 123:2001", "Widgets")),
    );
    let resolver = Resolver::with_tiers(
        file_config(&dir.path().join("unused"), None),
        tiers,
        registry_with("ISO", backend),
    )
    .unwrap();

    let report = resolver.resolve_all(&[CitationRequest::new("ISO 123:2001")]).await;

    assert!(report.is_success());
    let outcome = &report.citations[0];
    assert_eq!(outcome.status, OutcomeStatus::Resolved);
    assert_eq!(outcome.source, Some(RecordSource::Backend));
    assert!(outcome.message.as_deref().unwrap().contains("local tier"));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].starts_with("ISO 123:2001: "));

    // The healthy tier is still written.
    assert_eq!(global.len(), 1);
}

#[tokio::test]
async fn corrupt_cache_entry_aborts_the_pass() {
    let dir = tempdir().unwrap();
    let global = dir.path().join("global");
    let local = dir.path().join("local");

    // A valid global copy must not paper over the unreadable local one.
    let id = NormalizedIdentifier::parse("ISO 123:2001").unwrap();
    let seeded = CacheEntry::new(
        id.cache_key(),
        true,
        iso_record("ISO 123:2001", "Widgets"),
        Utc::now(),
    );
    FileStore::open(&global).unwrap().put(seeded.clone()).unwrap();
    FileStore::open(&local).unwrap().put(seeded).unwrap();
    fs::write(
        local
            .join("entries")
            .join(format!("{}.json", id.cache_key().file_stem())),
        b"{ truncated",
    )
    .unwrap();

    let backend = Arc::new(
        MockBackend::new("iso")
            .with_record("123", Some(2001), iso_record("ISO 123:2001", "Widgets"))
            .with_record("124", Some(2001), iso_record("ISO 124:2001", "Gadgets")),
    );
    let resolver = Resolver::new(
        file_config(&global, Some(&local)),
        registry_with("ISO", backend),
    )
    .unwrap();

    let report = resolver
        .resolve_all(&[
            CitationRequest::new("ISO 123:2001"),
            CitationRequest::new("ISO 124:2001"),
        ])
        .await;

    assert!(report.aborted);
    assert!(!report.is_success());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, ErrorKind::Configuration);
    assert_eq!(report.errors[0].identifier.as_deref(), Some("ISO 123:2001"));
    assert!(report.citations.is_empty());
}

#[tokio::test]
async fn conflicting_anchor_aborts_before_any_fetch() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(
        MockBackend::new("iso").with_record("1", Some(2001), iso_record("ISO 1:2001", "One")),
    );
    let resolver = Resolver::new(
        file_config(&dir.path().join("global"), None),
        registry_with("ISO", backend.clone()),
    )
    .unwrap();

    let report = resolver
        .resolve_all(&[
            CitationRequest::new("ISO 1:2001").with_anchor("ref1"),
            CitationRequest::new("ISO 2:2001").with_anchor("ref1"),
        ])
        .await;

    assert!(report.aborted);
    assert!(!report.is_success());
    assert_eq!(report.errors[0].kind, ErrorKind::DuplicateIdentifier);
    assert!(report.citations.is_empty());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn repeated_anchor_for_the_same_reference_is_allowed() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(
        MockBackend::new("iso").with_record("1", Some(2001), iso_record("ISO 1:2001", "One")),
    );
    let resolver = Resolver::new(
        file_config(&dir.path().join("global"), None),
        registry_with("ISO", backend.clone()),
    )
    .unwrap();

    let report = resolver
        .resolve_all(&[
            CitationRequest::new("ISO 1:2001").with_anchor("ref1"),
            CitationRequest::new("iso 1").with_year(2001).with_anchor("ref1"),
        ])
        .await;

    assert!(report.is_success());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn malformed_identifier_aborts_the_pass() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(
        MockBackend::new("iso").with_record("1", Some(2001), iso_record("ISO 1:2001", "One")),
    );
    let resolver = Resolver::new(
        file_config(&dir.path().join("global"), None),
        registry_with("ISO", backend.clone()),
    )
    .unwrap();

    let report = resolver
        .resolve_all(&[CitationRequest::new("ISO 1:2001"), CitationRequest::new("ISO 7:20x1")])
        .await;

    assert!(report.aborted);
    assert_eq!(report.errors[0].identifier.as_deref(), Some("ISO 7:20x1"));
    assert_eq!(report.errors[0].kind, ErrorKind::Configuration);
    assert_eq!(backend.calls(), 0);
}

#[test]
fn unusable_cache_location_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("global");
    fs::write(&file, b"not a directory").unwrap();

    let result = Resolver::new(
        file_config(&file, None),
        Arc::new(BackendRegistry::new()),
    );

    match result {
        Err(ConfigError::Store { kind, path, .. }) => {
            assert_eq!(kind, TierKind::Global);
            assert_eq!(path, PathBuf::from(&file));
        }
        Err(other) => panic!("expected store error, got {other}"),
        Ok(_) => panic!("expected store error"),
    }
}

#[tokio::test]
async fn report_is_written_as_json() {
    let dir = tempdir().unwrap();
    let backend = Arc::new(
        MockBackend::new("iso").with_record("123", Some(2001), iso_record("ISO 123:2001", "Widgets")),
    );
    let resolver = Resolver::new(
        file_config(&dir.path().join("global"), None),
        registry_with("ISO", backend),
    )
    .unwrap();

    let mut report = resolver
        .resolve_all(&[CitationRequest::new("ISO 123:2001").with_anchor("iso123")])
        .await;
    report.record_validation_failure(
        &dir.path().join("doc.xml"),
        &ValidationError::ResourceExhausted("out of memory".into()),
    );

    let path = dir.path().join("report.json");
    report.write_to(&path).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();

    let citation = &json["citations"][0];
    assert_eq!(citation["identifier"], "ISO 123:2001");
    assert_eq!(citation["anchor"], "iso123");
    assert_eq!(citation["key"], "ISO(ISO 123:2001)");
    assert_eq!(citation["status"], "resolved");
    assert_eq!(citation["source"]["kind"], "backend");
    assert!(citation["digest"].as_str().unwrap().starts_with("sha256:"));
    assert!(citation.get("record").is_none());

    assert_eq!(json["errors"][0]["kind"], "validation-resource-exhaustion");
    assert_eq!(json["errors"][0]["fatal"], true);
    assert_eq!(json["backend_calls"], 1);
    assert!(!report.is_success());
}
