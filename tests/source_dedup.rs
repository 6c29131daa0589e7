mod common;

use std::sync::Arc;
use std::time::Duration;

use bibcache_core::cache::{CacheTier, MemoryStore, TierChain, TierKind};
use bibcache_core::resolve::{OutcomeStatus, UnresolvedReason};
use bibcache_core::{CitationRequest, Resolution, Resolver, ResolverConfig};
use common::{iso_record, registry_with, MockBackend};

fn memory_resolver(backend: Arc<MockBackend>) -> Resolver {
    let tiers = TierChain::new(vec![CacheTier::new(
        TierKind::Global,
        Arc::new(MemoryStore::new("global")),
    )]);
    Resolver::with_tiers(ResolverConfig::default(), tiers, registry_with("ISO", backend)).unwrap()
}

fn slow_backend() -> Arc<MockBackend> {
    Arc::new(
        MockBackend::new("iso")
            .with_delay(Duration::from_millis(50))
            .with_record("123", Some(2001), iso_record("ISO 123:2001", "Widgets"))
            .with_record("123", None, iso_record("ISO 123", "Widgets, latest"))
            .with_record("999", None, iso_record("ISO 999", "Draft")),
    )
}

#[tokio::test]
async fn concurrent_requests_for_one_key_share_a_fetch() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend.clone());

    let requests = vec![
        CitationRequest::new("ISO 123:2001"),
        CitationRequest::new("iso 123:2001"),
        CitationRequest::new("ISO 123").with_year(2001),
    ];
    let report = resolver.resolve_all(&requests).await;

    assert!(report.is_success());
    assert_eq!(backend.calls(), 1);
    assert_eq!(report.backend_calls, 1);
    assert!(report
        .citations
        .iter()
        .all(|c| c.status == OutcomeStatus::Resolved));
}

#[tokio::test]
async fn joined_callers_receive_the_same_record() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend.clone());
    let request = CitationRequest::new("ISO 123:2001");

    let (a, b) = tokio::join!(resolver.resolve(&request), resolver.resolve(&request));

    assert_eq!(a.unwrap().record(), b.unwrap().record());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn dated_and_undated_editions_are_fetched_separately() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend.clone());

    let report = resolver
        .resolve_all(&[
            CitationRequest::new("ISO 123:2001"),
            CitationRequest::new("ISO 123"),
        ])
        .await;

    assert_eq!(backend.calls(), 2);
    assert_eq!(
        report.record_for("ISO 123").unwrap().titles[0].content,
        "Widgets, latest"
    );
}

#[tokio::test]
async fn outcomes_keep_request_order() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend);
    let identifiers = ["ISO 999:--", "ISO 123", "ISO 123:2001"];
    let requests: Vec<_> = identifiers.iter().map(|id| CitationRequest::new(*id)).collect();

    let report = resolver.resolve_all(&requests).await;

    let reported: Vec<_> = report.citations.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(reported, identifiers);
}

#[tokio::test]
async fn in_preparation_fetch_is_shared_only_while_in_flight() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend.clone());
    let request = CitationRequest::new("ISO 999:--");

    let (a, b) = tokio::join!(resolver.resolve(&request), resolver.resolve(&request));
    assert!(a.unwrap().is_resolved());
    assert!(b.unwrap().is_resolved());
    assert_eq!(backend.calls(), 1);

    resolver.resolve(&request).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn unknown_organization_is_not_found() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend.clone());

    let resolution = resolver.resolve(&CitationRequest::new("FOO 42")).await.unwrap();

    assert!(matches!(
        resolution,
        Resolution::Unresolved {
            reason: UnresolvedReason::NotFound,
            ..
        }
    ));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn missing_reference_is_asked_for_once() {
    let backend = slow_backend();
    let resolver = memory_resolver(backend.clone());
    let request = CitationRequest::new("ISO 404:2020");

    for _ in 0..3 {
        let resolution = resolver.resolve(&request).await.unwrap();
        assert!(!resolution.is_resolved());
    }
    assert_eq!(backend.calls(), 1);
}
