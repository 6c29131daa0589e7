use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::backend::{Backend, BackendError};
use super::registry::BackendRegistry;
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{BibliographicRecord, Edition, NormalizedIdentifier};

pub type FetchResult = Result<Option<Arc<BibliographicRecord>>, BackendError>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    organization: String,
    body: String,
    edition: Edition,
}

impl From<&NormalizedIdentifier> for FetchKey {
    fn from(id: &NormalizedIdentifier) -> Self {
        Self {
            organization: id.organization().to_string(),
            body: id.body().to_string(),
            edition: id.edition(),
        }
    }
}

/// Dispatches fetches to the registered backends for one resolution pass.
///
/// Every distinct (organization, body, edition) reaches its backend at most
/// once: concurrent callers share the in-flight future and later callers get
/// the settled result. In-preparation fetches are only shared while in flight,
/// so each later request asks the backend again.
pub struct SourceAdapter {
    registry: Arc<BackendRegistry>,
    retry: RetryPolicy,
    fetches: Mutex<HashMap<FetchKey, SharedFetch>>,
    outbound_calls: Arc<AtomicUsize>,
}

impl SourceAdapter {
    pub fn new(registry: Arc<BackendRegistry>, retry: RetryPolicy) -> Self {
        Self {
            registry,
            retry,
            fetches: Mutex::new(HashMap::new()),
            outbound_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend calls issued so far, retries included.
    pub fn outbound_calls(&self) -> usize {
        self.outbound_calls.load(Ordering::SeqCst)
    }

    pub async fn fetch(&self, id: &NormalizedIdentifier) -> FetchResult {
        let Some(backend) = self.registry.get(id.organization()) else {
            debug!(organization = id.organization(), "no backend registered");
            return Ok(None);
        };

        let key = FetchKey::from(id);
        let (fetch, leader) = {
            let mut fetches = self.fetches.lock();
            match fetches.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let fetch = self.start(backend, id);
                    fetches.insert(key.clone(), fetch.clone());
                    (fetch, true)
                }
            }
        };

        if !leader {
            debug!(id = %id, "joining in-flight fetch");
        }

        let result = fetch.await;

        if leader && id.is_in_preparation() {
            self.fetches.lock().remove(&key);
        }
        result
    }

    fn start(&self, backend: Arc<dyn Backend>, id: &NormalizedIdentifier) -> SharedFetch {
        let policy = self.retry;
        let calls = Arc::clone(&self.outbound_calls);
        let body = id.body().to_string();
        let edition = id.edition();
        let label = id.canonical();

        async move {
            info!(id = %label, backend = backend.name(), "fetching reference");
            let record = with_retry(
                &policy,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let backend = Arc::clone(&backend);
                    let body = body.clone();
                    async move {
                        match edition {
                            Edition::Dated(year) => backend.resolve_dated(&body, year).await,
                            Edition::Undated | Edition::InPreparation => {
                                backend.resolve_undated(&body).await
                            }
                        }
                    }
                },
                BackendError::is_transient,
            )
            .await?;
            Ok::<_, BackendError>(record.map(Arc::new))
        }
        .boxed()
        .shared()
    }
}
