use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::backend::Backend;

/// Organization token → backend. Populated once at startup.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.backends.iter().map(|(token, b)| (token, b.name())))
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` for an organization token (case-insensitive).
    /// A later registration for the same token replaces the earlier one.
    pub fn register(&mut self, organization: &str, backend: Arc<dyn Backend>) -> &mut Self {
        self.backends
            .insert(organization.to_ascii_uppercase(), backend);
        self
    }

    pub fn with(mut self, organization: &str, backend: Arc<dyn Backend>) -> Self {
        self.register(organization, backend);
        self
    }

    pub fn get(&self, organization: &str) -> Option<Arc<dyn Backend>> {
        self.backends
            .get(&organization.to_ascii_uppercase())
            .cloned()
    }

    pub fn organizations(&self) -> impl Iterator<Item = &str> {
        self.backends.keys().map(String::as_str)
    }
}
