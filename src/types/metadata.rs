use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend-specific field value that has no dedicated slot in the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Flag(bool),
    Number(i64),
    Text(String),
    List(Vec<String>),
}

/// Ordered bag of backend-specific fields (ICS codes, editorial groups, ...).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraFields {
    inner: BTreeMap<String, ExtraValue>,
}

impl ExtraFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ExtraValue) {
        self.inner.insert(key.into(), value);
    }

    pub fn insert_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, ExtraValue::Text(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&ExtraValue> {
        self.inner.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ExtraValue)> {
        self.inner.iter()
    }
}
