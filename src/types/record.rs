use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::metadata::ExtraFields;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIdentifier {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDate {
    /// `published`, `issued`, `updated`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// `obsoletes`, `updatedBy`, `instanceOf`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
}

/// Normalized bibliographic record for one external document.
///
/// Records come from a backend or are read back from a cache store; the
/// resolver only ever passes them through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    pub docid: Vec<DocumentIdentifier>,
    #[serde(default)]
    pub titles: Vec<LocalizedText>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    #[serde(default)]
    pub dates: Vec<RecordDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub abstracts: Vec<LocalizedText>,
    #[serde(default, skip_serializing_if = "ExtraFields::is_empty")]
    pub extra: ExtraFields,
}

impl BibliographicRecord {
    /// Start a record from its primary identifier.
    pub fn new(primary_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            docid: vec![DocumentIdentifier {
                id: primary_id.into(),
                kind: kind.into(),
                primary: true,
            }],
            titles: Vec::new(),
            contributors: Vec::new(),
            dates: Vec::new(),
            status: None,
            relations: Vec::new(),
            abstracts: Vec::new(),
            extra: ExtraFields::new(),
        }
    }

    pub fn with_title(mut self, content: impl Into<String>, language: Option<&str>) -> Self {
        self.titles.push(LocalizedText {
            content: content.into(),
            language: language.map(str::to_string),
        });
        self
    }

    pub fn with_contributor(mut self, name: impl Into<String>, role: impl Into<String>) -> Self {
        self.contributors.push(Contributor {
            name: name.into(),
            role: role.into(),
        });
        self
    }

    pub fn with_date(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.dates.push(RecordDate {
            kind: kind.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_relation(mut self, kind: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.push(Relation {
            kind: kind.into(),
            target: target.into(),
        });
        self
    }

    pub fn primary_id(&self) -> Option<&str> {
        self.docid
            .iter()
            .find(|d| d.primary)
            .or_else(|| self.docid.first())
            .map(|d| d.id.as_str())
    }

    /// Content digest over the canonical JSON encoding.
    pub fn digest(&self) -> Result<RecordDigest, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(RecordDigest::from_content(&bytes))
    }
}

/// Content hash of a record, `sha256:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDigest(String);

impl RecordDigest {
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);

        let hex = hex::encode(hasher.finalize());
        RecordDigest(format!("sha256:{hex}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
