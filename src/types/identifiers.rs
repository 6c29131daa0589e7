use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Organizations whose identifiers are rendered without a publisher prefix.
pub const WELL_KNOWN_ORGANIZATIONS: &[&str] = &["ISO", "IEC", "ITU"];

/// Identifier prefixes that are not themselves the publishing organization.
const ORGANIZATION_NAMES: &[(&str, &str)] = &[
    ("RFC", "IETF"),
    ("BCP", "IETF"),
    ("FIPS", "NIST"),
    ("BS", "BSI"),
    ("GB", "SAC"),
];

// The token ends at a space, a joint publisher (`/IEC`) or a series qualifier (`-T`).
static ORGANIZATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9]+)([ /-].*)?$").expect("invalid organization regex"));

static YEAR_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*:(\d{4})$").expect("invalid year regex"));

// Any trailing `:segment` without spaces or slashes is meant as an edition.
static EDITION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([^:/\s]*)$").expect("invalid edition regex"));

const IN_PREPARATION_SUFFIX: &str = ":--";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Empty citation identifier")]
    Empty,
    #[error("Missing organization token in citation `{0}`")]
    MissingOrganization(String),
    #[error("Missing document number in citation `{0}`")]
    MissingBody(String),
    #[error("Malformed edition suffix in citation `{0}`")]
    MalformedYear(String),
    #[error("Conflicting year for `{identifier}`: cited as {cited}, requested as {explicit}")]
    ConflictingYear {
        identifier: String,
        cited: u16,
        explicit: u16,
    },
}

/// Canonical key of one record within a cache tier, e.g. `ISO(ISO 123:2001)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename-safe stem for file-backed stores.
    pub fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let hash = hex::encode(hasher.finalize());
        hash[..24].to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edition {
    Dated(u16),
    Undated,
    /// Not yet published (`:--`).
    InPreparation,
}

/// A citation as requested by the document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRequest {
    pub identifier: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub in_preparation: bool,
    #[serde(default)]
    pub anchor: Option<String>,
}

impl CitationRequest {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            year: None,
            in_preparation: false,
            anchor: None,
        }
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn in_preparation(mut self) -> Self {
        self.in_preparation = true;
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    pub fn normalize(&self) -> Result<NormalizedIdentifier, IdentifierError> {
        let mut id = NormalizedIdentifier::parse(&self.identifier)?;

        if self.in_preparation {
            id.edition = Edition::InPreparation;
            return Ok(id);
        }

        match (id.edition, self.year) {
            (Edition::Undated, Some(year)) => id.edition = Edition::Dated(year),
            (Edition::Dated(cited), Some(explicit)) if cited != explicit => {
                return Err(IdentifierError::ConflictingYear {
                    identifier: self.identifier.clone(),
                    cited,
                    explicit,
                });
            }
            _ => {}
        }
        Ok(id)
    }
}

/// A parsed citation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedIdentifier {
    organization: String,
    body: String,
    edition: Edition,
}

impl NormalizedIdentifier {
    /// Parse a raw citation such as `ISO 123:2001`, `RFC 123` or `ISO 123:--`.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return Err(IdentifierError::Empty);
        }

        let (rest, edition) = split_edition(&collapsed)?;

        let caps = ORGANIZATION
            .captures(rest)
            .ok_or_else(|| IdentifierError::MissingOrganization(raw.trim().to_string()))?;
        let organization = caps[1].to_ascii_uppercase();
        if !organization.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(IdentifierError::MissingOrganization(raw.trim().to_string()));
        }

        let body = caps
            .get(2)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .trim_start_matches(' ')
            .to_string();
        if body.is_empty() || body == "/" || body == "-" {
            return Err(IdentifierError::MissingBody(raw.trim().to_string()));
        }

        Ok(Self {
            organization,
            body,
            edition,
        })
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn edition(&self) -> Edition {
        self.edition
    }

    pub fn year(&self) -> Option<u16> {
        match self.edition {
            Edition::Dated(year) => Some(year),
            _ => None,
        }
    }

    pub fn is_dated(&self) -> bool {
        matches!(self.edition, Edition::Dated(_))
    }

    pub fn is_in_preparation(&self) -> bool {
        self.edition == Edition::InPreparation
    }

    /// `ISO 123:2001`, `ISO/IEC 27001`, `ITU-T X.509`, `ISO 123:--`.
    pub fn canonical(&self) -> String {
        let joiner = if self.body.starts_with(['/', '-']) { "" } else { " " };
        let base = format!("{}{}{}", self.organization, joiner, self.body);
        match self.edition {
            Edition::Dated(year) => format!("{base}:{year}"),
            Edition::Undated => base,
            Edition::InPreparation => format!("{base}{IN_PREPARATION_SUFFIX}"),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey(format!("{}({})", self.organization, self.canonical()))
    }

    /// Publisher name for the organization token (`RFC` is published by `IETF`).
    pub fn organization_name(&self) -> &str {
        ORGANIZATION_NAMES
            .iter()
            .find(|(token, _)| *token == self.organization)
            .map(|(_, name)| *name)
            .unwrap_or(self.organization.as_str())
    }

    /// Citation text as shown in the document. Only bodies outside
    /// [`WELL_KNOWN_ORGANIZATIONS`] carry the publisher prefix.
    pub fn rendered(&self) -> String {
        let canonical = self.canonical();
        if WELL_KNOWN_ORGANIZATIONS.contains(&self.organization.as_str()) {
            return canonical;
        }
        let name = self.organization_name();
        if canonical.starts_with(name) {
            canonical
        } else {
            format!("{name} {canonical}")
        }
    }
}

impl fmt::Display for NormalizedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn split_edition(collapsed: &str) -> Result<(&str, Edition), IdentifierError> {
    if let Some(rest) = collapsed.strip_suffix(IN_PREPARATION_SUFFIX) {
        return Ok((rest.trim_end(), Edition::InPreparation));
    }

    if let Some(caps) = YEAR_SUFFIX.captures(collapsed) {
        let rest = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let year = caps[2]
            .parse::<u16>()
            .map_err(|_| IdentifierError::MalformedYear(collapsed.to_string()))?;
        return Ok((rest, Edition::Dated(year)));
    }

    if EDITION_SUFFIX.is_match(collapsed) {
        return Err(IdentifierError::MalformedYear(collapsed.to_string()));
    }

    Ok((collapsed, Edition::Undated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_edition_variants() {
        assert_eq!(
            split_edition("ISO 123:2001").unwrap(),
            ("ISO 123", Edition::Dated(2001))
        );
        assert_eq!(
            split_edition("ISO 123:--").unwrap(),
            ("ISO 123", Edition::InPreparation)
        );
        assert_eq!(split_edition("RFC 123").unwrap(), ("RFC 123", Edition::Undated));
        assert!(split_edition("ISO 123:20x1").is_err());
        assert!(split_edition("ISO 123:").is_err());
    }

    #[test]
    fn file_stem_is_stable_and_filename_safe() {
        let key = NormalizedIdentifier::parse("ISO 123:2001").unwrap().cache_key();
        let stem = key.file_stem();
        assert_eq!(stem.len(), 24);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, key.file_stem());
    }
}
