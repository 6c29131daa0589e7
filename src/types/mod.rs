pub mod identifiers;
pub mod metadata;
pub mod record;

pub use identifiers::{
    CacheKey, CitationRequest, Edition, IdentifierError, NormalizedIdentifier,
    WELL_KNOWN_ORGANIZATIONS,
};
pub use metadata::{ExtraFields, ExtraValue};
pub use record::{BibliographicRecord, RecordDigest};
