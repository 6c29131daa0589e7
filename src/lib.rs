//! Tiered reference cache and resolver for citations of external standards.
//!
//! `bibcache-core` turns citation identifiers such as `ISO 123:2001` or
//! `RFC 2119` into normalized bibliographic records. Records are looked up in
//! a chain of persistent cache tiers (local-only, local, global) and fetched
//! from pluggable per-organization backends only on a miss or when an undated
//! entry has gone stale. Fresh fetches are written through to every writable
//! tier that lacks a valid copy.
//!
//! Within one [`Resolver`] each distinct identifier reaches its backend at
//! most once; concurrent requests share the in-flight fetch.

pub mod cache;
pub mod config;
pub mod resolve;
pub mod retry;
pub mod source;
pub mod types;
pub mod validation;

pub use config::{ConfigError, ResolverConfig};
pub use resolve::{Resolution, ResolutionReport, ResolveError, Resolver};
pub use retry::{with_retry, RetryPolicy};
pub use source::{Backend, BackendError, BackendRegistry};
pub use types::{BibliographicRecord, CacheKey, CitationRequest, NormalizedIdentifier};
