pub mod entry;
pub mod export;
pub mod file_store;
pub mod staleness;
pub mod store;
pub mod tiers;
pub mod versioning;

pub use entry::{CacheEntry, EntryHeader};
pub use export::{export_store, ExportError, ExportSummary};
pub use file_store::FileStore;
pub use staleness::{StalenessPolicy, DEFAULT_UNDATED_TTL_DAYS};
pub use store::{CacheStore, MemoryStore, PutOutcome, StoreError};
pub use tiers::{CacheTier, Lookup, TierChain, TierKind, WriteThrough};
pub use versioning::{ExportIndex, ExportManifest, StoreManifest, STORE_FORMAT_VERSION};
