pub mod adapter;
pub mod backend;
pub mod registry;

pub use adapter::{FetchResult, SourceAdapter};
pub use backend::{Backend, BackendError, BackendResult};
pub use registry::BackendRegistry;
