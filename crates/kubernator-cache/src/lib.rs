//! kubernator-cache - the two on-disk caches kept under the application cache
//! directory: a content-addressed HTTP object cache (OpenAPI/CRD payloads)
//! and a Git repository working-copy cache (remote manifest trees).

pub mod error;
pub mod git_cache;
pub mod http_cache;

pub use error::{CacheError, Result};
pub use git_cache::GitCache;
pub use http_cache::{FetchOutcome, HttpCache};
