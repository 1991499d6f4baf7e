//! Cache Module
//!
//! Provides the sharded in-memory cache with lazy and active expiration.

mod entry;
mod partition;
mod stats;
pub(crate) mod store;


// Re-export public types
pub(crate) use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::Cache;
