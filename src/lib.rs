//! Shard Cache - a concurrent, sharded in-memory key-value cache
//!
//! Entries carry an optional expiration instant and an optional expiration
//! callback. Expired entries are evicted lazily on access and actively by a
//! background sweeper thread.

pub mod cache;
pub mod config;
pub mod error;
pub mod logger;
mod tasks;

pub use cache::{Cache, CacheStats};
pub use config::{CacheConfig, EntryOptions, ExpireCallback, DEFAULT_SWEEP_INTERVAL};
pub use error::{CacheError, Result};
pub use logger::{Level, Logger, NoopLogger, TracingLogger};
