//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Per-key operations report "not found" and "expired" through their return
/// values, so the only failure left is setting the cache up.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The background sweeper thread could not be started
    #[error("Failed to spawn sweeper thread: {0}")]
    SweeperSpawn(#[source] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
