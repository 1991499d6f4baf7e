//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with expiration support.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::{EntryOptions, ExpireCallback};

// == Cache Entry ==
/// Represents a single cache entry with value and expiration metadata.
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
    /// Fired once with the key and value when the entry expires
    pub on_expire: Option<ExpireCallback<V>>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry that never expires and has no callback.
    #[cfg(test)]
    pub fn new(value: V) -> Self {
        Self {
            value,
            expires_at: None,
            on_expire: None,
        }
    }

    /// Creates an entry from write-time options.
    ///
    /// The per-entry callback wins over `default_callback`; a duration option is
    /// resolved against `now`.
    pub fn with_options(
        value: V,
        mut opts: EntryOptions<V>,
        default_callback: Option<&ExpireCallback<V>>,
        now: Instant,
    ) -> Self {
        let expires_at = opts.deadline(now);
        let on_expire = opts.take_callback().or_else(|| default_callback.cloned());
        Self {
            value,
            expires_at,
            on_expire,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now` reaches the
    /// expiration instant, so a zero-length TTL is expired immediately.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the time left until expiration, or None if the entry never expires.
    ///
    /// Saturates at zero for an entry that is already past its deadline.
    pub fn ttl_remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .field("on_expire", &self.on_expire)
            .finish()
    }
}
