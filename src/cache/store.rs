//! Cache Store Module
//!
//! The public cache handle: routes every key to one partition and fans bulk
//! operations out across all of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;
use xxhash_rust::xxh32::xxh32;

use crate::cache::partition::{Partition, PartitionContext};
use crate::cache::CacheStats;
use crate::config::{CacheConfig, EntryOptions};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_sweeper, Sweeper};

// == Cache Shared ==
/// State shared between the cache handle and its sweeper thread.
pub(crate) struct CacheShared<V> {
    partitions: Box<[Partition<V>]>,
    ctx: PartitionContext<V>,
}

impl<V> CacheShared<V> {
    fn partition_for(&self, key: &str) -> &Partition<V> {
        let index = xxh32(key.as_bytes(), 0) as usize % self.partitions.len();
        &self.partitions[index]
    }

    /// Runs `check` on every partition in order, one lock at a time.
    pub(crate) fn check_all(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.check(&self.ctx))
            .sum()
    }

    fn len(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }
}

// == Cache ==
/// Concurrent, sharded key-value cache with per-entry expiration.
///
/// Expired entries are evicted lazily by whichever operation touches them
/// and actively by a background sweeper thread. Eviction fires the entry's
/// expiration callback exactly once; explicit deletion never does.
///
/// # Callbacks
/// Expiration callbacks run on the calling (or sweeper) thread while the
/// entry's partition is locked. They must be quick and must not call back
/// into the same cache.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use shard_cache::{Cache, CacheConfig, EntryOptions};
///
/// let cache = Cache::new(CacheConfig::new().with_partitions(4)).unwrap();
/// cache.set("a", 1);
/// cache.set_with("b", 2, EntryOptions::new().expire_in(Duration::from_secs(60)));
///
/// assert_eq!(cache.get("a"), Some(1));
/// assert!(!cache.set_x("a", 3));
/// cache.close();
/// ```
pub struct Cache<V> {
    shared: Arc<CacheShared<V>>,
    sweeper: Mutex<Option<Sweeper>>,
    closed: AtomicBool,
}

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    // == Constructor ==
    /// Builds the cache with all partitions allocated and starts the sweeper.
    pub fn new(config: CacheConfig<V>) -> Result<Self> {
        let interval = config.sweep_interval();
        let partitions = (0..config.partitions())
            .map(|_| Partition::new())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(CacheShared {
            partitions,
            ctx: PartitionContext::new(config),
        });
        let sweeper = spawn_sweeper(shared.clone(), interval).map_err(CacheError::SweeperSpawn)?;

        info!(
            "Cache initialized: partitions={}, sweep_interval={:?}",
            shared.partitions.len(),
            interval
        );

        Ok(Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
            closed: AtomicBool::new(false),
        })
    }
}

impl<V> Cache<V> {
    // == Has ==
    /// Returns true if `key` holds a live entry.
    pub fn has(&self, key: &str) -> bool {
        self.shared.partition_for(key).has(&self.shared.ctx, key)
    }

    // == Set ==
    /// Stores `value` under `key` with the default options.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with(key, value, EntryOptions::new());
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set_with(&self, key: impl Into<String>, value: V, opts: EntryOptions<V>) {
        let key = key.into();
        self.shared
            .partition_for(&key)
            .set(&self.shared.ctx, key, value, opts);
    }

    // == Get ==
    /// Returns a copy of the live value at `key`.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.shared.partition_for(key).get(&self.shared.ctx, key)
    }

    // == Del ==
    /// Removes a live entry without firing its callback.
    ///
    /// Returns false if the key was absent or already expired.
    pub fn del(&self, key: &str) -> bool {
        self.shared.partition_for(key).del(&self.shared.ctx, key)
    }

    // == Get Del ==
    /// Removes and returns the live value at `key`.
    pub fn get_del(&self, key: &str) -> Option<V> {
        self.shared.partition_for(key).get_del(&self.shared.ctx, key)
    }

    // == Get Set ==
    /// Stores `value` and returns the previous live value, if any.
    pub fn get_set(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.get_set_with(key, value, EntryOptions::new())
    }

    pub fn get_set_with(&self, key: impl Into<String>, value: V, opts: EntryOptions<V>) -> Option<V> {
        let key = key.into();
        self.shared
            .partition_for(&key)
            .get_set(&self.shared.ctx, key, value, opts)
    }

    // == Set X ==
    /// Stores `value` only if `key` has no live entry. Returns whether it did.
    pub fn set_x(&self, key: impl Into<String>, value: V) -> bool {
        self.set_x_with(key, value, EntryOptions::new())
    }

    pub fn set_x_with(&self, key: impl Into<String>, value: V, opts: EntryOptions<V>) -> bool {
        let key = key.into();
        self.shared
            .partition_for(&key)
            .set_x(&self.shared.ctx, key, value, opts)
    }

    // == Del Expired ==
    /// Evicts `key` only if it has expired.
    ///
    /// Returns `(existed, was_expired)`.
    pub fn del_expired(&self, key: &str) -> (bool, bool) {
        self.shared.partition_for(key).del_expired(&self.shared.ctx, key)
    }

    // == All ==
    /// Snapshot of every live entry.
    ///
    /// Partitions are visited one after another, so the result is not a
    /// single atomic view of the whole cache.
    pub fn all(&self) -> HashMap<String, V>
    where
        V: Clone,
    {
        let mut all = HashMap::new();
        for partition in self.shared.partitions.iter() {
            all.extend(partition.all(&self.shared.ctx));
        }
        all
    }

    // == Length ==
    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Clear ==
    /// Removes every entry and returns how many live entries were removed.
    ///
    /// Expired entries met along the way are evicted (callbacks fire) but
    /// are not included in the count.
    pub fn clear(&self) -> usize {
        self.shared
            .partitions
            .iter()
            .map(|partition| partition.clear(&self.shared.ctx))
            .sum()
    }

    // == TTL ==
    /// Time left before `key` expires; `Duration::MAX` if it never does.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.shared.partition_for(key).ttl(&self.shared.ctx, key)
    }

    // == Expire ==
    /// Sets a live entry to expire `ttl` from now. Returns false if absent or expired.
    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.shared
            .partition_for(key)
            .expire(&self.shared.ctx, key, ttl)
    }

    // == Sweep ==
    /// Runs one active sweep now and returns the number of entries evicted.
    pub fn sweep(&self) -> usize {
        self.shared.check_all()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.shared.ctx.stats.snapshot(self.len())
    }

    pub fn partition_count(&self) -> usize {
        self.shared.partitions.len()
    }

    // == Close ==
    /// Stops the background sweeper. Idempotent.
    ///
    /// Entries are left in place and the cache stays usable; expired entries
    /// are then only evicted lazily or through [`Cache::sweep`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("partitions", &self.shared.partitions.len())
            .field("config", &self.shared.ctx.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;
    use std::thread::sleep;

    fn new_cache(partitions: usize) -> Cache<String> {
        let config = CacheConfig::new()
            .with_partitions(partitions)
            .with_sweep_interval(Duration::from_secs(3600))
            .with_logger(Arc::new(NoopLogger));
        Cache::new(config).unwrap()
    }

    #[test]
    fn test_store_new() {
        let cache = new_cache(8);
        assert_eq!(cache.partition_count(), 8);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert!(!cache.is_closed());
    }

    #[test]
    fn test_store_zero_partitions_fall_back() {
        let cache = new_cache(0);
        assert_eq!(cache.partition_count(), crate::config::default_partitions());
    }

    #[test]
    fn test_store_set_and_get() {
        let cache = new_cache(4);

        cache.set("key1", "value1".to_string());
        assert_eq!(cache.get("key1").as_deref(), Some("value1"));
        assert!(cache.has("key1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_routing_is_stable() {
        let cache = new_cache(16);
        for i in 0..100 {
            let key = format!("key{}", i);
            let first = cache.shared.partition_for(&key) as *const Partition<String>;
            let second = cache.shared.partition_for(&key) as *const Partition<String>;
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_routing_spreads_keys() {
        let cache = new_cache(8);
        for i in 0..800 {
            cache.set(format!("key{}", i), i.to_string());
        }
        let used = cache
            .shared
            .partitions
            .iter()
            .filter(|partition| partition.len() > 0)
            .count();
        assert_eq!(used, 8);
        assert_eq!(cache.len(), 800);
    }

    #[test]
    fn test_store_bulk_operations() {
        let cache = new_cache(4);
        for i in 0..20 {
            cache.set(format!("live{}", i), i.to_string());
        }
        for i in 0..5 {
            cache.set_with(
                format!("dead{}", i),
                i.to_string(),
                EntryOptions::new().expire_in(Duration::ZERO),
            );
        }

        assert_eq!(cache.len(), 25);
        let all = cache.all();
        assert_eq!(all.len(), 20);
        assert!(all.keys().all(|key| key.starts_with("live")));
        assert_eq!(cache.len(), 20);

        assert_eq!(cache.clear(), 20);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_manual_sweep() {
        let cache = new_cache(4);
        cache.set_with("a", "1".to_string(), EntryOptions::new().expire_in(Duration::from_millis(10)));
        cache.set("b", "2".to_string());

        sleep(Duration::from_millis(20));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_store_stats() {
        let cache = new_cache(2);

        cache.set("key1", "value1".to_string());
        cache.get("key1"); // hit
        cache.get("nonexistent"); // miss
        cache.has("key1"); // hit

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_close_is_idempotent_and_keeps_entries() {
        let cache = new_cache(2);
        cache.set("k", "v".to_string());

        cache.close();
        cache.close();
        assert!(cache.is_closed());
        assert!(cache.sweeper.lock().is_none());

        // Still usable after close
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        cache.set("k2", "v2".to_string());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_debug_output() {
        let cache = new_cache(3);
        let out = format!("{:?}", cache);
        assert!(out.contains("partitions: 3"));
        assert!(out.contains("closed: false"));
    }
}
