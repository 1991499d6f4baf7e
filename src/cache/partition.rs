//! Cache Partition Module
//!
//! One independently locked slice of the keyspace. Every per-key operation
//! of the cache runs here, together with expiration detection and eviction.
//!
//! Eviction removes the entry from the table first and then runs its
//! callback while the partition lock is still held. A callback must be quick
//! and must not call back into the same cache, or it will deadlock on this
//! partition. A panicking callback is caught and logged; the table is
//! already consistent by then.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::cache::stats::StatsCounters;
use crate::cache::CacheEntry;
use crate::config::{far_future, CacheConfig, EntryOptions};

type Table<V> = HashMap<String, CacheEntry<V>>;

// == Partition Context ==
/// Cache-wide state every partition needs while evicting.
pub(crate) struct PartitionContext<V> {
    pub(crate) config: CacheConfig<V>,
    pub(crate) stats: StatsCounters,
}

impl<V> PartitionContext<V> {
    pub(crate) fn new(config: CacheConfig<V>) -> Self {
        Self {
            config,
            stats: StatsCounters::default(),
        }
    }
}

// == Partition ==
pub(crate) struct Partition<V> {
    table: RwLock<Table<V>>,
}

impl<V> Partition<V> {
    pub(crate) fn new() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
        }
    }

    // == Has ==
    pub(crate) fn has(&self, ctx: &PartitionContext<V>, key: &str) -> bool {
        let found = self.read_live(ctx, key, |_, _| ()).is_some();
        ctx.stats.record_lookup(found);
        found
    }

    // == Get ==
    pub(crate) fn get(&self, ctx: &PartitionContext<V>, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let value = self.read_live(ctx, key, |entry, _| entry.value.clone());
        ctx.stats.record_lookup(value.is_some());
        value
    }

    // == Set ==
    /// Installs `value`, replacing whatever was there. An expired entry at
    /// `key` is evicted first so its callback still fires.
    pub(crate) fn set(&self, ctx: &PartitionContext<V>, key: String, value: V, opts: EntryOptions<V>) {
        let mut table = self.table.write();
        let now = Instant::now();
        purge_if_expired(&mut table, ctx, &key, now);
        let entry = CacheEntry::with_options(value, opts, ctx.config.expire_callback(), now);
        table.insert(key, entry);
    }

    // == Del ==
    /// Removes a live entry without firing its callback.
    ///
    /// Returns false for an expired entry even though it is evicted as a side
    /// effect: expiration wins over deletion.
    pub(crate) fn del(&self, ctx: &PartitionContext<V>, key: &str) -> bool {
        let mut table = self.table.write();
        if purge_if_expired(&mut table, ctx, key, Instant::now()) {
            return false;
        }
        table.remove(key).is_some()
    }

    // == Get Del ==
    pub(crate) fn get_del(&self, ctx: &PartitionContext<V>, key: &str) -> Option<V> {
        let mut table = self.table.write();
        if purge_if_expired(&mut table, ctx, key, Instant::now()) {
            return None;
        }
        table.remove(key).map(|entry| entry.value)
    }

    // == Get Set ==
    /// Swaps in `value` and returns the previous live value, if any.
    pub(crate) fn get_set(
        &self,
        ctx: &PartitionContext<V>,
        key: String,
        value: V,
        opts: EntryOptions<V>,
    ) -> Option<V> {
        let mut table = self.table.write();
        let now = Instant::now();
        purge_if_expired(&mut table, ctx, &key, now);
        let entry = CacheEntry::with_options(value, opts, ctx.config.expire_callback(), now);
        table.insert(key, entry).map(|old| old.value)
    }

    // == Set X ==
    /// Installs `value` only if no live entry holds `key`.
    pub(crate) fn set_x(&self, ctx: &PartitionContext<V>, key: String, value: V, opts: EntryOptions<V>) -> bool {
        let mut table = self.table.write();
        let now = Instant::now();
        purge_if_expired(&mut table, ctx, &key, now);
        if table.contains_key(&key) {
            return false;
        }
        let entry = CacheEntry::with_options(value, opts, ctx.config.expire_callback(), now);
        table.insert(key, entry);
        true
    }

    // == Del Expired ==
    /// Returns `(existed, was_expired)`, evicting the entry only in the second case.
    pub(crate) fn del_expired(&self, ctx: &PartitionContext<V>, key: &str) -> (bool, bool) {
        let mut table = self.table.write();
        if !table.contains_key(key) {
            return (false, false);
        }
        let expired = purge_if_expired(&mut table, ctx, key, Instant::now());
        (true, expired)
    }

    // == All ==
    /// Snapshot of every live entry. Expired entries found on the way are evicted.
    pub(crate) fn all(&self, ctx: &PartitionContext<V>) -> HashMap<String, V>
    where
        V: Clone,
    {
        {
            let table = self.table.read();
            let now = Instant::now();
            if !table.values().any(|entry| entry.is_expired(now)) {
                return snapshot(&table);
            }
        }
        let mut table = self.table.write();
        purge_all_expired(&mut table, ctx, Instant::now());
        snapshot(&table)
    }

    // == Length ==
    /// Raw table size; expired entries not yet evicted are counted.
    pub(crate) fn len(&self) -> usize {
        self.table.read().len()
    }

    // == Clear ==
    /// Empties the partition and returns how many *live* entries were removed.
    ///
    /// Expired entries are evicted too (their callbacks fire) but are left
    /// out of the count.
    pub(crate) fn clear(&self, ctx: &PartitionContext<V>) -> usize {
        let mut table = self.table.write();
        let now = Instant::now();
        let mut removed = 0;
        for (key, entry) in table.drain() {
            if entry.is_expired(now) {
                fire_expired(ctx, &key, entry);
            } else {
                removed += 1;
            }
        }
        removed
    }

    // == TTL ==
    /// Remaining lifetime of a live entry; `Duration::MAX` if it never expires.
    pub(crate) fn ttl(&self, ctx: &PartitionContext<V>, key: &str) -> Option<Duration> {
        self.read_live(ctx, key, |entry, now| {
            entry.ttl_remaining(now).unwrap_or(Duration::MAX)
        })
    }

    // == Expire ==
    /// Gives a live entry a new deadline `ttl` from now.
    pub(crate) fn expire(&self, ctx: &PartitionContext<V>, key: &str, ttl: Duration) -> bool {
        let mut table = self.table.write();
        let now = Instant::now();
        if purge_if_expired(&mut table, ctx, key, now) {
            return false;
        }
        match table.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now.checked_add(ttl).unwrap_or_else(far_future));
                true
            }
            None => false,
        }
    }

    // == Check ==
    /// Active sweep: evicts every expired entry and returns how many there were.
    pub(crate) fn check(&self, ctx: &PartitionContext<V>) -> usize {
        let mut table = self.table.write();
        purge_all_expired(&mut table, ctx, Instant::now())
    }

    /// Runs `f` on the live entry at `key` under the shared lock.
    ///
    /// An expired entry needs the exclusive lock to be evicted; it is
    /// re-checked after re-locking so only one caller ever evicts it.
    fn read_live<R>(
        &self,
        ctx: &PartitionContext<V>,
        key: &str,
        f: impl Fn(&CacheEntry<V>, Instant) -> R,
    ) -> Option<R> {
        {
            let table = self.table.read();
            let now = Instant::now();
            match table.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(f(entry, now)),
                Some(_) => {}
            }
        }

        let mut table = self.table.write();
        let now = Instant::now();
        if purge_if_expired(&mut table, ctx, key, now) {
            return None;
        }
        // Replaced by a live entry between the two locks.
        table.get(key).map(|entry| f(entry, now))
    }
}

fn snapshot<V: Clone>(table: &Table<V>) -> HashMap<String, V> {
    table
        .iter()
        .map(|(key, entry)| (key.clone(), entry.value.clone()))
        .collect()
}

/// Evicts the entry at `key` if it is expired. Returns whether it was.
fn purge_if_expired<V>(table: &mut Table<V>, ctx: &PartitionContext<V>, key: &str, now: Instant) -> bool {
    let expired = table.get(key).is_some_and(|entry| entry.is_expired(now));
    if expired {
        if let Some((key, entry)) = table.remove_entry(key) {
            fire_expired(ctx, &key, entry);
        }
    }
    expired
}

fn purge_all_expired<V>(table: &mut Table<V>, ctx: &PartitionContext<V>, now: Instant) -> usize {
    let expired_keys: Vec<String> = table
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired_keys {
        if let Some(entry) = table.remove(key) {
            fire_expired(ctx, key, entry);
        }
    }
    expired_keys.len()
}

/// Runs the callback of an entry that has already left the table.
fn fire_expired<V>(ctx: &PartitionContext<V>, key: &str, entry: CacheEntry<V>) {
    ctx.stats.record_expiration();
    let CacheEntry { value, on_expire, .. } = entry;
    let Some(callback) = on_expire else {
        return;
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback.call(key, value))) {
        ctx.stats.record_callback_panic();
        ctx.config.logger().error(format_args!(
            "expiration callback {} for key {:?} panicked: {}",
            callback.name(),
            key,
            panic_message(payload.as_ref())
        ));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}
