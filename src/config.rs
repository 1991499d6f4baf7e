//! Configuration Module
//!
//! Construction-time cache settings and per-entry write options.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::logger::{Logger, TracingLogger};

/// Sweep interval used when none (or zero) is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Multiplier applied to the logical CPU count for the default partition count.
pub const PARTITIONS_PER_CPU: usize = 4;

// == Expire Callback ==
/// Callback fired with the key and the evicted value when an entry expires.
///
/// Runs while the owning partition's lock is held: it must be quick and must
/// not call back into the same cache. The handler's type name is kept so a
/// failing callback can be identified in the logs.
pub struct ExpireCallback<V> {
    name: &'static str,
    handler: Arc<dyn Fn(&str, V) + Send + Sync>,
}

impl<V> ExpireCallback<V> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, V) + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<F>(),
            handler: Arc::new(handler),
        }
    }

    /// Type name of the handler, e.g. `my_crate::on_session_expired`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, key: &str, value: V) {
        (self.handler)(key, value)
    }

    /// True if both refer to the same handler allocation.
    pub fn same_handler(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl<V> Clone for ExpireCallback<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            handler: self.handler.clone(),
        }
    }
}

impl<V> fmt::Debug for ExpireCallback<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExpireCallback").field(&self.name).finish()
    }
}

/// Default partition count: four per logical CPU.
pub fn default_partitions() -> usize {
    num_cpus::get().max(1) * PARTITIONS_PER_CPU
}

// == Cache Config ==
/// Immutable cache settings, fixed when the cache is built.
///
/// Invalid input never fails: a zero interval or partition count falls back
/// to the default.
pub struct CacheConfig<V> {
    sweep_interval: Duration,
    partitions: usize,
    on_expire: Option<ExpireCallback<V>>,
    logger: Arc<dyn Logger>,
}

impl<V> CacheConfig<V> {
    /// Creates a config with default settings.
    pub fn new() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            partitions: default_partitions(),
            on_expire: None,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Creates a config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep interval in milliseconds (default: 1000)
    /// - `CACHE_PARTITIONS` - Number of partitions (default: 4 per CPU)
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(ms) = env::var("CACHE_SWEEP_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config = config.with_sweep_interval(Duration::from_millis(ms));
        }
        if let Some(count) = env::var("CACHE_PARTITIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            config = config.with_partitions(count);
        }
        config
    }

    /// Sets the active sweep interval; zero restores the default.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = if interval.is_zero() {
            DEFAULT_SWEEP_INTERVAL
        } else {
            interval
        };
        self
    }

    /// Sets the partition count; zero restores the default.
    pub fn with_partitions(mut self, count: usize) -> Self {
        self.partitions = if count == 0 {
            default_partitions()
        } else {
            count
        };
        self
    }

    /// Sets the callback applied to entries that don't bring their own.
    pub fn with_expire_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, V) + Send + Sync + 'static,
    {
        self.on_expire = Some(ExpireCallback::new(callback));
        self
    }

    /// Sets the logger used to report callback failures.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn expire_callback(&self) -> Option<&ExpireCallback<V>> {
        self.on_expire.as_ref()
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }
}

impl<V> Default for CacheConfig<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for CacheConfig<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("sweep_interval", &self.sweep_interval)
            .field("partitions", &self.partitions)
            .field("on_expire", &self.on_expire)
            .finish_non_exhaustive()
    }
}

// == Entry Options ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiration {
    At(Instant),
    In(Duration),
}

/// Per-entry options applied when a value is written.
///
/// When two options conflict the one set last wins, so
/// `expire_at(t).expire_in(d)` expires after `d`.
pub struct EntryOptions<V> {
    expiration: Option<Expiration>,
    on_expire: Option<ExpireCallback<V>>,
}

impl<V> EntryOptions<V> {
    pub fn new() -> Self {
        Self {
            expiration: None,
            on_expire: None,
        }
    }

    /// Expires the entry at an absolute instant.
    pub fn expire_at(mut self, deadline: Instant) -> Self {
        self.expiration = Some(Expiration::At(deadline));
        self
    }

    /// Expires the entry `ttl` after it is written.
    pub fn expire_in(mut self, ttl: Duration) -> Self {
        self.expiration = Some(Expiration::In(ttl));
        self
    }

    /// Overrides the cache's default expiration callback for this entry.
    pub fn on_expire<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, V) + Send + Sync + 'static,
    {
        self.on_expire = Some(ExpireCallback::new(callback));
        self
    }

    /// Resolves the configured expiration against the write time `now`.
    pub(crate) fn deadline(&self, now: Instant) -> Option<Instant> {
        self.expiration.map(|exp| match exp {
            Expiration::At(deadline) => deadline,
            Expiration::In(ttl) => now.checked_add(ttl).unwrap_or_else(far_future),
        })
    }

    pub(crate) fn take_callback(&mut self) -> Option<ExpireCallback<V>> {
        self.on_expire.take()
    }
}

impl<V> Default for EntryOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for EntryOptions<V> {
    fn clone(&self) -> Self {
        Self {
            expiration: self.expiration,
            on_expire: self.on_expire.clone(),
        }
    }
}

impl<V> fmt::Debug for EntryOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryOptions")
            .field("expiration", &self.expiration)
            .field("on_expire", &self.on_expire)
            .finish()
    }
}

/// A deadline far enough out to stand in for an overflowing `now + ttl`.
pub(crate) fn far_future() -> Instant {
    // ~30 years; Instant has no MAX.
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365 * 30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;
    use serial_test::serial;

    #[test]
    fn test_config_default() {
        let config: CacheConfig<u32> = CacheConfig::default();
        assert_eq!(config.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.partitions(), default_partitions());
        assert!(config.partitions() >= PARTITIONS_PER_CPU);
        assert!(config.expire_callback().is_none());
    }

    #[test]
    fn test_config_zero_values_fall_back() {
        let config: CacheConfig<u32> = CacheConfig::new()
            .with_sweep_interval(Duration::ZERO)
            .with_partitions(0);
        assert_eq!(config.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.partitions(), default_partitions());
    }

    #[test]
    fn test_config_builder_overrides() {
        let config: CacheConfig<u32> = CacheConfig::new()
            .with_sweep_interval(Duration::from_millis(20))
            .with_partitions(3)
            .with_expire_callback(|_, _| {})
            .with_logger(Arc::new(NoopLogger));
        assert_eq!(config.sweep_interval(), Duration::from_millis(20));
        assert_eq!(config.partitions(), 3);
        assert!(config.expire_callback().is_some());
    }

    fn clear_env() {
        env::remove_var("CACHE_SWEEP_INTERVAL_MS");
        env::remove_var("CACHE_PARTITIONS");
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        clear_env();

        let config: CacheConfig<u32> = CacheConfig::from_env();
        assert_eq!(config.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.partitions(), default_partitions());
    }

    #[test]
    #[serial]
    fn test_config_from_env_applies_values() {
        env::set_var("CACHE_SWEEP_INTERVAL_MS", "25");
        env::set_var("CACHE_PARTITIONS", "3");

        let config: CacheConfig<u32> = CacheConfig::from_env();
        clear_env();

        assert_eq!(config.sweep_interval(), Duration::from_millis(25));
        assert_eq!(config.partitions(), 3);
    }

    #[test]
    #[serial]
    fn test_config_from_env_unparsable_falls_back() {
        env::set_var("CACHE_SWEEP_INTERVAL_MS", "abc");
        env::set_var("CACHE_PARTITIONS", "abc");

        let config: CacheConfig<u32> = CacheConfig::from_env();
        clear_env();

        assert_eq!(config.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.partitions(), default_partitions());
    }

    #[test]
    #[serial]
    fn test_config_from_env_zero_falls_back() {
        env::set_var("CACHE_SWEEP_INTERVAL_MS", "0");
        env::set_var("CACHE_PARTITIONS", "0");

        let config: CacheConfig<u32> = CacheConfig::from_env();
        clear_env();

        assert_eq!(config.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.partitions(), default_partitions());
    }

    fn on_session_expired(_key: &str, _value: u32) {}

    #[test]
    fn test_expire_callback_records_handler_name() {
        let callback = ExpireCallback::new(on_session_expired);
        assert!(callback.name().ends_with("on_session_expired"));
        assert!(callback.same_handler(&callback.clone()));
        assert!(format!("{:?}", callback).contains("on_session_expired"));

        let other = ExpireCallback::new(on_session_expired);
        assert!(!callback.same_handler(&other));
    }

    #[test]
    fn test_entry_options_last_wins() {
        let now = Instant::now();
        let at = now + Duration::from_secs(100);

        let opts: EntryOptions<u32> = EntryOptions::new()
            .expire_at(at)
            .expire_in(Duration::from_secs(5));
        assert_eq!(opts.deadline(now), Some(now + Duration::from_secs(5)));

        let opts: EntryOptions<u32> = EntryOptions::new()
            .expire_in(Duration::from_secs(5))
            .expire_at(at);
        assert_eq!(opts.deadline(now), Some(at));
    }

    #[test]
    fn test_entry_options_without_expiration() {
        let mut opts: EntryOptions<u32> = EntryOptions::default();
        assert_eq!(opts.deadline(Instant::now()), None);
        assert!(opts.take_callback().is_none());

        let mut opts: EntryOptions<u32> = EntryOptions::new().on_expire(|_, _| {});
        assert!(opts.take_callback().is_some());
        assert!(opts.take_callback().is_none());
    }

    #[test]
    fn test_entry_options_overflowing_ttl() {
        let now = Instant::now();
        let opts: EntryOptions<u32> = EntryOptions::new().expire_in(Duration::MAX);
        let deadline = opts.deadline(now).unwrap();
        assert!(deadline > now + Duration::from_secs(60 * 60 * 24 * 365));
    }
}
