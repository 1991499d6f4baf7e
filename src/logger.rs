//! Logger Module
//!
//! Pluggable logging capability handed to the cache at construction.
//! Every cache instance carries its own logger; there is no global default
//! that one cache could change underneath another.

use std::fmt;

pub use tracing::Level;

// == Logger Trait ==
/// Sink for the messages the cache emits while evicting entries.
///
/// Implementors only need [`Logger::log`]; the level helpers are provided.
/// Each helper takes `fmt::Arguments`, which covers both plain and formatted
/// messages, so there are no separate `&str` variants:
///
/// ```
/// use shard_cache::{Logger, TracingLogger};
///
/// let log = TracingLogger;
/// log.info(format_args!("sweeper started"));
/// log.warn(format_args!("evicted {} entries", 3));
/// ```
pub trait Logger: Send + Sync {
    /// Emits one message at `level`.
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::DEBUG, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::INFO, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::WARN, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::ERROR, args);
    }
}

// == Tracing Logger ==
/// Forwards every message to the `tracing` macros under the `shard_cache` target.
///
/// This is the logger used when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        match level {
            Level::ERROR => tracing::error!(target: "shard_cache", "{}", args),
            Level::WARN => tracing::warn!(target: "shard_cache", "{}", args),
            Level::INFO => tracing::info!(target: "shard_cache", "{}", args),
            Level::DEBUG => tracing::debug!(target: "shard_cache", "{}", args),
            _ => tracing::trace!(target: "shard_cache", "{}", args),
        }
    }
}

// == Noop Logger ==
/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}
