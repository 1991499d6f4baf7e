//! Background Tasks Module
//!
//! Contains the background work that runs for the lifetime of a cache.
//!
//! # Tasks
//! - Sweeper: evicts expired entries from every partition at a fixed interval

mod sweeper;

pub(crate) use sweeper::{spawn_sweeper, Sweeper};
