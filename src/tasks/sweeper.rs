//! Expiration Sweeper
//!
//! Background thread that periodically evicts expired entries, independent
//! of read/write traffic.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::store::CacheShared;

/// One-shot "closed" flag the sweeper waits on between ticks.
#[derive(Default)]
struct CloseSignal {
    closed: Mutex<bool>,
    cvar: Condvar,
}

/// Handle to a running sweeper thread.
pub(crate) struct Sweeper {
    handle: JoinHandle<()>,
    signal: Arc<CloseSignal>,
}

impl Sweeper {
    /// Signals the sweeper to exit and waits for it.
    ///
    /// A tick already in progress completes first. When called from the
    /// sweeper thread itself (a callback dropping the cache) the thread is
    /// only signalled, since it cannot join itself.
    pub(crate) fn stop(self) {
        *self.signal.closed.lock() = true;
        self.signal.cvar.notify_all();

        if self.handle.thread().id() == thread::current().id() {
            debug!("Sweeper stop requested from its own thread; not joining");
            return;
        }
        if self.handle.join().is_err() {
            warn!("Sweeper thread panicked before shutdown");
        }
    }
}

/// Spawns a thread that sweeps every partition of `shared` once per `interval`.
///
/// The thread keeps `shared` alive until [`Sweeper::stop`] is called.
pub(crate) fn spawn_sweeper<V>(shared: Arc<CacheShared<V>>, interval: Duration) -> io::Result<Sweeper>
where
    V: Send + Sync + 'static,
{
    let signal = Arc::new(CloseSignal::default());
    let thread_signal = signal.clone();

    let handle = thread::Builder::new()
        .name("shard-cache-sweeper".to_string())
        .spawn(move || run(&shared, &thread_signal, interval))?;

    Ok(Sweeper { handle, signal })
}

fn run<V>(shared: &CacheShared<V>, signal: &CloseSignal, interval: Duration) {
    info!("Starting expiration sweeper with interval of {:?}", interval);

    let mut closed = signal.closed.lock();
    let mut deadline = Instant::now() + interval;
    loop {
        while !*closed {
            if signal.cvar.wait_until(&mut closed, deadline).timed_out() {
                break;
            }
        }
        if *closed {
            break;
        }

        // Release the signal while sweeping so close() never waits on it
        let removed = MutexGuard::unlocked(&mut closed, || shared.check_all());

        if removed > 0 {
            info!("Sweep: removed {} expired entries", removed);
        } else {
            debug!("Sweep: no expired entries found");
        }

        deadline = next_deadline(deadline, interval, Instant::now());
    }

    info!("Expiration sweeper stopped");
}

/// Next tick on the fixed schedule `previous + k * interval`.
///
/// Ticks that a slow sweep ran past are dropped rather than run back to back.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = previous + interval;
    while next <= now {
        next += interval;
    }
    next
}
