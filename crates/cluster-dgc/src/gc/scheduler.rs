//! The dedicated collection thread.
//!
//! Runs full cycles every full interval. When young collection is scheduled,
//! young cycles fill the gaps: each iteration picks whichever deadline comes
//! first, sleeping at least one second before a full cycle.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::config::DgcConfig;
use crate::gc::algorithm::CycleOutcome;
use crate::gc::collector::GarbageCollector;
use crate::info::CollectionKind;

/// Name of the scheduling thread.
pub const THREAD_NAME: &str = "DGC-Thread";

/// Shortest sleep before a full cycle once young cycles are interleaved.
const MIN_FULL_GC_SLEEP: Duration = Duration::from_secs(1);

/// Cycle intervals, fixed at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Period between full cycles.
    pub full_interval: Duration,
    /// Period between young cycles, when they are interleaved.
    pub young_interval: Option<Duration>,
}

impl Schedule {
    /// Derive the schedule from configuration.
    #[must_use]
    pub fn from_config(config: &DgcConfig) -> Self {
        Self {
            full_interval: config.full_gc_interval,
            young_interval: config
                .young_gen_scheduled()
                .then_some(config.young_gc_interval),
        }
    }

    /// Which cycle runs next and how long to sleep before it.
    ///
    /// `last_full` is the start of the previous full cycle.
    #[must_use]
    pub fn next(&self, last_full: Instant, now: Instant) -> (CollectionKind, Duration) {
        let Some(young_interval) = self.young_interval else {
            return (CollectionKind::Full, self.full_interval);
        };
        let next_full = last_full + self.full_interval;
        if next_full <= now + young_interval {
            let wait = next_full.saturating_duration_since(now).max(MIN_FULL_GC_SLEEP);
            (CollectionKind::Full, wait)
        } else {
            (CollectionKind::YoungGen, young_interval)
        }
    }
}

/// Handle to the running scheduling thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct GarbageCollectorThread {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl GarbageCollectorThread {
    /// Spawn the thread. It holds only a weak reference to the collector and
    /// exits once the collector is dropped.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread cannot be spawned.
    pub fn spawn(collector: Weak<GarbageCollector>, schedule: Schedule) -> std::io::Result<Self> {
        let (stop, stop_rx) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || run(&collector, schedule, &stop_rx))?;
        tracing::debug!(?schedule, "collector thread started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit. A cycle in progress runs to
    /// its next stage boundary first.
    pub fn stop(&mut self) {
        let _ = self.stop.try_send(());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("collector thread panicked");
        }
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for GarbageCollectorThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for `duration` unless stopped. Returns `false` when the thread
/// should exit.
fn sleep(stop: &Receiver<()>, duration: Duration) -> bool {
    if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
        return false;
    }
    matches!(stop.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
}

fn run(collector: &Weak<GarbageCollector>, schedule: Schedule, stop: &Receiver<()>) {
    let mut last_full = Instant::now();
    loop {
        let (kind, wait) = schedule.next(last_full, Instant::now());
        if !sleep(stop, wait) {
            break;
        }
        if kind == CollectionKind::Full {
            last_full = Instant::now();
        }
        let Some(collector) = collector.upgrade() else {
            break;
        };
        if !collector.is_started() {
            break;
        }
        let outcome = match kind {
            CollectionKind::YoungGen => collector.gc_young(),
            _ => collector.gc(),
        };
        match outcome {
            Ok(CycleOutcome::Skipped) => {
                tracing::debug!(collection_type = kind.description(), "collector busy, skipped scheduled cycle");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(collection_type = kind.description(), error = %err, "scheduled cycle failed");
            }
        }
    }
    tracing::debug!("collector thread exiting");
}
