//! Collector lifecycle state machine.
//!
//! A single mutex-guarded state value with a condition variable. Guarded
//! transitions either succeed atomically or return `false`; only the `wait_*`
//! operations block, waking every poll interval to log progress.
//!
//! | Transition | From | To |
//! |---|---|---|
//! | `request_gc_start` | Idle (collector started) | Running |
//! | `request_disable` | Idle | Disabled |
//! | `enable` | Disabled | Idle |
//! | `request_pause` | Running | Pausing |
//! | `notify_ready_to_gc` | Pausing | Paused |
//! | `request_delete_start` | Paused or Idle | Deleting |
//! | `wait_to_start_inline` | Idle only | Deleting |
//! | `complete` | any | Idle |

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::store::PauseHandle;

/// Lifecycle state of the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GcState {
    /// No cycle in progress.
    #[default]
    Idle,
    /// A cycle is marking.
    Running,
    /// A pause was requested from the mutation path.
    Pausing,
    /// The mutation path acknowledged the pause.
    Paused,
    /// A garbage set is being deleted.
    Deleting,
    /// Collection is disabled until re-enabled.
    Disabled,
}

impl GcState {
    /// Name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "GC_SLEEP",
            Self::Running => "GC_RUNNING",
            Self::Pausing => "GC_PAUSING",
            Self::Paused => "GC_PAUSED",
            Self::Deleting => "GC_DELETE",
            Self::Disabled => "GC_DISABLED",
        }
    }
}

impl fmt::Display for GcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: GcState,
    started: bool,
    cancel_requested: bool,
}

/// The collector's lifecycle state, shared by the driver and foreground
/// threads.
#[derive(Debug)]
pub struct LifecycleState {
    inner: Mutex<Inner>,
    changed: Condvar,
    poll_interval: Duration,
}

impl LifecycleState {
    /// Create an idle, not yet started lifecycle. Blocking waits wake every
    /// `poll_interval` to log progress.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
            poll_interval,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GcState {
        self.inner.lock().state
    }

    /// Mark the collector started or stopped. Cycles only start while
    /// started. Stopping also requests cancellation of a running cycle.
    pub fn set_started(&self, started: bool) {
        let mut inner = self.inner.lock();
        inner.started = started;
        inner.cancel_requested = !started;
        drop(inner);
        self.changed.notify_all();
    }

    /// Whether the collector is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    /// Idle -> Running, if the collector is started.
    pub fn request_gc_start(&self) -> bool {
        let mut inner = self.inner.lock();
        Self::try_start(&mut inner)
    }

    fn try_start(inner: &mut Inner) -> bool {
        if inner.started && inner.state == GcState::Idle {
            inner.state = GcState::Running;
            inner.cancel_requested = false;
            return true;
        }
        false
    }

    /// Block until a cycle can start, then Idle -> Running.
    ///
    /// Returns `false` without blocking further once the collector is
    /// stopped.
    pub fn wait_to_start(&self) -> bool {
        self.wait_until("start", |inner| {
            if Self::try_start(inner) {
                Some(true)
            } else if inner.started {
                None
            } else {
                Some(false)
            }
        })
    }

    /// Idle -> Disabled. Denied while a cycle runs or when already disabled.
    pub fn request_disable(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == GcState::Idle {
            inner.state = GcState::Disabled;
            return true;
        }
        false
    }

    /// Block until the running cycle finishes, then Idle -> Disabled.
    ///
    /// Returns `false` immediately if already disabled.
    pub fn wait_to_disable(&self) -> bool {
        self.wait_until("disable", |inner| match inner.state {
            GcState::Idle => {
                inner.state = GcState::Disabled;
                Some(true)
            }
            GcState::Disabled => Some(false),
            _ => None,
        })
    }

    /// Disabled -> Idle.
    pub fn enable(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != GcState::Disabled {
            tracing::warn!(state = %inner.state, "GC is already enabled");
            return false;
        }
        inner.state = GcState::Idle;
        drop(inner);
        self.changed.notify_all();
        true
    }

    /// Running -> Pausing. The mutation path consumes this as a request to
    /// quiesce writes.
    pub fn request_pause(&self) {
        let mut inner = self.inner.lock();
        if inner.state != GcState::Running {
            tracing::debug!(state = %inner.state, "pause requested outside of a running cycle");
        }
        inner.state = GcState::Pausing;
    }

    /// Pausing -> Paused.
    pub fn notify_ready_to_gc(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != GcState::Pausing {
            return false;
        }
        inner.state = GcState::Paused;
        drop(inner);
        self.changed.notify_all();
        true
    }

    /// Block until the pause is acknowledged.
    ///
    /// Returns `false` if cancellation is requested first, or if the state
    /// leaves `Pausing` without reaching `Paused`.
    pub fn wait_until_paused(&self) -> bool {
        self.wait_until("pause acknowledgement", |inner| match inner.state {
            GcState::Paused => Some(true),
            _ if inner.cancel_requested => Some(false),
            GcState::Pausing => None,
            _ => Some(false),
        })
    }

    /// Paused -> Deleting on the active path, or Idle -> Deleting when
    /// replaying a computed result.
    pub fn request_delete_start(&self) -> bool {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, GcState::Idle | GcState::Paused) {
            return false;
        }
        inner.state = GcState::Deleting;
        drop(inner);
        self.changed.notify_all();
        true
    }

    /// Block until idle, then Idle -> Deleting. Never enters from `Paused`.
    ///
    /// Waits for as long as the collector stays disabled.
    pub fn wait_to_start_inline(&self) {
        self.wait_until("inline delete", |inner| {
            (inner.state == GcState::Idle).then(|| inner.state = GcState::Deleting)
        });
    }

    /// Block while mutators are held paused. Returns once the cycle moves on
    /// to deleting or back to idle.
    pub fn wait_until_resumed(&self) {
        self.wait_until("resume", |inner| (inner.state != GcState::Paused).then_some(()));
    }

    /// Any -> Idle, waking every blocked waiter.
    pub fn complete(&self) {
        self.inner.lock().state = GcState::Idle;
        self.changed.notify_all();
    }

    /// Ask the running cycle to stop at its next stage boundary.
    pub fn request_cancel(&self) {
        self.inner.lock().cancel_requested = true;
        self.changed.notify_all();
    }

    /// Whether cancellation was requested since the cycle started.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.lock().cancel_requested
    }

    /// Whether a pause is requested or acknowledged.
    #[must_use]
    pub fn is_pausing_or_paused(&self) -> bool {
        matches!(self.state(), GcState::Pausing | GcState::Paused)
    }

    /// Whether the pause is acknowledged.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == GcState::Paused
    }

    /// Whether collection is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.state() == GcState::Disabled
    }

    fn wait_until<R>(&self, waiting_for: &'static str, mut ready: impl FnMut(&mut Inner) -> Option<R>) -> R {
        let start = Instant::now();
        let mut inner = self.inner.lock();
        loop {
            if let Some(result) = ready(&mut inner) {
                return result;
            }
            if self
                .changed
                .wait_for(&mut inner, self.poll_interval)
                .timed_out()
            {
                tracing::warn!(
                    waiting_for,
                    state = %inner.state,
                    waited_ms = start.elapsed().as_millis(),
                    "still waiting on GC state"
                );
            }
        }
    }
}

impl PauseHandle for LifecycleState {
    fn is_pausing(&self) -> bool {
        self.state() == GcState::Pausing
    }

    fn notify_ready_to_gc(&self) {
        Self::notify_ready_to_gc(self);
    }
}
