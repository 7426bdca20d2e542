//! Per-cycle descriptors and results.

use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use crate::object_id::ObjectIdSet;

/// Type of collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// Every known object is a candidate.
    #[default]
    Full,
    /// Only recently created objects are candidates.
    YoungGen,
    /// Maintenance pass of the full collector, invisible to external listeners.
    InlineCleanup,
}

impl CollectionKind {
    /// Human-readable name used in logs.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::YoungGen => "YoungGen",
            Self::InlineCleanup => "InlineCleanup",
        }
    }

    /// Whether this kind considers the entire population.
    #[must_use]
    pub const fn is_full(self) -> bool {
        matches!(self, Self::Full | Self::InlineCleanup)
    }

    /// Whether lifecycle events reach registered listeners.
    #[must_use]
    pub const fn publishes_events(self) -> bool {
        !matches!(self, Self::InlineCleanup)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Metadata of one collection cycle.
///
/// Created when the cycle starts, filled in by the driver as each stage
/// completes, and read-only once the cycle has completed or been canceled.
#[derive(Debug, Clone)]
pub struct GarbageCollectionInfo {
    /// Cycle identifier from the sequence source.
    pub cycle_id: u64,
    /// Type of collection.
    pub kind: CollectionKind,
    /// Wall-clock start of the cycle.
    pub start_time: SystemTime,
    /// Live objects reported by the strategy at cycle start.
    pub live_object_count: usize,
    /// Size of the candidate set.
    pub begin_object_count: usize,
    /// Candidates left unreachable by the mark stage.
    pub pre_rescue_count: usize,
    /// Candidates left unreachable after rescue pass 1.
    pub candidate_garbage_count: usize,
    /// Size of the frozen garbage set.
    pub actual_garbage_count: usize,
    /// Size of the rescue set used by pass 1.
    pub rescue1_count: usize,
    /// Size of the rescue set used by pass 2, a superset of pass 1's.
    pub rescue2_count: usize,
    /// `begin_object_count - actual_garbage_count`.
    pub end_object_count: usize,
    /// Duration of the mark stage.
    pub mark_duration: Duration,
    /// Duration of rescue pass 1.
    pub rescue1_duration: Duration,
    /// Time spent negotiating the pause.
    pub pause_duration: Duration,
    /// Duration of rescue pass 2.
    pub mark_complete_duration: Duration,
    /// Duration of the delete stage.
    pub delete_duration: Duration,
    /// Total time from start to completion or cancellation.
    pub elapsed: Duration,
}

impl GarbageCollectionInfo {
    /// A fresh descriptor for a cycle starting now.
    #[must_use]
    pub fn new(cycle_id: u64, kind: CollectionKind) -> Self {
        Self {
            cycle_id,
            kind,
            start_time: SystemTime::now(),
            live_object_count: 0,
            begin_object_count: 0,
            pre_rescue_count: 0,
            candidate_garbage_count: 0,
            actual_garbage_count: 0,
            rescue1_count: 0,
            rescue2_count: 0,
            end_object_count: 0,
            mark_duration: Duration::ZERO,
            rescue1_duration: Duration::ZERO,
            pause_duration: Duration::ZERO,
            mark_complete_duration: Duration::ZERO,
            delete_duration: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether this was a full-population cycle.
    #[must_use]
    pub const fn is_full_gc(&self) -> bool {
        self.kind.is_full()
    }
}

/// Captures stage durations within one cycle.
///
/// # Example
///
/// ```
/// use cluster_dgc::StageTimer;
///
/// let mut timer = StageTimer::new();
/// timer.start();
/// // ... mark stage ...
/// let mark = timer.end();
/// assert!(timer.total() >= mark);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StageTimer {
    cycle_start: Instant,
    current_start: Option<Instant>,
}

impl Default for StageTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTimer {
    /// Create a timer; the cycle clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cycle_start: Instant::now(),
            current_start: None,
        }
    }

    /// Start timing a stage.
    pub fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    /// End the current stage and return its duration.
    pub fn end(&mut self) -> Duration {
        self.current_start
            .take()
            .map_or(Duration::ZERO, |start| start.elapsed())
    }

    /// Time since the timer was created.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.cycle_start.elapsed()
    }
}

/// The outcome of a cycle: its descriptor and the frozen garbage set.
///
/// Handed to the store once applied, and replayed on passive nodes through
/// [`GarbageCollector::delete_garbage`](crate::GarbageCollector::delete_garbage).
#[derive(Debug, Clone)]
pub struct GcResult {
    /// Descriptor of the cycle that produced the garbage set.
    pub info: GarbageCollectionInfo,
    /// Identifiers proven unreachable and un-rescued at both checkpoints.
    pub garbage: ObjectIdSet,
}

impl GcResult {
    /// Bundle a descriptor with its garbage set.
    #[must_use]
    pub const fn new(info: GarbageCollectionInfo, garbage: ObjectIdSet) -> Self {
        Self { info, garbage }
    }

    /// Identifier of the producing cycle.
    #[must_use]
    pub const fn cycle_id(&self) -> u64 {
        self.info.cycle_id
    }
}
