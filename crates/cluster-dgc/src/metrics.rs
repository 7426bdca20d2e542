//! GC metrics and statistics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::events::GarbageCollectorEventListener;
use crate::info::{CollectionKind, GarbageCollectionInfo};

/// Cumulative collector statistics, fed by lifecycle events.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cluster_dgc::GcStatsListener;
///
/// let stats = Arc::new(GcStatsListener::new(8));
/// // collector.add_listener(stats.clone());
/// assert_eq!(stats.snapshot().total_collections, 0);
/// ```
#[derive(Debug)]
pub struct GcStatsListener {
    full_collections: AtomicUsize,
    young_collections: AtomicUsize,
    canceled_collections: AtomicUsize,
    objects_reclaimed: AtomicUsize,
    pause_ns: AtomicU64,
    history: Mutex<VecDeque<GarbageCollectionInfo>>,
    history_len: usize,
}

/// Point-in-time copy of [`GcStatsListener`] counters.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Completed cycles of any kind.
    pub total_collections: usize,
    /// Completed full cycles.
    pub full_collections: usize,
    /// Completed young-generation cycles.
    pub young_collections: usize,
    /// Cycles abandoned without deleting anything.
    pub canceled_collections: usize,
    /// Objects deleted by completed cycles.
    pub objects_reclaimed: usize,
    /// Cumulative pause negotiation time.
    pub total_pause: Duration,
    /// Most recent completed cycles, oldest first.
    pub recent: Vec<GarbageCollectionInfo>,
}

impl GcStatsListener {
    /// Create a listener retaining up to `history_len` completed cycles.
    #[must_use]
    pub fn new(history_len: usize) -> Self {
        Self {
            full_collections: AtomicUsize::new(0),
            young_collections: AtomicUsize::new(0),
            canceled_collections: AtomicUsize::new(0),
            objects_reclaimed: AtomicUsize::new(0),
            pause_ns: AtomicU64::new(0),
            history: Mutex::new(VecDeque::with_capacity(history_len)),
            history_len,
        }
    }

    /// The most recent completed cycle.
    #[must_use]
    pub fn last_gc(&self) -> Option<GarbageCollectionInfo> {
        self.history.lock().back().cloned()
    }

    /// Copy the current counters.
    #[must_use]
    pub fn snapshot(&self) -> GcStats {
        let full = self.full_collections.load(Ordering::Relaxed);
        let young = self.young_collections.load(Ordering::Relaxed);
        GcStats {
            total_collections: full + young,
            full_collections: full,
            young_collections: young,
            canceled_collections: self.canceled_collections.load(Ordering::Relaxed),
            objects_reclaimed: self.objects_reclaimed.load(Ordering::Relaxed),
            total_pause: Duration::from_nanos(self.pause_ns.load(Ordering::Relaxed)),
            recent: self.history.lock().iter().cloned().collect(),
        }
    }
}

impl GarbageCollectorEventListener for GcStatsListener {
    #[allow(clippy::cast_possible_truncation)]
    fn garbage_collector_completed(&self, info: &GarbageCollectionInfo) {
        match info.kind {
            CollectionKind::YoungGen => &self.young_collections,
            CollectionKind::Full | CollectionKind::InlineCleanup => &self.full_collections,
        }
        .fetch_add(1, Ordering::Relaxed);
        self.objects_reclaimed
            .fetch_add(info.actual_garbage_count, Ordering::Relaxed);
        self.pause_ns
            .fetch_add(info.pause_duration.as_nanos() as u64, Ordering::Relaxed);

        if self.history_len == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() == self.history_len {
            history.pop_front();
        }
        history.push_back(info.clone());
    }

    fn garbage_collector_canceled(&self, _info: &GarbageCollectionInfo) {
        self.canceled_collections.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: u64, kind: CollectionKind, garbage: usize) -> GarbageCollectionInfo {
        let mut info = GarbageCollectionInfo::new(id, kind);
        info.actual_garbage_count = garbage;
        info.pause_duration = Duration::from_millis(2);
        info
    }

    #[test]
    fn test_counts_by_kind() {
        let stats = GcStatsListener::new(4);
        stats.garbage_collector_completed(&completed(1, CollectionKind::Full, 10));
        stats.garbage_collector_completed(&completed(2, CollectionKind::YoungGen, 3));
        stats.garbage_collector_canceled(&completed(3, CollectionKind::Full, 0));

        let snap = stats.snapshot();
        assert_eq!(snap.total_collections, 2);
        assert_eq!(snap.full_collections, 1);
        assert_eq!(snap.young_collections, 1);
        assert_eq!(snap.canceled_collections, 1);
        assert_eq!(snap.objects_reclaimed, 13);
        assert_eq!(snap.total_pause, Duration::from_millis(4));
        assert_eq!(stats.last_gc().map(|i| i.cycle_id), Some(2));
    }

    #[test]
    fn test_history_is_bounded() {
        let stats = GcStatsListener::new(2);
        for id in 1..=5 {
            stats.garbage_collector_completed(&completed(id, CollectionKind::Full, 0));
        }
        let ids: Vec<u64> = stats.snapshot().recent.iter().map(|i| i.cycle_id).collect();
        assert_eq!(ids, vec![4, 5]);
    }
}
