//! Recording of references written while a cycle is marking.
//!
//! Outside a cycle the collector holds [`ChangeCollector::Null`] and a
//! reference write costs one read lock. While monitoring, every new target is
//! pushed onto a lock-free queue by the mutator thread and drained into a set
//! by the driver. The old target is ignored: any write observed during the
//! window rescues its target, even one that was already reachable.

use std::sync::Arc;

use crossbeam::queue::SegQueue;
use parking_lot::{Mutex, RwLock};

use crate::object_id::{ObjectId, ObjectIdSet};

/// Records new reference targets while active.
#[derive(Debug, Default)]
pub enum ChangeCollector {
    /// Not monitoring; every notification is dropped.
    #[default]
    Null,
    /// Monitoring a cycle.
    Recording(NewReferenceCollector),
}

impl ChangeCollector {
    /// A reference slot of `subject` changed from `old` to `new`.
    pub fn changed(&self, _subject: ObjectId, _old: Option<ObjectId>, new: Option<ObjectId>) {
        if let (Self::Recording(collector), Some(target)) = (self, new) {
            collector.record(target);
        }
    }

    /// Add every recorded target to `set`.
    pub fn add_new_references_to(&self, set: &mut ObjectIdSet) {
        if let Self::Recording(collector) = self {
            collector.add_new_references_to(set);
        }
    }

    /// Whether this collector records anything.
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        matches!(self, Self::Recording(_))
    }
}

/// Set of targets written since monitoring started.
///
/// Safe for many concurrent writers and one reader.
#[derive(Debug, Default)]
pub struct NewReferenceCollector {
    pending: SegQueue<ObjectId>,
    collected: Mutex<ObjectIdSet>,
}

impl NewReferenceCollector {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, target: ObjectId) {
        self.pending.push(target);
    }

    /// Drain pending writes and add every recorded target to `set`.
    pub fn add_new_references_to(&self, set: &mut ObjectIdSet) {
        let start = std::time::Instant::now();
        let mut collected = self.collected.lock();
        while let Some(target) = self.pending.pop() {
            collected.insert(target);
        }
        set.union_with(&collected);
        tracing::debug!(
            new_references = collected.len(),
            elapsed_us = start.elapsed().as_micros(),
            "add_new_references_to"
        );
    }
}

/// The collector's current [`ChangeCollector`], swapped at monitoring
/// boundaries.
#[derive(Debug, Default)]
pub struct ReferenceMonitor {
    current: RwLock<Arc<ChangeCollector>>,
}

impl ReferenceMonitor {
    /// Create a monitor in the non-recording state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh recorder, discarding anything recorded by an earlier
    /// window.
    pub fn start_monitoring(&self) {
        *self.current.write() = Arc::new(ChangeCollector::Recording(NewReferenceCollector::new()));
    }

    /// Return to the non-recording state.
    pub fn stop_monitoring(&self) {
        *self.current.write() = Arc::new(ChangeCollector::Null);
    }

    /// Whether a monitoring window is open.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.current.read().is_recording()
    }

    /// Forward a reference write to the current collector.
    pub fn changed(&self, subject: ObjectId, old: Option<ObjectId>, new: Option<ObjectId>) {
        self.current.read().changed(subject, old, new);
    }

    /// Add every target recorded in the current window to `set`.
    pub fn add_new_references_to(&self, set: &mut ObjectIdSet) {
        let current = Arc::clone(&*self.current.read());
        current.add_new_references_to(set);
    }
}
