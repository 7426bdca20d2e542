//! Lifecycle event fan-out.
//!
//! The cycle driver fires one listener method per stage. Listeners are kept
//! in a copy-on-write registry: registration swaps in a new list, while a
//! publish clones the current `Arc` and iterates without holding the lock.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::info::GarbageCollectionInfo;

/// Receives collection lifecycle events.
///
/// Every method defaults to a no-op. Delivery is at-least-once and listeners
/// must not panic; a panicking listener is logged and skipped.
#[allow(unused_variables)]
pub trait GarbageCollectorEventListener: Send + Sync {
    /// A cycle acquired the running state.
    fn garbage_collector_start(&self, info: &GarbageCollectionInfo) {}
    /// The mark stage is starting.
    fn garbage_collector_mark(&self, info: &GarbageCollectionInfo) {}
    /// The mark stage finished.
    fn garbage_collector_mark_results(&self, info: &GarbageCollectionInfo) {}
    /// Rescue pass 1 finished.
    fn garbage_collector_rescue1_complete(&self, info: &GarbageCollectionInfo) {}
    /// A pause was requested from the mutation path.
    fn garbage_collector_pausing(&self, info: &GarbageCollectionInfo) {}
    /// The mutation path acknowledged the pause.
    fn garbage_collector_paused(&self, info: &GarbageCollectionInfo) {}
    /// Rescue pass 2 is starting.
    fn garbage_collector_rescue2_start(&self, info: &GarbageCollectionInfo) {}
    /// Marking is complete and the garbage set is frozen.
    fn garbage_collector_mark_complete(&self, info: &GarbageCollectionInfo) {}
    /// The garbage set was handed off with final counts.
    fn garbage_collector_cycle_completed(&self, info: &GarbageCollectionInfo) {}
    /// Deletion of the garbage set is starting.
    fn garbage_collector_delete(&self, info: &GarbageCollectionInfo) {}
    /// The cycle returned to idle after deleting its garbage.
    fn garbage_collector_completed(&self, info: &GarbageCollectionInfo) {}
    /// The cycle was abandoned without deleting anything.
    fn garbage_collector_canceled(&self, info: &GarbageCollectionInfo) {}
}

/// Handle returned by [`EventPublisher::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registry = Arc<Vec<(ListenerId, Arc<dyn GarbageCollectorEventListener>)>>;

/// Multicast dispatcher for [`GarbageCollectorEventListener`]s.
pub struct EventPublisher {
    listeners: RwLock<Registry>,
    next_id: AtomicU64,
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventPublisher {
    /// Create a publisher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn GarbageCollectorEventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.listeners.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push((id, listener));
        *guard = Arc::new(next);
        id
    }

    /// Deregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next: Vec<_> = guard
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *guard = Arc::new(next);
        true
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fire<F>(&self, event: &'static str, info: &GarbageCollectionInfo, f: F)
    where
        F: Fn(&dyn GarbageCollectorEventListener, &GarbageCollectionInfo),
    {
        let snapshot: Registry = self.listeners.read().clone();
        for (id, listener) in snapshot.iter() {
            let delivered = catch_unwind(AssertUnwindSafe(|| f(listener.as_ref(), info)));
            if delivered.is_err() {
                tracing::warn!(
                    listener = id.0,
                    event,
                    gc_id = info.cycle_id,
                    "listener panicked, continuing with remaining listeners"
                );
            }
        }
    }

    /// Fire `garbage_collector_start`.
    pub fn fire_start(&self, info: &GarbageCollectionInfo) {
        self.fire("start", info, |l, i| l.garbage_collector_start(i));
    }

    /// Fire `garbage_collector_mark`.
    pub fn fire_mark(&self, info: &GarbageCollectionInfo) {
        self.fire("mark", info, |l, i| l.garbage_collector_mark(i));
    }

    /// Fire `garbage_collector_mark_results`.
    pub fn fire_mark_results(&self, info: &GarbageCollectionInfo) {
        self.fire("mark_results", info, |l, i| l.garbage_collector_mark_results(i));
    }

    /// Fire `garbage_collector_rescue1_complete`.
    pub fn fire_rescue1_complete(&self, info: &GarbageCollectionInfo) {
        self.fire("rescue1_complete", info, |l, i| {
            l.garbage_collector_rescue1_complete(i);
        });
    }

    /// Fire `garbage_collector_pausing`.
    pub fn fire_pausing(&self, info: &GarbageCollectionInfo) {
        self.fire("pausing", info, |l, i| l.garbage_collector_pausing(i));
    }

    /// Fire `garbage_collector_paused`.
    pub fn fire_paused(&self, info: &GarbageCollectionInfo) {
        self.fire("paused", info, |l, i| l.garbage_collector_paused(i));
    }

    /// Fire `garbage_collector_rescue2_start`.
    pub fn fire_rescue2_start(&self, info: &GarbageCollectionInfo) {
        self.fire("rescue2_start", info, |l, i| l.garbage_collector_rescue2_start(i));
    }

    /// Fire `garbage_collector_mark_complete`.
    pub fn fire_mark_complete(&self, info: &GarbageCollectionInfo) {
        self.fire("mark_complete", info, |l, i| l.garbage_collector_mark_complete(i));
    }

    /// Fire `garbage_collector_cycle_completed`.
    pub fn fire_cycle_completed(&self, info: &GarbageCollectionInfo) {
        self.fire("cycle_completed", info, |l, i| {
            l.garbage_collector_cycle_completed(i);
        });
    }

    /// Fire `garbage_collector_delete`.
    pub fn fire_delete(&self, info: &GarbageCollectionInfo) {
        self.fire("delete", info, |l, i| l.garbage_collector_delete(i));
    }

    /// Fire `garbage_collector_completed`.
    pub fn fire_completed(&self, info: &GarbageCollectionInfo) {
        self.fire("completed", info, |l, i| l.garbage_collector_completed(i));
    }

    /// Fire `garbage_collector_canceled`.
    pub fn fire_canceled(&self, info: &GarbageCollectionInfo) {
        self.fire("canceled", info, |l, i| l.garbage_collector_canceled(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::CollectionKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl GarbageCollectorEventListener for Recorder {
        fn garbage_collector_start(&self, _info: &GarbageCollectionInfo) {
            self.events.lock().push("start");
        }

        fn garbage_collector_completed(&self, _info: &GarbageCollectionInfo) {
            self.events.lock().push("completed");
        }
    }

    struct Panicker;

    impl GarbageCollectorEventListener for Panicker {
        fn garbage_collector_start(&self, _info: &GarbageCollectionInfo) {
            panic!("listener failure");
        }
    }

    #[test]
    fn test_listener_panic_is_isolated() {
        let publisher = EventPublisher::new();
        let recorder = Arc::new(Recorder::default());
        publisher.add_listener(Arc::new(Panicker));
        publisher.add_listener(recorder.clone());

        let info = GarbageCollectionInfo::new(1, CollectionKind::Full);
        publisher.fire_start(&info);
        publisher.fire_completed(&info);

        assert_eq!(*recorder.events.lock(), vec!["start", "completed"]);
    }

    #[test]
    fn test_remove_listener() {
        let publisher = EventPublisher::new();
        let recorder = Arc::new(Recorder::default());
        let id = publisher.add_listener(recorder.clone());
        assert_eq!(publisher.len(), 1);

        assert!(publisher.remove_listener(id));
        assert!(!publisher.remove_listener(id));
        assert!(publisher.is_empty());

        publisher.fire_start(&GarbageCollectionInfo::new(2, CollectionKind::Full));
        assert!(recorder.events.lock().is_empty());
    }
}
