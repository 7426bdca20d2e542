//! Listener registration, isolation and statistics.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cluster_dgc::{GarbageCollectionInfo, GarbageCollectorEventListener, GcStatsListener};
use common::{harness, insert_leaves, manual_config, oid, young_config};

struct Panicking;

impl GarbageCollectorEventListener for Panicking {
    fn garbage_collector_mark(&self, _info: &GarbageCollectionInfo) {
        panic!("listener bug");
    }

    fn garbage_collector_completed(&self, _info: &GarbageCollectionInfo) {
        panic!("listener bug");
    }
}

#[derive(Default)]
struct Counter {
    completed: AtomicUsize,
}

impl GarbageCollectorEventListener for Counter {
    fn garbage_collector_completed(&self, _info: &GarbageCollectionInfo) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_panicking_listener_does_not_abort_the_cycle() {
    let h = harness(manual_config());
    h.collector.add_listener(Arc::new(Panicking));
    let counter = Arc::new(Counter::default());
    h.collector.add_listener(counter.clone());
    insert_leaves(&h.objects, 1..=3);
    h.objects.add_root(oid(1));

    let outcome = h.collector.gc().unwrap();

    assert!(outcome.is_completed());
    assert_eq!(h.objects.len(), 1);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
    assert!(h.events.names().contains(&"completed"));
}

#[test]
fn test_removed_listener_stops_receiving_events() {
    let h = harness(manual_config());
    let counter = Arc::new(Counter::default());
    let id = h.collector.add_listener(counter.clone());
    insert_leaves(&h.objects, [1]);

    h.collector.gc().unwrap();
    assert!(h.collector.remove_listener(id));
    assert!(!h.collector.remove_listener(id));
    h.collector.gc().unwrap();

    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stats_listener_tracks_cycles() {
    let h = harness(young_config());
    let stats = Arc::new(GcStatsListener::new(8));
    h.collector.add_listener(stats.clone());
    insert_leaves(&h.objects, 1..=4);
    h.objects.add_root(oid(1));
    h.objects.create_object(oid(101), cluster_dgc::ObjectIdSet::new());

    h.collector.gc_young().unwrap();
    h.collector.gc().unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.total_collections, 2);
    assert_eq!(snapshot.young_collections, 1);
    assert_eq!(snapshot.full_collections, 1);
    assert_eq!(snapshot.objects_reclaimed, 4);
    assert_eq!(snapshot.recent.len(), 2);
    assert!(stats.last_gc().unwrap().is_full_gc());
}
