//! Full collection against the in-memory store.

mod common;

use cluster_dgc::{CycleOutcome, GcState, ObjectIdSet, TraversalFilter};
use common::{harness, ids, insert_chain, insert_leaves, manual_config, oid};

#[test]
fn test_reclaims_unreachable_candidates() {
    let h = harness(manual_config());
    insert_chain(&h.objects, 1, 40);
    insert_leaves(&h.objects, 41..=100);
    h.objects.add_root(oid(1));

    let outcome = h.collector.gc().unwrap();

    assert_eq!(outcome.garbage(), Some(&ids(41..=100)));
    let info = outcome.info().unwrap();
    assert_eq!(info.begin_object_count, 100);
    assert_eq!(info.actual_garbage_count, 60);
    assert_eq!(info.end_object_count, 40);
    assert_eq!(h.objects.len(), 40);
    assert_eq!(h.collector.state(), GcState::Idle);
}

#[test]
fn test_unreachable_cycles_are_collected() {
    let h = harness(manual_config());
    h.objects.insert(oid(1), ObjectIdSet::new());
    h.objects.insert(oid(2), ids([3]));
    h.objects.insert(oid(3), ids([2]));
    h.objects.add_root(oid(1));

    let outcome = h.collector.gc().unwrap();
    assert_eq!(outcome.garbage(), Some(&ids([2, 3])));
}

#[test]
fn test_client_references_keep_objects_alive() {
    let h = harness(manual_config());
    insert_chain(&h.objects, 1, 5);
    insert_chain(&h.objects, 50, 52);
    insert_leaves(&h.objects, [60]);
    h.objects.add_root(oid(1));
    h.clients.add_reference(7, oid(50));

    let outcome = h.collector.gc().unwrap();

    assert_eq!(outcome.garbage(), Some(&ids([60])));
    assert!(h.objects.contains(oid(52)));
}

#[test]
fn test_events_follow_stage_order() {
    let h = harness(manual_config());
    insert_leaves(&h.objects, 1..=3);
    h.objects.add_root(oid(1));

    h.collector.gc().unwrap();

    assert_eq!(
        h.events.names(),
        vec![
            "start",
            "mark",
            "mark_results",
            "rescue1_complete",
            "pausing",
            "paused",
            "rescue2_start",
            "mark_complete",
            "cycle_completed",
            "delete",
            "completed",
        ]
    );
    let completed = h.events.last("completed").unwrap();
    assert_eq!(completed.pre_rescue_count, 2);
    assert_eq!(completed.candidate_garbage_count, 2);
    assert_eq!(completed.actual_garbage_count, 2);
    assert!(completed.is_full_gc());
}

#[test]
fn test_nothing_to_collect_skips_pause_and_delete() {
    let h = harness(manual_config());
    insert_chain(&h.objects, 1, 10);
    h.objects.add_root(oid(1));

    let outcome = h.collector.gc().unwrap();

    assert_eq!(outcome.garbage(), Some(&ObjectIdSet::new()));
    assert_eq!(
        h.events.names(),
        vec!["start", "mark", "mark_results", "rescue1_complete", "completed"]
    );
    assert_eq!(h.events.last("completed").unwrap().end_object_count, 10);
    assert!(h.objects.completed_results().is_empty());
    assert_eq!(h.collector.state(), GcState::Idle);
}

#[test]
fn test_store_receives_result() {
    let h = harness(manual_config());
    insert_leaves(&h.objects, 1..=4);
    h.objects.add_root(oid(1));

    let outcome = h.collector.gc().unwrap();
    let CycleOutcome::Completed(result) = outcome else {
        panic!("expected a completed cycle");
    };

    let handed_over = h.objects.completed_results();
    assert_eq!(handed_over.len(), 1);
    assert_eq!(handed_over[0].cycle_id(), result.cycle_id());
    assert_eq!(handed_over[0].garbage, ids(2..=4));
}

#[test]
fn test_cycle_ids_increase() {
    let h = harness(manual_config());
    insert_leaves(&h.objects, [1]);
    h.objects.add_root(oid(1));

    let first = h.collector.gc().unwrap().info().unwrap().cycle_id;
    let second = h.collector.gc().unwrap().info().unwrap().cycle_id;
    assert!(second > first);
}

#[test]
fn test_collect_does_not_touch_lifecycle() {
    let h = harness(manual_config());
    insert_chain(&h.objects, 1, 3);
    insert_leaves(&h.objects, 4..=6);

    let garbage = h
        .collector
        .collect(&TraversalFilter::AcceptAll, &ids([1]), ids(1..=6))
        .unwrap();

    assert_eq!(garbage, ids(4..=6));
    assert_eq!(h.objects.len(), 6);
    assert!(h.events.names().is_empty());
    assert_eq!(h.collector.state(), GcState::Idle);
}

#[test]
fn test_uninitialized_objects_are_not_expanded() {
    let h = harness(manual_config());
    h.objects.insert(oid(1), ids([2]));
    h.objects.create(oid(2));
    h.objects.insert(oid(3), ObjectIdSet::new());
    h.objects.add_root(oid(1));

    let outcome = h.collector.gc().unwrap();

    assert_eq!(outcome.garbage(), Some(&ids([3])));
    assert!(h.objects.contains(oid(2)));
}
