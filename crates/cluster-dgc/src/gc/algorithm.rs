//! Mark-and-sweep cycle driver.
//!
//! One cycle runs through these stages, publishing an event at each:
//!
//! 1. start: the caller has already moved the lifecycle to `Running`
//! 2. monitor reference writes
//! 3. mark from the strategy's roots
//! 4. rescue pass 1 with the current rescue set
//! 5. request a pause and wait for the mutation path to acknowledge it
//! 6. rescue pass 2, then freeze the garbage set
//! 7. delete the garbage set
//! 8. return to `Idle`
//!
//! Cancellation is checked at every stage boundary. A canceled or failed
//! cycle returns to `Idle` without deleting anything.

use std::sync::Arc;

use crate::error::{DgcError, StoreError};
use crate::events::EventPublisher;
use crate::gc::filter::TraversalFilter;
use crate::gc::hook::{GcContext, GcHook};
use crate::gc::lifecycle::LifecycleState;
use crate::info::{GarbageCollectionInfo, GcResult, StageTimer};
use crate::object_id::{ObjectId, ObjectIdSet};
use crate::tracing::trace_gc_cycle;

/// How a collection request ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// No cycle ran: the collector was busy, disabled or stopped.
    Skipped,
    /// The cycle was abandoned at a stage boundary. Nothing was deleted.
    Canceled(GarbageCollectionInfo),
    /// The cycle deleted its garbage set, possibly empty.
    Completed(GcResult),
}

impl CycleOutcome {
    /// Whether a cycle ran to completion.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Whether the cycle was canceled.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }

    /// Descriptor of the cycle, if one ran.
    #[must_use]
    pub const fn info(&self) -> Option<&GarbageCollectionInfo> {
        match self {
            Self::Skipped => None,
            Self::Canceled(info) => Some(info),
            Self::Completed(result) => Some(&result.info),
        }
    }

    /// The deleted garbage set of a completed cycle.
    #[must_use]
    pub const fn garbage(&self) -> Option<&ObjectIdSet> {
        match self {
            Self::Completed(result) => Some(&result.garbage),
            _ => None,
        }
    }
}

/// Compute `candidates - closure(roots)`.
///
/// Traversal expands each root, then every reference accepted by `filter`
/// that is still among the remaining candidates. It stops early once no
/// candidate remains. Objects `expand` reports as unavailable are kept
/// reachable but not expanded.
///
/// # Errors
///
/// Propagates the first error returned by `expand`.
pub fn collect<E>(
    filter: &TraversalFilter,
    roots: &ObjectIdSet,
    mut candidates: ObjectIdSet,
    mut expand: E,
) -> Result<ObjectIdSet, StoreError>
where
    E: FnMut(ObjectId) -> Result<Option<ObjectIdSet>, StoreError>,
{
    let mut expanded = ObjectIdSet::new();
    let mut pending: Vec<ObjectId> = roots.iter().collect();
    while let Some(id) = pending.pop() {
        if candidates.is_empty() {
            break;
        }
        if !expanded.insert(id) {
            continue;
        }
        candidates.remove(id);
        let Some(references) = expand(id)? else {
            continue;
        };
        pending.extend(
            references
                .iter()
                .filter(|&target| filter.should_visit(target) && candidates.contains(target)),
        );
    }
    Ok(candidates)
}

/// Apply a frozen garbage set. The lifecycle must already be `Deleting`.
///
/// Deletes from the store, drops the identifiers from young-generation
/// bookkeeping, returns the lifecycle to `Idle` and then hands the result to
/// the store. The lifecycle is back to `Idle` before the store is notified so
/// lookups waiting on the collector are released.
///
/// # Errors
///
/// Returns the store's error if deletion fails. The lifecycle is still
/// returned to `Idle`.
pub fn apply_garbage(
    ctx: &GcContext<'_>,
    lifecycle: &LifecycleState,
    result: &GcResult,
) -> Result<(), StoreError> {
    if let Err(err) = ctx.store.delete(&result.garbage) {
        lifecycle.complete();
        return Err(err);
    }
    ctx.tracker.remove_garbage(&result.garbage);
    lifecycle.complete();
    ctx.store.notify_gc_complete(result);
    Ok(())
}

enum Marked {
    Garbage(ObjectIdSet),
    NothingToCollect,
    Canceled(&'static str),
}

/// Keeps reference writes recorded while alive.
struct MonitoringWindow<'a> {
    ctx: GcContext<'a>,
    young_gen: bool,
}

impl<'a> MonitoringWindow<'a> {
    fn open(hook: &GcHook<'a>) -> Self {
        let ctx = *hook.context();
        let young_gen = !hook.kind().is_full();
        ctx.monitor.start_monitoring();
        if young_gen {
            ctx.tracker.start_monitoring_changes();
        }
        Self { ctx, young_gen }
    }
}

impl Drop for MonitoringWindow<'_> {
    fn drop(&mut self) {
        self.ctx.monitor.stop_monitoring();
        if self.young_gen {
            self.ctx.tracker.stop_monitoring_changes();
        }
    }
}

/// Drives a single collection cycle.
pub struct MarkAndSweep<'a> {
    hook: GcHook<'a>,
    lifecycle: &'a LifecycleState,
    publisher: &'a EventPublisher,
    timer: StageTimer,
}

impl std::fmt::Debug for MarkAndSweep<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkAndSweep")
            .field("kind", &self.hook.kind())
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl<'a> MarkAndSweep<'a> {
    /// Create a driver for one cycle.
    #[must_use]
    pub fn new(
        hook: GcHook<'a>,
        lifecycle: &'a LifecycleState,
        publisher: &'a EventPublisher,
    ) -> Self {
        Self {
            hook,
            lifecycle,
            publisher,
            timer: StageTimer::new(),
        }
    }

    /// Run the cycle. The lifecycle must already be `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store fails at any stage. The cycle
    /// is then reported as canceled and nothing is deleted.
    pub fn run(mut self, cycle_id: u64) -> Result<CycleOutcome, DgcError> {
        let _span = trace_gc_cycle(self.hook.kind(), cycle_id);
        self.timer = StageTimer::new();
        let mut info = self.hook.new_info(cycle_id);
        if !self.hook.kind().publishes_events() {
            tracing::debug!(gc_id = cycle_id, "inline cleanup start");
        }
        self.publish(&info, EventPublisher::fire_start);

        let marked = {
            let _window = MonitoringWindow::open(&self.hook);
            self.mark_and_rescue(&mut info)
        };

        match marked {
            Err(err) => {
                tracing::error!(gc_id = cycle_id, error = %err, "store fault during collection");
                self.cancel(&mut info);
                Err(err.into())
            }
            Ok(Marked::Canceled(stage)) => {
                tracing::info!(gc_id = cycle_id, stage, "cancel requested");
                Ok(CycleOutcome::Canceled(self.cancel(&mut info)))
            }
            Ok(Marked::NothingToCollect) => {
                info.actual_garbage_count = 0;
                info.end_object_count = info.begin_object_count;
                self.lifecycle.complete();
                info.elapsed = self.timer.total();
                self.publish(&info, EventPublisher::fire_completed);
                Ok(CycleOutcome::Completed(GcResult::new(info, ObjectIdSet::new())))
            }
            Ok(Marked::Garbage(garbage)) => self.delete(info, garbage),
        }
    }

    fn mark_and_rescue(&mut self, info: &mut GarbageCollectionInfo) -> Result<Marked, StoreError> {
        let candidates = Arc::new(self.hook.candidates()?);
        info.begin_object_count = candidates.len();
        let filter = self.hook.filter(&candidates);
        if self.lifecycle.is_cancel_requested() {
            return Ok(Marked::Canceled("start"));
        }

        // Mark
        self.publish(info, EventPublisher::fire_mark);
        self.timer.start();
        let roots = self.hook.roots(&candidates)?;
        let garbage = self.collect(&filter, &roots, candidates.as_ref().clone())?;
        info.mark_duration = self.timer.end();
        info.pre_rescue_count = garbage.len();
        self.publish(info, EventPublisher::fire_mark_results);
        if self.lifecycle.is_cancel_requested() {
            return Ok(Marked::Canceled("mark"));
        }

        // Rescue 1
        self.timer.start();
        let rescue1 = self.hook.rescue_ids();
        info.rescue1_count = rescue1.len();
        let garbage = self.rescue(&filter, &rescue1, &candidates, garbage)?;
        info.rescue1_duration = self.timer.end();
        info.candidate_garbage_count = garbage.len();
        self.publish(info, EventPublisher::fire_rescue1_complete);
        if self.lifecycle.is_cancel_requested() {
            return Ok(Marked::Canceled("rescue 1"));
        }
        if garbage.is_empty() {
            return Ok(Marked::NothingToCollect);
        }

        // Pause
        self.publish(info, EventPublisher::fire_pausing);
        self.timer.start();
        self.lifecycle.request_pause();
        self.hook.context().store.wait_until_ready_to_gc(self.lifecycle)?;
        if !self.lifecycle.wait_until_paused() {
            return Ok(Marked::Canceled("pause"));
        }
        info.pause_duration = self.timer.end();
        self.publish(info, EventPublisher::fire_paused);

        // Rescue 2
        self.publish(info, EventPublisher::fire_rescue2_start);
        self.timer.start();
        let rescue2 = self.hook.rescue_ids_since(&rescue1);
        info.rescue2_count = rescue2.len();
        let garbage = self.rescue(&filter, &rescue2, &candidates, garbage)?;
        info.mark_complete_duration = self.timer.end();
        info.actual_garbage_count = garbage.len();
        info.end_object_count = info.begin_object_count.saturating_sub(garbage.len());
        self.publish(info, EventPublisher::fire_mark_complete);
        if self.lifecycle.is_cancel_requested() {
            return Ok(Marked::Canceled("rescue 2"));
        }
        Ok(Marked::Garbage(garbage))
    }

    fn delete(
        self,
        mut info: GarbageCollectionInfo,
        garbage: ObjectIdSet,
    ) -> Result<CycleOutcome, DgcError> {
        self.publish(&info, EventPublisher::fire_cycle_completed);
        if !self.lifecycle.request_delete_start() {
            tracing::warn!(
                gc_id = info.cycle_id,
                state = %self.lifecycle.state(),
                "could not enter the delete state"
            );
            return Ok(CycleOutcome::Canceled(self.cancel(&mut info)));
        }
        self.publish(&info, EventPublisher::fire_delete);

        let mut timer = self.timer;
        timer.start();
        let mut result = GcResult::new(info, garbage);
        if let Err(err) = apply_garbage(self.hook.context(), self.lifecycle, &result) {
            tracing::error!(gc_id = result.cycle_id(), error = %err, "failed to delete garbage");
            result.info.elapsed = timer.total();
            self.publish(&result.info, EventPublisher::fire_canceled);
            return Err(err.into());
        }
        result.info.delete_duration = timer.end();
        result.info.elapsed = timer.total();
        self.publish(&result.info, EventPublisher::fire_completed);
        if !self.hook.kind().publishes_events() {
            tracing::debug!(
                gc_id = result.cycle_id(),
                garbage = result.garbage.len(),
                "inline cleanup complete"
            );
        }
        Ok(CycleOutcome::Completed(result))
    }

    fn cancel(&self, info: &mut GarbageCollectionInfo) -> GarbageCollectionInfo {
        self.lifecycle.complete();
        info.elapsed = self.timer.total();
        self.publish(info, EventPublisher::fire_canceled);
        info.clone()
    }

    fn collect(
        &self,
        filter: &TraversalFilter,
        roots: &ObjectIdSet,
        candidates: ObjectIdSet,
    ) -> Result<ObjectIdSet, StoreError> {
        collect(filter, roots, candidates, |id| self.hook.references_of(id))
    }

    /// Traverse from rescued objects that are still garbage, or that were
    /// never candidates and so were not expanded during the mark.
    fn rescue(
        &self,
        filter: &TraversalFilter,
        rescue: &ObjectIdSet,
        candidates: &ObjectIdSet,
        garbage: ObjectIdSet,
    ) -> Result<ObjectIdSet, StoreError> {
        let mut roots = rescue.clone();
        roots.retain(|id| garbage.contains(id) || !candidates.contains(id));
        if roots.is_empty() {
            return Ok(garbage);
        }
        self.collect(filter, &roots, garbage)
    }

    fn publish(&self, info: &GarbageCollectionInfo, fire: fn(&EventPublisher, &GarbageCollectionInfo)) {
        if self.hook.kind().publishes_events() {
            fire(self.publisher, info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn set(ids: impl IntoIterator<Item = u64>) -> ObjectIdSet {
        ids.into_iter().collect()
    }

    /// Chain 1 -> 2 -> ... -> n.
    fn chain(n: u64) -> HashMap<ObjectId, ObjectIdSet> {
        (1..n)
            .map(|i| (ObjectId::new(i), set([i + 1])))
            .collect()
    }

    fn expand_from(
        graph: &HashMap<ObjectId, ObjectIdSet>,
    ) -> impl Fn(ObjectId) -> Result<Option<ObjectIdSet>, StoreError> + '_ {
        |id| Ok(Some(graph.get(&id).cloned().unwrap_or_default()))
    }

    #[test]
    fn test_collect_returns_unreachable_candidates() {
        let mut graph = chain(40);
        graph.insert(ObjectId::new(60), set([61]));
        let garbage = collect(
            &TraversalFilter::AcceptAll,
            &set([1]),
            set(1..=100),
            expand_from(&graph),
        )
        .unwrap();
        assert_eq!(garbage, set(41..=100));
    }

    #[test]
    fn test_collect_respects_filter() {
        let graph = chain(10);
        let within = TraversalFilter::within(Arc::new(set(1..=3)));
        let garbage = collect(&within, &set([1]), set(1..=10), expand_from(&graph)).unwrap();
        assert_eq!(garbage, set(4..=10));
    }

    #[test]
    fn test_collect_skips_unavailable_objects() {
        let graph = chain(5);
        let garbage = collect(&TraversalFilter::AcceptAll, &set([1]), set(1..=5), |id| {
            if id == ObjectId::new(2) {
                Ok(None)
            } else {
                expand_from(&graph)(id)
            }
        })
        .unwrap();
        assert_eq!(garbage, set(3..=5));
    }

    #[test]
    fn test_collect_propagates_store_errors() {
        let result = collect(&TraversalFilter::AcceptAll, &set([1]), set(1..=2), |_| {
            Err(StoreError::Unavailable("offline".into()))
        });
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_collect_handles_cycles() {
        let mut graph = chain(3);
        graph.insert(ObjectId::new(3), set([1]));
        let garbage = collect(&TraversalFilter::AcceptAll, &set([2]), set(1..=4), expand_from(&graph)).unwrap();
        assert_eq!(garbage, set([4]));
    }
}
