//! The collector facade.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DgcConfig;
use crate::error::{DgcError, StoreError};
use crate::events::{EventPublisher, GarbageCollectorEventListener, ListenerId};
use crate::gc::algorithm::{self, apply_garbage, CycleOutcome, MarkAndSweep};
use crate::gc::change::ReferenceMonitor;
use crate::gc::filter::TraversalFilter;
use crate::gc::hook::{GcContext, GcHook};
use crate::gc::lifecycle::{GcState, LifecycleState};
use crate::gc::scheduler::{GarbageCollectorThread, Schedule};
use crate::gc::throttle::RequestThrottler;
use crate::gc::young::YoungGenTracker;
use crate::info::{CollectionKind, GarbageCollectionInfo, GcResult, StageTimer};
use crate::object_id::{ObjectId, ObjectIdSet};
use crate::store::{
    ClientStateManager, CycleIdSource, EvictedObject, MutationListener, ObjectStore,
};
use crate::tracing::GcLogger;

/// Distributed mark-and-sweep garbage collector.
///
/// Owns the lifecycle state, the reference-change monitor, the
/// young-generation tracker and the listener registry, and drives cycles
/// against the shared [`ObjectStore`].
///
/// The collector must be registered as the store's [`MutationListener`] so
/// reference writes made during a cycle rescue their targets.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cluster_dgc::{
///     DgcConfig, GarbageCollector, InMemoryClientState, InMemoryObjectStore, ObjectId,
///     ObjectIdSet, Sequence,
/// };
///
/// let store = Arc::new(InMemoryObjectStore::new());
/// store.insert(ObjectId::new(1), ObjectIdSet::new());
/// store.insert(ObjectId::new(2), ObjectIdSet::new());
/// store.add_root(ObjectId::new(1));
///
/// let config = DgcConfig { full_gc_enabled: false, ..Default::default() };
/// let collector = Arc::new(
///     GarbageCollector::new(
///         config,
///         store.clone(),
///         Arc::new(InMemoryClientState::new()),
///         Arc::new(Sequence::default()),
///     )
///     .unwrap(),
/// );
/// store.set_listener(&collector);
/// collector.start().unwrap();
///
/// let outcome = collector.gc().unwrap();
/// assert_eq!(outcome.garbage().map(|g| g.len()), Some(1));
/// assert!(!store.contains(ObjectId::new(2)));
/// ```
pub struct GarbageCollector {
    config: DgcConfig,
    store: Arc<dyn ObjectStore>,
    client_state: Arc<dyn ClientStateManager>,
    cycle_ids: Arc<dyn CycleIdSource>,
    lifecycle: LifecycleState,
    monitor: ReferenceMonitor,
    young_gen: YoungGenTracker,
    throttler: RequestThrottler,
    publisher: EventPublisher,
    scheduler: Mutex<Option<GarbageCollectorThread>>,
}

impl GarbageCollector {
    /// Create a stopped collector. A [`GcLogger`] is registered as the first
    /// listener.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Config`] if `config` does not validate.
    pub fn new(
        config: DgcConfig,
        store: Arc<dyn ObjectStore>,
        client_state: Arc<dyn ClientStateManager>,
        cycle_ids: Arc<dyn CycleIdSource>,
    ) -> Result<Self, DgcError> {
        config.validate()?;
        let young_gen = if config.young_gc_enabled {
            YoungGenTracker::enabled()
        } else {
            YoungGenTracker::Disabled
        };
        let publisher = EventPublisher::new();
        publisher.add_listener(Arc::new(GcLogger::new(config.verbose)));
        Ok(Self {
            lifecycle: LifecycleState::new(config.wait_poll_interval),
            monitor: ReferenceMonitor::new(),
            throttler: RequestThrottler::new(&config),
            young_gen,
            publisher,
            scheduler: Mutex::new(None),
            config,
            store,
            client_state,
            cycle_ids,
        })
    }

    /// The configuration this collector was built with.
    #[must_use]
    pub const fn config(&self) -> &DgcConfig {
        &self.config
    }

    /// Young-generation bookkeeping.
    #[must_use]
    pub const fn young_gen(&self) -> &YoungGenTracker {
        &self.young_gen
    }

    fn context(&self) -> GcContext<'_> {
        GcContext {
            store: self.store.as_ref(),
            client_state: self.client_state.as_ref(),
            monitor: &self.monitor,
            tracker: &self.young_gen,
            throttler: &self.throttler,
        }
    }

    // ========================================================================
    // Service lifecycle
    // ========================================================================

    /// Allow cycles to start and, when full collection is enabled, spawn
    /// the scheduling thread.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::SchedulerSpawn`] if the thread cannot be spawned.
    /// The collector stays started and can still be driven manually.
    pub fn start(self: &Arc<Self>) -> Result<(), DgcError> {
        self.lifecycle.set_started(true);
        if !self.config.full_gc_enabled {
            return Ok(());
        }
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_none() {
            let thread = GarbageCollectorThread::spawn(
                Arc::downgrade(self),
                Schedule::from_config(&self.config),
            )
            .map_err(DgcError::SchedulerSpawn)?;
            *scheduler = Some(thread);
        }
        Ok(())
    }

    /// Stop starting cycles, cancel the running one at its next stage
    /// boundary and join the scheduling thread.
    pub fn stop(&self) {
        self.lifecycle.set_started(false);
        let thread = self.scheduler.lock().take();
        if let Some(mut thread) = thread {
            thread.stop();
        }
    }

    /// Whether [`start`](Self::start) was called without a later
    /// [`stop`](Self::stop).
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    // ========================================================================
    // Collection entry points
    // ========================================================================

    /// Run a full cycle if the collector is idle.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store fails during the cycle.
    pub fn gc(&self) -> Result<CycleOutcome, DgcError> {
        self.try_run(GcHook::full(self.context()))
    }

    /// Run a young-generation cycle if the collector is idle and young
    /// collection is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store fails during the cycle.
    pub fn gc_young(&self) -> Result<CycleOutcome, DgcError> {
        if !self.young_gen.is_enabled() {
            tracing::debug!("young generation collection is disabled");
            return Ok(CycleOutcome::Skipped);
        }
        self.try_run(GcHook::young_gen(self.context()))
    }

    /// Run a full cycle without publishing events to listeners.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store fails during the cycle.
    pub fn gc_inline(&self) -> Result<CycleOutcome, DgcError> {
        self.try_run(GcHook::inline_cleanup(self.context()))
    }

    /// Run a full cycle, waiting for the running cycle to finish or for the
    /// collector to be re-enabled. Skips only if the collector is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store fails during the cycle.
    pub fn gc_blocking(&self) -> Result<CycleOutcome, DgcError> {
        if !self.lifecycle.wait_to_start() {
            return Ok(CycleOutcome::Skipped);
        }
        self.run(GcHook::full(self.context()))
    }

    fn try_run(&self, hook: GcHook<'_>) -> Result<CycleOutcome, DgcError> {
        if !self.lifecycle.request_gc_start() {
            tracing::debug!(
                collection_type = hook.description(),
                state = %self.lifecycle.state(),
                started = self.lifecycle.is_started(),
                "collector busy, skipping cycle"
            );
            return Ok(CycleOutcome::Skipped);
        }
        self.run(hook)
    }

    fn run(&self, hook: GcHook<'_>) -> Result<CycleOutcome, DgcError> {
        let cycle_id = self.cycle_ids.next_cycle_id();
        MarkAndSweep::new(hook, &self.lifecycle, &self.publisher).run(cycle_id)
    }

    /// Traverse from `roots` and return the members of `candidates` that were
    /// not reached. Does not touch the lifecycle or delete anything.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if a reference lookup fails.
    pub fn collect(
        &self,
        filter: &TraversalFilter,
        roots: &ObjectIdSet,
        candidates: ObjectIdSet,
    ) -> Result<ObjectIdSet, StoreError> {
        let hook = GcHook::full(self.context());
        algorithm::collect(filter, roots, candidates, |id| hook.references_of(id))
    }

    /// Apply a result computed elsewhere, for example on the active node.
    ///
    /// Returns `Ok(false)` without side effects unless the collector is idle
    /// or paused.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store cannot delete the set. The
    /// collector returns to idle.
    pub fn delete_garbage(&self, result: &GcResult) -> Result<bool, DgcError> {
        if !self.lifecycle.request_delete_start() {
            tracing::debug!(
                gc_id = result.cycle_id(),
                state = %self.lifecycle.state(),
                "cannot delete garbage in the current state"
            );
            return Ok(false);
        }
        apply_garbage(&self.context(), &self.lifecycle, result)?;
        tracing::debug!(
            gc_id = result.cycle_id(),
            garbage = result.garbage.len(),
            "applied garbage set"
        );
        Ok(true)
    }

    /// Delete a set already proven garbage by the caller, waiting until the
    /// collector is idle. Publishes no events.
    ///
    /// Blocks while a cycle runs and for as long as the collector stays
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns [`DgcError::Store`] if the store cannot delete the set. The
    /// collector returns to idle.
    pub fn inline_delete(&self, garbage: ObjectIdSet) -> Result<GcResult, DgcError> {
        let mut timer = StageTimer::new();
        let mut info = GarbageCollectionInfo::new(
            self.cycle_ids.next_cycle_id(),
            CollectionKind::InlineCleanup,
        );
        info.live_object_count = self.store.live_object_count();
        info.begin_object_count = info.live_object_count;
        info.candidate_garbage_count = garbage.len();
        info.actual_garbage_count = garbage.len();
        info.end_object_count = info.begin_object_count.saturating_sub(garbage.len());

        self.lifecycle.wait_to_start_inline();
        timer.start();
        let mut result = GcResult::new(info, garbage);
        apply_garbage(&self.context(), &self.lifecycle, &result)?;
        result.info.delete_duration = timer.end();
        result.info.elapsed = timer.total();
        tracing::debug!(
            gc_id = result.cycle_id(),
            garbage = result.garbage.len(),
            "inline delete complete"
        );
        Ok(result)
    }

    // ========================================================================
    // Lifecycle control
    // ========================================================================

    /// Re-enable a disabled collector.
    pub fn enable_gc(&self) -> bool {
        self.lifecycle.enable()
    }

    /// Disable the collector if idle.
    pub fn disable_gc(&self) -> bool {
        self.lifecycle.request_disable()
    }

    /// Wait for the running cycle to finish, then disable the collector.
    /// Returns `false` if it was already disabled.
    pub fn wait_to_disable_gc(&self) -> bool {
        self.lifecycle.wait_to_disable()
    }

    /// Acknowledge a pause request from the mutation path.
    pub fn notify_ready_to_gc(&self) -> bool {
        self.lifecycle.notify_ready_to_gc()
    }

    /// Cancel the running cycle at its next stage boundary.
    pub fn request_cancel(&self) {
        self.lifecycle.request_cancel();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GcState {
        self.lifecycle.state()
    }

    /// Whether the mutation path has been asked to pause or has paused.
    #[must_use]
    pub fn is_pausing_or_paused(&self) -> bool {
        self.lifecycle.is_pausing_or_paused()
    }

    /// Whether the mutation path has acknowledged a pause.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lifecycle.is_paused()
    }

    /// Whether the collector is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.lifecycle.is_disabled()
    }

    /// The lifecycle, as seen by a store acknowledging pauses.
    #[must_use]
    pub const fn lifecycle(&self) -> &LifecycleState {
        &self.lifecycle
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a lifecycle listener.
    pub fn add_listener(&self, listener: Arc<dyn GarbageCollectorEventListener>) -> ListenerId {
        self.publisher.add_listener(listener)
    }

    /// Deregister a lifecycle listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.publisher.remove_listener(id)
    }
}

impl MutationListener for GarbageCollector {
    fn changed(&self, subject: ObjectId, old: Option<ObjectId>, new: Option<ObjectId>) {
        self.monitor.changed(subject, old, new);
    }

    fn object_created(&self, id: ObjectId) {
        self.young_gen.record_created(id);
    }

    fn object_initialized(&self, id: ObjectId) {
        self.young_gen.record_initialized(id);
    }

    fn objects_evicted(&self, evicted: &[EvictedObject]) {
        self.young_gen.record_evicted(evicted);
    }

    fn is_mutation_paused(&self) -> bool {
        self.lifecycle.is_paused()
    }

    fn wait_until_mutable(&self) {
        self.lifecycle.wait_until_resumed();
    }
}

impl fmt::Display for GarbageCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GarbageCollector[{}]", self.lifecycle.state())
    }
}

impl fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("state", &self.lifecycle.state())
            .field("started", &self.lifecycle.is_started())
            .field("young_gen", &self.young_gen.is_enabled())
            .field("listeners", &self.publisher.len())
            .finish_non_exhaustive()
    }
}
