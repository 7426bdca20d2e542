//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cluster_dgc::{
    DgcConfig, GarbageCollectionInfo, GarbageCollector, GarbageCollectorEventListener, GcResult,
    InMemoryClientState, InMemoryObjectStore, ObjectId, ObjectIdSet, ObjectStore, PauseHandle,
    Sequence, StoreError,
};
use parking_lot::Mutex;

pub fn oid(n: u64) -> ObjectId {
    ObjectId::new(n)
}

pub fn ids(ids: impl IntoIterator<Item = u64>) -> ObjectIdSet {
    ids.into_iter().collect()
}

/// Collector settings for tests that drive cycles by hand.
pub fn manual_config() -> DgcConfig {
    DgcConfig {
        full_gc_enabled: false,
        wait_poll_interval: Duration::from_millis(50),
        ..DgcConfig::default()
    }
}

pub fn young_config() -> DgcConfig {
    DgcConfig {
        young_gc_enabled: true,
        ..manual_config()
    }
}

/// Insert `first -> first + 1 -> ... -> last`.
pub fn insert_chain(store: &InMemoryObjectStore, first: u64, last: u64) {
    for n in first..last {
        store.insert(oid(n), ids([n + 1]));
    }
    store.insert(oid(last), ObjectIdSet::new());
}

/// Insert objects with no outgoing references.
pub fn insert_leaves(store: &InMemoryObjectStore, range: impl IntoIterator<Item = u64>) {
    for n in range {
        store.insert(oid(n), ObjectIdSet::new());
    }
}

pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

type Action = Box<dyn FnOnce() + Send>;

/// Wraps the in-memory store to record lookups, run actions at chosen
/// points of a cycle and inject faults.
pub struct ScriptedStore {
    pub inner: Arc<InMemoryObjectStore>,
    lookups: Mutex<Vec<ObjectId>>,
    after_lookup: Mutex<Option<(ObjectId, Action)>>,
    during_pause: Mutex<Option<Action>>,
    defer_pause_ack: AtomicBool,
    fail_enumeration: AtomicBool,
    fail_delete: AtomicBool,
}

impl ScriptedStore {
    pub fn new(inner: Arc<InMemoryObjectStore>) -> Self {
        Self {
            inner,
            lookups: Mutex::new(Vec::new()),
            after_lookup: Mutex::new(None),
            during_pause: Mutex::new(None),
            defer_pause_ack: AtomicBool::new(false),
            fail_enumeration: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    /// Run `action` once, right after the references of `id` were read.
    pub fn after_lookup(&self, id: ObjectId, action: impl FnOnce() + Send + 'static) {
        *self.after_lookup.lock() = Some((id, Box::new(action)));
    }

    /// Run `action` once while the collector waits for the pause.
    pub fn during_pause(&self, action: impl FnOnce() + Send + 'static) {
        *self.during_pause.lock() = Some(Box::new(action));
    }

    /// Leave the pause unacknowledged; the test acknowledges it.
    pub fn defer_pause_ack(&self) {
        self.defer_pause_ack.store(true, Ordering::SeqCst);
    }

    pub fn fail_enumeration(&self) {
        self.fail_enumeration.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> Vec<ObjectId> {
        self.lookups.lock().clone()
    }
}

impl ObjectStore for ScriptedStore {
    fn all_object_ids(&self) -> Result<ObjectIdSet, StoreError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("enumeration disabled".into()));
        }
        self.inner.all_object_ids()
    }

    fn root_ids(&self) -> Result<ObjectIdSet, StoreError> {
        self.inner.root_ids()
    }

    fn resident_object_ids(&self) -> Result<ObjectIdSet, StoreError> {
        self.inner.resident_object_ids()
    }

    fn references_of(
        &self,
        id: ObjectId,
        cache_only: bool,
    ) -> Result<Option<ObjectIdSet>, StoreError> {
        self.lookups.lock().push(id);
        let references = self.inner.references_of(id, cache_only);
        let action = {
            let mut pending = self.after_lookup.lock();
            match pending.take() {
                Some((target, action)) if target == id => Some(action),
                other => {
                    *pending = other;
                    None
                }
            }
        };
        if let Some(action) = action {
            action();
        }
        references
    }

    fn live_object_count(&self) -> usize {
        self.inner.live_object_count()
    }

    fn delete(&self, garbage: &ObjectIdSet) -> Result<(), StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StoreError::DeleteFailed {
                count: garbage.len(),
                reason: "disk full".into(),
            });
        }
        self.inner.delete(garbage)
    }

    fn notify_gc_complete(&self, result: &GcResult) {
        self.inner.notify_gc_complete(result);
    }

    fn wait_until_ready_to_gc(&self, pause: &dyn PauseHandle) -> Result<(), StoreError> {
        let action = self.during_pause.lock().take();
        if let Some(action) = action {
            action();
        }
        if self.defer_pause_ack.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.wait_until_ready_to_gc(pause)
    }
}

/// Records every lifecycle event with its cycle id.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<(&'static str, GarbageCollectionInfo)>>,
}

impl EventRecorder {
    fn push(&self, name: &'static str, info: &GarbageCollectionInfo) {
        self.events.lock().push((name, info.clone()));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|(name, _)| *name).collect()
    }

    pub fn last(&self, name: &str) -> Option<GarbageCollectionInfo> {
        self.events
            .lock()
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, info)| info.clone())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl GarbageCollectorEventListener for EventRecorder {
    fn garbage_collector_start(&self, info: &GarbageCollectionInfo) {
        self.push("start", info);
    }
    fn garbage_collector_mark(&self, info: &GarbageCollectionInfo) {
        self.push("mark", info);
    }
    fn garbage_collector_mark_results(&self, info: &GarbageCollectionInfo) {
        self.push("mark_results", info);
    }
    fn garbage_collector_rescue1_complete(&self, info: &GarbageCollectionInfo) {
        self.push("rescue1_complete", info);
    }
    fn garbage_collector_pausing(&self, info: &GarbageCollectionInfo) {
        self.push("pausing", info);
    }
    fn garbage_collector_paused(&self, info: &GarbageCollectionInfo) {
        self.push("paused", info);
    }
    fn garbage_collector_rescue2_start(&self, info: &GarbageCollectionInfo) {
        self.push("rescue2_start", info);
    }
    fn garbage_collector_mark_complete(&self, info: &GarbageCollectionInfo) {
        self.push("mark_complete", info);
    }
    fn garbage_collector_cycle_completed(&self, info: &GarbageCollectionInfo) {
        self.push("cycle_completed", info);
    }
    fn garbage_collector_delete(&self, info: &GarbageCollectionInfo) {
        self.push("delete", info);
    }
    fn garbage_collector_completed(&self, info: &GarbageCollectionInfo) {
        self.push("completed", info);
    }
    fn garbage_collector_canceled(&self, info: &GarbageCollectionInfo) {
        self.push("canceled", info);
    }
}

/// A started collector wired to a scripted in-memory store.
pub struct Harness {
    pub objects: Arc<InMemoryObjectStore>,
    pub store: Arc<ScriptedStore>,
    pub clients: Arc<InMemoryClientState>,
    pub collector: Arc<GarbageCollector>,
    pub events: Arc<EventRecorder>,
}

pub fn harness(config: DgcConfig) -> Harness {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(ScriptedStore::new(Arc::clone(&objects)));
    let clients = Arc::new(InMemoryClientState::new());
    let collector = Arc::new(
        GarbageCollector::new(
            config,
            store.clone(),
            clients.clone(),
            Arc::new(Sequence::default()),
        )
        .expect("valid config"),
    );
    objects.set_listener(&collector);
    let events = Arc::new(EventRecorder::default());
    collector.add_listener(events.clone());
    collector.start().expect("collector starts");
    Harness {
        objects,
        store,
        clients,
        collector,
        events,
    }
}
