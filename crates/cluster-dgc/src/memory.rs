//! In-memory collaborators.
//!
//! [`InMemoryObjectStore`] keeps the whole reference graph in a map and
//! reports every mutation to a registered [`MutationListener`]. It models a
//! resident cache with explicit eviction so young-generation behavior can be
//! exercised. [`InMemoryClientState`] tracks references per client.
//!
//! Writes are reported while the graph lock is held, so the collector never
//! sees a reference before it is recorded. Once the collector holds the
//! mutation path paused, new writes block until it moves on to deleting.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::info::GcResult;
use crate::object_id::{ObjectId, ObjectIdSet};
use crate::store::{ClientStateManager, EvictedObject, MutationListener, ObjectStore, PauseHandle};

#[derive(Debug, Clone, Default)]
struct StoredObject {
    references: ObjectIdSet,
    initialized: bool,
}

#[derive(Debug, Default)]
struct Graph {
    objects: HashMap<ObjectId, StoredObject>,
    roots: ObjectIdSet,
    resident: ObjectIdSet,
}

impl Graph {
    /// An object about to be written. Writing requires it in memory.
    fn fault_in_mut(&mut self, id: ObjectId) -> Result<&mut StoredObject, StoreError> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or_else(|| StoreError::Other(format!("{id} does not exist")))?;
        self.resident.insert(id);
        Ok(object)
    }
}

/// A thread-safe object store holding the reference graph in memory.
#[derive(Default)]
pub struct InMemoryObjectStore {
    graph: RwLock<Graph>,
    /// Shared by every write, taken exclusively to acknowledge a pause.
    writers: RwLock<()>,
    listener: RwLock<Option<Weak<dyn MutationListener>>>,
    completed: Mutex<Vec<GcResult>>,
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let graph = self.graph.read();
        f.debug_struct("InMemoryObjectStore")
            .field("objects", &graph.objects.len())
            .field("roots", &graph.roots)
            .field("resident", &graph.resident.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report mutations to `listener`. Only a weak reference is kept.
    pub fn set_listener<L: MutationListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn MutationListener> = weak;
        *self.listener.write() = Some(weak);
    }

    fn listener(&self) -> Option<Arc<dyn MutationListener>> {
        self.listener.read().as_ref().and_then(Weak::upgrade)
    }

    /// Apply a write under the graph lock, waiting first while the mutation
    /// path is paused. `write` reports to the listener before the lock is
    /// released.
    fn mutate<T>(&self, write: impl FnOnce(&mut Graph, Option<&dyn MutationListener>) -> T) -> T {
        let listener = self.listener();
        let listener = listener.as_deref();
        loop {
            let in_flight = self.writers.read();
            if let Some(listener) = listener.filter(|l| l.is_mutation_paused()) {
                drop(in_flight);
                listener.wait_until_mutable();
                continue;
            }
            let mut graph = self.graph.write();
            return write(&mut graph, listener);
        }
    }

    /// Load an existing, initialized object into memory without reporting
    /// it as new.
    pub fn insert(&self, id: ObjectId, references: ObjectIdSet) {
        let mut graph = self.graph.write();
        graph.objects.insert(
            id,
            StoredObject {
                references,
                initialized: true,
            },
        );
        graph.resident.insert(id);
    }

    /// Allocate a new, uninitialized object.
    pub fn create(&self, id: ObjectId) {
        self.mutate(|graph, listener| {
            graph.objects.insert(id, StoredObject::default());
            graph.resident.insert(id);
            if let Some(listener) = listener {
                listener.object_created(id);
            }
        });
    }

    /// Initialize a created object with its references. Each reference is
    /// reported as a write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Other`] if `id` was never created.
    pub fn initialize(&self, id: ObjectId, references: ObjectIdSet) -> Result<(), StoreError> {
        self.mutate(|graph, listener| {
            let object = graph.fault_in_mut(id)?;
            object.references = references.clone();
            object.initialized = true;
            if let Some(listener) = listener {
                for target in &references {
                    listener.changed(id, None, Some(target));
                }
                listener.object_initialized(id);
            }
            Ok(())
        })
    }

    /// Create and initialize an object in one step.
    pub fn create_object(&self, id: ObjectId, references: ObjectIdSet) {
        self.create(id);
        let initialized = self.initialize(id, references);
        debug_assert!(initialized.is_ok(), "{id} was just created");
    }

    /// Write a reference from `from` to `to`, bringing `from` back into
    /// memory first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Other`] if either object does not exist.
    pub fn add_reference(&self, from: ObjectId, to: ObjectId) -> Result<(), StoreError> {
        self.mutate(|graph, listener| {
            if !graph.objects.contains_key(&to) {
                return Err(StoreError::Other(format!("{to} does not exist")));
            }
            graph.fault_in_mut(from)?.references.insert(to);
            if let Some(listener) = listener {
                listener.changed(from, None, Some(to));
            }
            Ok(())
        })
    }

    /// Clear a reference from `from` to `to`, bringing `from` back into
    /// memory first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Other`] if `from` does not exist.
    pub fn remove_reference(&self, from: ObjectId, to: ObjectId) -> Result<(), StoreError> {
        self.mutate(|graph, listener| {
            if graph.fault_in_mut(from)?.references.remove(to) {
                if let Some(listener) = listener {
                    listener.changed(from, Some(to), None);
                }
            }
            Ok(())
        })
    }

    /// Make `id` a named root.
    pub fn add_root(&self, id: ObjectId) {
        self.graph.write().roots.insert(id);
    }

    /// Remove `id` from the named roots.
    pub fn remove_root(&self, id: ObjectId) {
        self.graph.write().roots.remove(id);
    }

    /// Drop objects from memory. They stay in the store.
    pub fn evict(&self, ids: &ObjectIdSet) {
        let listener = self.listener();
        let mut graph = self.graph.write();
        let mut evicted = Vec::with_capacity(ids.len());
        for id in ids {
            if !graph.resident.remove(id) {
                continue;
            }
            if let Some(object) = graph.objects.get(&id) {
                evicted.push(EvictedObject {
                    id,
                    references: object.references.clone(),
                });
            }
        }
        if let Some(listener) = listener.filter(|_| !evicted.is_empty()) {
            listener.objects_evicted(&evicted);
        }
    }

    /// Bring an object back into memory.
    pub fn fault_in(&self, id: ObjectId) -> bool {
        let mut graph = self.graph.write();
        graph.objects.contains_key(&id) && graph.resident.insert(id)
    }

    /// Whether the store holds `id`.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.graph.read().objects.contains_key(&id)
    }

    /// Whether `id` is resident in memory.
    #[must_use]
    pub fn is_resident(&self, id: ObjectId) -> bool {
        self.graph.read().resident.contains(id)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.read().objects.len()
    }

    /// Returns `true` if the store holds no object.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outgoing references of `id`, regardless of residency.
    #[must_use]
    pub fn references(&self, id: ObjectId) -> Option<ObjectIdSet> {
        self.graph
            .read()
            .objects
            .get(&id)
            .map(|object| object.references.clone())
    }

    /// Results handed over by completed cycles, oldest first.
    #[must_use]
    pub fn completed_results(&self) -> Vec<GcResult> {
        self.completed.lock().clone()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn all_object_ids(&self) -> Result<ObjectIdSet, StoreError> {
        Ok(self.graph.read().objects.keys().copied().collect())
    }

    fn root_ids(&self) -> Result<ObjectIdSet, StoreError> {
        Ok(self.graph.read().roots.clone())
    }

    fn resident_object_ids(&self) -> Result<ObjectIdSet, StoreError> {
        Ok(self.graph.read().resident.clone())
    }

    fn references_of(
        &self,
        id: ObjectId,
        cache_only: bool,
    ) -> Result<Option<ObjectIdSet>, StoreError> {
        let graph = self.graph.read();
        if cache_only && !graph.resident.contains(id) {
            return Ok(None);
        }
        Ok(graph
            .objects
            .get(&id)
            .filter(|object| object.initialized)
            .map(|object| object.references.clone()))
    }

    fn live_object_count(&self) -> usize {
        self.len()
    }

    fn delete(&self, garbage: &ObjectIdSet) -> Result<(), StoreError> {
        let mut graph = self.graph.write();
        for id in garbage {
            graph.objects.remove(&id);
            graph.roots.remove(id);
            graph.resident.remove(id);
        }
        tracing::debug!(deleted = garbage.len(), remaining = graph.objects.len(), "deleted garbage");
        Ok(())
    }

    fn notify_gc_complete(&self, result: &GcResult) {
        self.completed.lock().push(result.clone());
    }

    /// Wait for writes already in progress, then acknowledge. Writes that
    /// arrive after the acknowledgement see the paused state and block.
    fn wait_until_ready_to_gc(&self, pause: &dyn PauseHandle) -> Result<(), StoreError> {
        let _drained = self.writers.write();
        pause.notify_ready_to_gc();
        Ok(())
    }
}

/// Client reference tracking keyed by client id.
#[derive(Debug, Default)]
pub struct InMemoryClientState {
    clients: RwLock<HashMap<u64, HashSet<ObjectId>>>,
}

impl InMemoryClientState {
    /// Create a tracker with no connected client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `client` now holds a reference to `id`.
    pub fn add_reference(&self, client: u64, id: ObjectId) {
        self.clients.write().entry(client).or_default().insert(id);
    }

    /// `client` released its reference to `id`.
    pub fn remove_reference(&self, client: u64, id: ObjectId) -> bool {
        self.clients
            .write()
            .get_mut(&client)
            .is_some_and(|ids| ids.remove(&id))
    }

    /// `client` disconnected, releasing everything it held.
    pub fn remove_client(&self, client: u64) -> bool {
        self.clients.write().remove(&client).is_some()
    }
}

impl ClientStateManager for InMemoryClientState {
    fn referenced_ids(&self) -> ObjectIdSet {
        self.clients
            .read()
            .values()
            .flat_map(|ids| ids.iter().copied())
            .collect()
    }
}
