//! Collaborator interfaces consumed by the collector.
//!
//! The collector never owns object data. It reads the graph through an
//! [`ObjectStore`], learns which identifiers connected clients hold through a
//! [`ClientStateManager`], and numbers its cycles from a [`CycleIdSource`].
//! In the other direction, the store's mutation path reports reference writes
//! to a [`MutationListener`], which the collector implements.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StoreError;
use crate::info::GcResult;
use crate::object_id::{ObjectId, ObjectIdSet};

/// The store holding object bytes and reference graphs.
///
/// Concurrent reads (traversal) and writes (mutation) must be individually
/// safe; the collector only ever reads references and requests deletion of
/// identifiers it has proven garbage.
pub trait ObjectStore: Send + Sync {
    /// Every identifier known to the store.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the identifiers cannot be enumerated.
    fn all_object_ids(&self) -> Result<ObjectIdSet, StoreError>;

    /// Identifiers of the named roots.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the roots cannot be enumerated.
    fn root_ids(&self) -> Result<ObjectIdSet, StoreError>;

    /// Identifiers of objects currently resident in memory.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the cache cannot be enumerated.
    fn resident_object_ids(&self) -> Result<ObjectIdSet, StoreError>;

    /// Outgoing references of `id`.
    ///
    /// Returns `Ok(None)` when the object is not available: not yet
    /// initialized, or not resident while `cache_only` is set.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the lookup itself fails.
    fn references_of(
        &self,
        id: ObjectId,
        cache_only: bool,
    ) -> Result<Option<ObjectIdSet>, StoreError>;

    /// Number of live objects in the store.
    fn live_object_count(&self) -> usize;

    /// Remove a garbage set. The store may apply it incrementally but must
    /// treat it as one logical batch.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the deletion could not be applied.
    fn delete(&self, garbage: &ObjectIdSet) -> Result<(), StoreError>;

    /// Called once a cycle's result has been applied, for persistence and
    /// replay on passive nodes.
    fn notify_gc_complete(&self, _result: &GcResult) {}

    /// Quiesce the mutation path for the pause window.
    ///
    /// Implementations flush in-flight writes and then acknowledge through
    /// `pause`, either before returning or later from another thread. The
    /// default acknowledges immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the mutation path cannot be quiesced.
    fn wait_until_ready_to_gc(&self, pause: &dyn PauseHandle) -> Result<(), StoreError> {
        pause.notify_ready_to_gc();
        Ok(())
    }
}

/// Tracks the references held by connected clients.
pub trait ClientStateManager: Send + Sync {
    /// Every identifier referenced by at least one connected client.
    fn referenced_ids(&self) -> ObjectIdSet;
}

/// Source of monotonically increasing cycle identifiers.
pub trait CycleIdSource: Send + Sync {
    /// The next cycle identifier.
    fn next_cycle_id(&self) -> u64;
}

/// Process-wide cycle counter starting at 1.
#[derive(Debug)]
pub struct Sequence {
    next: AtomicU64,
}

impl Sequence {
    /// Create a sequence whose first value is `start`.
    #[must_use]
    pub const fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl CycleIdSource for Sequence {
    fn next_cycle_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// An object dropped from memory, with the references it held at eviction.
#[derive(Debug, Clone)]
pub struct EvictedObject {
    /// The evicted object.
    pub id: ObjectId,
    /// Its outgoing references at the time of eviction.
    pub references: ObjectIdSet,
}

/// Receives notifications from the store's mutation path.
pub trait MutationListener: Send + Sync {
    /// A reference slot of `subject` changed from `old` to `new`.
    fn changed(&self, subject: ObjectId, old: Option<ObjectId>, new: Option<ObjectId>);

    /// A new object was allocated but is not yet initialized.
    fn object_created(&self, _id: ObjectId) {}

    /// A newly created object finished initialization.
    fn object_initialized(&self, _id: ObjectId) {}

    /// Objects were evicted from memory.
    fn objects_evicted(&self, _evicted: &[EvictedObject]) {}

    /// Whether writes must wait because the collector holds the mutation
    /// path paused.
    fn is_mutation_paused(&self) -> bool {
        false
    }

    /// Block until writes may proceed again. Must not be called from the
    /// collecting thread.
    fn wait_until_mutable(&self) {}
}

/// The pause side of the lifecycle, as seen by the mutation path.
pub trait PauseHandle {
    /// Whether the collector has requested a pause not yet acknowledged.
    fn is_pausing(&self) -> bool;

    /// Acknowledge the pause: mutators are quiesced.
    fn notify_ready_to_gc(&self);
}
