//! Collection strategies.
//!
//! A [`GcHook`] supplies everything that differs between a full and a
//! young-generation cycle: the candidate set, the roots, the traversal bound,
//! the rescue set and how references are expanded.

use std::sync::Arc;

use crate::error::StoreError;
use crate::gc::change::ReferenceMonitor;
use crate::gc::filter::TraversalFilter;
use crate::gc::throttle::RequestThrottler;
use crate::gc::young::YoungGenTracker;
use crate::info::{CollectionKind, GarbageCollectionInfo};
use crate::object_id::{ObjectId, ObjectIdSet};
use crate::store::{ClientStateManager, ObjectStore};

/// Collaborators shared by every strategy.
#[derive(Clone, Copy)]
pub struct GcContext<'a> {
    /// The object store.
    pub store: &'a dyn ObjectStore,
    /// Client reference tracker.
    pub client_state: &'a dyn ClientStateManager,
    /// References written during the cycle.
    pub monitor: &'a ReferenceMonitor,
    /// Young-generation bookkeeping.
    pub tracker: &'a YoungGenTracker,
    /// Bounds the rate of reference expansion.
    pub throttler: &'a RequestThrottler,
}

impl std::fmt::Debug for GcContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcContext")
            .field("monitoring", &self.monitor.is_monitoring())
            .field("young_gen", &self.tracker.is_enabled())
            .finish_non_exhaustive()
    }
}

/// Strategy of one cycle, dispatched on its [`CollectionKind`].
#[derive(Debug, Clone, Copy)]
pub struct GcHook<'a> {
    kind: CollectionKind,
    ctx: GcContext<'a>,
}

impl<'a> GcHook<'a> {
    /// Full collection over every known object.
    #[must_use]
    pub const fn full(ctx: GcContext<'a>) -> Self {
        Self {
            kind: CollectionKind::Full,
            ctx,
        }
    }

    /// Full collection whose events stay internal.
    #[must_use]
    pub const fn inline_cleanup(ctx: GcContext<'a>) -> Self {
        Self {
            kind: CollectionKind::InlineCleanup,
            ctx,
        }
    }

    /// Young-generation collection over recently created objects.
    #[must_use]
    pub const fn young_gen(ctx: GcContext<'a>) -> Self {
        Self {
            kind: CollectionKind::YoungGen,
            ctx,
        }
    }

    /// Kind of cycle this hook drives.
    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Human-readable kind.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        self.kind.description()
    }

    /// Shared collaborators.
    #[must_use]
    pub const fn context(&self) -> &GcContext<'a> {
        &self.ctx
    }

    /// A descriptor for a new cycle of this kind.
    #[must_use]
    pub fn new_info(&self, cycle_id: u64) -> GarbageCollectionInfo {
        let mut info = GarbageCollectionInfo::new(cycle_id, self.kind);
        info.live_object_count = self.live_object_count();
        info
    }

    /// Live objects at cycle start.
    #[must_use]
    pub fn live_object_count(&self) -> usize {
        if self.kind.is_full() {
            self.ctx.store.live_object_count()
        } else {
            self.ctx.tracker.young_count()
        }
    }

    /// Objects eligible for reclamation.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot enumerate its objects.
    pub fn candidates(&self) -> Result<ObjectIdSet, StoreError> {
        if self.kind.is_full() {
            self.ctx.store.all_object_ids()
        } else {
            Ok(self.ctx.tracker.young_candidates())
        }
    }

    /// Traversal starting points for `candidates`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot enumerate roots or
    /// resident objects.
    pub fn roots(&self, candidates: &ObjectIdSet) -> Result<ObjectIdSet, StoreError> {
        let mut roots = self.ctx.store.root_ids()?;
        if self.kind.is_full() {
            roots.union_with(&self.ctx.client_state.referenced_ids());
            self.ctx.monitor.add_new_references_to(&mut roots);
        } else {
            let mut resident = self.ctx.store.resident_object_ids()?;
            resident.subtract(candidates);
            roots.union_with(&resident);
            roots.union_with(&self.ctx.tracker.remembered_set());
        }
        Ok(roots)
    }

    /// Bound on traversal: young cycles never leave the candidate set.
    #[must_use]
    pub fn filter(&self, candidates: &Arc<ObjectIdSet>) -> TraversalFilter {
        if self.kind.is_full() {
            TraversalFilter::AcceptAll
        } else {
            TraversalFilter::within(Arc::clone(candidates))
        }
    }

    /// Objects to keep regardless of reachability.
    #[must_use]
    pub fn rescue_ids(&self) -> ObjectIdSet {
        let mut rescue = self.ctx.client_state.referenced_ids();
        let client_refs = rescue.len();
        self.ctx.monitor.add_new_references_to(&mut rescue);
        let with_new_refs = rescue.len();
        let remembered = if self.kind.is_full() {
            0
        } else {
            let remembered = self.ctx.tracker.remembered_set();
            rescue.union_with(&remembered);
            remembered.len()
        };
        tracing::debug!(
            collection_type = self.description(),
            client_refs,
            new_refs = with_new_refs - client_refs,
            remembered,
            rescue = rescue.len(),
            "computed rescue set"
        );
        rescue
    }

    /// Rescue set for the second pass: the current rescue set plus every
    /// identifier rescued by `previous`, so it never shrinks between passes.
    #[must_use]
    pub fn rescue_ids_since(&self, previous: &ObjectIdSet) -> ObjectIdSet {
        let mut rescue = self.rescue_ids();
        rescue.union_with(previous);
        rescue
    }

    /// Outgoing references of `id`, throttled. `Ok(None)` skips the object.
    ///
    /// Full cycles fault objects in from the store. Young cycles only look at
    /// resident objects and fall back to the references remembered at
    /// eviction.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the lookup fails.
    pub fn references_of(&self, id: ObjectId) -> Result<Option<ObjectIdSet>, StoreError> {
        if self.kind.is_full() {
            let refs = self
                .ctx
                .throttler
                .run(|| self.ctx.store.references_of(id, false))?;
            if refs.is_none() {
                tracing::warn!(%id, "looked up a new object before it was initialized, skipping");
            }
            return Ok(refs);
        }
        let refs = self
            .ctx
            .throttler
            .run(|| self.ctx.store.references_of(id, true))?;
        Ok(refs.or_else(|| self.ctx.tracker.remembered_references(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DgcConfig;
    use crate::memory::{InMemoryClientState, InMemoryObjectStore};

    fn id(n: u64) -> ObjectId {
        ObjectId::new(n)
    }

    #[test]
    fn test_second_rescue_set_keeps_first() {
        let store = InMemoryObjectStore::new();
        let clients = InMemoryClientState::new();
        let monitor = ReferenceMonitor::new();
        let tracker = YoungGenTracker::Disabled;
        let throttler = RequestThrottler::new(&DgcConfig::default());
        let hook = GcHook::full(GcContext {
            store: &store,
            client_state: &clients,
            monitor: &monitor,
            tracker: &tracker,
            throttler: &throttler,
        });

        monitor.start_monitoring();
        clients.add_reference(7, id(3));
        let first = hook.rescue_ids();
        assert!(first.contains(id(3)));

        // Between the passes the client lets go and a new reference lands.
        assert!(clients.remove_client(7));
        monitor.changed(id(1), None, Some(id(5)));
        let second = hook.rescue_ids_since(&first);

        assert!(first.iter().all(|rescued| second.contains(rescued)));
        assert!(second.contains(id(5)));
        assert!(!hook.rescue_ids().contains(id(3)));
    }
}
