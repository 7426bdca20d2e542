//! Young-generation bookkeeping.
//!
//! Tracks objects created since they were last collected, and a remembered
//! set of objects outside the young set that hold references into it.
//!
//! A young object that is evicted from memory can no longer be inspected, so
//! it leaves the young candidate set and is only reclaimed by a full cycle.
//! If it still referenced young objects it is remembered together with those
//! references, which the young collector then uses in place of an in-memory
//! lookup.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::object_id::{ObjectId, ObjectIdSet};
use crate::store::EvictedObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YoungState {
    Uninitialized,
    Initialized,
}

/// Interior state of an enabled [`YoungGenTracker`].
#[derive(Debug, Default)]
pub struct YoungGenState {
    young: HashMap<ObjectId, YoungState>,
    /// Referrer outside the young set -> young objects it referenced.
    remembered: BTreeMap<ObjectId, ObjectIdSet>,
    monitoring: bool,
}

impl YoungGenState {
    fn is_young(&self, id: ObjectId) -> bool {
        self.young.contains_key(&id)
    }

    /// Forget `id` as a young object. Inbound remembered references are kept
    /// while a cycle monitors changes, since the object may just have been
    /// faulted out and the running cycle only inspects memory.
    fn remove_references_to(&mut self, id: ObjectId) {
        self.young.remove(&id);
        if self.monitoring {
            return;
        }
        self.remembered.retain(|_, targets| {
            targets.remove(id);
            !targets.is_empty()
        });
    }

    fn prune_remembered(&mut self) {
        let young = &self.young;
        self.remembered.retain(|_, targets| {
            targets.retain(|id| young.contains_key(&id));
            !targets.is_empty()
        });
    }
}

/// Young-generation tracker; [`YoungGenTracker::Disabled`] when young
/// collection is turned off.
#[derive(Debug, Default)]
pub enum YoungGenTracker {
    /// Accepts every notification and always reports empty sets.
    #[default]
    Disabled,
    /// Tracks young objects and the remembered set.
    Enabled(Mutex<YoungGenState>),
}

impl YoungGenTracker {
    /// An enabled tracker with no history.
    #[must_use]
    pub fn enabled() -> Self {
        Self::Enabled(Mutex::new(YoungGenState::default()))
    }

    /// Whether this tracker records anything.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    fn with_state<R>(&self, default: R, f: impl FnOnce(&mut YoungGenState) -> R) -> R {
        match self {
            Self::Disabled => default,
            Self::Enabled(state) => f(&mut state.lock()),
        }
    }

    /// A new object was allocated. It is not a candidate until initialized.
    pub fn record_created(&self, id: ObjectId) {
        self.with_state((), |state| {
            if let Some(previous) = state.young.insert(id, YoungState::Uninitialized) {
                tracing::warn!(%id, ?previous, "object created twice");
            }
        });
    }

    /// A created object finished initialization.
    pub fn record_initialized(&self, id: ObjectId) {
        self.with_state((), |state| {
            let previous = state.young.insert(id, YoungState::Initialized);
            if previous != Some(YoungState::Uninitialized) {
                tracing::warn!(%id, ?previous, "initialized object was not pending initialization");
            }
        });
    }

    /// Objects were dropped from memory.
    pub fn record_evicted(&self, evicted: &[EvictedObject]) {
        self.with_state((), |state| {
            for object in evicted {
                state.remove_references_to(object.id);
                let mut young_refs = object.references.clone();
                young_refs.retain(|target| state.is_young(target));
                if !young_refs.is_empty() {
                    state
                        .remembered
                        .entry(object.id)
                        .or_default()
                        .union_with(&young_refs);
                }
            }
        });
    }

    /// Initialized young objects: the candidates of the next young cycle.
    #[must_use]
    pub fn young_candidates(&self) -> ObjectIdSet {
        self.with_state(ObjectIdSet::new(), |state| {
            state
                .young
                .iter()
                .filter(|(_, s)| **s == YoungState::Initialized)
                .map(|(id, _)| *id)
                .collect()
        })
    }

    /// Number of tracked young objects, initialized or not.
    #[must_use]
    pub fn young_count(&self) -> usize {
        self.with_state(0, |state| state.young.len())
    }

    /// Referrers outside the young set holding references into it.
    #[must_use]
    pub fn remembered_set(&self) -> ObjectIdSet {
        self.with_state(ObjectIdSet::new(), |state| {
            state.remembered.keys().copied().collect()
        })
    }

    /// Young references recorded for a remembered referrer.
    #[must_use]
    pub fn remembered_references(&self, referrer: ObjectId) -> Option<ObjectIdSet> {
        self.with_state(None, |state| state.remembered.get(&referrer).cloned())
    }

    /// Drop reclaimed identifiers from every tracked set.
    pub fn remove_garbage(&self, garbage: &ObjectIdSet) {
        self.with_state((), |state| {
            for id in garbage {
                state.remembered.remove(&id);
                state.remove_references_to(id);
            }
        });
    }

    /// Open a monitoring window for a running cycle.
    pub fn start_monitoring_changes(&self) {
        self.with_state((), |state| {
            debug_assert!(!state.monitoring, "young-gen monitoring already started");
            state.monitoring = true;
        });
    }

    /// Close the monitoring window and drop remembered references to objects
    /// that are no longer young.
    pub fn stop_monitoring_changes(&self) {
        self.with_state((), |state| {
            debug_assert!(state.monitoring, "young-gen monitoring not started");
            state.monitoring = false;
            state.prune_remembered();
        });
    }
}
