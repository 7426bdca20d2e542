//! A distributed mark-and-sweep garbage collector for a clustered object
//! server.
//!
//! Objects live in an external store and refer to each other by 64-bit
//! [`ObjectId`]. The collector periodically proves a set of identifiers
//! unreachable from the store's roots and from the references held by
//! connected clients, and asks the store to delete them, while mutators keep
//! writing references concurrently.
//!
//! # Cycle
//!
//! Marking runs concurrently with mutation. Every reference written during
//! the cycle rescues its target. After a first rescue pass the collector asks
//! the mutation path to pause, recomputes the rescue set once more with
//! writers quiesced, and only then deletes the frozen garbage set.
//!
//! Two strategies share the driver:
//!
//! - **Full**: every known object is a candidate.
//! - **Young generation**: only recently created objects are candidates, and
//!   a remembered set stands in for references from evicted objects.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use cluster_dgc::{
//!     DgcConfig, GarbageCollector, InMemoryClientState, InMemoryObjectStore, ObjectId,
//!     ObjectIdSet, Sequence,
//! };
//!
//! let store = Arc::new(InMemoryObjectStore::new());
//! let root = ObjectId::new(1);
//! store.insert(root, [ObjectId::new(2)].into_iter().collect());
//! store.insert(ObjectId::new(2), ObjectIdSet::new());
//! store.insert(ObjectId::new(3), ObjectIdSet::new());
//! store.add_root(root);
//!
//! let collector = Arc::new(
//!     GarbageCollector::new(
//!         DgcConfig { full_gc_enabled: false, ..Default::default() },
//!         store.clone(),
//!         Arc::new(InMemoryClientState::new()),
//!         Arc::new(Sequence::default()),
//!     )
//!     .unwrap(),
//! );
//! store.set_listener(&collector);
//! collector.start().unwrap();
//!
//! let outcome = collector.gc().unwrap();
//! assert_eq!(outcome.info().unwrap().actual_garbage_count, 1);
//! assert!(store.contains(ObjectId::new(2)));
//! assert!(!store.contains(ObjectId::new(3)));
//! ```
//!
//! # Logging
//!
//! All diagnostics go through `tracing`. The crate never installs a
//! subscriber.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
pub mod gc;
pub mod info;
pub mod memory;
pub mod metrics;
pub mod object_id;
pub mod store;
pub mod tracing;

pub use config::DgcConfig;
pub use error::{ConfigError, DgcError, StoreError};
pub use events::{EventPublisher, GarbageCollectorEventListener, ListenerId};
pub use gc::{CycleOutcome, GarbageCollector, GcState, TraversalFilter};
pub use info::{CollectionKind, GarbageCollectionInfo, GcResult, StageTimer};
pub use memory::{InMemoryClientState, InMemoryObjectStore};
pub use metrics::{GcStats, GcStatsListener};
pub use object_id::{ObjectId, ObjectIdSet};
pub use store::{
    ClientStateManager, CycleIdSource, EvictedObject, MutationListener, ObjectStore, PauseHandle,
    Sequence,
};
pub use crate::tracing::GcLogger;
