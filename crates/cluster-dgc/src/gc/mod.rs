//! Collection machinery.
//!
//! - [`lifecycle`]: the collector's state machine and blocking waits
//! - [`hook`]: full and young-generation strategies
//! - [`algorithm`]: the mark-and-sweep cycle driver
//! - [`collector`]: the public facade
//! - [`scheduler`]: the dedicated collection thread
//! - [`change`], [`young`], [`filter`], [`throttle`]: supporting pieces

pub mod algorithm;
pub mod change;
pub mod collector;
pub mod filter;
pub mod hook;
pub mod lifecycle;
pub mod scheduler;
pub mod throttle;
pub mod young;

pub use algorithm::{collect, CycleOutcome, MarkAndSweep};
pub use change::{ChangeCollector, NewReferenceCollector, ReferenceMonitor};
pub use collector::GarbageCollector;
pub use filter::TraversalFilter;
pub use hook::{GcContext, GcHook};
pub use lifecycle::{GcState, LifecycleState};
pub use scheduler::{GarbageCollectorThread, Schedule};
pub use throttle::RequestThrottler;
pub use young::{YoungGenState, YoungGenTracker};
