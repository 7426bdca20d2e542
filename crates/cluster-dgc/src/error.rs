//! Error types for the collector and its collaborators.
//!
//! Illegal lifecycle transitions are not errors: they are reported as a
//! `false` return so the caller can retry or give up.

use thiserror::Error;

/// Failures reported by an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not serve the request right now.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// Removing a garbage set failed.
    #[error("failed to delete {count} objects: {reason}")]
    DeleteFailed {
        /// Size of the garbage set that was being removed.
        count: usize,
        /// Store-specific description.
        reason: String,
    },

    /// Any other store fault.
    #[error("object store error: {0}")]
    Other(String),
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An enabled collector was configured with a zero interval.
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    /// Throttling requested without a sleep duration.
    #[error("throttle_request_count is set but throttle_interval is zero")]
    ThrottleWithoutInterval,
}

/// Errors returned by collection entry points.
#[derive(Debug, Error)]
pub enum DgcError {
    /// A store fault aborted the cycle. The cycle was recorded as canceled
    /// and nothing was deleted.
    #[error("collection aborted by store fault: {0}")]
    Store(#[from] StoreError),

    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The scheduling thread could not be spawned.
    #[error("failed to spawn the collector thread: {0}")]
    SchedulerSpawn(#[source] std::io::Error),
}
