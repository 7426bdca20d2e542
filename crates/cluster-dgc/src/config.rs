//! Collector configuration.
//!
//! A [`DgcConfig`] is built once at startup and shared by reference with every
//! component; nothing reads process-wide statics.

use std::time::Duration;

use crate::error::ConfigError;

/// Default period between full collections.
pub const DEFAULT_FULL_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Default period between young-generation collections.
pub const DEFAULT_YOUNG_GC_INTERVAL: Duration = Duration::from_secs(60);
/// Default throttler sleep.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(10);
/// Default wake-up period of blocking lifecycle waits.
pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Default number of cycles kept by the statistics listener.
pub const DEFAULT_STATS_HISTORY_LEN: usize = 16;

/// Configuration for the distributed garbage collector.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cluster_dgc::DgcConfig;
///
/// let config = DgcConfig {
///     young_gc_enabled: true,
///     young_gc_interval: Duration::from_secs(30),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert!(config.young_gen_scheduled());
/// ```
#[derive(Debug, Clone)]
pub struct DgcConfig {
    /// Whether the scheduling thread runs periodic full collections.
    pub full_gc_enabled: bool,
    /// Period between full collections.
    pub full_gc_interval: Duration,
    /// Whether young-generation tracking and collection are enabled.
    pub young_gc_enabled: bool,
    /// Period between young-generation collections.
    pub young_gc_interval: Duration,
    /// Log every lifecycle stage at `info` instead of `debug`.
    pub verbose: bool,
    /// Sleep applied by the request throttler.
    pub throttle_interval: Duration,
    /// Sleep after every Nth reference expansion. Zero disables throttling.
    pub throttle_request_count: u64,
    /// Wake-up period of blocking lifecycle waits, used for progress logging.
    pub wait_poll_interval: Duration,
    /// Number of completed cycles kept by the statistics listener.
    pub stats_history_len: usize,
}

impl Default for DgcConfig {
    fn default() -> Self {
        Self {
            full_gc_enabled: true,
            full_gc_interval: DEFAULT_FULL_GC_INTERVAL,
            young_gc_enabled: false,
            young_gc_interval: DEFAULT_YOUNG_GC_INTERVAL,
            verbose: false,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            throttle_request_count: 0,
            wait_poll_interval: DEFAULT_WAIT_POLL_INTERVAL,
            stats_history_len: DEFAULT_STATS_HISTORY_LEN,
        }
    }
}

impl DgcConfig {
    /// Check that enabled features carry usable values.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.full_gc_enabled && self.full_gc_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("full_gc_interval"));
        }
        if self.young_gc_enabled && self.young_gc_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("young_gc_interval"));
        }
        if self.wait_poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("wait_poll_interval"));
        }
        if self.throttle_request_count > 0 && self.throttle_interval.is_zero() {
            return Err(ConfigError::ThrottleWithoutInterval);
        }
        Ok(())
    }

    /// Whether the scheduler should interleave young collections.
    ///
    /// Young cycles only run when enabled and more frequent than full cycles.
    #[must_use]
    pub fn young_gen_scheduled(&self) -> bool {
        self.young_gc_enabled && self.young_gc_interval < self.full_gc_interval
    }

    /// Whether the throttler ever sleeps.
    #[must_use]
    pub const fn throttle_enabled(&self) -> bool {
        self.throttle_request_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DgcConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.young_gen_scheduled());
        assert!(!config.throttle_enabled());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config = DgcConfig {
            full_gc_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval("full_gc_interval"))
        );

        // A disabled collector may carry any interval.
        let config = DgcConfig {
            full_gc_enabled: false,
            full_gc_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = DgcConfig {
            throttle_request_count: 10,
            throttle_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ThrottleWithoutInterval));
    }

    #[test]
    fn test_young_not_scheduled_when_slower_than_full() {
        let config = DgcConfig {
            young_gc_enabled: true,
            young_gc_interval: Duration::from_secs(120),
            full_gc_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(!config.young_gen_scheduled());
    }
}
