//! Rate limiting of reference expansion against the store.
//!
//! Every call that asks the store for an object's outgoing references goes
//! through the throttler. After every Nth call it sleeps, bounding how hard a
//! cycle competes with foreground traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::DgcConfig;

/// Process-wide request throttler.
#[derive(Debug)]
pub struct RequestThrottler {
    requests: AtomicU64,
    every: u64,
    sleep: Duration,
}

impl RequestThrottler {
    /// Build a throttler from the configured request count and interval.
    #[must_use]
    pub const fn new(config: &DgcConfig) -> Self {
        Self::with_limits(config.throttle_request_count, config.throttle_interval)
    }

    /// Sleep `sleep` after every `every` requests. Zero disables throttling.
    #[must_use]
    pub const fn with_limits(every: u64, sleep: Duration) -> Self {
        Self {
            requests: AtomicU64::new(0),
            every,
            sleep,
        }
    }

    /// Count one request, sleeping if it completes a batch.
    ///
    /// Returns `true` if the caller was put to sleep.
    pub fn throttle(&self) -> bool {
        let count = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        if self.every == 0 || count % self.every != 0 || self.sleep.is_zero() {
            return false;
        }
        std::thread::sleep(self.sleep);
        true
    }

    /// Run `request` after counting it.
    pub fn run<T>(&self, request: impl FnOnce() -> T) -> T {
        self.throttle();
        request()
    }

    /// Total requests counted since creation.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_disabled_never_sleeps() {
        let throttler = RequestThrottler::new(&DgcConfig::default());
        for _ in 0..1_000 {
            assert!(!throttler.throttle());
        }
        assert_eq!(throttler.request_count(), 1_000);
    }

    #[test]
    fn test_sleeps_every_nth_request() {
        let throttler = RequestThrottler::with_limits(3, Duration::from_millis(5));
        let start = Instant::now();
        let slept: Vec<bool> = (0..6).map(|_| throttler.throttle()).collect();
        assert_eq!(slept, vec![false, false, true, false, false, true]);
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_run_returns_request_value() {
        let throttler = RequestThrottler::with_limits(1, Duration::from_millis(1));
        assert_eq!(throttler.run(|| 42), 42);
        assert_eq!(throttler.request_count(), 1);
    }
}
