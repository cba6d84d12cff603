//! Wall-clock abstraction.
//!
//! Every timestamp the queue writes (creation, update, retry, and the due
//! time of scheduled retries) is unix seconds read from a [`Clock`], so
//! tests and simulations can move time forward without sleeping.

use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time in unix seconds.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current time.
    fn current(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A manually driven clock.
///
/// Clones share the same time.
///
/// # Example
///
/// ```
/// use relq::clock::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::new(1_000);
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(clock.current(), 1_060);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Arc<AtomicI64>,
}

impl MockClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn current(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.current() > 1_577_836_800);
    }

    #[test]
    fn test_mock_clock_shared_between_clones() {
        let clock = MockClock::new(10);
        let other = clock.clone();

        other.advance(Duration::from_secs(5));
        assert_eq!(clock.current(), 15);

        clock.set(100);
        assert_eq!(other.current(), 100);
    }
}
