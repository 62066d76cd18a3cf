//! Time sources for enqueue and processing timestamps.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::{QueueError, Result};

/// Source of timestamps for the queue.
///
/// Reading the clock may fail; the queue turns a failure into a rejected
/// enqueue or an `Error` result for the affected message.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> Result<Instant>;
}

/// Monotonic clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Instant> {
        Ok(Instant::now())
    }
}

/// Manually driven clock for simulated time.
///
/// Clones share the same time, so a test can keep one handle while the queue
/// owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Rc<ManualClockInner>,
}

#[derive(Debug)]
struct ManualClockInner {
    now: Cell<Instant>,
    failing: Cell<bool>,
}

impl ManualClock {
    /// Create a clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ManualClockInner {
                now: Cell::new(Instant::now()),
                failing: Cell::new(false),
            }),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.inner.now.set(self.inner.now.get() + by);
    }

    /// Move time backward. Real clocks can do this after adjustments.
    pub fn rewind(&self, by: Duration) {
        let now = self.inner.now.get();
        self.inner.now.set(now.checked_sub(by).unwrap_or(now));
    }

    /// Make subsequent reads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.set(failing);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Instant> {
        if self.inner.failing.get() {
            return Err(QueueError::Clock("manual clock set to fail".to_string()));
        }
        Ok(self.inner.now.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now().unwrap();
        let second = clock.now().unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_manual_clock_advance_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now().unwrap();

        handle.advance(Duration::from_secs(2));
        assert_eq!(clock.now().unwrap() - start, Duration::from_secs(2));
    }

    #[test]
    fn test_manual_clock_rewind() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(10));
        let later = clock.now().unwrap();

        clock.rewind(Duration::from_secs(4));
        assert_eq!(later - clock.now().unwrap(), Duration::from_secs(4));
    }

    #[test]
    fn test_manual_clock_failure() {
        let clock = ManualClock::new();
        clock.set_failing(true);
        assert!(matches!(clock.now(), Err(QueueError::Clock(_))));

        clock.set_failing(false);
        assert!(clock.now().is_ok());
    }
}
