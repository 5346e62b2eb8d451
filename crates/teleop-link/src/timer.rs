//! Periodic task primitives over an injectable clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use quanta::Instant;

/// Fixed-interval deadline tracker.
///
/// `poll` fires at most once per call; after a long stall the next deadline
/// is rescheduled from `now` instead of firing a burst of catch-up ticks.
/// A new interval takes effect from the next fire, never retroactively.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    next_due: Instant,
}

impl Ticker {
    /// First fire is at `start` (immediately).
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_due: start,
        }
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        let next = self.next_due + self.interval;
        self.next_due = if next <= now { now + self.interval } else { next };
        true
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Time left until the next fire (zero when already due).
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }
}

/// Shared cancellation flag for worker loops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
