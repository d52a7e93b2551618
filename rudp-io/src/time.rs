//! Time utilities for RUDP
//!
//! Retransmission in RUDP only happens when the owner calls into an endpoint,
//! so applications that want resends while their peer is silent tick the
//! endpoint periodically. `Timer` paces that.

use std::time::{Duration, Instant};

/// Milliseconds elapsed between `earlier` and `now`, zero if `now` is older
#[inline]
pub fn millis_since(earlier: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(earlier)
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Timer for periodic operations
///
/// Used for retransmission ticks and statistics output.
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the timer has expired
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.last_fire = Instant::now();
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self) -> Duration {
        self.interval.saturating_sub(self.last_fire.elapsed())
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.reset();
            true
        } else {
            false
        }
    }
}
