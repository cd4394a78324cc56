//! Retransmission timer
//!
//! The timer is a plain deadline consulted by the blocking reads of the
//! protocol loops; nothing fires asynchronously. Each [`RetryTimer::arm`]
//! hands out a [`TimerToken`] tagged with a generation number and every
//! [`RetryTimer::cancel`] bumps the generation, so a token from an operation
//! that has already concluded can never be observed as expired.

use std::time::{Duration, Instant};

/// Proof that the timer was armed by a particular operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    generation: u64,
}

/// Deadline-based retransmission timer for one outstanding frame
#[derive(Debug, Clone)]
pub struct RetryTimer {
    timeout: Duration,
    deadline: Option<Instant>,
    generation: u64,
    fired: u32,
}

impl RetryTimer {
    /// Create a disarmed timer
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            generation: 0,
            fired: 0,
        }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm the timer for one timeout period starting now
    pub fn arm(&mut self) -> TimerToken {
        self.deadline = Some(Instant::now() + self.timeout);
        TimerToken {
            generation: self.generation,
        }
    }

    /// Disarm the timer and invalidate every outstanding token
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Deadline for the current blocking read, `None` when disarmed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the timer is armed
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Record an expiry observed by the holder of `token`
    ///
    /// Returns `false` for a stale token; the timer is left untouched then.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        if token.generation != self.generation || self.deadline.is_none() {
            return false;
        }
        self.deadline = None;
        self.fired += 1;
        true
    }

    /// Number of expiries recorded since the last [`RetryTimer::reset_count`]
    pub fn fired(&self) -> u32 {
        self.fired
    }

    /// Start a fresh retry budget for a new frame
    pub fn reset_count(&mut self) {
        self.cancel();
        self.fired = 0;
    }
}
