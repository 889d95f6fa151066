//! Adaptive poll timeout.
//!
//! A request left unfinished by its handler usually means the reply is
//! produced shortly by another thread. The session then polls at 1 ms for
//! [`BURST_ITERATIONS`] iterations so the reply goes out promptly, and
//! otherwise settles at one frame (1/60 s).

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Poll timeout while the activity counter is positive.
pub const FAST_POLL: Duration = Duration::from_millis(1);

/// Poll timeout while idle.
pub const SLOW_POLL: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Activity counter value after an unfinished dispatch.
pub const BURST_ITERATIONS: u32 = 1000;

// ============================================================================
// PollCadence
// ============================================================================

/// Activity counter of one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence {
    activity: u32,
}

impl PollCadence {
    /// Creates an idle cadence.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { activity: 0 }
    }

    /// Starts (or restarts) a fast-poll burst.
    #[inline]
    pub fn burst(&mut self) {
        self.activity = BURST_ITERATIONS;
    }

    /// Ends one loop iteration.
    #[inline]
    pub fn tick(&mut self) {
        self.activity = self.activity.saturating_sub(1);
    }

    /// Timeout for the next poll.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        if self.activity > 0 { FAST_POLL } else { SLOW_POLL }
    }

    /// Remaining fast iterations.
    #[inline]
    #[must_use]
    pub const fn activity(&self) -> u32 {
        self.activity
    }
}

// ============================================================================
// Tests
// ============================================================================
