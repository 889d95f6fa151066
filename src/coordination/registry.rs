//! Live-session registry and drain-on-shutdown.
//!
//! Counts live sessions and carries the process-wide stop flag. Both live
//! behind one lock with a condition variable that is signalled on every
//! change, which is what [`ConnectionRegistry::stop_all`] waits on.
//!
//! # Drain Sequence
//!
//! ```text
//! stop_all()                         session loop (each)
//!   stop_requested = true
//!   wait ──────────────┐             sees stop flag on next iteration
//!                      │             closes transport with GOING_AWAY
//!                      │             tears down, drops registration
//!   woken, count == 0 ◄┘             ── count -= 1, notify_all
//!   stop_requested = false
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

// ============================================================================
// RegistryState
// ============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    connected: usize,
    stop_requested: bool,
}

// ============================================================================
// ConnectionRegistry
// ============================================================================

/// Process-wide session count and stop coordination.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    changed: Condvar,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live session until the returned guard is dropped.
    #[must_use = "the session is unregistered when the guard drops"]
    pub fn register(&self) -> SessionRegistration<'_> {
        self.update(|count| count + 1);
        SessionRegistration { registry: self }
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn active(&self) -> usize {
        self.state.lock().connected
    }

    /// Returns `true` while a [`stop_all`](Self::stop_all) is draining.
    #[inline]
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.lock().stop_requested
    }

    /// Asks every live session to close and blocks until none is left.
    ///
    /// Returns immediately when no session is live. There is no timeout:
    /// on return the session count is zero. The stop flag is cleared before
    /// returning, so the call can be repeated.
    pub fn stop_all(&self) {
        let mut state = self.state.lock();
        if state.connected > 0 {
            info!(sessions = state.connected, "Stopping all debugger sessions");
        }

        while state.connected != 0 {
            state.stop_requested = true;
            self.changed.wait(&mut state);
        }

        state.stop_requested = false;
        debug!("All debugger sessions stopped");
    }

    fn update(&self, apply: impl FnOnce(usize) -> usize) {
        let mut state = self.state.lock();
        state.connected = apply(state.connected);
        self.changed.notify_all();
    }
}

// ============================================================================
// SessionRegistration
// ============================================================================

/// Keeps one session counted in its [`ConnectionRegistry`].
///
/// Dropping it (including during unwinding) unregisters the session and
/// wakes drain waiters.
#[derive(Debug)]
pub struct SessionRegistration<'a> {
    registry: &'a ConnectionRegistry,
}

impl Drop for SessionRegistration<'_> {
    fn drop(&mut self) {
        self.registry.update(|count| count.saturating_sub(1));
    }
}

// ============================================================================
// Tests
// ============================================================================
