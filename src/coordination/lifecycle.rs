//! Lock serializing debugger activity with host start/stop transitions.
//!
//! The host holds the lock from the moment a transition begins
//! (`Starting`, `Stopping`) until it completes (`StartComplete`,
//! `Stopped`). Debugger code takes the same lock around every dispatch,
//! every broadcast tick and every subscriber init/shutdown, so:
//!
//! - a transition never begins while debugger code touches host state,
//! - debugger code never runs while a transition is in progress.
//!
//! Begin and end of a transition arrive as two separate listener calls,
//! possibly on different threads, so the host side keeps an owned
//! [`ArcMutexGuard`] between them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, MutexGuard, RawMutex};
use tracing::{debug, warn};

use crate::host::CoreLifecycle;

// ============================================================================
// Types
// ============================================================================

/// Guard held by debugger activity for its whole duration.
pub type LifecycleGuard<'a> = MutexGuard<'a, ()>;

// ============================================================================
// LifecycleLock
// ============================================================================

/// Process-wide lifecycle lock.
#[derive(Default)]
pub struct LifecycleLock {
    /// The lock itself.
    lock: Arc<Mutex<()>>,
    /// Guard owned by the host while a transition is in progress.
    host_guard: Mutex<Option<ArcMutexGuard<RawMutex, ()>>>,
}

impl fmt::Debug for LifecycleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleLock")
            .field("host_transitioning", &self.is_host_transitioning())
            .finish_non_exhaustive()
    }
}

impl LifecycleLock {
    /// Creates an unlocked lifecycle lock.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for one unit of debugger activity.
    ///
    /// Blocks while a host transition is in progress.
    #[inline]
    pub fn guard(&self) -> LifecycleGuard<'_> {
        self.lock.lock()
    }

    /// Returns `true` while the host is between a transition's begin and end.
    #[inline]
    #[must_use]
    pub fn is_host_transitioning(&self) -> bool {
        self.host_guard.lock().is_some()
    }

    /// Host lifecycle listener body.
    ///
    /// `active_sessions` only affects logging.
    pub fn on_lifecycle(&self, stage: CoreLifecycle, active_sessions: usize) {
        if stage.begins_transition() {
            self.begin_transition(stage, active_sessions);
        } else {
            self.end_transition(stage, active_sessions);
        }
    }

    fn begin_transition(&self, stage: CoreLifecycle, active_sessions: usize) {
        if self.is_host_transitioning() {
            warn!(?stage, "Lifecycle transition already in progress, ignoring");
            return;
        }

        if active_sessions > 0 {
            debug!(?stage, active_sessions, "Waiting for debugger activity to complete");
        }

        let guard = self.lock.lock_arc();
        *self.host_guard.lock() = Some(guard);
    }

    fn end_transition(&self, stage: CoreLifecycle, active_sessions: usize) {
        let released = self.host_guard.lock().take();
        if released.is_none() {
            warn!(?stage, "Lifecycle transition ended without a matching begin");
            return;
        }
        drop(released);

        if active_sessions > 0 {
            debug!(?stage, active_sessions, "Debugger resumed after lifecycle transition");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
