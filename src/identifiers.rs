//! Type-safe identifiers.
//!
//! Session IDs are process-unique and used to correlate log lines emitted
//! by one connection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// SessionId
// ============================================================================

/// Counter backing [`SessionId::next`].
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one debugger session (one WebSocket connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    /// Allocates the next process-unique session ID.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        // Starts at 1 and would need 2^64 sessions to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
