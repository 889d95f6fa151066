//! Per-connection debugger session.
//!
//! # Loop
//!
//! ```text
//! open:    register → create broadcasters → init subscribers (each locked)
//! loop:    process(timeout) ── frames ──► Dispatcher (handler locked)
//!          lock { broadcast all; read stop flag }
//!          flush outbox → transport
//!          stop flag? close(GOING_AWAY) once
//!          activity -= 1
//! drop:    shutdown subscribers (each locked) → unregister
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `cadence` | Adaptive poll timeout |
//! | `core` | `Session` open, loop and teardown |
//! | `dispatcher` | Inbound frame callbacks |

// ============================================================================
// Submodules
// ============================================================================

/// Adaptive poll timeout.
pub mod cadence;

/// Session open, loop and teardown.
pub mod core;

/// Inbound frame callbacks.
pub mod dispatcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use cadence::{BURST_ITERATIONS, FAST_POLL, PollCadence, SLOW_POLL};
pub use core::{Session, SessionContext};
pub use dispatcher::Dispatcher;
