//! Process-wide coordination between sessions and the host.
//!
//! These are the only resources shared across sessions. Everything else a
//! session touches is exclusively its own.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `lifecycle` | Lock serializing debugger activity with host transitions |
//! | `registry` | Live-session count and drain-on-shutdown |

// ============================================================================
// Submodules
// ============================================================================

/// Lock serializing debugger activity with host transitions.
pub mod lifecycle;

/// Live-session count and drain-on-shutdown.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use lifecycle::{LifecycleGuard, LifecycleLock};
pub use registry::{ConnectionRegistry, SessionRegistration};
