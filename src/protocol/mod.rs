//! Debugger protocol message types.
//!
//! Every frame is a single JSON object with an `event` name.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | request | Client → Server | `{"event": "name", "ticket"?: any, ...params}` |
//! | response | Server → Client | Same `event` name, echoed `ticket`, result fields |
//! | spontaneous | Server → Client | Broadcast events (`log`, `game.start`, `cpu.stepping`, ...) |
//! | error | Server → Client | `{"event": "error", "message", "level", "ticket"?}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatch` | Event name → handler table |
//! | `event` | Error events and severity levels |
//! | `request` | Inbound request and deferred replies |

// ============================================================================
// Submodules
// ============================================================================

/// Event name → handler table.
pub mod dispatch;

/// Error events and severity levels.
pub mod event;

/// Inbound request and deferred replies.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{DispatchTable, EventHandler};
pub use event::{ErrorEvent, LogLevel};
pub use request::{PendingReply, Request};
