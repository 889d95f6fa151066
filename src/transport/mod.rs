//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │ Session (Rust)   │        WebSocket         │ Debugger client  │
//! │                  │  debugger.ppsspp.org     │                  │
//! │ Outbox → flush ──┼─────────────────────────►│                  │
//! │ FrameHandler ◄───┼──────────────────────────┤                  │
//! └──────────────────┘                          └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | `Transport` trait and its WebSocket implementation |
//! | `outbox` | Per-session outbound frame queue |
//! | `server` | Sub-protocol negotiated upgrade |

// ============================================================================
// Submodules
// ============================================================================

/// `Transport` trait and its WebSocket implementation.
pub mod connection;

/// Per-session outbound frame queue.
pub mod outbox;

/// Sub-protocol negotiated upgrade.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{DEFAULT_CLOSE_TIMEOUT, FrameHandler, Transport, WebSocketTransport};
pub use outbox::Outbox;
pub use server::{DEFAULT_SUBPROTOCOL, accept_upgrade, is_valid_subprotocol};
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
