//! Emulator debugger server - WebSocket JSON debugging protocol.
//!
//! This library exposes the state of a running host application (an
//! emulated machine) to remote debugging tools over WebSocket.
//!
//! # Architecture
//!
//! - **Host**: the application being debugged, behind the [`Host`] trait
//! - **Session**: one per client connection, a sequential poll loop
//!   interleaving request dispatch with spontaneous broadcasts
//! - **Modules**: [`Subscriber`]s register event handlers,
//!   [`Broadcaster`]s emit events on every poll iteration
//!
//! Key design principles:
//!
//! - Every frame is one JSON object with an `event` name
//! - Debugger activity and host start/stop never overlap (lifecycle lock)
//! - [`Debugger::stop_all`] blocks until every session has closed
//! - Sessions poll at 1 ms after an unfinished request, 1/60 s otherwise
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use emu_debug_server::{Debugger, Result, SimHost};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let host = Arc::new(SimHost::default());
//!     let debugger = Debugger::builder().host(host).build()?;
//!
//!     let server = debugger.serve().await?;
//!     println!("Connect with sub-protocol debugger.ppsspp.org to {}", server.ws_url());
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`coordination`] | Lifecycle lock and connection registry |
//! | [`debugger`] | Debugger context, builder, options and server |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`host`] | [`Host`] trait and the in-memory [`SimHost`] |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`modules`] | Subscriber/broadcaster traits and the default set |
//! | [`protocol`] | Requests, error events, dispatch table |
//! | [`session`] | Per-connection loop |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Lifecycle lock and connection registry.
pub mod coordination;

/// Debugger context, builder, options and server.
///
/// Use [`Debugger::builder()`] to create a configured instance.
pub mod debugger;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Host application interface.
pub mod host;

/// Type-safe identifiers.
pub mod identifiers;

/// Pluggable feature units.
pub mod modules;

/// Debugger protocol message types.
pub mod protocol;

/// Per-connection session loop.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Debugger types
pub use debugger::{Debugger, DebuggerBuilder, DebuggerOptions, DebuggerServer};

// Error types
pub use error::{Error, Result};

// Host types
pub use host::{CoreLifecycle, CoreState, Host, SimHost};

// Identifier types
pub use identifiers::SessionId;

// Module types
pub use modules::{Broadcaster, BroadcasterFactory, Subscriber, SubscriberState};

// Protocol types
pub use protocol::{DispatchTable, ErrorEvent, LogLevel, PendingReply, Request};

// Transport types
pub use transport::{Outbox, Transport};
