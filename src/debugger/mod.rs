//! Debugger context, configuration and server.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use emu_debug_server::{Debugger, DebuggerOptions, SimHost};
//!
//! # async fn example() -> emu_debug_server::Result<()> {
//! let debugger = Debugger::builder()
//!     .host(Arc::new(SimHost::default()))
//!     .options(DebuggerOptions::new().with_port(45000))
//!     .build()?;
//!
//! let server = debugger.serve().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Validated `Debugger` construction |
//! | `core` | Process-wide `Debugger` context |
//! | `options` | Bind address, sub-protocol, close timeout |
//! | `server` | TCP accept loop |

// ============================================================================
// Submodules
// ============================================================================

/// Validated `Debugger` construction.
pub mod builder;

/// Process-wide `Debugger` context.
pub mod core;

/// Bind address, sub-protocol, close timeout.
pub mod options;

/// TCP accept loop.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::DebuggerBuilder;
pub use core::Debugger;
pub use options::DebuggerOptions;
pub use server::DebuggerServer;
