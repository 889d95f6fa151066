//! Debugger server configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use emu_debug_server::DebuggerOptions;
//!
//! let options = DebuggerOptions::new()
//!     .with_port(45000)
//!     .with_close_timeout(Duration::from_secs(2));
//!
//! assert_eq!(options.socket_addr().port(), 45000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::transport::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_SUBPROTOCOL};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address.
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

// ============================================================================
// DebuggerOptions
// ============================================================================

/// Network and protocol settings of a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerOptions {
    /// Address the server listens on.
    pub bind_ip: IpAddr,

    /// Port the server listens on, 0 for any free port.
    pub port: u16,

    /// WebSocket sub-protocol clients must offer.
    pub subprotocol: String,

    /// Time allowed for a client to answer a server-initiated close.
    pub close_timeout: Duration,
}

impl Default for DebuggerOptions {
    fn default() -> Self {
        Self {
            bind_ip: DEFAULT_BIND_IP,
            port: 0,
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl DebuggerOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the address the server binds to.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl DebuggerOptions {
    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the required sub-protocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.subprotocol = subprotocol.into();
        self
    }

    /// Sets the close handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
