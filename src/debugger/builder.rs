//! Builder pattern for debugger configuration.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use emu_debug_server::{Debugger, DebuggerOptions, SimHost};
//!
//! # fn example() -> emu_debug_server::Result<()> {
//! let debugger = Debugger::builder()
//!     .host(Arc::new(SimHost::default()))
//!     .options(DebuggerOptions::new().with_port(0))
//!     .build()?;
//! assert_eq!(debugger.active_sessions(), 0);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::host::Host;
use crate::modules::{
    BroadcasterFactory, Subscriber, default_broadcasters, default_subscribers,
};
use crate::transport::is_valid_subprotocol;

use super::core::Debugger;
use super::options::DebuggerOptions;

// ============================================================================
// DebuggerBuilder
// ============================================================================

/// Builder for configuring a [`Debugger`] instance.
///
/// Use [`Debugger::builder()`] to create a new builder.
#[derive(Default)]
pub struct DebuggerBuilder {
    /// Application being debugged.
    host: Option<Arc<dyn Host>>,
    /// Network and protocol settings.
    options: DebuggerOptions,
    /// Replaces the default subscriber set.
    subscribers: Option<Vec<Arc<dyn Subscriber>>>,
    /// Replaces the default broadcaster set.
    broadcasters: Option<Vec<BroadcasterFactory>>,
}

impl fmt::Debug for DebuggerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerBuilder")
            .field("host", &self.host.as_ref().map(|host| host.name().to_string()))
            .field("options", &self.options)
            .field("subscribers", &self.subscribers.as_ref().map(Vec::len))
            .field("broadcasters", &self.broadcasters.as_ref().map(Vec::len))
            .finish()
    }
}

// ============================================================================
// DebuggerBuilder Implementation
// ============================================================================

impl DebuggerBuilder {
    /// Creates a new builder with default options and no host.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application being debugged.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets network and protocol options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: DebuggerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the default subscribers. Init order is the vector order.
    #[inline]
    #[must_use]
    pub fn subscribers(mut self, subscribers: Vec<Arc<dyn Subscriber>>) -> Self {
        self.subscribers = Some(subscribers);
        self
    }

    /// Replaces the default broadcasters. Tick order is the vector order.
    #[inline]
    #[must_use]
    pub fn broadcasters(mut self, broadcasters: Vec<BroadcasterFactory>) -> Self {
        self.broadcasters = Some(broadcasters);
        self
    }

    /// Builds the debugger and registers it with the host.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no host is set
    /// - [`Error::Config`] if the sub-protocol is not a valid token
    /// - [`Error::Config`] if the close timeout is zero
    pub fn build(self) -> Result<Debugger> {
        let host = self.host.ok_or_else(|| {
            Error::config(
                "Host is required. Use .host() to set it.\n\
                 Example: Debugger::builder().host(Arc::new(SimHost::default()))",
            )
        })?;
        Self::validate_options(&self.options)?;

        let subscribers = self
            .subscribers
            .unwrap_or_else(|| default_subscribers(&host));
        let broadcasters = self
            .broadcasters
            .unwrap_or_else(|| default_broadcasters(&host));

        Ok(Debugger::new(host, self.options, subscribers, broadcasters))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl DebuggerBuilder {
    fn validate_options(options: &DebuggerOptions) -> Result<()> {
        if !is_valid_subprotocol(&options.subprotocol) {
            return Err(Error::config(format!(
                "Invalid WebSocket sub-protocol: {:?}",
                options.subprotocol
            )));
        }

        if options.close_timeout.is_zero() {
            return Err(Error::config("Close timeout must be greater than zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
