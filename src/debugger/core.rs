//! Process-wide debugger context.
//!
//! A [`Debugger`] owns everything sessions share: the host, the lifecycle
//! lock, the connection registry and the module set. It is cheap to clone;
//! clones share the same context.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use emu_debug_server::{Debugger, SimHost};
//!
//! # async fn example() -> emu_debug_server::Result<()> {
//! let debugger = Debugger::builder().host(Arc::new(SimHost::default())).build()?;
//! let server = debugger.serve().await?;
//! println!("Debugger listening on {}", server.ws_url());
//!
//! // Later, from the host side:
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::coordination::{ConnectionRegistry, LifecycleLock};
use crate::error::Result;
use crate::host::Host;
use crate::modules::{BroadcasterFactory, Subscriber};
use crate::session::{Session, SessionContext};
use crate::transport::{Transport, WebSocketTransport, accept_upgrade};

use super::builder::DebuggerBuilder;
use super::options::DebuggerOptions;
use super::server::DebuggerServer;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the debugger.
pub(crate) struct DebuggerInner {
    /// Application being debugged.
    pub host: Arc<dyn Host>,

    /// Network and protocol settings.
    pub options: DebuggerOptions,

    /// Shared with the host lifecycle listener.
    pub lifecycle: Arc<LifecycleLock>,

    /// Shared with the host lifecycle listener.
    pub registry: Arc<ConnectionRegistry>,

    /// Subscribers, in init order.
    pub subscribers: Vec<Arc<dyn Subscriber>>,

    /// Broadcaster factories, in tick order.
    pub broadcasters: Vec<BroadcasterFactory>,
}

// ============================================================================
// Debugger
// ============================================================================

/// Debugger context shared by all sessions.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use emu_debug_server::{Debugger, SimHost};
///
/// let debugger = Debugger::builder()
///     .host(Arc::new(SimHost::default()))
///     .build()
///     .unwrap();
///
/// // No sessions: returns immediately.
/// debugger.stop_all();
/// ```
#[derive(Clone)]
pub struct Debugger {
    pub(crate) inner: Arc<DebuggerInner>,
}

impl fmt::Debug for Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debugger")
            .field("host", &self.inner.host.name())
            .field("options", &self.inner.options)
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Debugger - Constructor
// ============================================================================

impl Debugger {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> DebuggerBuilder {
        DebuggerBuilder::new()
    }

    /// Creates the context and installs the lifecycle listener with the host.
    ///
    /// The listener is installed exactly once per context.
    pub(crate) fn new(
        host: Arc<dyn Host>,
        options: DebuggerOptions,
        subscribers: Vec<Arc<dyn Subscriber>>,
        broadcasters: Vec<BroadcasterFactory>,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleLock::new());
        let registry = Arc::new(ConnectionRegistry::new());

        {
            let lifecycle = Arc::clone(&lifecycle);
            let registry = Arc::clone(&registry);
            host.listen_lifecycle(Box::new(move |stage| {
                lifecycle.on_lifecycle(stage, registry.active());
            }));
        }

        debug!(
            host = host.name(),
            subscribers = subscribers.len(),
            broadcasters = broadcasters.len(),
            "Debugger created"
        );

        Self {
            inner: Arc::new(DebuggerInner {
                host,
                options,
                lifecycle,
                registry,
                subscribers,
                broadcasters,
            }),
        }
    }
}

// ============================================================================
// Debugger - Accessors
// ============================================================================

impl Debugger {
    /// Returns the application being debugged.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    /// Returns the configured options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &DebuggerOptions {
        &self.inner.options
    }

    /// Returns the lifecycle lock shared with the host.
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleLock {
        &self.inner.lifecycle
    }

    /// Returns the number of live sessions.
    #[inline]
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.inner.registry.active()
    }

    /// Returns the number of subscribers each session initializes.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Returns the number of broadcasters each session runs.
    #[inline]
    #[must_use]
    pub fn broadcaster_count(&self) -> usize {
        self.inner.broadcasters.len()
    }

    fn context(&self) -> SessionContext<'_> {
        SessionContext {
            lifecycle: &self.inner.lifecycle,
            registry: &self.inner.registry,
            subscribers: &self.inner.subscribers,
            broadcasters: &self.inner.broadcasters,
        }
    }
}

// ============================================================================
// Debugger - Sessions
// ============================================================================

impl Debugger {
    /// Upgrades `stream` and runs a session on it until it closes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`](crate::Error::Handshake) if the client
    /// was refused, or [`Error::WebSocket`](crate::Error::WebSocket) if the
    /// upgrade failed. No session is created in either case.
    pub async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let peer = stream.peer_addr().ok();
        let ws = accept_upgrade(stream, &self.inner.options.subprotocol)
            .await
            .inspect_err(|e| debug!(?peer, error = %e, "Debugger upgrade failed"))?;

        info!(?peer, "Debugger client connected");
        let transport =
            WebSocketTransport::new(ws).with_close_timeout(self.inner.options.close_timeout);
        self.run_session(transport).await;
        Ok(())
    }

    /// Runs a session over an already established transport.
    ///
    /// Returns once the transport has closed and the session is torn down.
    pub async fn run_session<T: Transport>(&self, transport: T) {
        Session::open(self.context(), transport).run().await;
    }

    /// Asks every live session to close and blocks until none is left.
    ///
    /// This blocks the calling thread. From async code, call it through
    /// [`tokio::task::spawn_blocking`].
    pub fn stop_all(&self) {
        self.inner.registry.stop_all();
    }

    /// Binds the configured address and starts accepting clients.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn serve(&self) -> Result<DebuggerServer> {
        DebuggerServer::bind(self.clone()).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::host::{CoreLifecycle, GameInfo, SimHost};

    fn game() -> GameInfo {
        GameInfo {
            id: "TEST00001".into(),
            version: "1.00".into(),
            title: "Test".into(),
        }
    }

    #[test]
    fn test_lifecycle_listener_is_installed() {
        let sim = Arc::new(SimHost::default());
        let debugger = Debugger::builder().host(sim.clone()).build().expect("build");

        let guard = debugger.lifecycle().guard();
        std::thread::scope(|scope| {
            let booting = scope.spawn(|| sim.boot(game(), 0));
            std::thread::sleep(Duration::from_millis(50));
            assert!(!booting.is_finished(), "boot ran during debugger activity");
            drop(guard);
        });

        assert!(sim.game().is_some());
        assert!(!debugger.lifecycle().is_host_transitioning());
    }

    #[test]
    fn test_clones_share_context() {
        let debugger = Debugger::builder()
            .host(Arc::new(SimHost::default()))
            .build()
            .expect("build");
        let clone = debugger.clone();

        debugger.lifecycle().on_lifecycle(CoreLifecycle::Stopping, 0);
        assert!(clone.lifecycle().is_host_transitioning());
        clone.lifecycle().on_lifecycle(CoreLifecycle::Stopped, 0);
        assert!(!debugger.lifecycle().is_host_transitioning());
    }

    #[test]
    fn test_stop_all_without_sessions() {
        let debugger = Debugger::builder()
            .host(Arc::new(SimHost::default()))
            .build()
            .expect("build");
        debugger.stop_all();
        assert_eq!(debugger.active_sessions(), 0);
    }
}
