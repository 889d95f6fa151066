//! TCP accept loop spawning one session task per client.
//!
//! # Shutdown
//!
//! [`DebuggerServer::shutdown`] stops accepting, then drains live sessions
//! with [`Debugger::stop_all`]. Dropping the server only stops accepting.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::core::Debugger;

// ============================================================================
// Constants
// ============================================================================

/// How often the accept loop checks its shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// DebuggerServer
// ============================================================================

/// A bound, accepting debugger server.
pub struct DebuggerServer {
    /// Context handed to every session.
    debugger: Debugger,
    /// Actual bound address.
    local_addr: SocketAddr,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
    /// Accept loop task, taken by `shutdown`.
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DebuggerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerServer")
            .field("local_addr", &self.local_addr)
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DebuggerServer - Constructor
// ============================================================================

impl DebuggerServer {
    /// Binds the debugger's configured address and starts the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(debugger: Debugger) -> Result<Self> {
        let listener = TcpListener::bind(debugger.options().socket_addr()).await?;
        let local_addr = listener.local_addr()?;

        debug!(port = local_addr.port(), "Debugger server bound");

        let shutdown = Arc::new(AtomicBool::new(false));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            debugger.clone(),
            Arc::clone(&shutdown),
        ));

        info!(%local_addr, "Debugger server started");

        Ok(Self {
            debugger,
            local_addr,
            shutdown,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }
}

// ============================================================================
// DebuggerServer - Public API
// ============================================================================

impl DebuggerServer {
    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a WebSocket URL clients can connect to.
    ///
    /// An unspecified bind address is reported as `127.0.0.1`.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let ip = if self.local_addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.local_addr.ip()
        };
        format!("ws://{}", SocketAddr::new(ip, self.port()))
    }

    /// Returns the debugger context.
    #[inline]
    #[must_use]
    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// Stops accepting clients and closes every live session.
    ///
    /// Returns once no session is left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the drain task panicked.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);

        let accept_task = self.accept_task.lock().take();
        if let Some(task) = accept_task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        let debugger = self.debugger.clone();
        tokio::task::spawn_blocking(move || debugger.stop_all())
            .await
            .map_err(|e| Error::connection(format!("Session drain failed: {e}")))?;

        info!("Debugger server shutdown complete");
        Ok(())
    }
}

impl Drop for DebuggerServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Accept Loop
// ============================================================================

async fn accept_loop(listener: TcpListener, debugger: Debugger, shutdown: Arc<AtomicBool>) {
    debug!("Accept loop started");

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("Accept loop shutting down");
            break;
        }

        // Accept with timeout to allow checking the shutdown flag
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, addr))) => {
                debug!(?addr, "New TCP connection");
                let debugger = debugger.clone();
                tokio::spawn(async move {
                    if let Err(e) = debugger.handle_connection(stream).await {
                        if e.is_handshake_error() {
                            debug!(error = %e, ?addr, "Rejected non-debugger client");
                        } else if e.is_connection_error() {
                            debug!(error = %e, ?addr, "Client dropped during upgrade");
                        } else {
                            warn!(error = %e, ?addr, "Connection handling failed");
                        }
                    }
                });
            }
            Ok(Err(e)) => {
                error!(error = %e, "Accept failed");
            }
            Err(_) => continue,
        }
    }

    debug!("Accept loop terminated");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    use crate::host::{GameInfo, Host, SimHost};
    use crate::protocol::LogLevel;
    use crate::transport::DEFAULT_SUBPROTOCOL;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const WAIT: Duration = Duration::from_secs(5);

    async fn start() -> (Arc<SimHost>, DebuggerServer) {
        let sim = Arc::new(SimHost::new("SimHost", "9.9"));
        let debugger = Debugger::builder().host(sim.clone()).build().expect("build");
        let server = debugger.serve().await.expect("serve");
        (sim, server)
    }

    async fn connect(server: &DebuggerServer) -> Client {
        let mut request = server.ws_url().into_client_request().expect("request");
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(DEFAULT_SUBPROTOCOL));
        let (client, _) = tokio_tungstenite::connect_async(request)
            .await
            .expect("connect");
        client
    }

    /// Reads JSON frames until one satisfies `matches`.
    async fn next_matching(client: &mut Client, matches: impl Fn(&Value) -> bool) -> Value {
        timeout(WAIT, async {
            loop {
                match client.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let value: Value = serde_json::from_str(text.as_str()).expect("json");
                        if matches(&value) {
                            return value;
                        }
                    }
                    Some(Ok(_)) => {}
                    other => panic!("connection ended: {other:?}"),
                }
            }
        })
        .await
        .expect("timed out waiting for frame")
    }

    async fn wait_for_sessions(server: &DebuggerServer, count: usize) {
        timeout(WAIT, async {
            while server.debugger().active_sessions() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session count");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ws_url_format() {
        let (_sim, server) = start().await;
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_version_and_unknown_event() {
        let (_sim, server) = start().await;
        let mut client = connect(&server).await;

        client
            .send(Message::Text(r#"{"event":"version","ticket":1}"#.into()))
            .await
            .expect("send");
        let reply = next_matching(&mut client, |v| v["event"] == "version").await;
        assert_eq!(
            reply,
            json!({"event": "version", "ticket": 1, "name": "SimHost", "version": "9.9"})
        );

        client
            .send(Message::Text(r#"{"event":"bogus","ticket":"t1"}"#.into()))
            .await
            .expect("send");
        let reply = next_matching(&mut client, |v| v["event"] == "error").await;
        assert_eq!(
            reply,
            json!({"event": "error", "message": "Bad message: unknown event", "level": 2, "ticket": "t1"})
        );

        client
            .send(Message::Binary(vec![0u8; 4].into()))
            .await
            .expect("send");
        let reply = next_matching(&mut client, |v| v["event"] == "error").await;
        assert_eq!(reply["message"], "Bad message");

        client.close(None).await.expect("close");
        wait_for_sessions(&server, 0).await;
        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_broadcasts_reach_client() {
        let (sim, server) = start().await;
        let mut client = connect(&server).await;
        wait_for_sessions(&server, 1).await;

        let boot_sim = Arc::clone(&sim);
        tokio::task::spawn_blocking(move || {
            boot_sim.boot(
                GameInfo {
                    id: "TEST00001".into(),
                    version: "1.00".into(),
                    title: "Test".into(),
                },
                0x100,
            );
        })
        .await
        .expect("boot");

        let start = next_matching(&mut client, |v| v["event"] == "game.start").await;
        assert_eq!(start["game"]["id"], "TEST00001");

        sim.log(LogLevel::Warn, "HLE", "hello");
        let log = next_matching(&mut client, |v| v["event"] == "log" && v["channel"] == "HLE").await;
        assert_eq!(log["message"], "hello");
        assert_eq!(log["level"], 3);

        client
            .send(Message::Text(r#"{"event":"cpu.stepping"}"#.into()))
            .await
            .expect("send");
        let stepping = next_matching(&mut client, |v| v["event"] == "cpu.stepping").await;
        assert_eq!(stepping["pc"], 0x100);
        assert_eq!(sim.core_state(), crate::host::CoreState::Stepping);

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_closes_sessions_with_going_away() {
        let (_sim, server) = start().await;
        let mut first = connect(&server).await;
        let mut second = connect(&server).await;
        wait_for_sessions(&server, 2).await;

        let clients = tokio::spawn(async move {
            let mut codes = Vec::new();
            for client in [&mut first, &mut second] {
                loop {
                    match client.next().await {
                        Some(Ok(Message::Close(frame))) => {
                            codes.push(frame.map(|frame| frame.code));
                            break;
                        }
                        Some(Ok(_)) => {}
                        _ => {
                            codes.push(None);
                            break;
                        }
                    }
                }
            }
            // Let tungstenite answer the close handshakes.
            for client in [&mut first, &mut second] {
                while let Some(Ok(_)) = client.next().await {}
            }
            codes
        });

        timeout(WAIT, server.shutdown())
            .await
            .expect("drain timed out")
            .expect("shutdown");
        assert_eq!(server.debugger().active_sessions(), 0);

        let codes = clients.await.expect("clients");
        assert_eq!(codes, vec![Some(CloseCode::Away), Some(CloseCode::Away)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_host_shutdown_with_live_session() {
        let (sim, server) = start().await;
        let _client = connect(&server).await;
        wait_for_sessions(&server, 1).await;

        let lifecycle_sim = Arc::clone(&sim);
        timeout(
            WAIT,
            tokio::task::spawn_blocking(move || {
                lifecycle_sim.boot(
                    GameInfo {
                        id: "TEST00001".into(),
                        version: "1.00".into(),
                        title: "Test".into(),
                    },
                    0,
                );
                lifecycle_sim.shutdown();
            }),
        )
        .await
        .expect("lifecycle blocked")
        .expect("lifecycle");

        assert!(sim.game().is_none());
        assert!(!server.debugger().lifecycle().is_host_transitioning());
        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rejects_client_without_subprotocol() {
        let (_sim, server) = start().await;

        let result = tokio_tungstenite::connect_async(server.ws_url()).await;
        assert!(result.is_err());
        assert_eq!(server.debugger().active_sessions(), 0);

        server.shutdown().await.expect("shutdown");
    }
}
