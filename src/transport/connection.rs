//! Message-duplex transport and its WebSocket implementation.
//!
//! The session loop drives a [`Transport`] by polling it with a timeout.
//! Inbound frames are delivered to a [`FrameHandler`] during
//! [`Transport::process`]; the loop never reads frames itself.
//!
//! # Polling
//!
//! `process` waits up to `timeout` for the first frame, then delivers
//! every further frame that is already buffered without waiting again.
//! It returns `false` once the connection is gone, whatever the cause:
//! peer close, I/O error, or an initiated close that completed or timed
//! out.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout as with_timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace};

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for the peer to answer an initiated close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reason text sent with server-initiated closes.
const CLOSE_REASON: &str = "Debugger stopping";

// ============================================================================
// FrameHandler
// ============================================================================

/// Receives inbound frames during [`Transport::process`].
pub trait FrameHandler {
    /// A text frame arrived.
    fn on_text(&mut self, text: &str);

    /// A binary frame arrived.
    fn on_binary(&mut self, data: &[u8]);
}

// ============================================================================
// Transport
// ============================================================================

/// A message-oriented duplex connection owned by one session.
///
/// Resources are released on drop.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text frame. Failures surface as a closed transport on the
    /// next [`process`](Self::process).
    async fn send_text(&mut self, text: String);

    /// Processes pending I/O for up to `timeout`, delivering inbound frames
    /// to `handler`. Returns `false` once the transport is closed.
    async fn process(&mut self, timeout: Duration, handler: &mut (dyn FrameHandler + Send))
    -> bool;

    /// Initiates an orderly close with `code`.
    async fn close(&mut self, code: CloseCode);
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] over an upgraded WebSocket stream.
pub struct WebSocketTransport<S = TcpStream> {
    /// Upgraded stream.
    stream: WebSocketStream<S>,
    /// Cleared once the connection is gone.
    open: bool,
    /// Set when either side started the close handshake.
    closing_since: Option<Instant>,
    /// Time allowed for the close handshake.
    close_timeout: Duration,
}

impl<S> std::fmt::Debug for WebSocketTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("open", &self.open)
            .field("closing", &self.closing_since.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an upgraded stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self {
            stream,
            open: true,
            closing_since: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Sets how long an initiated close may wait for the peer.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Returns `true` until the connection is gone.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    fn mark_closed(&mut self) -> bool {
        self.open = false;
        false
    }

    /// Dispatches one inbound message.
    fn deliver(&mut self, message: Message, handler: &mut (dyn FrameHandler + Send)) {
        match message {
            Message::Text(text) => handler.on_text(text.as_str()),
            Message::Binary(data) => handler.on_binary(&data),
            Message::Close(frame) => {
                debug!(?frame, "WebSocket close received");
                // The close reply is queued by tungstenite; the stream ends
                // once it has been flushed.
                self.closing_since.get_or_insert_with(Instant::now);
            }
            // Ping/Pong are answered by tungstenite.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, text: String) {
        if !self.open || self.closing_since.is_some() {
            trace!("Dropping frame on closing transport");
            return;
        }

        if let Err(e) = self.stream.send(Message::Text(text.into())).await {
            debug!(error = %e, "WebSocket send failed");
            self.open = false;
        }
    }

    async fn process(
        &mut self,
        timeout: Duration,
        handler: &mut (dyn FrameHandler + Send),
    ) -> bool {
        if !self.open {
            return false;
        }

        if let Some(since) = self.closing_since
            && since.elapsed() >= self.close_timeout
        {
            debug!("WebSocket close handshake timed out");
            return self.mark_closed();
        }

        let mut next = match with_timeout(timeout, self.stream.next()).await {
            Ok(next) => next,
            Err(_) => return true,
        };

        loop {
            match next {
                Some(Ok(message)) => self.deliver(message, handler),
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read failed");
                    return self.mark_closed();
                }
                None => {
                    debug!("WebSocket stream ended");
                    return self.mark_closed();
                }
            }

            // Deliver whatever else is already buffered without waiting.
            match self.stream.next().now_or_never() {
                Some(more) => next = more,
                None => return true,
            }
        }
    }

    async fn close(&mut self, code: CloseCode) {
        if !self.open || self.closing_since.is_some() {
            return;
        }
        self.closing_since = Some(Instant::now());

        let frame = CloseFrame {
            code,
            reason: CLOSE_REASON.into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            debug!(error = %e, "WebSocket close failed");
            self.open = false;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
