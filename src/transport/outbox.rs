//! Per-session outbound frame queue.
//!
//! Handlers and broadcasters never write to the transport directly. They
//! push serialized frames into the session's [`Outbox`]; the session loop
//! drains the queue into the transport between poll iterations. Clones of
//! the outbox (held by [`PendingReply`](crate::protocol::PendingReply)) may
//! enqueue from any thread, and frames keep their enqueue order.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::to_string;
use tokio::sync::mpsc;
use tracing::{trace, warn};

// ============================================================================
// Outbox
// ============================================================================

/// Sending half of a session's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    /// Creates an outbox and the receiver the session drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a raw text frame.
    ///
    /// Returns `false` if the session has already ended.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        let sent = self.tx.send(text.into()).is_ok();
        if !sent {
            trace!("Outbox closed, dropping frame");
        }
        sent
    }

    /// Serializes and queues an event.
    ///
    /// Returns `false` if serialization failed or the session has ended.
    pub fn send_event<T: Serialize>(&self, event: &T) -> bool {
        match to_string(event) {
            Ok(json) => self.send_text(json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound event");
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_frames_keep_order() {
        let (outbox, mut rx) = Outbox::channel();
        assert!(outbox.send_text("one"));
        assert!(outbox.send_event(&json!({"event": "two"})));

        assert_eq!(rx.try_recv().expect("first"), "one");
        assert_eq!(rx.try_recv().expect("second"), r#"{"event":"two"}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_session_end() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        assert!(outbox.tx.is_closed());
        assert!(!outbox.send_text("late"));
    }

    #[test]
    fn test_clones_share_queue() {
        let (outbox, mut rx) = Outbox::channel();
        let clone = outbox.clone();
        std::thread::spawn(move || clone.send_text("from thread"))
            .join()
            .expect("thread");
        assert_eq!(rx.try_recv().expect("frame"), "from thread");
    }
}
