//! Inbound frame handling for one session.
//!
//! | Frame | Outcome |
//! |-------|---------|
//! | text, not JSON | `error` "Bad message: invalid JSON" |
//! | text, no string `event` | `error` "Bad message: no event property" (ticket echoed) |
//! | text, unregistered `event` | `error` "Bad message: unknown event" (ticket echoed) |
//! | text, registered `event` | handler runs under the lifecycle lock |
//! | binary | `error` "Bad message" |
//!
//! All of these errors are sent at level 2 (error).

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::{debug, trace};

use crate::coordination::LifecycleLock;
use crate::identifiers::SessionId;
use crate::protocol::event::EVENT_FIELD;
use crate::protocol::{DispatchTable, ErrorEvent, LogLevel, Request};
use crate::transport::{FrameHandler, Outbox};

use super::PollCadence;

// ============================================================================
// Constants
// ============================================================================

/// Text frame that is not valid JSON.
pub const INVALID_JSON: &str = "Bad message: invalid JSON";

/// JSON root without a string `event` field.
pub const NO_EVENT_PROPERTY: &str = "Bad message: no event property";

/// `event` with no registered handler.
pub const UNKNOWN_EVENT: &str = "Bad message: unknown event";

/// Binary frames are not part of the protocol.
pub const BINARY_FRAME: &str = "Bad message";

// ============================================================================
// Dispatcher
// ============================================================================

/// Frame callbacks of one session, borrowed for one poll.
pub struct Dispatcher<'s> {
    session_id: SessionId,
    table: &'s DispatchTable,
    outbox: &'s Outbox,
    lifecycle: &'s LifecycleLock,
    cadence: &'s mut PollCadence,
}

impl<'s> Dispatcher<'s> {
    /// Borrows the session parts frame handling needs.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        table: &'s DispatchTable,
        outbox: &'s Outbox,
        lifecycle: &'s LifecycleLock,
        cadence: &'s mut PollCadence,
    ) -> Self {
        Self {
            session_id,
            table,
            outbox,
            lifecycle,
            cadence,
        }
    }

    fn send_error(&self, error: ErrorEvent) {
        self.outbox.send_event(&error);
    }
}

impl FrameHandler for Dispatcher<'_> {
    fn on_text(&mut self, text: &str) {
        let root: Value = match serde_json::from_str(text) {
            Ok(root) => root,
            Err(e) => {
                debug!(session_id = %self.session_id, error = %e, "Inbound frame is not JSON");
                self.send_error(ErrorEvent::new(INVALID_JSON, LogLevel::Error));
                return;
            }
        };

        let Some(event) = root.get(EVENT_FIELD).and_then(Value::as_str) else {
            self.send_error(ErrorEvent::for_root(NO_EVENT_PROPERTY, LogLevel::Error, &root));
            return;
        };
        let event = event.to_string();

        let Some(handler) = self.table.get(&event) else {
            debug!(session_id = %self.session_id, %event, "Unknown event");
            Request::new(event, self.outbox, root).fail(UNKNOWN_EVENT);
            return;
        };

        trace!(session_id = %self.session_id, %event, "Dispatching");
        let mut request = Request::new(event, self.outbox, root);
        {
            let _guard = self.lifecycle.guard();
            handler(&mut request);
        }

        if !request.is_finished() {
            self.cadence.burst();
        }
    }

    fn on_binary(&mut self, data: &[u8]) {
        debug!(session_id = %self.session_id, len = data.len(), "Binary frame rejected");
        self.send_error(ErrorEvent::new(BINARY_FRAME, LogLevel::Error));
    }
}

// ============================================================================
// Tests
// ============================================================================
