//! Outbound error events and severity levels.
//!
//! Every failure the server reports to a client uses one shape:
//!
//! ```json
//! {
//!   "event": "error",
//!   "message": "Bad message: unknown event",
//!   "level": 2,
//!   "ticket": "t1"
//! }
//! ```
//!
//! `ticket` is only present when the inbound message carried one, and is
//! echoed back verbatim (any JSON type).

// ============================================================================
// Imports
// ============================================================================

use serde::{Serialize, Serializer};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Event name of error events.
pub const ERROR_EVENT: &str = "error";

/// Inbound field carrying the event name.
pub const EVENT_FIELD: &str = "event";

/// Inbound field echoed back on responses and errors.
pub const TICKET_FIELD: &str = "ticket";

// ============================================================================
// LogLevel
// ============================================================================

/// Severity carried by error and log events. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Always shown.
    Notice = 1,
    /// Failure.
    Error = 2,
    /// Suspicious but handled.
    Warn = 3,
    /// Informational.
    Info = 4,
    /// Developer detail.
    Debug = 5,
    /// Trace detail.
    Verbose = 6,
}

impl LogLevel {
    /// Returns the wire value (1..=6).
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// One-letter tag used in log headers.
    #[inline]
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Notice => 'N',
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
            Self::Verbose => 'V',
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

// ============================================================================
// ErrorEvent
// ============================================================================

/// An `error` event sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    /// Always [`ERROR_EVENT`].
    event: &'static str,

    /// Human-readable description.
    pub message: String,

    /// Severity.
    pub level: LogLevel,

    /// Echo of the inbound `ticket`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Value>,
}

impl ErrorEvent {
    /// Creates an error event without a ticket.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            event: ERROR_EVENT,
            message: message.into(),
            level,
            ticket: None,
        }
    }

    /// Creates an error event echoing the `ticket` of an inbound root.
    ///
    /// Non-object roots have no ticket.
    #[must_use]
    pub fn for_root(message: impl Into<String>, level: LogLevel, root: &Value) -> Self {
        Self::new(message, level).with_ticket(ticket_of(root))
    }

    /// Sets the echoed ticket.
    #[inline]
    #[must_use]
    pub fn with_ticket(mut self, ticket: Option<Value>) -> Self {
        self.ticket = ticket;
        self
    }
}

/// Extracts the `ticket` field of an inbound root.
#[must_use]
pub fn ticket_of(root: &Value) -> Option<Value> {
    root.get(TICKET_FIELD).cloned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_error_event_shape() {
        let event = ErrorEvent::new("Bad message", LogLevel::Error);
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({"event": "error", "message": "Bad message", "level": 2})
        );
    }

    #[test]
    fn test_error_event_echoes_ticket() {
        let root = json!({"event": "bogus", "ticket": "t1"});
        let event = ErrorEvent::for_root("Bad message: unknown event", LogLevel::Error, &root);
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            value,
            json!({
                "event": "error",
                "message": "Bad message: unknown event",
                "level": 2,
                "ticket": "t1"
            })
        );
    }

    #[test]
    fn test_ticket_keeps_json_type() {
        let root = json!({"ticket": {"seq": 7}});
        assert_eq!(ticket_of(&root), Some(json!({"seq": 7})));
        assert_eq!(ticket_of(&json!([1, 2])), None);
    }

    #[test]
    fn test_log_level_wire_values() {
        let levels = [
            LogLevel::Notice,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Verbose,
        ];
        let values: Vec<u8> = levels.iter().map(|level| level.as_u8()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(serde_json::to_value(LogLevel::Warn).expect("serialize"), json!(3));
        assert!(LogLevel::Notice < LogLevel::Verbose);
    }
}
