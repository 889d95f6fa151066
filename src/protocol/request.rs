//! Inbound requests and their replies.
//!
//! A [`Request`] lives for exactly one handler call. The handler either
//! answers it ([`Request::respond`] / [`Request::fail`]) or leaves it
//! unfinished, optionally taking a [`PendingReply`] to complete it later
//! from other code.
//!
//! # Response Format
//!
//! Responses reuse the inbound event name and echo the ticket:
//!
//! ```json
//! { "event": "cpu.getReg", "ticket": 12, "category": 0, "register": 3, "uintValue": 7 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};
use tracing::warn;

use crate::transport::Outbox;

use super::event::{ErrorEvent, EVENT_FIELD, LogLevel, TICKET_FIELD, ticket_of};

// ============================================================================
// Request
// ============================================================================

/// One inbound message being dispatched.
#[derive(Debug)]
pub struct Request<'a> {
    /// Event name from the inbound `event` field.
    event: String,

    /// Reply channel of the owning session.
    outbox: &'a Outbox,

    /// Parsed inbound JSON root.
    data: Value,

    /// Echo of the inbound `ticket`.
    ticket: Option<Value>,

    /// Set once a terminal response or error was sent.
    finished: bool,
}

impl<'a> Request<'a> {
    /// Creates a request for a parsed inbound root.
    #[must_use]
    pub fn new(event: impl Into<String>, outbox: &'a Outbox, data: Value) -> Self {
        let ticket = ticket_of(&data);
        Self {
            event: event.into(),
            outbox,
            data,
            ticket,
            finished: false,
        }
    }

    /// Returns the event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns the parsed inbound root.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Returns the inbound ticket, if any.
    #[inline]
    #[must_use]
    pub fn ticket(&self) -> Option<&Value> {
        self.ticket.as_ref()
    }

    /// Returns `true` once the request has been answered.
    ///
    /// A request left unanswered by its handler is still pending: the
    /// handler started work whose result shows up later as a spontaneous
    /// event or through a [`PendingReply`].
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Sends the response. `fields` must be a JSON object (or `null`).
    pub fn respond(&mut self, fields: Value) {
        if !self.begin_terminal() {
            return;
        }
        self.outbox
            .send_event(&envelope(&self.event, self.ticket.as_ref(), fields));
    }

    /// Sends a response with no fields besides `event` and `ticket`.
    #[inline]
    pub fn respond_empty(&mut self) {
        self.respond(Value::Null);
    }

    /// Fails the request with an error-level event.
    #[inline]
    pub fn fail(&mut self, message: impl Into<String>) {
        self.fail_with(message, LogLevel::Error);
    }

    /// Fails the request with an explicit severity.
    pub fn fail_with(&mut self, message: impl Into<String>, level: LogLevel) {
        if !self.begin_terminal() {
            return;
        }
        self.outbox
            .send_event(&ErrorEvent::new(message, level).with_ticket(self.ticket.clone()));
    }

    /// Detaches a completion handle.
    ///
    /// The request itself stays unfinished, which keeps the session polling
    /// at its fast cadence for a while.
    #[must_use]
    pub fn defer(&self) -> PendingReply {
        PendingReply {
            event: self.event.clone(),
            ticket: self.ticket.clone(),
            outbox: self.outbox.clone(),
        }
    }

    fn begin_terminal(&mut self) -> bool {
        debug_assert!(!self.finished, "request {} answered twice", self.event);
        if self.finished {
            warn!(event = %self.event, "Request already answered");
            return false;
        }
        self.finished = true;
        true
    }
}

// ============================================================================
// Request - Parameters
// ============================================================================

impl Request<'_> {
    /// Returns an optional string parameter.
    #[must_use]
    pub fn optional_str(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    /// Reads a required string parameter, failing the request if absent.
    pub fn param_str(&mut self, name: &str) -> Option<String> {
        match self.data.get(name) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.fail(format!("Invalid '{name}' parameter type"));
                None
            }
            None => {
                self.fail(format!("Missing '{name}' parameter"));
                None
            }
        }
    }

    /// Reads a required `u32` parameter, failing the request if absent.
    ///
    /// Accepts a JSON number or a decimal / `0x`-prefixed string.
    pub fn param_u32(&mut self, name: &str) -> Option<u32> {
        if self.data.get(name).is_none() {
            self.fail(format!("Missing '{name}' parameter"));
            return None;
        }
        self.read_u32(name)
    }

    /// Reads an optional `u32` parameter.
    ///
    /// Returns `Some(default)` when absent; fails the request and returns
    /// `None` when present but invalid.
    pub fn optional_u32(&mut self, name: &str, default: u32) -> Option<u32> {
        if self.data.get(name).is_none() {
            return Some(default);
        }
        self.read_u32(name)
    }

    fn read_u32(&mut self, name: &str) -> Option<u32> {
        let parsed = self.data.get(name).and_then(parse_u32);
        if parsed.is_none() {
            self.fail(format!("Invalid '{name}' parameter: expected unsigned 32-bit value"));
        }
        parsed
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// Completion handle for a request answered after its handler returned.
///
/// Consumed by answering, so a request is answered at most once. Dropping
/// it without answering is allowed.
#[derive(Debug)]
pub struct PendingReply {
    event: String,
    ticket: Option<Value>,
    outbox: Outbox,
}

impl PendingReply {
    /// Returns the event name being answered.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Sends the response. Returns `false` if the session has ended.
    pub fn respond(self, fields: Value) -> bool {
        self.outbox
            .send_event(&envelope(&self.event, self.ticket.as_ref(), fields))
    }

    /// Fails the request. Returns `false` if the session has ended.
    pub fn fail(self, message: impl Into<String>) -> bool {
        self.outbox
            .send_event(&ErrorEvent::new(message, LogLevel::Error).with_ticket(self.ticket))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds a response object: `event`, then `ticket`, then handler fields.
fn envelope(event: &str, ticket: Option<&Value>, fields: Value) -> Value {
    debug_assert!(
        matches!(fields, Value::Object(_) | Value::Null),
        "response fields must be an object"
    );

    let mut object = Map::new();
    object.insert(EVENT_FIELD.to_string(), Value::String(event.to_string()));
    if let Some(ticket) = ticket {
        object.insert(TICKET_FIELD.to_string(), ticket.clone());
    }

    match fields {
        Value::Object(fields) => {
            for (key, value) in fields {
                if key != EVENT_FIELD && key != TICKET_FIELD {
                    object.insert(key, value);
                }
            }
        }
        Value::Null => {}
        _ => warn!(event, "Dropping non-object response fields"),
    }

    Value::Object(object)
}

/// Parses a `u32` from a JSON number or a decimal / hex string.
fn parse_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
