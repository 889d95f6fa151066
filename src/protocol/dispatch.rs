//! Per-session event dispatch table.
//!
//! Maps inbound event names to handlers. A table is built fresh for every
//! session while its subscribers initialize, and is read-only afterwards:
//! the running session only ever holds `&DispatchTable`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;

use super::Request;

// ============================================================================
// Types
// ============================================================================

/// Handler invoked for one inbound event.
///
/// Runs with the lifecycle lock held. It may answer the request, fail it,
/// or leave it unfinished.
pub type EventHandler = Box<dyn Fn(&mut Request<'_>) + Send + Sync>;

// ============================================================================
// DispatchTable
// ============================================================================

/// Event name → handler mapping of one session.
#[derive(Default)]
pub struct DispatchTable {
    handlers: FxHashMap<String, EventHandler>,
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("DispatchTable")
            .field("events", &events)
            .finish()
    }
}

impl DispatchTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`.
    ///
    /// Event names are unique per session; registering one twice is a bug
    /// in the subscriber set.
    pub fn add<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: Fn(&mut Request<'_>) + Send + Sync + 'static,
    {
        let event = event.into();
        let previous = self.handlers.insert(event.clone(), Box::new(handler));
        debug_assert!(previous.is_none(), "event {event} registered twice");
    }

    /// Looks up the handler for `event`.
    #[inline]
    #[must_use]
    pub fn get(&self, event: &str) -> Option<&EventHandler> {
        self.handlers.get(event)
    }

    /// Returns `true` if `event` has a handler.
    #[inline]
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Returns the number of registered events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no event is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
