//! Stepping and run control.
//!
//! | Event | Direction | Payload |
//! |-------|-----------|---------|
//! | `cpu.stepInto` | request | none; answered by `cpu.stepping` |
//! | `cpu.runUntil` | request | `address`; answered by `cpu.stepping` when reached |
//! | `cpu.stepping` | broadcast | `{pc, ticks}` on every break or step |
//! | `cpu.resume` | broadcast | `{}` when execution continues |
//!
//! Temporary breakpoints set by `cpu.runUntil` belong to the session that
//! set them and are removed when it closes.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::json;
use tracing::debug;

use crate::host::{CoreState, Host};
use crate::protocol::{DispatchTable, Request};
use crate::transport::Outbox;

use super::{
    Broadcaster, Subscriber, SubscriberState, add_host_handler, ensure_started, ensure_stepping,
};

// ============================================================================
// SteppingSubscriber
// ============================================================================

/// Temporary breakpoints owned by one session.
type OwnedBreakpoints = Arc<Mutex<FxHashSet<u32>>>;

/// Registers `cpu.stepInto` and `cpu.runUntil`.
pub struct SteppingSubscriber {
    host: Arc<dyn Host>,
}

impl SteppingSubscriber {
    /// Creates the subscriber for `host`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Subscriber for SteppingSubscriber {
    fn name(&self) -> &'static str {
        "stepping"
    }

    fn init(&self, table: &mut DispatchTable) -> Option<SubscriberState> {
        add_host_handler(table, &self.host, "cpu.stepInto", step_into);

        let owned = OwnedBreakpoints::default();
        let host = Arc::clone(&self.host);
        let handler_owned = Arc::clone(&owned);
        table.add("cpu.runUntil", move |request: &mut Request<'_>| {
            run_until(host.as_ref(), &handler_owned, request);
        });

        Some(Box::new(owned))
    }

    fn shutdown(&self, state: Option<SubscriberState>) {
        let Some(owned) = state.and_then(|state| state.downcast::<OwnedBreakpoints>().ok()) else {
            return;
        };

        for address in owned.lock().drain() {
            if self.host.has_temp_breakpoint(address) {
                debug!(address, "Removing session breakpoint");
                self.host.remove_temp_breakpoint(address);
            }
        }
    }
}

fn step_into(host: &dyn Host, request: &mut Request<'_>) {
    if !ensure_started(host, request) || !ensure_stepping(host, request) {
        return;
    }
    host.step_into();
}

fn run_until(host: &dyn Host, owned: &OwnedBreakpoints, request: &mut Request<'_>) {
    if !ensure_started(host, request) {
        return;
    }
    let Some(address) = request.param_u32("address") else {
        return;
    };

    host.add_temp_breakpoint(address);
    {
        let mut owned = owned.lock();
        // Forget breakpoints the host already consumed.
        owned.retain(|&kept| host.has_temp_breakpoint(kept));
        owned.insert(address);
    }

    if host.core_state() == CoreState::Stepping {
        host.request_stepping(false);
    }
}

// ============================================================================
// SteppingBroadcaster
// ============================================================================

/// Emits `cpu.stepping` / `cpu.resume` on core state changes.
pub struct SteppingBroadcaster {
    host: Arc<dyn Host>,
    was_stepping: bool,
    last_counter: Option<u64>,
}

impl SteppingBroadcaster {
    /// Creates a broadcaster that has not seen a break yet.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            was_stepping: false,
            last_counter: None,
        }
    }
}

impl Broadcaster for SteppingBroadcaster {
    fn broadcast(&mut self, outbox: &Outbox) {
        match self.host.core_state() {
            CoreState::Stepping => {
                let counter = self.host.stepping_counter();
                if !self.was_stepping || self.last_counter != Some(counter) {
                    outbox.send_event(&json!({
                        "event": "cpu.stepping",
                        "pc": self.host.pc(),
                        "ticks": self.host.ticks(),
                    }));
                }
                self.was_stepping = true;
                self.last_counter = Some(counter);
            }
            CoreState::Running => {
                if self.was_stepping {
                    outbox.send_event(&json!({ "event": "cpu.resume" }));
                }
                self.was_stepping = false;
            }
            CoreState::PowerDown => self.was_stepping = false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
