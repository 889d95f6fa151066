//! Pluggable feature units attached to every session.
//!
//! Two kinds of modules extend a session:
//!
//! | Kind | Lifetime | Role |
//! |------|----------|------|
//! | [`Subscriber`] | shared by all sessions | Registers event handlers, may keep per-session state |
//! | [`Broadcaster`] | one instance per session | Emits spontaneous events every poll iteration |
//!
//! # Default Set
//!
//! | Module | Subscriber | Broadcaster |
//! |--------|------------|-------------|
//! | `cpu` | `cpu.*` core and register access | |
//! | `disasm` | `memory.disasm` | |
//! | `game` | `version`, `game.status` | `game.start`, `game.quit` |
//! | `stepping` | `cpu.stepInto`, `cpu.runUntil` | `cpu.stepping`, `cpu.resume` |
//! | `log` | | `log` |

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::sync::Arc;

use crate::host::{CoreState, Host};
use crate::protocol::{DispatchTable, Request};
use crate::transport::Outbox;

// ============================================================================
// Submodules
// ============================================================================

/// CPU core and register access.
pub mod cpu;

/// Disassembly.
pub mod disasm;

/// Host and game information.
pub mod game;

/// Host log forwarding.
pub mod log;

/// Stepping and run control.
pub mod stepping;

// ============================================================================
// Types
// ============================================================================

/// Opaque per-session state produced by [`Subscriber::init`].
///
/// Only the producing subscriber downcasts it.
pub type SubscriberState = Box<dyn Any + Send>;

/// Creates one broadcaster instance for a new session.
pub type BroadcasterFactory = Box<dyn Fn() -> Box<dyn Broadcaster> + Send + Sync>;

// ============================================================================
// Subscriber
// ============================================================================

/// Feature unit that registers event handlers.
///
/// `init` and `shutdown` both run with the lifecycle lock held.
pub trait Subscriber: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Registers handlers into a fresh session table.
    ///
    /// Returns the session state handed back to [`shutdown`](Self::shutdown).
    fn init(&self, table: &mut DispatchTable) -> Option<SubscriberState>;

    /// Releases session state.
    ///
    /// The default covers subscribers without a shutdown routine, which
    /// never produce state.
    fn shutdown(&self, state: Option<SubscriberState>) {
        debug_assert!(
            state.is_none(),
            "subscriber {} produced state without a shutdown routine",
            self.name()
        );
    }
}

// ============================================================================
// Broadcaster
// ============================================================================

/// Per-session emitter of spontaneous events.
///
/// Called on every poll iteration with the lifecycle lock held, so it must
/// return quickly.
pub trait Broadcaster: Send {
    /// Queues whatever changed since the previous call.
    fn broadcast(&mut self, outbox: &Outbox);
}

// ============================================================================
// Handler Helpers
// ============================================================================

/// Handler body that only needs the host.
pub(crate) type HostHandler = fn(&dyn Host, &mut Request<'_>);

/// Registers `handler` for `event`, bound to `host`.
pub(crate) fn add_host_handler(
    table: &mut DispatchTable,
    host: &Arc<dyn Host>,
    event: &str,
    handler: HostHandler,
) {
    let host = Arc::clone(host);
    table.add(event, move |request: &mut Request<'_>| {
        handler(host.as_ref(), request);
    });
}

/// Fails `request` with "CPU not started" unless a game is running.
pub(crate) fn ensure_started(host: &dyn Host, request: &mut Request<'_>) -> bool {
    if host.core_state() == CoreState::PowerDown {
        request.fail("CPU not started");
        return false;
    }
    true
}

/// Fails `request` with "CPU not stepping" unless the core is stepping.
pub(crate) fn ensure_stepping(host: &dyn Host, request: &mut Request<'_>) -> bool {
    if host.core_state() != CoreState::Stepping {
        request.fail("CPU not stepping");
        return false;
    }
    true
}

// ============================================================================
// Default Set
// ============================================================================

/// Default subscribers, in init order.
#[must_use]
pub fn default_subscribers(host: &Arc<dyn Host>) -> Vec<Arc<dyn Subscriber>> {
    let cpu: Arc<dyn Subscriber> = Arc::new(cpu::CpuSubscriber::new(Arc::clone(host)));
    let disasm: Arc<dyn Subscriber> = Arc::new(disasm::DisasmSubscriber::new(Arc::clone(host)));
    let game: Arc<dyn Subscriber> = Arc::new(game::GameSubscriber::new(Arc::clone(host)));
    let stepping: Arc<dyn Subscriber> =
        Arc::new(stepping::SteppingSubscriber::new(Arc::clone(host)));
    vec![cpu, disasm, game, stepping]
}

/// Default broadcaster factories, in tick order.
#[must_use]
pub fn default_broadcasters(host: &Arc<dyn Host>) -> Vec<BroadcasterFactory> {
    let log_host = Arc::clone(host);
    let game_host = Arc::clone(host);
    let stepping_host = Arc::clone(host);

    let log: BroadcasterFactory = Box::new(move || -> Box<dyn Broadcaster> {
        Box::new(log::LogBroadcaster::new(log_host.as_ref()))
    });
    let game: BroadcasterFactory = Box::new(move || -> Box<dyn Broadcaster> {
        Box::new(game::GameBroadcaster::new(Arc::clone(&game_host)))
    });
    let stepping: BroadcasterFactory = Box::new(move || -> Box<dyn Broadcaster> {
        Box::new(stepping::SteppingBroadcaster::new(Arc::clone(&stepping_host)))
    });
    vec![log, game, stepping]
}

// ============================================================================
// Tests
// ============================================================================
