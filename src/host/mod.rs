//! Host application interface.
//!
//! The debugger never owns the emulated machine. Everything it observes or
//! mutates goes through the [`Host`] trait, which the embedding application
//! implements.
//!
//! # Lifecycle
//!
//! The host announces start/stop transitions through a single listener
//! registered with [`Host::listen_lifecycle`]:
//!
//! ```text
//! Starting ──► StartComplete ──► (running) ──► Stopping ──► Stopped
//!    ▲                                                         │
//!    └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners are invoked synchronously on the transitioning thread.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `sim` | In-memory reference host |

// ============================================================================
// Submodules
// ============================================================================

/// In-memory reference host.
pub mod sim;

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use tokio::sync::broadcast;

use crate::protocol::LogLevel;

// ============================================================================
// Re-exports
// ============================================================================

pub use sim::SimHost;

// ============================================================================
// CoreLifecycle
// ============================================================================

/// Host start/stop transition stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreLifecycle {
    /// A game is about to boot.
    Starting,
    /// Boot finished, the core is running.
    StartComplete,
    /// The running game is about to shut down.
    Stopping,
    /// Shutdown finished.
    Stopped,
}

impl CoreLifecycle {
    /// Returns `true` for the stages that open a transition.
    #[inline]
    #[must_use]
    pub const fn begins_transition(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }
}

/// Callback invoked on every lifecycle stage.
pub type LifecycleListener = Box<dyn Fn(CoreLifecycle) + Send + Sync>;

// ============================================================================
// CoreState
// ============================================================================

/// Execution state of the emulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreState {
    /// No game loaded.
    PowerDown,
    /// Executing freely.
    Running,
    /// Halted in the debugger (break, step or breakpoint hit).
    Stepping,
}

impl CoreState {
    /// Returns `true` while a game is loaded.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::PowerDown)
    }
}

// ============================================================================
// Data Types
// ============================================================================

/// Metadata of the loaded game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameInfo {
    /// Product ID.
    pub id: String,
    /// Product version.
    pub version: String,
    /// Display title.
    pub title: String,
}

/// One named CPU register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    /// Register name, e.g. `r3` or `pc`.
    pub name: String,
    /// Current value.
    pub value: u32,
}

/// A group of registers (general purpose, special, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterCategory {
    /// Category index, stable for the host's lifetime.
    pub id: usize,
    /// Category display name.
    pub name: String,
    /// Registers in index order.
    pub registers: Vec<Register>,
}

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Address of the instruction.
    pub address: u32,
    /// Encoded size in bytes.
    pub size: u32,
    /// Disassembly text.
    pub text: String,
}

/// One host log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Host-formatted timestamp.
    pub timestamp: String,
    /// Host-formatted line header.
    pub header: String,
    /// Message body.
    pub message: String,
    /// Severity.
    pub level: LogLevel,
    /// Log channel name.
    pub channel: String,
}

// ============================================================================
// Host
// ============================================================================

/// The application being debugged.
///
/// Implementations must be cheap to query: broadcasters call into the host
/// on every poll iteration of every session. State-mutating calls are only
/// made while the debugger holds the lifecycle lock.
pub trait Host: Send + Sync {
    /// Registers the lifecycle listener. Called once per debugger context.
    fn listen_lifecycle(&self, listener: LifecycleListener);

    /// Returns a fresh receiver for host log lines.
    fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry>;

    /// Host application name.
    fn name(&self) -> &str;

    /// Host application version.
    fn version(&self) -> &str;

    /// Loaded game, if any.
    fn game(&self) -> Option<GameInfo>;

    /// Whether the host UI is paused (menu open).
    fn is_paused(&self) -> bool {
        false
    }

    /// CPU execution state.
    fn core_state(&self) -> CoreState;

    /// Incremented every time the core enters the stepping state.
    fn stepping_counter(&self) -> u64;

    /// Executed CPU cycles since boot.
    fn ticks(&self) -> u64;

    /// Current program counter.
    fn pc(&self) -> u32;

    /// Snapshot of all registers.
    fn registers(&self) -> Vec<RegisterCategory>;

    /// Writes one register. Returns `false` for an invalid location.
    fn set_register(&self, category: usize, index: usize, value: u32) -> bool;

    /// Disassembles the instruction at `address`, `None` if unmapped.
    fn disassemble(&self, address: u32) -> Option<Instruction>;

    /// Changes whenever memory is written other than by executing code
    /// (debugger writes, loaders, patches).
    ///
    /// Cached disassembly is keyed on it. A host that cannot track writes
    /// keeps the default; its listings then refresh only when the core
    /// executes or steps.
    fn memory_generation(&self) -> u64 {
        0
    }

    /// Requests a break (`true`) or a resume (`false`).
    fn request_stepping(&self, stepping: bool);

    /// Executes one instruction while stepping.
    fn step_into(&self);

    /// Adds a breakpoint that removes itself when hit.
    fn add_temp_breakpoint(&self, address: u32);

    /// Removes a temporary breakpoint if still present.
    fn remove_temp_breakpoint(&self, address: u32);

    /// Returns `true` if a temporary breakpoint is set at `address`.
    fn has_temp_breakpoint(&self, address: u32) -> bool;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begins_transition() {
        assert!(CoreLifecycle::Starting.begins_transition());
        assert!(CoreLifecycle::Stopping.begins_transition());
        assert!(!CoreLifecycle::StartComplete.begins_transition());
        assert!(!CoreLifecycle::Stopped.begins_transition());
    }

    #[test]
    fn test_core_state_is_active() {
        assert!(!CoreState::PowerDown.is_active());
        assert!(CoreState::Running.is_active());
        assert!(CoreState::Stepping.is_active());
    }

    #[test]
    fn test_game_info_serialization() {
        let game = GameInfo {
            id: "ULUS10000".into(),
            version: "1.00".into(),
            title: "Demo".into(),
        };
        let value = serde_json::to_value(&game).expect("serialize");
        assert_eq!(value["id"], "ULUS10000");
        assert_eq!(value["title"], "Demo");
    }
}
