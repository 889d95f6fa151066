//! In-memory reference host.
//!
//! [`SimHost`] models just enough of an emulated machine to exercise the
//! whole protocol: a game slot, sixteen general purpose registers plus
//! `pc`, word-addressed memory, a run/step state machine with temporary
//! breakpoints and a log stream.
//!
//! It drives its lifecycle listeners exactly like a real host would:
//! [`SimHost::boot`] and [`SimHost::shutdown`] bracket their state changes
//! with `Starting`/`StartComplete` and `Stopping`/`Stopped`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::LogLevel;

use super::{
    CoreLifecycle, CoreState, GameInfo, Host, Instruction, LifecycleListener, LogEntry, Register,
    RegisterCategory,
};

// ============================================================================
// Constants
// ============================================================================

/// Log lines buffered per subscriber before it lags.
const LOG_CAPACITY: usize = 1024;

/// Number of general purpose registers.
const GPR_COUNT: usize = 16;

/// Register category holding `r0..r15`.
const CATEGORY_GPR: usize = 0;

/// Register category holding `pc`.
const CATEGORY_SPECIAL: usize = 1;

/// Width of one instruction.
const INSTRUCTION_SIZE: u32 = 4;

// ============================================================================
// SimState
// ============================================================================

/// Mutable machine state.
#[derive(Debug)]
struct SimState {
    game: Option<GameInfo>,
    core: CoreState,
    paused: bool,
    stepping_counter: u64,
    ticks: u64,
    gpr: [u32; GPR_COUNT],
    pc: u32,
    memory: FxHashMap<u32, u32>,
    memory_generation: u64,
    temp_breakpoints: FxHashSet<u32>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            game: None,
            core: CoreState::PowerDown,
            paused: false,
            stepping_counter: 0,
            ticks: 0,
            gpr: [0; GPR_COUNT],
            pc: 0,
            memory: FxHashMap::default(),
            memory_generation: 0,
            temp_breakpoints: FxHashSet::default(),
        }
    }
}

impl SimState {
    fn enter_stepping(&mut self) {
        self.core = CoreState::Stepping;
        self.stepping_counter += 1;
    }

    fn execute_one(&mut self) {
        self.pc = self.pc.wrapping_add(INSTRUCTION_SIZE);
        self.ticks += 1;
    }
}

// ============================================================================
// SimHost
// ============================================================================

/// In-memory emulated machine implementing [`Host`].
pub struct SimHost {
    name: String,
    version: String,
    started_at: Instant,
    state: Mutex<SimState>,
    listeners: Mutex<Vec<LifecycleListener>>,
    logs: broadcast::Sender<LogEntry>,
}

impl std::fmt::Debug for SimHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimHost")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new("SimHost", env!("CARGO_PKG_VERSION"))
    }
}

// ============================================================================
// SimHost - Control
// ============================================================================

impl SimHost {
    /// Creates a powered-down host.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let (logs, _) = broadcast::channel(LOG_CAPACITY);
        Self {
            name: name.into(),
            version: version.into(),
            started_at: Instant::now(),
            state: Mutex::new(SimState::default()),
            listeners: Mutex::new(Vec::new()),
            logs,
        }
    }

    /// Boots `game` with execution starting at `entry`.
    ///
    /// Blocks in the `Starting` notification until debugger activity in
    /// flight has released the lifecycle lock.
    pub fn boot(&self, game: GameInfo, entry: u32) {
        self.notify(CoreLifecycle::Starting);
        {
            let mut state = self.state.lock();
            let memory = std::mem::take(&mut state.memory);
            let memory_generation = state.memory_generation;
            *state = SimState {
                game: Some(game),
                core: CoreState::Running,
                pc: entry,
                memory,
                memory_generation,
                ..SimState::default()
            };
        }
        self.notify(CoreLifecycle::StartComplete);
        self.log(LogLevel::Info, "BOOT", format!("Booted at 0x{entry:08x}"));
    }

    /// Shuts the running game down.
    pub fn shutdown(&self) {
        self.notify(CoreLifecycle::Stopping);
        {
            let mut state = self.state.lock();
            state.game = None;
            state.core = CoreState::PowerDown;
            state.paused = false;
            state.temp_breakpoints.clear();
        }
        self.notify(CoreLifecycle::Stopped);
        self.log(LogLevel::Info, "BOOT", "Shut down");
    }

    /// Runs up to `count` instructions. Returns how many were executed.
    ///
    /// Stops early when a temporary breakpoint is reached; the breakpoint
    /// is consumed and the core enters the stepping state.
    pub fn run(&self, count: u64) -> u64 {
        let mut state = self.state.lock();
        let mut executed = 0;
        while executed < count && state.core == CoreState::Running {
            state.execute_one();
            executed += 1;
            let pc = state.pc;
            if state.temp_breakpoints.remove(&pc) {
                debug!(pc, "Temporary breakpoint hit");
                state.enter_stepping();
            }
        }
        executed
    }

    /// Writes one word of memory.
    pub fn write_word(&self, address: u32, value: u32) {
        let mut state = self.state.lock();
        state.memory.insert(address, value);
        state.memory_generation += 1;
    }

    /// Sets the host pause menu flag.
    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    /// Publishes a log line to every subscriber.
    pub fn log(&self, level: LogLevel, channel: &str, message: impl Into<String>) {
        let elapsed = self.started_at.elapsed();
        let entry = LogEntry {
            timestamp: format!("{}.{:03}", elapsed.as_secs(), elapsed.subsec_millis()),
            header: format!("{}[{channel}]:", level.letter()),
            message: message.into(),
            level,
            channel: channel.to_string(),
        };
        // No receivers is not an error: nobody is listening yet.
        let _ = self.logs.send(entry);
    }

    fn notify(&self, stage: CoreLifecycle) {
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            listener(stage);
        }
    }
}

// ============================================================================
// SimHost - Host
// ============================================================================

impl Host for SimHost {
    fn listen_lifecycle(&self, listener: LifecycleListener) {
        self.listeners.lock().push(listener);
    }

    fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.logs.subscribe()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn game(&self) -> Option<GameInfo> {
        self.state.lock().game.clone()
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn core_state(&self) -> CoreState {
        self.state.lock().core
    }

    fn stepping_counter(&self) -> u64 {
        self.state.lock().stepping_counter
    }

    fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    fn pc(&self) -> u32 {
        self.state.lock().pc
    }

    fn registers(&self) -> Vec<RegisterCategory> {
        let state = self.state.lock();
        let gpr = state
            .gpr
            .iter()
            .enumerate()
            .map(|(i, &value)| Register {
                name: format!("r{i}"),
                value,
            })
            .collect();

        vec![
            RegisterCategory {
                id: CATEGORY_GPR,
                name: "GPR".to_string(),
                registers: gpr,
            },
            RegisterCategory {
                id: CATEGORY_SPECIAL,
                name: "Special".to_string(),
                registers: vec![Register {
                    name: "pc".to_string(),
                    value: state.pc,
                }],
            },
        ]
    }

    fn set_register(&self, category: usize, index: usize, value: u32) -> bool {
        let mut state = self.state.lock();
        match (category, index) {
            (CATEGORY_GPR, i) if i < GPR_COUNT => {
                state.gpr[i] = value;
                true
            }
            (CATEGORY_SPECIAL, 0) => {
                state.pc = value;
                true
            }
            _ => false,
        }
    }

    fn disassemble(&self, address: u32) -> Option<Instruction> {
        let state = self.state.lock();
        state.memory.get(&address).map(|word| Instruction {
            address,
            size: INSTRUCTION_SIZE,
            text: format!(".word 0x{word:08x}"),
        })
    }

    fn memory_generation(&self) -> u64 {
        self.state.lock().memory_generation
    }

    fn request_stepping(&self, stepping: bool) {
        let mut state = self.state.lock();
        match (state.core, stepping) {
            (CoreState::Running, true) => state.enter_stepping(),
            (CoreState::Stepping, false) => state.core = CoreState::Running,
            _ => {}
        }
    }

    fn step_into(&self) {
        let mut state = self.state.lock();
        if state.core == CoreState::Stepping {
            state.execute_one();
            state.stepping_counter += 1;
        }
    }

    fn add_temp_breakpoint(&self, address: u32) {
        self.state.lock().temp_breakpoints.insert(address);
    }

    fn remove_temp_breakpoint(&self, address: u32) {
        self.state.lock().temp_breakpoints.remove(&address);
    }

    fn has_temp_breakpoint(&self, address: u32) -> bool {
        self.state.lock().temp_breakpoints.contains(&address)
    }
}

// ============================================================================
// Tests
// ============================================================================
