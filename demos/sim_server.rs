//! Debugger server in front of a simulated machine.
//!
//! Demonstrates:
//! - Building a Debugger around a SimHost
//! - Serving clients over the debugger sub-protocol
//! - An emulator thread that boots, runs and logs
//! - Draining sessions on Ctrl+C before the host shuts down
//!
//! Usage:
//!   cargo run --example sim_server
//!   cargo run --example sim_server -- --port 45000
//!   cargo run --example sim_server -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use emu_debug_server::host::GameInfo;
use emu_debug_server::{Debugger, DebuggerOptions, Host, LogLevel, SimHost};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Entry point of the demo program.
const ENTRY: u32 = 0x0880_4000;

/// Instructions executed per emulated frame.
const CYCLES_PER_FRAME: u64 = 1000;

/// One emulated frame.
const FRAME: Duration = Duration::from_millis(16);

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    port: u16,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let port = match args.iter().position(|a| a == "--port") {
            Some(i) => args
                .get(i + 1)
                .context("--port needs a value")?
                .parse()
                .context("--port must be a number")?,
            None => 0,
        };
        Ok(Self {
            debug: args.iter().any(|a| a == "--debug"),
            port,
        })
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse()?;
    init_logging(args.debug);

    let sim = Arc::new(SimHost::new("SimHost", env!("CARGO_PKG_VERSION")));
    load_program(&sim);

    let debugger = Debugger::builder()
        .host(sim.clone())
        .options(DebuggerOptions::new().with_port(args.port))
        .build()?;
    let server = debugger.serve().await?;
    println!("Debugger listening on {}", server.ws_url());
    println!("Sub-protocol: {}", debugger.options().subprotocol);

    let running = Arc::new(AtomicBool::new(true));
    let emulator = {
        let sim = Arc::clone(&sim);
        let running = Arc::clone(&running);
        thread::spawn(move || emulate(&sim, &running))
    };

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await?;

    // Close every client before the machine goes away.
    server.shutdown().await?;

    running.store(false, Ordering::SeqCst);
    emulator
        .join()
        .map_err(|_| anyhow::anyhow!("emulator thread panicked"))?;
    sim.shutdown();

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "emu_debug_server=debug"
    } else {
        "emu_debug_server=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Writes a small counting loop into memory.
fn load_program(sim: &SimHost) {
    for i in 0..64u32 {
        sim.write_word(ENTRY + i * 4, 0x2484_0001 + (i << 16));
    }
}

/// Emulator thread: boots, then runs one frame at a time.
fn emulate(sim: &SimHost, running: &AtomicBool) {
    sim.boot(
        GameInfo {
            id: "DEMO00001".into(),
            version: "1.00".into(),
            title: "Debugger Demo".into(),
        },
        ENTRY,
    );

    let mut frame = 0u64;
    while running.load(Ordering::SeqCst) {
        sim.run(CYCLES_PER_FRAME);
        frame += 1;
        if frame % 60 == 0 {
            let message = format!("Frame {frame}, pc 0x{:08x}", sim.pc());
            sim.log(LogLevel::Info, "DEMO", message);
        }
        thread::sleep(FRAME);
    }
}
