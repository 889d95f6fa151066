//! Disassembly.
//!
//! `memory.disasm {address, count?}` answers
//! `{range: {start, end}, lines: [{address, size, text}]}`. `count`
//! defaults to 1 and is capped at [`MAX_LINES`]. Disassembly stops early at
//! the first unmapped address; an unmapped start fails with
//! "Invalid address".
//!
//! Each session keeps a line cache, dropped whenever the core has executed
//! or stepped, or the host reports a memory write, since it was filled.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::json;
use tracing::trace;

use crate::host::{Host, Instruction};
use crate::protocol::{DispatchTable, Request};

use super::{Subscriber, SubscriberState, ensure_started};

// ============================================================================
// Constants
// ============================================================================

/// Most lines returned by one request.
pub const MAX_LINES: u32 = 1000;

// ============================================================================
// DisasmCache
// ============================================================================

/// Per-session disassembly cache.
#[derive(Debug, Default)]
struct DisasmCache {
    /// `(stepping_counter, ticks, memory_generation)` when the lines were
    /// cached.
    generation: (u64, u64, u64),
    lines: FxHashMap<u32, Instruction>,
}

impl DisasmCache {
    fn line(&mut self, host: &dyn Host, address: u32) -> Option<Instruction> {
        let generation = (
            host.stepping_counter(),
            host.ticks(),
            host.memory_generation(),
        );
        if generation != self.generation {
            self.lines.clear();
            self.generation = generation;
        }

        if let Some(line) = self.lines.get(&address) {
            return Some(line.clone());
        }
        let line = host.disassemble(address)?;
        self.lines.insert(address, line.clone());
        Some(line)
    }
}

type SharedCache = Arc<Mutex<DisasmCache>>;

// ============================================================================
// DisasmSubscriber
// ============================================================================

/// Registers `memory.disasm`.
pub struct DisasmSubscriber {
    host: Arc<dyn Host>,
}

impl DisasmSubscriber {
    /// Creates the subscriber for `host`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Subscriber for DisasmSubscriber {
    fn name(&self) -> &'static str {
        "disasm"
    }

    fn init(&self, table: &mut DispatchTable) -> Option<SubscriberState> {
        let cache = SharedCache::default();

        let host = Arc::clone(&self.host);
        let handler_cache = Arc::clone(&cache);
        table.add("memory.disasm", move |request: &mut Request<'_>| {
            disasm(host.as_ref(), &handler_cache, request);
        });

        Some(Box::new(cache))
    }

    fn shutdown(&self, state: Option<SubscriberState>) {
        if let Some(cache) = state.and_then(|state| state.downcast::<SharedCache>().ok()) {
            let mut cache = cache.lock();
            trace!(lines = cache.lines.len(), "Dropping disassembly cache");
            cache.lines.clear();
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

fn disasm(host: &dyn Host, cache: &SharedCache, request: &mut Request<'_>) {
    if !ensure_started(host, request) {
        return;
    }
    let Some(start) = request.param_u32("address") else {
        return;
    };
    let Some(count) = request.optional_u32("count", 1) else {
        return;
    };

    let mut cache = cache.lock();
    let mut lines = Vec::new();
    let mut address = start;
    for _ in 0..count.min(MAX_LINES) {
        let Some(line) = cache.line(host, address) else {
            break;
        };
        address = address.wrapping_add(line.size.max(1));
        lines.push(line);
    }

    if lines.is_empty() && count > 0 {
        request.fail("Invalid address");
        return;
    }

    request.respond(json!({
        "range": { "start": start, "end": address },
        "lines": lines,
    }));
}

// ============================================================================
// Tests
// ============================================================================
