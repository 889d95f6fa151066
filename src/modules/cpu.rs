//! CPU core and register access.
//!
//! | Event | Parameters | Response |
//! |-------|------------|----------|
//! | `cpu.stepping` | | none, see the `cpu.stepping` broadcast |
//! | `cpu.resume` | | none, see the `cpu.resume` broadcast |
//! | `cpu.status` | | `{stepping, paused, pc, ticks}` |
//! | `cpu.getAllRegs` | | `{categories: [{id, name, registerNames, uintValues}]}` |
//! | `cpu.getReg` | `name` | `{category, register, uintValue}` |
//! | `cpu.setReg` | `name`, `value` | `{category, register, uintValue}` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;

use crate::host::{CoreState, Host, RegisterCategory};
use crate::protocol::{DispatchTable, Request};

use super::{SubscriberState, Subscriber, add_host_handler, ensure_started, ensure_stepping};

// ============================================================================
// CpuSubscriber
// ============================================================================

/// Registers the `cpu.*` core and register events.
pub struct CpuSubscriber {
    host: Arc<dyn Host>,
}

impl CpuSubscriber {
    /// Creates the subscriber for `host`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Subscriber for CpuSubscriber {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn init(&self, table: &mut DispatchTable) -> Option<SubscriberState> {
        add_host_handler(table, &self.host, "cpu.stepping", stepping);
        add_host_handler(table, &self.host, "cpu.resume", resume);
        add_host_handler(table, &self.host, "cpu.status", status);
        add_host_handler(table, &self.host, "cpu.getAllRegs", get_all_regs);
        add_host_handler(table, &self.host, "cpu.getReg", get_reg);
        add_host_handler(table, &self.host, "cpu.setReg", set_reg);
        None
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn stepping(host: &dyn Host, request: &mut Request<'_>) {
    if !ensure_started(host, request) {
        return;
    }
    if host.core_state() == CoreState::Stepping {
        request.fail("Already stepping");
        return;
    }
    host.request_stepping(true);
}

fn resume(host: &dyn Host, request: &mut Request<'_>) {
    if !ensure_stepping(host, request) {
        return;
    }
    host.request_stepping(false);
}

fn status(host: &dyn Host, request: &mut Request<'_>) {
    request.respond(json!({
        "stepping": host.core_state() == CoreState::Stepping,
        "paused": host.is_paused(),
        "pc": host.pc(),
        "ticks": host.ticks(),
    }));
}

fn get_all_regs(host: &dyn Host, request: &mut Request<'_>) {
    if !ensure_started(host, request) {
        return;
    }

    let categories: Vec<_> = host
        .registers()
        .into_iter()
        .map(|category| {
            let (names, values): (Vec<_>, Vec<_>) = category
                .registers
                .into_iter()
                .map(|register| (register.name, register.value))
                .unzip();
            json!({
                "id": category.id,
                "name": category.name,
                "registerNames": names,
                "uintValues": values,
            })
        })
        .collect();

    request.respond(json!({ "categories": categories }));
}

fn get_reg(host: &dyn Host, request: &mut Request<'_>) {
    if !ensure_started(host, request) {
        return;
    }
    let Some(name) = request.param_str("name") else {
        return;
    };
    let Some(location) = find_register(&host.registers(), &name) else {
        request.fail("Invalid register name");
        return;
    };

    respond_register(request, location);
}

fn set_reg(host: &dyn Host, request: &mut Request<'_>) {
    if !ensure_started(host, request) {
        return;
    }
    if host.core_state() != CoreState::Stepping {
        request.fail("CPU currently running (cpu.stepping first)");
        return;
    }
    let Some(name) = request.param_str("name") else {
        return;
    };
    let Some(value) = request.param_u32("value") else {
        return;
    };
    let Some(location) = find_register(&host.registers(), &name) else {
        request.fail("Invalid register name");
        return;
    };

    if !host.set_register(location.category, location.index, value) {
        request.fail("Invalid register name");
        return;
    }

    respond_register(
        request,
        RegisterLocation {
            value,
            ..location
        },
    );
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct RegisterLocation {
    category: usize,
    index: usize,
    value: u32,
}

/// Finds a register by name, ignoring ASCII case.
fn find_register(categories: &[RegisterCategory], name: &str) -> Option<RegisterLocation> {
    categories.iter().find_map(|category| {
        category
            .registers
            .iter()
            .position(|register| register.name.eq_ignore_ascii_case(name))
            .map(|index| RegisterLocation {
                category: category.id,
                index,
                value: category.registers[index].value,
            })
    })
}

fn respond_register(request: &mut Request<'_>, location: RegisterLocation) {
    request.respond(json!({
        "category": location.category,
        "register": location.index,
        "uintValue": location.value,
    }));
}

// ============================================================================
// Tests
// ============================================================================
