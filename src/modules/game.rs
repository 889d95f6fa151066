//! Host and game information.
//!
//! | Event | Direction | Payload |
//! |-------|-----------|---------|
//! | `version` | request | `{name, version}` of the host |
//! | `game.status` | request | `{game: null \| {id, version, title}, paused}` |
//! | `game.start` | broadcast | `{game}` |
//! | `game.quit` | broadcast | `{}` |
//! | `game.pause` / `game.resume` | broadcast | `{}` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::host::{GameInfo, Host};
use crate::protocol::{DispatchTable, Request};
use crate::transport::Outbox;

use super::{Broadcaster, Subscriber, SubscriberState, add_host_handler};

// ============================================================================
// GameSubscriber
// ============================================================================

/// Registers `version` and `game.status`.
pub struct GameSubscriber {
    host: Arc<dyn Host>,
}

impl GameSubscriber {
    /// Creates the subscriber for `host`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Subscriber for GameSubscriber {
    fn name(&self) -> &'static str {
        "game"
    }

    fn init(&self, table: &mut DispatchTable) -> Option<SubscriberState> {
        add_host_handler(table, &self.host, "version", version);
        add_host_handler(table, &self.host, "game.status", status);
        None
    }
}

/// Clients may announce themselves; the reply is always the host's identity.
fn version(host: &dyn Host, request: &mut Request<'_>) {
    if let (Some(name), Some(client_version)) =
        (request.optional_str("name"), request.optional_str("version"))
    {
        debug!(client = name, version = client_version, "Debugger client identified");
    }

    request.respond(json!({
        "name": host.name(),
        "version": host.version(),
    }));
}

fn status(host: &dyn Host, request: &mut Request<'_>) {
    request.respond(json!({
        "game": host.game(),
        "paused": host.is_paused(),
    }));
}

// ============================================================================
// GameBroadcaster
// ============================================================================

/// Emits game start/quit and pause/resume transitions.
pub struct GameBroadcaster {
    host: Arc<dyn Host>,
    game: Option<GameInfo>,
    paused: bool,
}

impl GameBroadcaster {
    /// Creates a broadcaster that has seen no game yet.
    ///
    /// A game already running when the session opens is announced on the
    /// first tick.
    #[must_use]
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            game: None,
            paused: false,
        }
    }
}

impl Broadcaster for GameBroadcaster {
    fn broadcast(&mut self, outbox: &Outbox) {
        let game = self.host.game();
        if game != self.game {
            if self.game.is_some() {
                outbox.send_event(&json!({ "event": "game.quit" }));
                self.paused = false;
            }
            if let Some(game) = &game {
                outbox.send_event(&json!({ "event": "game.start", "game": game }));
            }
            self.game = game;
        }

        if self.game.is_none() {
            return;
        }

        let paused = self.host.is_paused();
        if paused != self.paused {
            let event = if paused { "game.pause" } else { "game.resume" };
            outbox.send_event(&json!({ "event": event }));
            self.paused = paused;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;

    use crate::host::SimHost;

    fn game() -> GameInfo {
        GameInfo {
            id: "TEST00001".into(),
            version: "1.00".into(),
            title: "Test".into(),
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|text| serde_json::from_str(&text).expect("json"))
            .collect()
    }

    fn call(host: Arc<dyn Host>, root: Value) -> Value {
        let mut table = DispatchTable::new();
        assert!(GameSubscriber::new(host).init(&mut table).is_none());

        let (outbox, mut rx) = Outbox::channel();
        let event = root["event"].as_str().expect("event").to_string();
        let mut request = Request::new(event.clone(), &outbox, root);
        (table.get(&event).expect("handler"))(&mut request);
        drain(&mut rx).remove(0)
    }

    #[test]
    fn test_version() {
        let host: Arc<dyn Host> = Arc::new(SimHost::new("Sim", "2.0"));
        let reply = call(
            host,
            json!({ "event": "version", "name": "tool", "version": "1", "ticket": 3 }),
        );
        assert_eq!(
            reply,
            json!({ "event": "version", "ticket": 3, "name": "Sim", "version": "2.0" })
        );
    }

    #[test]
    fn test_status() {
        let sim = Arc::new(SimHost::default());
        let reply = call(sim.clone(), json!({ "event": "game.status" }));
        assert_eq!(reply, json!({ "event": "game.status", "game": null, "paused": false }));

        sim.boot(game(), 0);
        let reply = call(sim, json!({ "event": "game.status" }));
        assert_eq!(reply["game"]["id"], "TEST00001");
        assert_eq!(reply["game"]["title"], "Test");
    }

    #[test]
    fn test_broadcasts_start_and_quit() {
        let sim = Arc::new(SimHost::default());
        let mut broadcaster = GameBroadcaster::new(sim.clone());
        let (outbox, mut rx) = Outbox::channel();

        broadcaster.broadcast(&outbox);
        assert!(drain(&mut rx).is_empty());

        sim.boot(game(), 0);
        broadcaster.broadcast(&outbox);
        broadcaster.broadcast(&outbox);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "game.start");
        assert_eq!(events[0]["game"]["id"], "TEST00001");

        sim.shutdown();
        broadcaster.broadcast(&outbox);
        assert_eq!(drain(&mut rx), vec![json!({ "event": "game.quit" })]);
    }

    #[test]
    fn test_announces_running_game_to_new_session() {
        let sim = Arc::new(SimHost::default());
        sim.boot(game(), 0);

        let mut broadcaster = GameBroadcaster::new(sim);
        let (outbox, mut rx) = Outbox::channel();
        broadcaster.broadcast(&outbox);
        assert_eq!(drain(&mut rx)[0]["event"], "game.start");
    }

    #[test]
    fn test_broadcasts_pause_and_resume() {
        let sim = Arc::new(SimHost::default());
        sim.boot(game(), 0);
        let mut broadcaster = GameBroadcaster::new(sim.clone());
        let (outbox, mut rx) = Outbox::channel();
        broadcaster.broadcast(&outbox);
        drain(&mut rx);

        sim.set_paused(true);
        broadcaster.broadcast(&outbox);
        sim.set_paused(false);
        broadcaster.broadcast(&outbox);

        assert_eq!(
            drain(&mut rx),
            vec![json!({ "event": "game.pause" }), json!({ "event": "game.resume" })]
        );
    }
}
