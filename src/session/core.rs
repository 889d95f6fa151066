//! Session lifecycle: open, poll loop, teardown.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::coordination::{ConnectionRegistry, LifecycleLock, SessionRegistration};
use crate::identifiers::SessionId;
use crate::modules::{Broadcaster, BroadcasterFactory, Subscriber, SubscriberState};
use crate::protocol::DispatchTable;
use crate::transport::{CloseCode, Outbox, Transport};

use super::{Dispatcher, PollCadence};

// ============================================================================
// SessionContext
// ============================================================================

/// Process-wide parts a session borrows for its whole life.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    /// Lock shared with the host lifecycle listener.
    pub lifecycle: &'a LifecycleLock,
    /// Live-session registry.
    pub registry: &'a ConnectionRegistry,
    /// Subscribers, in init order.
    pub subscribers: &'a [Arc<dyn Subscriber>],
    /// Broadcaster factories, in tick order.
    pub broadcasters: &'a [BroadcasterFactory],
}

impl std::fmt::Debug for SessionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("subscribers", &self.subscribers.len())
            .field("broadcasters", &self.broadcasters.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live debugger connection.
///
/// Subscribers are shut down when the session drops, including while
/// unwinding from a panicking handler. The registration is released last.
pub struct Session<'a, T: Transport> {
    id: SessionId,
    context: SessionContext<'a>,
    table: DispatchTable,
    transport: T,
    states: Vec<Option<SubscriberState>>,
    broadcasters: Vec<Box<dyn Broadcaster>>,
    cadence: PollCadence,
    outbox: Outbox,
    outbound: UnboundedReceiver<String>,
    closing: bool,
    _registration: SessionRegistration<'a>,
}

impl<'a, T: Transport> Session<'a, T> {
    /// Registers the session and initializes its modules.
    ///
    /// Each subscriber init runs under the lifecycle lock, so this blocks
    /// while a host transition is in progress.
    pub fn open(context: SessionContext<'a>, transport: T) -> Self {
        let registration = context.registry.register();
        let id = SessionId::next();

        let broadcasters = context.broadcasters.iter().map(|factory| factory()).collect();

        let mut table = DispatchTable::new();
        let states = context
            .subscribers
            .iter()
            .map(|subscriber| {
                let _guard = context.lifecycle.guard();
                subscriber.init(&mut table)
            })
            .collect();

        let (outbox, outbound) = Outbox::channel();

        debug!(session_id = %id, events = table.len(), "Debugger session opened");

        Self {
            id,
            context,
            table,
            transport,
            states,
            broadcasters,
            cadence: PollCadence::new(),
            outbox,
            outbound,
            closing: false,
            _registration: registration,
        }
    }

    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the dispatch table built by the subscribers.
    #[inline]
    #[must_use]
    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// Runs until the transport closes, then tears the session down.
    pub async fn run(mut self) {
        info!(session_id = %self.id, "Debugger session started");

        loop {
            let timeout = self.cadence.timeout();
            let mut dispatcher = Dispatcher::new(
                self.id,
                &self.table,
                &self.outbox,
                self.context.lifecycle,
                &mut self.cadence,
            );
            if !self.transport.process(timeout, &mut dispatcher).await {
                break;
            }

            let stop_requested = {
                let _guard = self.context.lifecycle.guard();
                for broadcaster in &mut self.broadcasters {
                    broadcaster.broadcast(&self.outbox);
                }
                self.context.registry.stop_requested()
            };

            self.flush().await;

            if stop_requested && !self.closing {
                self.closing = true;
                info!(session_id = %self.id, "Closing debugger session");
                self.transport.close(CloseCode::Away).await;
            }

            self.cadence.tick();
        }

        info!(session_id = %self.id, "Debugger session ended");
    }

    /// Writes queued frames to the transport, in enqueue order.
    async fn flush(&mut self) {
        while let Ok(text) = self.outbound.try_recv() {
            self.transport.send_text(text).await;
        }
    }
}

impl<T: Transport> Drop for Session<'_, T> {
    fn drop(&mut self) {
        let states = std::mem::take(&mut self.states);
        for (subscriber, state) in self.context.subscribers.iter().zip(states) {
            let _guard = self.context.lifecycle.guard();
            subscriber.shutdown(state);
        }
        debug!(session_id = %self.id, "Debugger session torn down");
    }
}

impl<T: Transport> std::fmt::Debug for Session<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("cadence", &self.cadence)
            .field("closing", &self.closing)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    use crate::host::CoreLifecycle;
    use crate::protocol::Request;
    use crate::session::{BURST_ITERATIONS, FAST_POLL, SLOW_POLL};
    use crate::transport::{FrameHandler, Outbox};

    // ------------------------------------------------------------------------
    // Scripted transport
    // ------------------------------------------------------------------------

    enum Step {
        Text(&'static str),
        Binary,
        Idle,
    }

    #[derive(Default)]
    struct Record {
        timeouts: Vec<Duration>,
        sent: Vec<String>,
        closes: Vec<CloseCode>,
    }

    impl Record {
        fn sent_json(&self) -> Vec<Value> {
            self.sent
                .iter()
                .map(|text| serde_json::from_str(text).expect("outbound JSON"))
                .collect()
        }
    }

    /// Plays `script`, then either ends or stays open until closed.
    struct ScriptedTransport {
        script: VecDeque<Step>,
        hold_open: bool,
        closed: bool,
        record: Arc<Mutex<Record>>,
    }

    impl ScriptedTransport {
        fn new(script: impl IntoIterator<Item = Step>) -> (Self, Arc<Mutex<Record>>) {
            let record = Arc::new(Mutex::new(Record::default()));
            let transport = Self {
                script: script.into_iter().collect(),
                hold_open: false,
                closed: false,
                record: Arc::clone(&record),
            };
            (transport, record)
        }

        fn held_open(mut self) -> Self {
            self.hold_open = true;
            self
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send_text(&mut self, text: String) {
            self.record.lock().sent.push(text);
        }

        async fn process(
            &mut self,
            timeout: Duration,
            handler: &mut (dyn FrameHandler + Send),
        ) -> bool {
            self.record.lock().timeouts.push(timeout);
            match self.script.pop_front() {
                Some(Step::Text(text)) => handler.on_text(text),
                Some(Step::Binary) => handler.on_binary(&[1, 2, 3]),
                Some(Step::Idle) => {}
                None if self.closed || !self.hold_open => return false,
                None => tokio::task::yield_now().await,
            }
            true
        }

        async fn close(&mut self, code: CloseCode) {
            self.closed = true;
            self.record.lock().closes.push(code);
        }
    }

    // ------------------------------------------------------------------------
    // Test modules
    // ------------------------------------------------------------------------

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Probe {
        name: &'static str,
        trace: Trace,
        stateful: bool,
    }

    impl Subscriber for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn init(&self, table: &mut DispatchTable) -> Option<SubscriberState> {
            self.trace.lock().push(format!("init {}", self.name));
            if self.name == "a" {
                table.add("ping", |request: &mut Request<'_>| {
                    request.respond(json!({ "pong": true }));
                });
                table.add("later", |_request: &mut Request<'_>| {});
                let trace = Arc::clone(&self.trace);
                table.add("slow", move |request: &mut Request<'_>| {
                    trace.lock().push("slow started".to_string());
                    std::thread::sleep(Duration::from_millis(100));
                    trace.lock().push("slow finished".to_string());
                    request.respond_empty();
                });
            }
            self.stateful
                .then(|| Box::new(self.name.to_string()) as SubscriberState)
        }

        fn shutdown(&self, state: Option<SubscriberState>) {
            let state = state.and_then(|state| state.downcast::<String>().ok());
            self.trace
                .lock()
                .push(format!("shutdown {} {:?}", self.name, state.as_deref()));
        }
    }

    struct Ticker;

    impl Broadcaster for Ticker {
        fn broadcast(&mut self, outbox: &Outbox) {
            outbox.send_event(&json!({ "event": "tick" }));
        }
    }

    struct Env {
        lifecycle: LifecycleLock,
        registry: Arc<ConnectionRegistry>,
        subscribers: Vec<Arc<dyn Subscriber>>,
        broadcasters: Vec<BroadcasterFactory>,
        trace: Trace,
    }

    impl Env {
        fn new() -> Self {
            let trace = Trace::default();
            let probe = |name, stateful| -> Arc<dyn Subscriber> {
                Arc::new(Probe {
                    name,
                    trace: Arc::clone(&trace),
                    stateful,
                })
            };
            let subscribers = vec![probe("a", false), probe("b", true)];
            Self {
                lifecycle: LifecycleLock::new(),
                registry: Arc::new(ConnectionRegistry::new()),
                subscribers,
                broadcasters: Vec::new(),
                trace,
            }
        }

        fn with_ticker(mut self) -> Self {
            self.broadcasters
                .push(Box::new(|| -> Box<dyn Broadcaster> { Box::new(Ticker) }));
            self
        }

        fn context(&self) -> SessionContext<'_> {
            SessionContext {
                lifecycle: &self.lifecycle,
                registry: &self.registry,
                subscribers: &self.subscribers,
                broadcasters: &self.broadcasters,
            }
        }
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_open_inits_in_order_and_drop_shuts_down_in_order() {
        let env = Env::new();
        let (transport, _) = ScriptedTransport::new([]);

        let session = Session::open(env.context(), transport);
        assert_eq!(env.registry.active(), 1);
        assert!(session.table().contains("ping"));

        session.run().await;
        assert_eq!(env.registry.active(), 0);
        assert_eq!(
            *env.trace.lock(),
            vec![
                "init a".to_string(),
                "init b".to_string(),
                "shutdown a None".to_string(),
                "shutdown b Some(\"b\")".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_responses_and_errors_reach_transport() {
        let env = Env::new();
        let (transport, record) = ScriptedTransport::new([
            Step::Text(r#"{"event":"ping","ticket":1}"#),
            Step::Text(r#"{"event":"bogus","ticket":"t1"}"#),
            Step::Text("nope"),
            Step::Binary,
        ]);

        Session::open(env.context(), transport).run().await;

        assert_eq!(
            record.lock().sent_json(),
            vec![
                json!({"event": "ping", "ticket": 1, "pong": true}),
                json!({"event": "error", "message": "Bad message: unknown event", "level": 2, "ticket": "t1"}),
                json!({"event": "error", "message": "Bad message: invalid JSON", "level": 2}),
                json!({"event": "error", "message": "Bad message", "level": 2}),
            ]
        );
    }

    #[tokio::test]
    async fn test_broadcast_runs_every_iteration() {
        let env = Env::new().with_ticker();
        let (transport, record) =
            ScriptedTransport::new([Step::Idle, Step::Idle, Step::Idle]);

        Session::open(env.context(), transport).run().await;

        let record = record.lock();
        assert_eq!(record.sent.len(), 3);
        assert!(record.sent.iter().all(|text| text == r#"{"event":"tick"}"#));
    }

    #[tokio::test]
    async fn test_unfinished_dispatch_bursts_fast_polling() {
        let env = Env::new();
        let script = std::iter::once(Step::Text(r#"{"event":"later"}"#))
            .chain(std::iter::repeat_with(|| Step::Idle).take(BURST_ITERATIONS as usize + 5));
        let (transport, record) = ScriptedTransport::new(script);

        Session::open(env.context(), transport).run().await;

        let timeouts = &record.lock().timeouts;
        let burst = BURST_ITERATIONS as usize;
        assert_eq!(timeouts[0], SLOW_POLL);
        assert!(timeouts[1..burst].iter().all(|t| *t == FAST_POLL));
        assert!(timeouts[burst..].iter().all(|t| *t == SLOW_POLL));
    }

    #[tokio::test]
    async fn test_finished_dispatch_stays_slow() {
        let env = Env::new();
        let (transport, record) = ScriptedTransport::new([
            Step::Text(r#"{"event":"ping"}"#),
            Step::Idle,
            Step::Idle,
        ]);

        Session::open(env.context(), transport).run().await;
        assert!(record.lock().timeouts.iter().all(|t| *t == SLOW_POLL));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_all_closes_with_going_away() {
        let env = Env::new();
        let (transport, record) = ScriptedTransport::new([]);
        let session = Session::open(env.context(), transport.held_open());

        let registry = Arc::clone(&env.registry);
        let drain = tokio::task::spawn_blocking(move || registry.stop_all());

        session.run().await;
        drain.await.expect("drain");

        assert_eq!(record.lock().closes, vec![CloseCode::Away]);
        assert_eq!(env.registry.active(), 0);
        assert!(!env.registry.stop_requested());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_waits_for_host_transition() {
        let env = Env::new();
        let (transport, record) = ScriptedTransport::new([Step::Text(r#"{"event":"ping"}"#)]);
        let session = Session::open(env.context(), transport);

        env.lifecycle.on_lifecycle(CoreLifecycle::Stopping, 1);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(50));
                assert!(record.lock().sent.is_empty(), "dispatched during transition");
                env.lifecycle.on_lifecycle(CoreLifecycle::Stopped, 1);
            });
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(session.run());
            });
        });

        assert_eq!(record.lock().sent_json(), vec![json!({"event": "ping", "pong": true})]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_broadcast_waits_for_host_transition() {
        let env = Env::new().with_ticker();
        let (transport, record) = ScriptedTransport::new([Step::Idle, Step::Idle]);
        let session = Session::open(env.context(), transport);

        env.lifecycle.on_lifecycle(CoreLifecycle::Stopping, 1);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(80));
                assert!(record.lock().sent.is_empty(), "broadcast during transition");
                env.lifecycle.on_lifecycle(CoreLifecycle::Stopped, 1);
            });
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(session.run());
            });
        });

        let tick = json!({"event": "tick"});
        assert_eq!(record.lock().sent_json(), vec![tick.clone(), tick]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_host_transition_waits_for_running_handler() {
        let env = Env::new();
        let (transport, record) = ScriptedTransport::new([Step::Text(r#"{"event":"slow"}"#)]);
        let session = Session::open(env.context(), transport);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !env.trace.lock().iter().any(|line| line == "slow started") {
                    std::thread::yield_now();
                }
                env.lifecycle.on_lifecycle(CoreLifecycle::Stopping, 1);
                env.trace.lock().push("host stopping".to_string());
                env.lifecycle.on_lifecycle(CoreLifecycle::Stopped, 1);
            });
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(session.run());
            });
        });

        let trace = env.trace.lock();
        let position = |line: &str| trace.iter().position(|entry| entry == line);
        assert!(position("slow finished").is_some());
        assert!(position("host stopping").is_some());
        assert!(position("slow finished") < position("host stopping"));
        assert_eq!(record.lock().sent_json(), vec![json!({"event": "slow"})]);
    }
}
