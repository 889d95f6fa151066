//! Host log forwarding.
//!
//! Every host log line becomes
//! `{"event": "log", timestamp, header, message, level, channel}`.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

use crate::host::{Host, LogEntry};
use crate::transport::Outbox;

use super::Broadcaster;

// ============================================================================
// Constants
// ============================================================================

/// Lines forwarded per tick; the rest wait for the next one.
const MAX_LINES_PER_TICK: usize = 256;

// ============================================================================
// LogBroadcaster
// ============================================================================

#[derive(Serialize)]
struct LogEvent<'a> {
    event: &'static str,
    #[serde(flatten)]
    entry: &'a LogEntry,
}

/// Forwards host log lines logged after the session opened.
pub struct LogBroadcaster {
    logs: Receiver<LogEntry>,
}

impl LogBroadcaster {
    /// Subscribes to the host log stream.
    #[must_use]
    pub fn new(host: &dyn Host) -> Self {
        Self {
            logs: host.subscribe_logs(),
        }
    }
}

impl Broadcaster for LogBroadcaster {
    fn broadcast(&mut self, outbox: &Outbox) {
        for _ in 0..MAX_LINES_PER_TICK {
            match self.logs.try_recv() {
                Ok(entry) => {
                    outbox.send_event(&LogEvent {
                        event: "log",
                        entry: &entry,
                    });
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Debugger log stream lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    use crate::host::SimHost;
    use crate::protocol::LogLevel;

    #[test]
    fn test_forwards_lines_in_order() {
        let sim = SimHost::default();
        sim.log(LogLevel::Info, "EARLY", "before session");

        let mut broadcaster = LogBroadcaster::new(&sim);
        let (outbox, mut rx) = Outbox::channel();

        sim.log(LogLevel::Warn, "HLE", "first");
        sim.log(LogLevel::Error, "MEM", "second");
        broadcaster.broadcast(&outbox);

        let events: Vec<Value> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|text| serde_json::from_str(&text).expect("json"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "log");
        assert_eq!(events[0]["message"], "first");
        assert_eq!(events[0]["level"], 3);
        assert_eq!(events[0]["channel"], "HLE");
        assert_eq!(events[0]["header"], "W[HLE]:");
        assert!(events[0]["timestamp"].is_string());
        assert_eq!(events[1]["message"], "second");
        assert_eq!(events[1]["level"], json!(2));
    }

    #[test]
    fn test_idle_stream_sends_nothing() {
        let sim = SimHost::default();
        let mut broadcaster = LogBroadcaster::new(&sim);
        let (outbox, mut rx) = Outbox::channel();

        broadcaster.broadcast(&outbox);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_large_backlog_spans_ticks() {
        let sim = SimHost::default();
        let mut broadcaster = LogBroadcaster::new(&sim);
        let (outbox, mut rx) = Outbox::channel();

        for i in 0..MAX_LINES_PER_TICK + 10 {
            sim.log(LogLevel::Debug, "LOOP", format!("line {i}"));
        }

        broadcaster.broadcast(&outbox);
        assert_eq!(std::iter::from_fn(|| rx.try_recv().ok()).count(), MAX_LINES_PER_TICK);

        broadcaster.broadcast(&outbox);
        assert_eq!(std::iter::from_fn(|| rx.try_recv().ok()).count(), 10);
    }
}
