// THEORY:
// The `ActivityBus` is how results leave the pipeline actor. Anything that
// wants to watch the engine (a printer, a dashboard, a test) subscribes and
// gets its own receiver; the actor publishes once per activity and once per
// frame without knowing who is listening.
//
// Key architectural principles:
// 1.  **Two Streams**: recognised activities and per-frame diagnostics travel
//     on separate channels. A consumer that only wants activities never pays
//     for diagnostics traffic.
// 2.  **Never Block the Pipeline**: both channels are bounded broadcasts. A
//     slow subscriber lags and misses messages; the actor never waits on it.
//     Consumers that must see every activity use the actor's activity sink.
// 3.  **Nobody Listening Is Fine**: publishing with no subscribers is not an
//     error. It reports zero deliveries.

use crate::core_modules::gesture::Timestamp;
use crate::core_modules::rule_engine::ActivityEvent;
use crate::pipeline::BodyDiagnostics;
use serde::Serialize;
use tokio::sync::broadcast;

/// Everything the engine decided in one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDiagnostics {
    pub timestamp: Timestamp,
    pub bodies: Vec<BodyDiagnostics>,
    pub activities: Vec<ActivityEvent>,
}

/// Fan-out for activity events and per-frame diagnostics.
///
/// Slow subscribers lag and miss messages rather than holding up the pipeline.
#[derive(Clone)]
pub struct ActivityBus {
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub diagnostics_tx: broadcast::Sender<FrameDiagnostics>,
}

impl ActivityBus {
    pub fn new(capacity: usize) -> Self {
        let (activity_tx, _) = broadcast::channel::<ActivityEvent>(capacity.max(1));
        let (diagnostics_tx, _) = broadcast::channel::<FrameDiagnostics>(capacity.max(1));
        Self {
            activity_tx,
            diagnostics_tx,
        }
    }

    pub fn subscribe_activities(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<FrameDiagnostics> {
        self.diagnostics_tx.subscribe()
    }

    /// Returns how many subscribers received the event; zero is not an error.
    pub fn publish_activity(&self, event: ActivityEvent) -> usize {
        self.activity_tx.send(event).unwrap_or(0)
    }

    pub fn publish_diagnostics(&self, diagnostics: FrameDiagnostics) -> usize {
        self.diagnostics_tx.send(diagnostics).unwrap_or(0)
    }
}
