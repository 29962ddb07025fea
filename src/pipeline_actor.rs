// THEORY:
// The `ActivityPipeline` is `&mut self` all the way down and knows nothing
// about async. The `PipelineActor` gives it a home on the tokio runtime: one
// task owns the pipeline outright and everyone else talks to it through an
// unbounded queue.
//
// Key architectural principles:
// 1.  **Single Owner**: no locks around the pipeline. Frames, tracking-lost
//     notifications and diagnostics requests are applied strictly in the order
//     they were queued, whichever producer sent them.
// 2.  **Fire and Forget Producers**: submitting a frame never waits for it to be
//     processed. Results leave through the `ActivityBus`, and activities can
//     also go to an unbounded sink for a consumer that must not miss any.
// 3.  **Graceful Shutdown**: a `Shutdown` message, or every handle being
//     dropped, ends the loop after everything already queued is processed. The
//     task's join handle yields the run's totals.

use crate::activity_bus::{ActivityBus, FrameDiagnostics};
use crate::core_modules::frame::BodyFrame;
use crate::core_modules::rule_engine::ActivityEvent;
use crate::pipeline::{ActivityPipeline, BodyDiagnostics, Report};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum PipelineMessage {
    Frame(BodyFrame),
    TrackingLost(u64),
    Diagnostics(oneshot::Sender<Vec<BodyDiagnostics>>),
    Shutdown,
}

/// Totals for one actor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub activities: u64,
    pub tracking_lost: u64,
}

/// Cheap, cloneable sender side of the actor.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineMessage>,
}

impl PipelineHandle {
    pub fn submit_frame(&self, frame: BodyFrame) -> Result<()> {
        self.send(PipelineMessage::Frame(frame))
    }

    pub fn tracking_lost(&self, tracking_id: u64) -> Result<()> {
        self.send(PipelineMessage::TrackingLost(tracking_id))
    }

    /// Diagnostics of the last frame processed before this request.
    pub async fn diagnostics(&self) -> Result<Vec<BodyDiagnostics>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PipelineMessage::Diagnostics(reply_tx))?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Asks the actor to stop once everything queued so far is processed.
    pub fn shutdown(&self) -> Result<()> {
        self.send(PipelineMessage::Shutdown)
    }

    fn send(&self, message: PipelineMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::ChannelClosed)
    }
}

pub struct PipelineActor;

impl PipelineActor {
    pub fn spawn(pipeline: ActivityPipeline, bus: ActivityBus) -> (PipelineHandle, JoinHandle<PipelineStats>) {
        Self::spawn_with_sink(pipeline, bus, None)
    }

    /// Like `spawn`, but every activity is also sent to `sink`, which never lags.
    ///
    /// The sink is dropped when the actor stops, closing its receiver.
    pub fn spawn_with_sink(
        mut pipeline: ActivityPipeline,
        bus: ActivityBus,
        mut sink: Option<mpsc::UnboundedSender<ActivityEvent>>,
    ) -> (PipelineHandle, JoinHandle<PipelineStats>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineMessage>();

        let task = tokio::spawn(async move {
            let mut stats = PipelineStats::default();
            while let Some(message) = rx.recv().await {
                match message {
                    PipelineMessage::Frame(frame) => {
                        stats.frames += 1;
                        let activities = match pipeline.generate_report(&frame) {
                            Report::NoActivity => Vec::new(),
                            Report::Activity(data) => data.events,
                        };
                        for activity in &activities {
                            stats.activities += 1;
                            if let Some(tx) = &sink {
                                if tx.send(activity.clone()).is_err() {
                                    warn!("activity sink closed, no longer forwarding");
                                    sink = None;
                                }
                            }
                            let delivered = bus.publish_activity(activity.clone());
                            debug!(activity = %activity.name, delivered, "activity published");
                        }
                        bus.publish_diagnostics(FrameDiagnostics {
                            timestamp: frame.timestamp,
                            bodies: pipeline.last_diagnostics().to_vec(),
                            activities,
                        });
                    }
                    PipelineMessage::TrackingLost(tracking_id) => {
                        stats.tracking_lost += 1;
                        pipeline.tracking_lost(tracking_id);
                    }
                    PipelineMessage::Diagnostics(reply) => {
                        let _ = reply.send(pipeline.last_diagnostics().to_vec());
                    }
                    PipelineMessage::Shutdown => break,
                }
            }
            info!(frames = stats.frames, activities = stats.activities, "pipeline actor stopped");
            stats
        });

        (PipelineHandle { tx }, task)
    }
}
