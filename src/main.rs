// THEORY:
// The `activity_sentinel` binary replays body frames from stdin and prints the
// activities the engine recognises. Each input line is a JSON `InputRecord`
// (`{"type": "frame", ...}` or `{"type": "tracking_lost", "tracking_id": N}`).
// Each output line is a JSON `ActivityEvent`. Logs go to stderr and follow
// `RUST_LOG`.
//
// Key architectural principles:
// 1.  **Thin Shell**: parsing, ordering and recognition all live in the
//     library. The binary only wires stdin to the actor and the actor to stdout.
// 2.  **Nothing Dropped**: activities are printed from the actor's unbounded
//     sink rather than the broadcast bus, so a slow stdout can never make the
//     printer skip one.
// 3.  **Bad Lines Are Skipped**: a malformed input line is logged and the
//     replay carries on.

use activity_sentinel::{ActivityBus, ActivityPipeline, Config, InputRecord, PipelineActor};
use anyhow::Context;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Config path from argv or env, else the built-in kitchen layout.
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SENTINEL_CONFIG").ok())
        .map(PathBuf::from);
    let config = match &config_path {
        Some(path) => Config::load(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    info!(
        zones = config.zones.len(),
        rules = config.rules.len(),
        source = %config_path.as_ref().map_or("built-in".to_string(), |p| p.display().to_string()),
        "configuration loaded"
    );

    let pipeline = ActivityPipeline::new(&config)?;
    let bus = ActivityBus::new(config.history.bus_capacity);
    let (sink, mut activities) = mpsc::unbounded_channel();
    let (handle, actor) = PipelineActor::spawn_with_sink(pipeline, bus, Some(sink));

    // Ends once the actor stops and drops the sink.
    let printer = tokio::spawn(async move {
        while let Some(activity) = activities.recv().await {
            match serde_json::to_string(&activity) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "could not serialise activity"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match InputRecord::parse(&line) {
            Ok(InputRecord::Frame(frame)) => handle.submit_frame(frame)?,
            Ok(InputRecord::TrackingLost { tracking_id }) => handle.tracking_lost(tracking_id)?,
            Err(e) => warn!(line = line_no, error = %e, "skipping malformed input line"),
        }
    }

    handle.shutdown()?;
    let stats = actor.await.context("pipeline actor panicked")?;
    printer.await.context("activity printer panicked")?;
    info!(
        frames = stats.frames,
        activities = stats.activities,
        tracking_lost = stats.tracking_lost,
        "replay finished"
    );
    Ok(())
}
