// THEORY:
// This file is the entry point for the `activity_sentinel` library crate. The
// crate turns a stream of noisy, per-frame gesture scores for tracked bodies
// into a handful of meaningful daily-living events ("medication taken", "meal
// eaten").
//
// The stack, leaves first:
// 1.  `core_modules`: floor correction, zone classification, label resolution,
//     bounded per-(gesture, zone) histories, the rule engine and the body
//     registry. All synchronous, all plain data.
// 2.  `pipeline`: the `ActivityPipeline`, one `BodyFrame` in and one `Report`
//     out, the clean high-level interface most callers want.
// 3.  `pipeline_actor` and `activity_bus`: a tokio task that owns a pipeline so
//     any number of async producers can feed it, with results fanned out on
//     broadcast channels.
// 4.  `config`: the serde-backed zone table, routes, cutoffs and rules.

pub mod activity_bus;
pub mod config;
pub mod core_modules;
pub mod pipeline;
pub mod pipeline_actor;

pub use activity_bus::{ActivityBus, FrameDiagnostics};
pub use config::Config;
pub use core_modules::floor_corrector::{FloorPlane, Point3};
pub use core_modules::frame::{BodyFrame, BodyJoints, BodySnapshot, InputRecord};
pub use core_modules::gesture::{GestureKind, GestureLabel, GestureObservation, ResolvedEvent, Timestamp, NO_ZONE};
pub use core_modules::rule_engine::{ActivityEvent, ActivityRule};
pub use pipeline::{ActivityData, ActivityPipeline, BodyDiagnostics, Report, ResolvedEventObserver};
pub use pipeline_actor::{PipelineActor, PipelineHandle, PipelineStats};

use thiserror::Error;

/// Errors produced by the library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("pipeline channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
