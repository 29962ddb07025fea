// THEORY:
// The `gesture` module holds the vocabulary the rest of the engine speaks. The
// external gesture engine reports one `GestureObservation` per (body, kind) per
// frame; the resolver collapses those into a single `GestureLabel`; and a label
// that survives the recording gate becomes a `ResolvedEvent`, the fact that is
// pushed into history and evaluated by the rules.
//
// Key architectural principles:
// 1.  **Closed Set of Kinds**: `GestureKind` is a fixed enum. Its declaration
//     order is meaningful: it is the tie-break order used by the resolver, so
//     it is also the order in which `Ord` compares kinds.
// 2.  **Dumb Data Containers**: these types carry data and know how to name
//     themselves, nothing more.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Instants are wall-clock UTC so they can cross the sink boundary unchanged.
pub type Timestamp = DateTime<Utc>;

/// The zone label used when no zone matched.
pub const NO_ZONE: &str = "None";

/// The recognised discrete motions, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GestureKind {
    PickUp,
    PutDown,
    OpenDoor,
    HandToMouth,
    Pour,
}

impl GestureKind {
    pub const ALL: [GestureKind; 5] = [
        GestureKind::PickUp,
        GestureKind::PutDown,
        GestureKind::OpenDoor,
        GestureKind::HandToMouth,
        GestureKind::Pour,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PickUp => "PickUp",
            Self::PutDown => "PutDown",
            Self::OpenDoor => "OpenDoor",
            Self::HandToMouth => "HandToMouth",
            Self::Pour => "Pour",
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown gesture kind `{s}`"))
    }
}

/// One raw confidence report from the gesture engine for one body and one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureObservation {
    /// Tracking identifier of the body the engine attributed this result to.
    pub body_id: u64,
    pub kind: GestureKind,
    /// Engine confidence in `[0, 1]`.
    pub confidence: f32,
    /// The engine's own binary detection flag.
    #[serde(default)]
    pub detected: bool,
    /// Arrival time of the frame that produced this result.
    pub timestamp: Timestamp,
}

/// The per-body, per-frame outcome of label resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureLabel {
    Gesture(GestureKind),
    NoGesture,
}

impl GestureLabel {
    pub fn kind(&self) -> Option<GestureKind> {
        match self {
            Self::Gesture(kind) => Some(*kind),
            Self::NoGesture => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gesture(kind) => kind.as_str(),
            Self::NoGesture => "No Gesture",
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (gesture kind, zone, timestamp) fact for one body in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub body_id: u64,
    pub kind: GestureKind,
    /// Zone name, or [`NO_ZONE`].
    pub zone: String,
    pub confidence: f32,
    pub timestamp: Timestamp,
}

impl ResolvedEvent {
    pub fn new(body_id: u64, kind: GestureKind, zone: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            body_id,
            kind,
            zone: zone.into(),
            confidence: 1.0,
            timestamp,
        }
    }

    pub fn has_zone(&self) -> bool {
        self.zone != NO_ZONE
    }
}
