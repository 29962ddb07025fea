// THEORY:
// A `BodyFrame` is everything the engine learns in one tick of the sensor: when
// it happened, where the floor is, which bodies the tracker sees (with the few
// joints zone matching needs) and the gesture engine's scores for them. These
// are plain data containers with serde derives so frames can be replayed from
// a file or piped in from another process.

use crate::core_modules::floor_corrector::{FloorPlane, Point3};
use crate::core_modules::gesture::{GestureObservation, Timestamp};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// The joints zone matching needs, in raw camera space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyJoints {
    pub hand_tip_left: Point3,
    pub hand_tip_right: Point3,
    /// Stands in for the body centre.
    pub spine_mid: Point3,
}

/// One body as reported by the tracker in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub tracking_id: u64,
    #[serde(default = "default_tracking_valid")]
    pub tracking_valid: bool,
    /// Missing when the tracker lost the skeleton but kept the id.
    #[serde(default)]
    pub joints: Option<BodyJoints>,
}

fn default_tracking_valid() -> bool {
    true
}

impl BodySnapshot {
    pub fn tracked(tracking_id: u64, joints: BodyJoints) -> Self {
        Self {
            tracking_id,
            tracking_valid: true,
            joints: Some(joints),
        }
    }

    /// A zero id is the tracker's way of saying the slot is empty.
    pub fn is_tracked(&self) -> bool {
        self.tracking_valid && self.tracking_id != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyFrame {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub floor_plane: FloorPlane,
    #[serde(default)]
    pub bodies: Vec<BodySnapshot>,
    #[serde(default)]
    pub observations: Vec<GestureObservation>,
}

impl BodyFrame {
    pub fn new(timestamp: Timestamp, floor_plane: FloorPlane) -> Self {
        Self {
            timestamp,
            floor_plane,
            bodies: Vec::new(),
            observations: Vec::new(),
        }
    }

    /// This frame's observations attributed to one body.
    pub fn observations_for(&self, body_id: u64) -> Vec<GestureObservation> {
        self.observations
            .iter()
            .filter(|o| o.body_id == body_id)
            .cloned()
            .collect()
    }
}

/// One line of a replayed input stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputRecord {
    Frame(BodyFrame),
    TrackingLost { tracking_id: u64 },
}

impl InputRecord {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::Parse(e.to_string()))
    }
}
