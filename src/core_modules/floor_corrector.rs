// THEORY:
// The `FloorCorrector` removes the sensor's mounting tilt from joint positions.
// The body tracker reports a floor plane `(fx, fy, fz, fw)` alongside every
// frame: a unit normal plus the sensor's height above the floor. Rotating the
// Y/Z plane by the tilt angle and translating by `fw` puts the origin on the
// floor directly beneath the sensor with Y pointing straight up, so zone
// tolerances mean the same thing however the sensor is angled.
//
// A plane whose `fy` is zero (the tracker reports an all-zero plane until it
// finds the floor) has no defined tilt. Positions then pass through untouched
// and the result says so, rather than letting a NaN leak into zone matching.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// A position in camera or floor space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Floor clip plane reported by the body tracker: unit normal `(x, y, z)` and offset `w`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FloorPlane {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl FloorPlane {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Sensor tilt `atan2(fz, fy)` in radians, or `None` when undefined.
    pub fn tilt(&self) -> Option<f64> {
        let finite = self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite();
        if !finite || self.y == 0.0 {
            return None;
        }
        Some(self.z.atan2(self.y))
    }
}

/// The outcome of correcting one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Floor-relative coordinates.
    Corrected(Point3),
    /// Tilt was undefined; the raw position is returned as-is.
    Uncorrected(Point3),
}

impl Correction {
    pub fn point(&self) -> Point3 {
        match self {
            Self::Corrected(p) | Self::Uncorrected(p) => *p,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Uncorrected(_))
    }
}

/// Applies one frame's floor plane to any number of joint positions.
#[derive(Debug, Clone, Copy)]
pub struct FloorCorrector {
    plane: FloorPlane,
    /// `(cos θ, sin θ)`, precomputed once per frame.
    rotation: Option<(f64, f64)>,
}

impl FloorCorrector {
    pub fn new(plane: FloorPlane) -> Self {
        let rotation = plane.tilt().map(|theta| (theta.cos(), theta.sin()));
        if rotation.is_none() {
            trace!(?plane, "floor tilt undefined, positions pass through uncorrected");
        }
        Self { plane, rotation }
    }

    pub fn plane(&self) -> FloorPlane {
        self.plane
    }

    pub fn is_tilt_defined(&self) -> bool {
        self.rotation.is_some()
    }

    pub fn correct(&self, raw: Point3) -> Correction {
        match self.rotation {
            Some((cos, sin)) => Correction::Corrected(Point3 {
                x: raw.x,
                y: raw.y * cos + raw.z * sin + self.plane.w,
                z: raw.z * cos - raw.y * sin,
            }),
            None => Correction::Uncorrected(raw),
        }
    }
}
