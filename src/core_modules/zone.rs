// THEORY:
// The `zone` module answers "where in the room did this gesture happen?". A
// `Zone` is a named anchor with an axis-aligned tolerance box around it; most
// zones only test the floor-plane axes (X and Z), a few also test height.
//
// Which zones are worth checking depends on the gesture: picking something up
// can happen at the medication shelf or the pantry, but a hand-to-mouth only
// means something at the dining table. Each kind therefore owns an ordered list
// of `ZoneRoute`s. A route names a zone, the probe points to test against it
// (the two hand tips, or the spine mid-point standing in for the body centre),
// and optionally looser X/Z tolerances for that kind alone.
//
// Key architectural principles:
// 1.  **Policy as Data**: routes and tolerances come from configuration. The
//     classifier is a pure function over that data, so it can be audited and
//     tested without a sensor.
// 2.  **First Match Wins**: routes are tried in order and the first zone that
//     contains a probe point is returned. Zones may overlap; order breaks ties.
// 3.  **Per-Point Matching**: a probe point must satisfy every tested axis on
//     its own. Left-hand X and right-hand Z do not combine into a match.

use crate::core_modules::floor_corrector::Point3;
use crate::core_modules::gesture::{GestureKind, NO_ZONE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named region of the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    /// Half-width of the box along X, in metres.
    pub tolerance_x: f64,
    /// Half-depth of the box along Z, in metres.
    pub tolerance_z: f64,
    /// Whether height is tested at all.
    #[serde(default)]
    pub uses_y: bool,
    /// Half-height of the box along Y; only read when `uses_y` is set.
    #[serde(default)]
    pub tolerance_y: f64,
    /// Centre of the box in floor-relative coordinates.
    pub anchor: Point3,
}

impl Zone {
    /// A zone that tests X and Z only.
    pub fn planar(name: impl Into<String>, anchor: Point3, tolerance_x: f64, tolerance_z: f64) -> Self {
        Self {
            name: name.into(),
            tolerance_x,
            tolerance_z,
            uses_y: false,
            tolerance_y: 0.0,
            anchor,
        }
    }

    /// A zone that also tests height.
    pub fn volumetric(name: impl Into<String>, anchor: Point3, tolerance_x: f64, tolerance_y: f64, tolerance_z: f64) -> Self {
        Self {
            name: name.into(),
            tolerance_x,
            tolerance_z,
            uses_y: true,
            tolerance_y,
            anchor,
        }
    }

    pub fn contains(&self, point: &Point3) -> bool {
        self.contains_with(point, None)
    }

    /// Box test with optional replacement X/Z tolerances; the Y rule is always the zone's own.
    pub fn contains_with(&self, point: &Point3, planar: Option<&PlanarTolerance>) -> bool {
        let (tol_x, tol_z) = match planar {
            Some(t) => (t.x, t.z),
            None => (self.tolerance_x, self.tolerance_z),
        };
        within(point.x, self.anchor.x, tol_x)
            && within(point.z, self.anchor.z, tol_z)
            && (!self.uses_y || within(point.y, self.anchor.y, self.tolerance_y))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("zone name must not be empty".to_string()));
        }
        if self.name == NO_ZONE {
            return Err(Error::Config(format!("`{NO_ZONE}` is reserved and cannot name a zone")));
        }
        if !self.anchor.is_finite() {
            return Err(Error::Config(format!("zone `{}` has a non-finite anchor", self.name)));
        }
        check_tolerance(&self.name, "tolerance_x", self.tolerance_x)?;
        check_tolerance(&self.name, "tolerance_z", self.tolerance_z)?;
        if self.uses_y {
            check_tolerance(&self.name, "tolerance_y", self.tolerance_y)?;
        }
        Ok(())
    }
}

fn within(value: f64, centre: f64, tolerance: f64) -> bool {
    (value - centre).abs() <= tolerance
}

fn check_tolerance(zone: &str, field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!("zone `{zone}`: {field} must be a positive number, got {value}")))
    }
}

/// Replacement X/Z half-extents for one route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarTolerance {
    pub x: f64,
    pub z: f64,
}

/// Which of the body's points are tested against a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Probe {
    /// Either hand tip.
    Hands,
    /// The spine mid-point.
    BodyCenter,
}

/// One entry in a gesture kind's zone priority list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRoute {
    pub zone: String,
    pub probe: Probe,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<PlanarTolerance>,
}

impl ZoneRoute {
    pub fn new(zone: impl Into<String>, probe: Probe) -> Self {
        Self {
            zone: zone.into(),
            probe,
            tolerance: None,
        }
    }

    pub fn with_tolerance(mut self, x: f64, z: f64) -> Self {
        self.tolerance = Some(PlanarTolerance { x, z });
        self
    }
}

/// The ordered route list for one gesture kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindRoutes {
    pub kind: GestureKind,
    pub routes: Vec<ZoneRoute>,
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    zone_index: usize,
    probe: Probe,
    tolerance: Option<PlanarTolerance>,
}

/// Maps probe points to zone names using per-kind priority lists.
#[derive(Debug, Clone)]
pub struct ZoneClassifier {
    zones: Vec<Zone>,
    routes: HashMap<GestureKind, Vec<CompiledRoute>>,
}

impl ZoneClassifier {
    /// Builds the classifier, rejecting routes that name unknown zones.
    pub fn new(zones: Vec<Zone>, kind_routes: &[KindRoutes]) -> Result<Self> {
        let mut routes: HashMap<GestureKind, Vec<CompiledRoute>> = HashMap::new();
        for entry in kind_routes {
            if routes.contains_key(&entry.kind) {
                return Err(Error::Config(format!("routes for `{}` are listed more than once", entry.kind)));
            }
            let mut compiled = Vec::with_capacity(entry.routes.len());
            for route in &entry.routes {
                let zone_index = zones
                    .iter()
                    .position(|z| z.name == route.zone)
                    .ok_or_else(|| Error::Config(format!("route for `{}` names unknown zone `{}`", entry.kind, route.zone)))?;
                if let Some(t) = &route.tolerance {
                    check_tolerance(&route.zone, "route tolerance x", t.x)?;
                    check_tolerance(&route.zone, "route tolerance z", t.z)?;
                }
                compiled.push(CompiledRoute {
                    zone_index,
                    probe: route.probe,
                    tolerance: route.tolerance,
                });
            }
            routes.insert(entry.kind, compiled);
        }
        Ok(Self { zones, routes })
    }

    /// Returns the first routed zone containing a probe point, or [`NO_ZONE`].
    pub fn classify(&self, kind: GestureKind, hands: &[Point3], body_center: Option<Point3>) -> &str {
        let Some(routes) = self.routes.get(&kind) else {
            return NO_ZONE;
        };
        for route in routes {
            let zone = &self.zones[route.zone_index];
            let tolerance = route.tolerance.as_ref();
            let hit = match route.probe {
                Probe::Hands => hands.iter().any(|p| zone.contains_with(p, tolerance)),
                Probe::BodyCenter => body_center.is_some_and(|p| zone.contains_with(&p, tolerance)),
            };
            if hit {
                return &zone.name;
            }
        }
        NO_ZONE
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Zone names tried for `kind`, in priority order.
    pub fn priority(&self, kind: GestureKind) -> Vec<&str> {
        self.routes
            .get(&kind)
            .map(|routes| routes.iter().map(|r| self.zones[r.zone_index].name.as_str()).collect())
            .unwrap_or_default()
    }
}
