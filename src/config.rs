// THEORY:
// `Config` is every tunable of the engine in one serialisable value: the zone
// table, per-kind zone routes, confidence cutoffs, activity rules and history
// sizing. `Config::default()` is the reference kitchen layout, so a run with
// no file behaves like the stock deployment.
//
// Key architectural principles:
// 1.  **One Source of Truth**: the classifier, resolver and rule engine are all
//     built from a `Config`. None of them hard-codes a zone or a rule.
// 2.  **Validate Before Use**: `load` and the builders reject unknown zones,
//     duplicate names and out-of-range cutoffs up front, so a bad file fails
//     at startup and never mid-replay.
// 3.  **Partial Files**: every section has a default. A file that only lists
//     rules keeps the stock zones. Files are TOML unless their extension is
//     `.json`.

use crate::core_modules::event_log::DEFAULT_LOG_CAPACITY;
use crate::core_modules::floor_corrector::Point3;
use crate::core_modules::gesture::GestureKind;
use crate::core_modules::label_resolver::{GestureLabelResolver, WinnerPolicy, DEFAULT_THRESHOLD};
use crate::core_modules::rule_engine::{ActivityRule, ActivityRuleEngine};
use crate::core_modules::zone::{KindRoutes, Probe, Zone, ZoneClassifier, ZoneRoute};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Minimum winning confidence for an event to be pushed into history.
pub const DEFAULT_RECORD_CONFIDENCE: f32 = 0.4;

/// Broadcast buffer for activity and diagnostics subscribers.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub history: HistoryConfig,
    pub zones: Vec<Zone>,
    pub routes: Vec<KindRoutes>,
    pub rules: Vec<ActivityRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub policy: WinnerPolicy,
    /// Also require the gesture engine's own `detected` flag.
    pub require_detected: bool,
    /// Winning confidence at or above which an event is recorded and evaluated.
    pub record_confidence: f32,
    pub thresholds: KindThresholds,
}

/// Per-kind cutoffs. A kind left out of an explicit table never wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KindThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick_up: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_down: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_door: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_to_mouth: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pour: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Entries kept per (kind, zone) history.
    pub capacity: usize,
    pub bus_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            history: HistoryConfig::default(),
            zones: default_zones(),
            routes: default_routes(),
            rules: ActivityRule::defaults(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            policy: WinnerPolicy::default(),
            require_detected: false,
            record_confidence: DEFAULT_RECORD_CONFIDENCE,
            thresholds: KindThresholds::uniform(DEFAULT_THRESHOLD),
        }
    }
}

impl Default for KindThresholds {
    fn default() -> Self {
        Self::uniform(DEFAULT_THRESHOLD)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl KindThresholds {
    pub fn uniform(threshold: f32) -> Self {
        Self {
            pick_up: Some(threshold),
            put_down: Some(threshold),
            open_door: Some(threshold),
            hand_to_mouth: Some(threshold),
            pour: Some(threshold),
        }
    }

    pub fn get(&self, kind: GestureKind) -> Option<f32> {
        match kind {
            GestureKind::PickUp => self.pick_up,
            GestureKind::PutDown => self.put_down,
            GestureKind::OpenDoor => self.open_door,
            GestureKind::HandToMouth => self.hand_to_mouth,
            GestureKind::Pour => self.pour,
        }
    }

    pub fn to_map(&self) -> HashMap<GestureKind, f32> {
        GestureKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind).map(|t| (*kind, t)))
            .collect()
    }
}

fn default_zones() -> Vec<Zone> {
    vec![
        Zone::volumetric("Medication", Point3::new(1.11, 0.86, 1.68), 0.1, 0.1, 0.1),
        Zone::planar("Pantry", Point3::new(-0.45, 1.25, 1.40), 0.15, 0.3),
        Zone::planar("Fridge", Point3::new(1.75, 1.15, 4.40), 0.5, 0.5),
        Zone::planar("BowlCupboard", Point3::new(0.75, 1.10, 2.50), 0.15, 0.3),
        Zone::planar("FoodPrep", Point3::new(-0.10, 1.22, 2.83), 0.15, 0.3),
        Zone::planar("Dining", Point3::new(-0.31, 0.78, 1.98), 0.15, 0.3),
    ]
}

fn default_routes() -> Vec<KindRoutes> {
    let body = |zone: &str| ZoneRoute::new(zone, Probe::BodyCenter);
    vec![
        KindRoutes {
            kind: GestureKind::PickUp,
            routes: vec![
                ZoneRoute::new("Medication", Probe::Hands),
                body("Pantry"),
                body("Fridge"),
                body("BowlCupboard"),
                body("FoodPrep"),
            ],
        },
        KindRoutes {
            kind: GestureKind::PutDown,
            routes: vec![body("FoodPrep").with_tolerance(0.4, 0.4)],
        },
        KindRoutes {
            kind: GestureKind::OpenDoor,
            routes: vec![body("Pantry"), body("Fridge"), body("BowlCupboard")],
        },
        KindRoutes {
            kind: GestureKind::HandToMouth,
            routes: vec![body("Dining")],
        },
        KindRoutes {
            kind: GestureKind::Pour,
            routes: vec![body("FoodPrep")],
        },
    ]
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for zone in &self.zones {
            zone.validate()?;
            if !names.insert(zone.name.as_str()) {
                return Err(Error::Config(format!("zone `{}` is defined more than once", zone.name)));
            }
        }

        for kind in GestureKind::ALL {
            if let Some(t) = self.resolver.thresholds.get(kind) {
                if !(0.0..=1.0).contains(&t) {
                    return Err(Error::Config(format!("threshold for {kind} must be in [0, 1], got {t}")));
                }
            }
        }
        if !(0.0..=1.0).contains(&self.resolver.record_confidence) {
            return Err(Error::Config(format!(
                "record_confidence must be in [0, 1], got {}",
                self.resolver.record_confidence
            )));
        }
        if self.history.capacity == 0 {
            return Err(Error::Config("history capacity must be > 0".to_string()));
        }
        if self.history.bus_capacity == 0 {
            return Err(Error::Config("bus_capacity must be > 0".to_string()));
        }

        let mut rule_names = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !rule_names.insert(rule.name.as_str()) {
                return Err(Error::Config(format!("rule `{}` is defined more than once", rule.name)));
            }
        }

        // Route checks live in the classifier.
        ZoneClassifier::new(self.zones.clone(), &self.routes)?;
        Ok(())
    }

    /// Loads and validates a config file; `.json` files are JSON, anything else TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn classifier(&self) -> Result<ZoneClassifier> {
        ZoneClassifier::new(self.zones.clone(), &self.routes)
    }

    pub fn resolver(&self) -> GestureLabelResolver {
        GestureLabelResolver::new(
            self.resolver.thresholds.to_map(),
            self.resolver.policy,
            self.resolver.require_detected,
        )
    }

    pub fn engine(&self) -> Result<ActivityRuleEngine> {
        ActivityRuleEngine::new(self.rules.clone(), self.history.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.zones.len(), 6);
        assert_eq!(config.history.capacity, 32);
        assert_eq!(config.resolver.record_confidence, 0.4);
        assert_eq!(config.resolver.thresholds.get(GestureKind::Pour), Some(0.05));
    }

    #[test]
    fn default_config_survives_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config = Config::from_toml_str(
            r#"
            [resolver]
            policy = "LastDeclared"
            record_confidence = 0.2

            [history]
            capacity = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.resolver.policy, WinnerPolicy::LastDeclared);
        assert_eq!(config.history.capacity, 8);
        assert_eq!(config.history.bus_capacity, DEFAULT_BUS_CAPACITY);
        assert_eq!(config.zones, default_zones());
    }

    #[test]
    fn explicit_threshold_table_drops_omitted_kinds() {
        let config = Config::from_toml_str(
            r#"
            [resolver.thresholds]
            PickUp = 0.1
            HandToMouth = 0.2
            "#,
        )
        .unwrap();
        let map = config.resolver.thresholds.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&GestureKind::HandToMouth), Some(&0.2));
        assert_eq!(config.resolver().threshold(GestureKind::Pour), None);
    }

    #[test]
    fn rules_and_routes_parse_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [[zones]]
            name = "Sink"
            tolerance_x = 0.3
            tolerance_z = 0.3
            anchor = { x = 0.0, y = 1.0, z = 2.0 }

            [[routes]]
            kind = "Pour"
            routes = [{ zone = "Sink", probe = "Hands", tolerance = { x = 0.5, z = 0.5 } }]

            [[rules]]
            name = "Drink"
            requires = ["Pour@Sink"]
            trigger = { kind = "HandToMouth" }
            constraints = [{ type = "MaxAge", log = "Pour@Sink", secs = 30 }]
            "#,
        )
        .unwrap();
        assert_eq!(config.zones.len(), 1);
        assert!(!config.zones[0].uses_y);
        assert_eq!(config.routes[0].routes[0].tolerance.map(|t| t.x), Some(0.5));
        assert_eq!(config.rules[0].trigger.zone, None);
        assert!(config.engine().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = Config::default();
        config.zones[1].tolerance_x = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.zones.push(config.zones[0].clone());
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("more than once")));

        let mut config = Config::default();
        config.resolver.thresholds.pour = Some(1.5);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.routes[0].routes.push(ZoneRoute::new("Garage", Probe::Hands));
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("sentinel.toml");
        std::fs::write(&toml_path, "[history]\ncapacity = 4\n").unwrap();
        assert_eq!(Config::load(&toml_path).unwrap().history.capacity, 4);

        let json_path = dir.path().join("sentinel.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        writeln!(file, r#"{{ "history": {{ "capacity": 5 }} }}"#).unwrap();
        assert_eq!(Config::load(&json_path).unwrap().history.capacity, 5);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(Error::Io(_))));
    }
}
