// THEORY:
// The `ActivityRuleEngine` is where isolated gestures become activities. A
// single HandToMouth means little; a HandToMouth shortly after a PickUp at the
// medication shelf means medication was taken. Each `ActivityRule` is plain
// data: a trigger, the histories it needs, and an ordered list of temporal
// constraints over the most recent entry of each history.
//
// Key architectural principles:
// 1.  **Trigger-Driven**: rules are only evaluated when an event of a trigger
//     kind arrives. Every other event is simply recorded.
// 2.  **Checked Guards**: a guard first confirms every required history has an
//     entry, then checks constraints in order and stops at the first unmet one.
//     An empty history is an ordinary outcome (`MissingHistory`), never a fault.
// 3.  **Fire Once, Then Forget**: a rule that fires clears every history it
//     consumed, so the same evidence cannot produce a second activity. The rule
//     stays armed and fires again once fresh evidence accumulates.
// 4.  **Event Time**: ages are measured against the trigger event's own
//     timestamp, so replaying a recorded stream gives the same answers.

use crate::core_modules::event_log::{EventLogBook, LogKey, TemporalEventLog, DEFAULT_LOG_CAPACITY};
use crate::core_modules::gesture::{GestureKind, ResolvedEvent, Timestamp};
use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// A composite activity inferred from gesture history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub name: String,
    pub timestamp: Timestamp,
}

/// The event that causes a rule to be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrigger {
    pub kind: GestureKind,
    /// `None` matches the kind in any zone, including no zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl RuleTrigger {
    pub fn matches(&self, event: &ResolvedEvent) -> bool {
        self.kind == event.kind && self.zone.as_ref().is_none_or(|zone| *zone == event.zone)
    }

    /// The history the trigger itself is recorded into, when it names a zone.
    pub fn log_key(&self) -> Option<LogKey> {
        self.zone.as_ref().map(|zone| LogKey::new(self.kind, zone.clone()))
    }
}

/// A temporal condition over the newest entries of required histories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    /// The newest entry of `log` is less than `secs` seconds old.
    MaxAge { log: LogKey, secs: u64 },
    /// The newest entry of `newer` is strictly later than the newest entry of `older`.
    NewerThan { newer: LogKey, older: LogKey },
}

impl Constraint {
    fn logs(&self) -> Vec<&LogKey> {
        match self {
            Self::MaxAge { log, .. } => vec![log],
            Self::NewerThan { newer, older } => vec![newer, older],
        }
    }

    fn holds(&self, logs: &EventLogBook, now: Timestamp) -> bool {
        match self {
            Self::MaxAge { log, secs } => logs.peek(log).is_some_and(|at| {
                // A window too large for chrono never expires.
                i64::try_from(*secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .is_none_or(|window| now - at < window)
            }),
            Self::NewerThan { newer, older } => match (logs.peek(newer), logs.peek(older)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxAge { log, secs } => write!(f, "age({log}) < {secs}s"),
            Self::NewerThan { newer, older } => write!(f, "{newer} newer than {older}"),
        }
    }
}

/// A named composite activity, described entirely as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRule {
    pub name: String,
    /// Also clear the trigger's own history on firing (only when the trigger names a zone).
    #[serde(default)]
    pub clear_trigger_log: bool,
    pub requires: Vec<LogKey>,
    pub trigger: RuleTrigger,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl ActivityRule {
    /// A HandToMouth anywhere within two minutes of picking something up at the medication shelf.
    pub fn medication_taken() -> Self {
        let pick_up = LogKey::new(GestureKind::PickUp, "Medication");
        Self {
            name: "MedicationTaken".to_string(),
            clear_trigger_log: false,
            requires: vec![pick_up.clone()],
            trigger: RuleTrigger {
                kind: GestureKind::HandToMouth,
                zone: None,
            },
            constraints: vec![Constraint::MaxAge { log: pick_up, secs: 120 }],
        }
    }

    /// Pantry opened, food put down, poured and picked up at the prep area, then eaten at the table.
    pub fn eating_meal() -> Self {
        let open_pantry = LogKey::new(GestureKind::OpenDoor, "Pantry");
        let put_food = LogKey::new(GestureKind::PutDown, "FoodPrep");
        let pour = LogKey::new(GestureKind::Pour, "FoodPrep");
        let pick = LogKey::new(GestureKind::PickUp, "FoodPrep");
        Self {
            name: "EatingMeal".to_string(),
            clear_trigger_log: true,
            requires: vec![open_pantry.clone(), put_food.clone(), pour.clone(), pick.clone()],
            trigger: RuleTrigger {
                kind: GestureKind::HandToMouth,
                zone: Some("Dining".to_string()),
            },
            constraints: vec![
                Constraint::MaxAge { log: open_pantry.clone(), secs: 150 },
                Constraint::NewerThan {
                    newer: open_pantry,
                    older: put_food.clone(),
                },
                Constraint::MaxAge { log: put_food, secs: 120 },
                Constraint::MaxAge { log: pour.clone(), secs: 100 },
                Constraint::MaxAge { log: pick.clone(), secs: 60 },
                Constraint::NewerThan { newer: pick, older: pour },
            ],
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::medication_taken(), Self::eating_meal()]
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("rule name must not be empty".to_string()));
        }
        for constraint in &self.constraints {
            if let Constraint::MaxAge { secs: 0, .. } = constraint {
                return Err(Error::Config(format!("rule `{}`: `{constraint}` can never hold", self.name)));
            }
            if let Some(missing) = constraint.logs().into_iter().find(|log| !self.requires.contains(log)) {
                return Err(Error::Config(format!(
                    "rule `{}`: constraint `{constraint}` uses `{missing}`, which is not in `requires`",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Why a rule did or did not fire on one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Fired(ActivityEvent),
    /// The first required history found empty.
    MissingHistory(LogKey),
    /// The first constraint found not to hold.
    Unmet(Constraint),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    pub rule: String,
    pub outcome: RuleOutcome,
}

impl RuleEvaluation {
    pub fn fired(&self) -> Option<&ActivityEvent> {
        match &self.outcome {
            RuleOutcome::Fired(activity) => Some(activity),
            _ => None,
        }
    }
}

/// Owns every event history and the rule set that consumes them.
#[derive(Debug, Clone)]
pub struct ActivityRuleEngine {
    rules: Vec<ActivityRule>,
    logs: EventLogBook,
}

impl ActivityRuleEngine {
    pub fn new(rules: Vec<ActivityRule>, log_capacity: usize) -> Result<Self> {
        if log_capacity == 0 {
            return Err(Error::Config("history capacity must be at least 1".to_string()));
        }
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self {
            rules,
            logs: EventLogBook::new(log_capacity),
        })
    }

    pub fn with_default_rules() -> Self {
        Self {
            rules: ActivityRule::defaults(),
            logs: EventLogBook::new(DEFAULT_LOG_CAPACITY),
        }
    }

    pub fn rules(&self) -> &[ActivityRule] {
        &self.rules
    }

    pub fn logs(&self) -> &EventLogBook {
        &self.logs
    }

    pub fn log(&self, key: &LogKey) -> Option<&TemporalEventLog> {
        self.logs.get(key)
    }

    pub fn is_trigger(&self, kind: GestureKind) -> bool {
        self.rules.iter().any(|rule| rule.trigger.kind == kind)
    }

    /// Pushes the event into its (kind, zone) history.
    pub fn record(&mut self, event: &ResolvedEvent) {
        self.logs.push(LogKey::new(event.kind, event.zone.clone()), event.timestamp);
    }

    /// Evaluates, in declaration order, every rule the event triggers.
    pub fn evaluate(&mut self, event: &ResolvedEvent) -> Vec<RuleEvaluation> {
        let now = event.timestamp;
        let mut evaluations = Vec::new();
        for index in 0..self.rules.len() {
            if !self.rules[index].trigger.matches(event) {
                continue;
            }
            let outcome = self.check(index, now);
            let rule = &self.rules[index];
            match &outcome {
                RuleOutcome::Fired(_) => {
                    info!(activity = %rule.name, body_id = event.body_id, at = %now, "activity detected");
                }
                RuleOutcome::MissingHistory(log) => {
                    debug!(rule = %rule.name, %log, "guard failed: history empty");
                }
                RuleOutcome::Unmet(constraint) => {
                    debug!(rule = %rule.name, %constraint, "guard failed: constraint unmet");
                }
            }
            evaluations.push(RuleEvaluation {
                rule: rule.name.clone(),
                outcome,
            });
        }
        evaluations
    }

    /// Records the event, then evaluates rules if its kind is a trigger. Returns the activities fired.
    pub fn ingest(&mut self, event: &ResolvedEvent) -> Vec<ActivityEvent> {
        self.record(event);
        if !self.is_trigger(event.kind) {
            return Vec::new();
        }
        self.evaluate(event)
            .into_iter()
            .filter_map(|evaluation| match evaluation.outcome {
                RuleOutcome::Fired(activity) => Some(activity),
                _ => None,
            })
            .collect()
    }

    fn check(&mut self, index: usize, now: Timestamp) -> RuleOutcome {
        let rule = &self.rules[index];
        if let Some(missing) = rule.requires.iter().find(|key| self.logs.peek(key).is_none()) {
            return RuleOutcome::MissingHistory(missing.clone());
        }
        if let Some(unmet) = rule.constraints.iter().find(|c| !c.holds(&self.logs, now)) {
            return RuleOutcome::Unmet(unmet.clone());
        }

        let mut consumed = rule.requires.clone();
        if rule.clear_trigger_log {
            consumed.extend(rule.trigger.log_key());
        }
        let activity = ActivityEvent {
            name: rule.name.clone(),
            timestamp: now,
        };
        for key in &consumed {
            self.logs.clear(key);
        }
        RuleOutcome::Fired(activity)
    }
}
