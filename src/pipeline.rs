// THEORY:
// The `pipeline` module is the top-level API for the inference engine. It wires
// the core modules into one synchronous call: hand it a `BodyFrame`, get back a
// `Report` saying whether any activity was recognised.
//
// Per frame, for each tracked body in frame order:
// 1.  Correct the hand tips and spine for sensor tilt.
// 2.  Resolve the body's gesture scores into one label.
// 3.  Classify the zone the winning kind happened in.
// 4.  Tell observers about the resolved event.
// 5.  If the win was confident enough, record it and let the rule engine react
//     before the next body is looked at.
//
// Everything the engine decided about each body is kept as diagnostics until
// the next frame, so a UI or log can show what the engine "thinks" without
// reaching into its internals.

use crate::config::Config;
use crate::core_modules::body_registry::BodyRegistry;
use crate::core_modules::floor_corrector::{FloorCorrector, Point3};
use crate::core_modules::frame::BodyFrame;
use crate::core_modules::gesture::{GestureLabel, ResolvedEvent, Timestamp, NO_ZONE};
use crate::core_modules::label_resolver::GestureLabelResolver;
use crate::core_modules::rule_engine::{ActivityEvent, ActivityRuleEngine};
use crate::core_modules::zone::ZoneClassifier;
use crate::Result;
use serde::Serialize;
use tracing::{debug, trace, warn};

/// Receives every resolved event, whether or not it clears the recording gate.
pub trait ResolvedEventObserver: Send {
    fn on_resolved(&mut self, event: &ResolvedEvent);
}

impl<F> ResolvedEventObserver for F
where
    F: FnMut(&ResolvedEvent) + Send,
{
    fn on_resolved(&mut self, event: &ResolvedEvent) {
        self(event)
    }
}

/// What the engine decided about one body in the last frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyDiagnostics {
    pub tracking_id: u64,
    /// Floor-relative left and right hand tips.
    pub hands: [Point3; 2],
    /// Floor-relative spine mid-point.
    pub spine: Point3,
    /// The floor plane had no usable tilt, so positions are raw.
    pub correction_fallback: bool,
    pub label: GestureLabel,
    pub zone: String,
    pub confidence: f32,
    /// Whether the event cleared the recording gate.
    pub recorded: bool,
}

/// The data package for a frame in which at least one activity fired.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityData {
    pub events: Vec<ActivityEvent>,
}

/// The primary output of the pipeline for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    NoActivity,
    Activity(ActivityData),
}

pub struct ActivityPipeline {
    classifier: ZoneClassifier,
    resolver: GestureLabelResolver,
    engine: ActivityRuleEngine,
    registry: BodyRegistry,
    observers: Vec<Box<dyn ResolvedEventObserver>>,
    record_confidence: f32,
    last_diagnostics: Vec<BodyDiagnostics>,
    last_timestamp: Option<Timestamp>,
}

impl ActivityPipeline {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            classifier: config.classifier()?,
            resolver: config.resolver(),
            engine: config.engine()?,
            registry: BodyRegistry::new(),
            observers: Vec::new(),
            record_confidence: config.resolver.record_confidence,
            last_diagnostics: Vec::new(),
            last_timestamp: None,
        })
    }

    pub fn add_observer(&mut self, observer: Box<dyn ResolvedEventObserver>) {
        self.observers.push(observer);
    }

    pub fn activity_detected(&mut self, frame: &BodyFrame) -> bool {
        let report = self.generate_report(frame);
        matches!(report, Report::Activity(_))
    }

    pub fn generate_report(&mut self, frame: &BodyFrame) -> Report {
        if let Some(last) = self.last_timestamp {
            if frame.timestamp < last {
                warn!(frame = %frame.timestamp, previous = %last, "frame timestamp went backwards");
            }
        }
        self.last_timestamp = Some(frame.timestamp);
        self.last_diagnostics.clear();

        let corrector = FloorCorrector::new(frame.floor_plane);
        let active = self.registry.observe_frame(&frame.bodies);
        let mut events = Vec::new();

        for tracking_id in active {
            if !self.registry.is_active(tracking_id) {
                continue;
            }
            let joints = frame
                .bodies
                .iter()
                .find(|b| b.is_tracked() && b.tracking_id == tracking_id)
                .and_then(|b| b.joints);
            let Some(joints) = joints else {
                trace!(tracking_id, "no joints this frame, body skipped");
                continue;
            };

            let left = corrector.correct(joints.hand_tip_left);
            let right = corrector.correct(joints.hand_tip_right);
            let spine = corrector.correct(joints.spine_mid);
            let correction_fallback = left.is_fallback() || right.is_fallback() || spine.is_fallback();
            let hands = [left.point(), right.point()];

            let observations = frame.observations_for(tracking_id);
            let Some(winner) = self.resolver.resolve(&observations) else {
                self.registry.record_label(tracking_id, GestureLabel::NoGesture, NO_ZONE, 0.0);
                self.last_diagnostics.push(BodyDiagnostics {
                    tracking_id,
                    hands,
                    spine: spine.point(),
                    correction_fallback,
                    label: GestureLabel::NoGesture,
                    zone: NO_ZONE.to_string(),
                    confidence: 0.0,
                    recorded: false,
                });
                continue;
            };

            let zone = self.classifier.classify(winner.kind, &hands, Some(spine.point()));
            let event = ResolvedEvent {
                body_id: tracking_id,
                kind: winner.kind,
                zone: zone.to_string(),
                confidence: winner.confidence,
                timestamp: frame.timestamp,
            };
            let label = GestureLabel::Gesture(event.kind);
            self.registry.record_label(tracking_id, label, &event.zone, event.confidence);
            for observer in &mut self.observers {
                observer.on_resolved(&event);
            }

            let recorded = event.confidence >= self.record_confidence;
            if recorded {
                debug!(tracking_id, kind = %event.kind, zone = %event.zone, confidence = event.confidence, "event recorded");
                events.extend(self.engine.ingest(&event));
            }
            self.last_diagnostics.push(BodyDiagnostics {
                tracking_id,
                hands,
                spine: spine.point(),
                correction_fallback,
                label,
                zone: event.zone,
                confidence: event.confidence,
                recorded,
            });
        }

        if events.is_empty() {
            Report::NoActivity
        } else {
            Report::Activity(ActivityData { events })
        }
    }

    /// Pauses a body and clears its label until the tracker re-acquires it.
    pub fn tracking_lost(&mut self, tracking_id: u64) -> bool {
        let known = self.registry.tracking_lost(tracking_id);
        if known {
            debug!(tracking_id, "tracking lost, body paused");
        }
        known
    }

    pub fn last_diagnostics(&self) -> &[BodyDiagnostics] {
        &self.last_diagnostics
    }

    pub fn engine(&self) -> &ActivityRuleEngine {
        &self.engine
    }

    pub fn registry(&self) -> &BodyRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::event_log::LogKey;
    use crate::core_modules::floor_corrector::FloorPlane;
    use crate::core_modules::frame::{BodyJoints, BodySnapshot};
    use crate::core_modules::gesture::{GestureKind, GestureObservation};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    const LEVEL: FloorPlane = FloorPlane::new(0.0, 1.0, 0.0, 0.0);
    const MEDICATION: Point3 = Point3::new(1.11, 0.86, 1.68);
    const ELSEWHERE: Point3 = Point3::new(5.0, 1.0, 9.0);

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap() + Duration::seconds(secs)
    }

    fn frame(secs: i64, body: u64, hands: Point3, scores: &[(GestureKind, f32)]) -> BodyFrame {
        let mut frame = BodyFrame::new(t(secs), LEVEL);
        frame.bodies.push(BodySnapshot::tracked(
            body,
            BodyJoints {
                hand_tip_left: hands,
                hand_tip_right: ELSEWHERE,
                spine_mid: ELSEWHERE,
            },
        ));
        frame.observations = scores
            .iter()
            .map(|(kind, confidence)| GestureObservation {
                body_id: body,
                kind: *kind,
                confidence: *confidence,
                detected: true,
                timestamp: t(secs),
            })
            .collect();
        frame
    }

    fn pipeline() -> ActivityPipeline {
        ActivityPipeline::new(&Config::default()).unwrap()
    }

    #[test]
    fn medication_taken_end_to_end() {
        let mut pipeline = pipeline();
        let report = pipeline.generate_report(&frame(0, 1, MEDICATION, &[(GestureKind::PickUp, 0.8)]));
        assert_eq!(report, Report::NoActivity);
        let diag = &pipeline.last_diagnostics()[0];
        assert_eq!(diag.zone, "Medication");
        assert!(diag.recorded);

        let report = pipeline.generate_report(&frame(60, 1, ELSEWHERE, &[(GestureKind::HandToMouth, 0.7)]));
        let Report::Activity(data) = report else {
            panic!("expected an activity, got {report:?}");
        };
        assert_eq!(data.events[0].name, "MedicationTaken");
        assert_eq!(data.events[0].timestamp, t(60));
    }

    #[test]
    fn weak_wins_are_labelled_but_not_recorded() {
        let mut pipeline = pipeline();
        pipeline.generate_report(&frame(0, 1, MEDICATION, &[(GestureKind::PickUp, 0.3)]));
        let diag = &pipeline.last_diagnostics()[0];
        assert_eq!(diag.label, GestureLabel::Gesture(GestureKind::PickUp));
        assert!(!diag.recorded);
        assert_eq!(pipeline.engine().logs().count(&LogKey::new(GestureKind::PickUp, "Medication")), 0);

        assert!(!pipeline.activity_detected(&frame(10, 1, ELSEWHERE, &[(GestureKind::HandToMouth, 0.9)])));
    }

    #[test]
    fn observers_see_every_resolved_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut pipeline = pipeline();
        pipeline.add_observer(Box::new(move |event: &ResolvedEvent| {
            sink.lock().unwrap().push((event.kind, event.zone.clone()));
        }));

        pipeline.generate_report(&frame(0, 1, MEDICATION, &[(GestureKind::PickUp, 0.2)]));
        pipeline.generate_report(&frame(1, 1, ELSEWHERE, &[(GestureKind::Pour, 0.01)]));
        pipeline.generate_report(&frame(2, 1, ELSEWHERE, &[(GestureKind::Pour, 0.5)]));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (GestureKind::PickUp, "Medication".to_string()),
                (GestureKind::Pour, NO_ZONE.to_string()),
            ]
        );
    }

    #[test]
    fn bodies_without_joints_or_tracking_are_skipped() {
        let mut pipeline = pipeline();
        let mut no_joints = frame(0, 1, MEDICATION, &[(GestureKind::PickUp, 0.9)]);
        no_joints.bodies[0].joints = None;
        pipeline.generate_report(&no_joints);
        assert!(pipeline.last_diagnostics().is_empty());

        let mut untracked = frame(1, 0, MEDICATION, &[(GestureKind::PickUp, 0.9)]);
        untracked.bodies[0].tracking_valid = false;
        pipeline.generate_report(&untracked);
        assert!(pipeline.last_diagnostics().is_empty());
        assert_eq!(pipeline.engine().logs().keys().count(), 0);
    }

    #[test]
    fn observations_for_other_bodies_are_ignored() {
        let mut pipeline = pipeline();
        let mut f = frame(0, 1, MEDICATION, &[]);
        f.observations.push(GestureObservation {
            body_id: 42,
            kind: GestureKind::PickUp,
            confidence: 0.9,
            detected: true,
            timestamp: t(0),
        });
        pipeline.generate_report(&f);
        assert_eq!(pipeline.last_diagnostics()[0].label, GestureLabel::NoGesture);
        assert_eq!(pipeline.engine().logs().keys().count(), 0);
    }

    #[test]
    fn undefined_floor_tilt_is_flagged() {
        let mut pipeline = pipeline();
        let mut f = frame(0, 1, MEDICATION, &[(GestureKind::PickUp, 0.9)]);
        f.floor_plane = FloorPlane::default();
        pipeline.generate_report(&f);
        let diag = &pipeline.last_diagnostics()[0];
        assert!(diag.correction_fallback);
        assert_eq!(diag.zone, "Medication");
    }

    #[test]
    fn tracking_lost_pauses_known_bodies_only() {
        let mut pipeline = pipeline();
        pipeline.generate_report(&frame(0, 1, ELSEWHERE, &[]));
        assert!(pipeline.tracking_lost(1));
        assert!(!pipeline.tracking_lost(2));
        assert!(pipeline.registry().get(1).is_some_and(|b| b.paused));
    }

    #[test]
    fn lost_body_records_nothing_until_reacquired() {
        let mut pipeline = pipeline();
        let pick_up = LogKey::new(GestureKind::PickUp, "Medication");
        pipeline.generate_report(&frame(0, 1, ELSEWHERE, &[]));
        pipeline.tracking_lost(1);

        // The tracker still lists body 1 on the very next frame.
        pipeline.generate_report(&frame(1, 1, MEDICATION, &[(GestureKind::PickUp, 0.9)]));
        assert!(pipeline.last_diagnostics().is_empty());
        assert_eq!(pipeline.engine().logs().count(&pick_up), 0);
        assert_eq!(pipeline.registry().get(1).map(|b| b.last_label), Some(GestureLabel::NoGesture));

        let mut gone = frame(2, 1, ELSEWHERE, &[]);
        gone.bodies.clear();
        pipeline.generate_report(&gone);

        pipeline.generate_report(&frame(3, 1, MEDICATION, &[(GestureKind::PickUp, 0.9)]));
        assert_eq!(pipeline.last_diagnostics().len(), 1);
        assert_eq!(pipeline.engine().logs().count(&pick_up), 1);
    }
}
