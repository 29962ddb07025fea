// THEORY:
// The gesture engine scores every kind it knows on every frame, so a single
// body can "be" a PickUp at 0.3, a Pour at 0.2 and a HandToMouth at 0.07 all at
// once. The `GestureLabelResolver` collapses those scores into one label per
// body per frame.
//
// Key architectural principles:
// 1.  **Per-Kind Gates**: each kind has its own cutoff. A kind is a candidate
//     only when its confidence is strictly above that cutoff; a kind with no
//     cutoff is never a candidate.
// 2.  **Deterministic Winner**: when several kinds pass, the `WinnerPolicy`
//     decides. Ties and "last one wins" both resolve by `GestureKind`
//     declaration order, never by the order the engine happened to report in.
// 3.  **Stateless**: the resolver remembers nothing between frames.

use crate::core_modules::gesture::{GestureKind, GestureLabel, GestureObservation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cutoff applied to every kind unless configured otherwise.
pub const DEFAULT_THRESHOLD: f32 = 0.05;

/// How the winning kind is chosen when more than one passes its cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WinnerPolicy {
    /// Greatest confidence wins; equal confidences go to the later-declared kind.
    #[default]
    HighestConfidence,
    /// The later-declared kind wins regardless of confidence.
    LastDeclared,
}

#[derive(Debug, Clone)]
pub struct GestureLabelResolver {
    thresholds: HashMap<GestureKind, f32>,
    policy: WinnerPolicy,
    require_detected: bool,
}

impl Default for GestureLabelResolver {
    fn default() -> Self {
        Self::uniform(DEFAULT_THRESHOLD, WinnerPolicy::default())
    }
}

impl GestureLabelResolver {
    pub fn new(thresholds: HashMap<GestureKind, f32>, policy: WinnerPolicy, require_detected: bool) -> Self {
        Self {
            thresholds,
            policy,
            require_detected,
        }
    }

    /// Same cutoff for every kind.
    pub fn uniform(threshold: f32, policy: WinnerPolicy) -> Self {
        let thresholds = GestureKind::ALL.iter().map(|k| (*k, threshold)).collect();
        Self::new(thresholds, policy, false)
    }

    pub fn threshold(&self, kind: GestureKind) -> Option<f32> {
        self.thresholds.get(&kind).copied()
    }

    pub fn policy(&self) -> WinnerPolicy {
        self.policy
    }

    fn passes(&self, observation: &GestureObservation) -> bool {
        let Some(threshold) = self.threshold(observation.kind) else {
            return false;
        };
        observation.confidence > threshold && (!self.require_detected || observation.detected)
    }

    /// The winning observation among one body's observations for this frame.
    pub fn resolve<'a>(&self, observations: &'a [GestureObservation]) -> Option<&'a GestureObservation> {
        let candidates = observations.iter().filter(|o| self.passes(o));
        match self.policy {
            WinnerPolicy::HighestConfidence => candidates.max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| a.kind.cmp(&b.kind))
            }),
            WinnerPolicy::LastDeclared => candidates.max_by_key(|o| o.kind),
        }
    }

    pub fn resolve_label(&self, observations: &[GestureObservation]) -> GestureLabel {
        self.resolve(observations)
            .map_or(GestureLabel::NoGesture, |o| GestureLabel::Gesture(o.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn obs(kind: GestureKind, confidence: f32) -> GestureObservation {
        GestureObservation {
            body_id: 7,
            kind,
            confidence,
            detected: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn confidence_must_be_strictly_above_cutoff() {
        let resolver = GestureLabelResolver::default();
        assert_eq!(resolver.resolve_label(&[obs(GestureKind::Pour, 0.04)]), GestureLabel::NoGesture);
        assert_eq!(resolver.resolve_label(&[obs(GestureKind::Pour, 0.05)]), GestureLabel::NoGesture);
        assert_eq!(
            resolver.resolve_label(&[obs(GestureKind::Pour, 0.06)]),
            GestureLabel::Gesture(GestureKind::Pour)
        );
    }

    #[test]
    fn empty_frame_is_no_gesture() {
        assert_eq!(GestureLabelResolver::default().resolve_label(&[]), GestureLabel::NoGesture);
    }

    #[test]
    fn highest_confidence_wins() {
        let resolver = GestureLabelResolver::default();
        let frame = [
            obs(GestureKind::PickUp, 0.7),
            obs(GestureKind::Pour, 0.2),
            obs(GestureKind::HandToMouth, 0.06),
        ];
        assert_eq!(resolver.resolve_label(&frame), GestureLabel::Gesture(GestureKind::PickUp));
    }

    #[test]
    fn ties_go_to_later_declared_kind_in_any_report_order() {
        let resolver = GestureLabelResolver::default();
        let a = [obs(GestureKind::Pour, 0.5), obs(GestureKind::PutDown, 0.5)];
        let b = [obs(GestureKind::PutDown, 0.5), obs(GestureKind::Pour, 0.5)];
        assert_eq!(resolver.resolve_label(&a), GestureLabel::Gesture(GestureKind::Pour));
        assert_eq!(resolver.resolve_label(&b), GestureLabel::Gesture(GestureKind::Pour));
    }

    #[test]
    fn last_declared_ignores_confidence() {
        let resolver = GestureLabelResolver::uniform(DEFAULT_THRESHOLD, WinnerPolicy::LastDeclared);
        let frame = [obs(GestureKind::PickUp, 0.9), obs(GestureKind::OpenDoor, 0.1)];
        assert_eq!(resolver.resolve_label(&frame), GestureLabel::Gesture(GestureKind::OpenDoor));
    }

    #[test]
    fn kind_without_cutoff_never_wins() {
        let thresholds = HashMap::from([(GestureKind::PickUp, 0.05)]);
        let resolver = GestureLabelResolver::new(thresholds, WinnerPolicy::HighestConfidence, false);
        let frame = [obs(GestureKind::Pour, 0.99), obs(GestureKind::PickUp, 0.1)];
        assert_eq!(resolver.resolve(&frame).map(|o| o.kind), Some(GestureKind::PickUp));
    }

    #[test]
    fn detected_flag_gate_is_optional() {
        let mut flagged = obs(GestureKind::Pour, 0.3);
        let resolver = GestureLabelResolver::new(
            GestureKind::ALL.iter().map(|k| (*k, DEFAULT_THRESHOLD)).collect(),
            WinnerPolicy::HighestConfidence,
            true,
        );
        assert!(resolver.resolve(std::slice::from_ref(&flagged)).is_none());
        flagged.detected = true;
        assert!(resolver.resolve(std::slice::from_ref(&flagged)).is_some());
    }
}
