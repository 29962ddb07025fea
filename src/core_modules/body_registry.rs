// THEORY:
// The `BodyRegistry` gives the engine a notion of "who". The tracker hands out
// a tracking id per body and reuses a handful of slots; the registry keeps one
// `BodyState` per live id so the pipeline can tell a body it has been following
// from one that just walked in, and can forget bodies that have left.
//
// Key architectural principles:
// 1.  **Keyed, Not Indexed**: state lives in a map keyed by tracking id, never in
//     parallel arrays indexed by sensor slot.
// 2.  **Lifecycle Management**: a body is born the first time it is seen
//     tracked, ages while it stays in view, and is dropped after too many
//     frames unseen. An untracked snapshot (zero id or invalid flag) clears it
//     at once.
// 3.  **Pause Until Re-acquired**: when the tracker reports a body lost, its
//     label state is cleared and it stays paused even if later frames still
//     list it. It resumes only after the tracker re-acquires it, meaning it
//     drops out of at least one frame and then comes back tracked.
// 4.  **No History Ownership**: forgetting a body never touches the event
//     histories. Activities are about the room, not about one tracking id.

use crate::core_modules::frame::BodySnapshot;
use crate::core_modules::gesture::{GestureLabel, NO_ZONE};
use std::collections::HashMap;
use tracing::debug;

/// How many frames a body can go unseen before it is forgotten.
pub const MAX_FRAMES_SINCE_SEEN: u32 = 30;

/// What the engine remembers about one tracked body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    pub tracking_id: u64,
    /// Set by a tracking-lost notification, cleared when the body is re-acquired.
    pub paused: bool,
    /// The label resolved for this body on the last frame it was processed.
    pub last_label: GestureLabel,
    /// The zone that label was matched to.
    pub last_zone: String,
    pub last_confidence: f32,
    /// The number of frames this body has been seen tracked.
    pub age: u32,
    /// The number of frames since this body was last seen tracked.
    pub frames_since_seen: u32,
}

impl BodyState {
    fn new(tracking_id: u64) -> Self {
        Self {
            tracking_id,
            paused: false,
            last_label: GestureLabel::NoGesture,
            last_zone: NO_ZONE.to_string(),
            last_confidence: 0.0,
            age: 0,
            frames_since_seen: 0,
        }
    }

    fn clear_label(&mut self) {
        self.last_label = GestureLabel::NoGesture;
        self.last_zone = NO_ZONE.to_string();
        self.last_confidence = 0.0;
    }

    fn seen(&mut self) {
        // Back after at least one frame away: the tracker re-acquired it.
        if self.frames_since_seen > 0 {
            self.paused = false;
        }
        self.age += 1;
        self.frames_since_seen = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    bodies: HashMap<u64, BodyState>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates lifecycles from one frame's snapshots and returns the ids to process, in frame order.
    pub fn observe_frame(&mut self, snapshots: &[BodySnapshot]) -> Vec<u64> {
        let mut active = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            if !snapshot.is_tracked() {
                if self.bodies.remove(&snapshot.tracking_id).is_some() {
                    debug!(tracking_id = snapshot.tracking_id, "body untracked, state cleared");
                }
                continue;
            }
            if active.contains(&snapshot.tracking_id) {
                continue;
            }
            self.bodies
                .entry(snapshot.tracking_id)
                .or_insert_with(|| {
                    debug!(tracking_id = snapshot.tracking_id, "new body");
                    BodyState::new(snapshot.tracking_id)
                })
                .seen();
            active.push(snapshot.tracking_id);
        }

        self.bodies.retain(|id, state| {
            if active.contains(id) {
                return true;
            }
            state.frames_since_seen += 1;
            let keep = state.frames_since_seen <= MAX_FRAMES_SINCE_SEEN;
            if !keep {
                debug!(tracking_id = id, "body not seen for too long, dropped");
            }
            keep
        });
        active
    }

    /// Pauses a body and clears its label state; returns `false` when the id is unknown.
    pub fn tracking_lost(&mut self, tracking_id: u64) -> bool {
        match self.bodies.get_mut(&tracking_id) {
            Some(state) => {
                state.paused = true;
                state.clear_label();
                true
            }
            None => false,
        }
    }

    /// Whether observations for this body should be processed.
    pub fn is_active(&self, tracking_id: u64) -> bool {
        self.bodies
            .get(&tracking_id)
            .is_some_and(|state| !state.paused && state.frames_since_seen == 0)
    }

    pub fn record_label(&mut self, tracking_id: u64, label: GestureLabel, zone: &str, confidence: f32) {
        if let Some(state) = self.bodies.get_mut(&tracking_id) {
            state.last_label = label;
            state.last_zone = zone.to_string();
            state.last_confidence = confidence;
        }
    }

    pub fn get(&self, tracking_id: u64) -> Option<&BodyState> {
        self.bodies.get(&tracking_id)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BodyState> {
        self.bodies.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::BodyJoints;
    use crate::core_modules::floor_corrector::Point3;
    use crate::core_modules::gesture::GestureKind;

    fn snap(id: u64) -> BodySnapshot {
        BodySnapshot::tracked(
            id,
            BodyJoints {
                hand_tip_left: Point3::default(),
                hand_tip_right: Point3::default(),
                spine_mid: Point3::default(),
            },
        )
    }

    #[test]
    fn bodies_are_born_and_age() {
        let mut registry = BodyRegistry::new();
        assert_eq!(registry.observe_frame(&[snap(3), snap(8)]), vec![3, 8]);
        registry.observe_frame(&[snap(3)]);
        assert_eq!(registry.get(3).map(|b| b.age), Some(2));
        assert_eq!(registry.get(8).map(|b| b.frames_since_seen), Some(1));
        assert!(registry.is_active(3));
        assert!(!registry.is_active(8));
    }

    #[test]
    fn bodies_unseen_too_long_are_dropped() {
        let mut registry = BodyRegistry::new();
        registry.observe_frame(&[snap(5)]);
        for _ in 0..MAX_FRAMES_SINCE_SEEN {
            registry.observe_frame(&[]);
        }
        assert!(registry.get(5).is_some());
        registry.observe_frame(&[]);
        assert!(registry.get(5).is_none());
    }

    #[test]
    fn untracked_snapshot_clears_state() {
        let mut registry = BodyRegistry::new();
        registry.observe_frame(&[snap(5)]);
        registry.record_label(5, GestureLabel::Gesture(GestureKind::Pour), "FoodPrep", 0.6);

        let mut lost = snap(5);
        lost.tracking_valid = false;
        assert!(registry.observe_frame(&[lost, snap(0)]).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn tracking_lost_clears_label_and_pauses() {
        let mut registry = BodyRegistry::new();
        registry.observe_frame(&[snap(5)]);
        registry.record_label(5, GestureLabel::Gesture(GestureKind::Pour), "FoodPrep", 0.6);
        assert!(registry.tracking_lost(5));
        assert!(!registry.tracking_lost(6));
        assert!(!registry.is_active(5));

        let state = registry.get(5).unwrap();
        assert!(state.paused);
        assert_eq!(state.last_label, GestureLabel::NoGesture);
        assert_eq!(state.last_zone, NO_ZONE);
        assert_eq!(state.last_confidence, 0.0);
    }

    #[test]
    fn lost_body_stays_paused_until_reacquired() {
        let mut registry = BodyRegistry::new();
        registry.observe_frame(&[snap(5)]);
        registry.tracking_lost(5);

        // Still listed by the tracker, but not re-acquired yet.
        registry.observe_frame(&[snap(5)]);
        registry.observe_frame(&[snap(5)]);
        assert!(!registry.is_active(5));

        registry.observe_frame(&[]);
        assert!(!registry.is_active(5));
        registry.observe_frame(&[snap(5)]);
        assert!(registry.is_active(5));
        assert!(registry.get(5).is_some_and(|b| !b.paused));
    }

    #[test]
    fn lost_body_seen_untracked_comes_back_fresh() {
        let mut registry = BodyRegistry::new();
        registry.observe_frame(&[snap(5)]);
        registry.tracking_lost(5);

        let mut untracked = snap(5);
        untracked.tracking_valid = false;
        registry.observe_frame(&[untracked]);
        registry.observe_frame(&[snap(5)]);
        assert!(registry.is_active(5));
        assert_eq!(registry.get(5).map(|b| b.age), Some(1));
    }
}
