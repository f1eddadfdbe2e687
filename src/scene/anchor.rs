//! Per-dependent pose reconciliation with tracking-loss hysteresis.
//!
//! Raw tracking flickers: a marker grazing the frame edge drops out for a
//! frame or two and reappears. Each dependent object therefore runs a small
//! state machine that keeps showing stale content for a configurable grace
//! window after loss, so found/lost notifications fire on real transitions
//! only.

use log::debug;
use nalgebra::Matrix4;

use crate::scene::events::EventKind;
use crate::scene::matrix::invert_pose;
use crate::scene::registry::{TrackableHandle, TrackableRegistry};
use crate::scene::visibility::Visibility;

/// Hysteresis state machine shared by anchors and the camera projector.
///
/// Driven once per tick with the source's visibility and the current time;
/// returns the notifications to emit for that transition.
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    state: Visibility,
    /// How long content stays shown after the source becomes invisible.
    seconds_to_remain_visible: f64,
    time_tracking_lost: f64,
}

impl VisibilityGate {
    pub fn new(seconds_to_remain_visible: f64) -> Self {
        Self {
            state: Visibility::Hidden,
            seconds_to_remain_visible,
            time_tracking_lost: 0.0,
        }
    }

    pub fn state(&self) -> Visibility {
        self.state
    }

    /// Whether dependent content should currently be shown.
    pub fn shows_content(&self) -> bool {
        self.state.shows_content()
    }

    /// Advance the state machine one tick.
    pub fn update(&mut self, source_visible: bool, now: f64) -> Vec<EventKind> {
        match self.state {
            Visibility::Hidden => {
                if source_visible {
                    self.state = Visibility::Visible;
                    vec![EventKind::Found]
                } else {
                    Vec::new()
                }
            }
            Visibility::Visible => {
                if source_visible {
                    vec![EventKind::Tracked]
                } else if self.seconds_to_remain_visible > 0.0 {
                    self.state = Visibility::VisibleRemaining;
                    self.time_tracking_lost = now;
                    Vec::new()
                } else {
                    self.state = Visibility::Hidden;
                    vec![EventKind::Lost]
                }
            }
            Visibility::VisibleRemaining => {
                if source_visible {
                    // grace countdown cancelled, no duplicate Found
                    self.state = Visibility::Visible;
                    vec![EventKind::Tracked]
                } else if now - self.time_tracking_lost >= self.seconds_to_remain_visible {
                    self.state = Visibility::Hidden;
                    vec![EventKind::Lost]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// A dependent object keyed to a trackable by tag.
///
/// Holds the reconciled world pose and the visibility gate. The tag is
/// resolved through the registry once and cached; the cache is invalidated
/// by the registry's add/remove epoch, not re-scanned every tick.
#[derive(Debug, Clone)]
pub struct Anchor {
    target_tag: String,
    gate: VisibilityGate,
    pose: Matrix4<f32>,
    resolved: Option<TrackableHandle>,
    resolved_epoch: Option<u64>,
}

impl Anchor {
    pub fn new(target_tag: impl Into<String>, seconds_to_remain_visible: f64) -> Self {
        Self {
            target_tag: target_tag.into(),
            gate: VisibilityGate::new(seconds_to_remain_visible),
            pose: Matrix4::identity(),
            resolved: None,
            resolved_epoch: None,
        }
    }

    pub fn target_tag(&self) -> &str {
        &self.target_tag
    }

    pub fn visibility(&self) -> Visibility {
        self.gate.state()
    }

    pub fn shows_content(&self) -> bool {
        self.gate.shows_content()
    }

    /// Last applied world pose. Meaningful while `shows_content()` is true.
    pub fn pose(&self) -> &Matrix4<f32> {
        &self.pose
    }

    /// Resolve the target tag to a registry handle, re-resolving only when
    /// the registry's trackable set changed. An unknown tag leaves the
    /// anchor permanently hidden at no per-tick cost.
    pub fn resolve(&mut self, registry: &TrackableRegistry) -> Option<TrackableHandle> {
        if self.resolved_epoch != Some(registry.epoch()) {
            self.resolved = registry.find_by_tag(&self.target_tag);
            self.resolved_epoch = Some(registry.epoch());
            if self.resolved.is_none() {
                debug!("anchor target tag '{}' does not resolve", self.target_tag);
            }
        }
        self.resolved
    }

    /// Advance one tick with the computed pose for this frame.
    ///
    /// `pose` being `None` while the source is visible means the pose could
    /// not be computed this frame (singular reference matrix); the previous
    /// pose is retained.
    pub fn update(
        &mut self,
        source_visible: bool,
        pose: Option<Matrix4<f32>>,
        now: f64,
    ) -> Vec<EventKind> {
        if source_visible {
            if let Some(pose) = pose {
                self.pose = pose;
            }
        }
        self.gate.update(source_visible, now)
    }
}

/// Compute a dependent's world pose from its target's scene-space pose.
///
/// With an elected reference the pose is relative to it,
/// `reference⁻¹ · target` — except when the target IS the reference, which
/// short-circuits to the identity instead of inverting a matrix by itself.
/// With no reference configured the pose is `observer · target`
/// (camera-relative). Returns `None` when the reference matrix cannot be
/// inverted; the caller keeps the previous pose for that frame.
pub fn compute_world_pose(
    target_pose: &Matrix4<f32>,
    reference_pose: Option<&Matrix4<f32>>,
    target_is_reference: bool,
    observer_pose: &Matrix4<f32>,
) -> Option<Matrix4<f32>> {
    match reference_pose {
        Some(_) if target_is_reference => Some(Matrix4::identity()),
        Some(reference) => invert_pose(reference).map(|inv| inv * target_pose),
        None => Some(observer_pose * target_pose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::matrix::extract_position;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, Vector3};

    fn count(events: &[EventKind], kind: EventKind) -> usize {
        events.iter().filter(|e| **e == kind).count()
    }

    #[test]
    fn brief_dropout_fires_one_found_and_no_lost() {
        let mut gate = VisibilityGate::new(2.0);
        let mut all = Vec::new();

        all.extend(gate.update(true, 0.0));
        all.extend(gate.update(false, 0.1)); // dropout starts
        all.extend(gate.update(false, 1.0));
        all.extend(gate.update(true, 1.5)); // back within the window
        all.extend(gate.update(true, 1.6));

        assert_eq!(count(&all, EventKind::Found), 1);
        assert_eq!(count(&all, EventKind::Lost), 0);
        assert_eq!(gate.state(), Visibility::Visible);
    }

    #[test]
    fn lost_fires_exactly_when_grace_elapses() {
        let mut gate = VisibilityGate::new(2.0);
        gate.update(true, 0.0);

        assert!(gate.update(false, 1.0).is_empty());
        assert_eq!(gate.state(), Visibility::VisibleRemaining);
        assert!(gate.shows_content()); // stale content still shown

        assert!(gate.update(false, 2.5).is_empty()); // 1.5s elapsed, not yet
        let events = gate.update(false, 3.0); // exactly 2.0s
        assert_eq!(events, vec![EventKind::Lost]);
        assert_eq!(gate.state(), Visibility::Hidden);

        // no repeat while still invisible
        assert!(gate.update(false, 4.0).is_empty());
    }

    #[test]
    fn zero_grace_window_hides_immediately() {
        let mut gate = VisibilityGate::new(0.0);
        gate.update(true, 0.0);
        assert_eq!(gate.update(false, 0.1), vec![EventKind::Lost]);
        assert_eq!(gate.state(), Visibility::Hidden);
    }

    #[test]
    fn tracked_recurs_every_visible_frame() {
        let mut gate = VisibilityGate::new(1.0);
        assert_eq!(gate.update(true, 0.0), vec![EventKind::Found]);
        assert_eq!(gate.update(true, 0.1), vec![EventKind::Tracked]);
        assert_eq!(gate.update(true, 0.2), vec![EventKind::Tracked]);
    }

    #[test]
    fn relative_pose_uses_inverted_reference() {
        let reference = Translation3::new(1.0, 0.0, 0.0).to_homogeneous();
        let target = Translation3::new(1.0, 2.0, 0.0).to_homogeneous();
        let world =
            compute_world_pose(&target, Some(&reference), false, &Matrix4::identity()).unwrap();
        assert_relative_eq!(
            extract_position(&world),
            Vector3::new(0.0, 2.0, 0.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn reference_target_short_circuits_to_identity() {
        let pose = Translation3::new(3.0, 1.0, 2.0).to_homogeneous();
        let world = compute_world_pose(&pose, Some(&pose), true, &Matrix4::identity()).unwrap();
        assert_relative_eq!(world, Matrix4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn camera_relative_mode_composes_with_observer() {
        let observer = Translation3::new(0.0, 0.0, 5.0).to_homogeneous();
        let target = Translation3::new(1.0, 0.0, 0.0).to_homogeneous();
        let world = compute_world_pose(&target, None, false, &observer).unwrap();
        assert_relative_eq!(
            extract_position(&world),
            Vector3::new(1.0, 0.0, 5.0),
            epsilon = 1e-6
        );
    }
}
