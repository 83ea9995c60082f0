//! Per-frame motion intensity and moving/stable tracking

use std::time::Instant;

use super::types::PoseSample;
use crate::config::MotionConfig;

/// Motion status after the latest frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub is_moving: bool,
    /// Onset of the current (or most recent) motion
    pub motion_start_time: Instant,
    pub stable_frame_count: u32,
    pub intensity: f64,
}

impl MotionState {
    /// Resting state anchored at `start`
    #[must_use]
    pub const fn at_rest(start: Instant) -> Self {
        Self {
            is_moving: false,
            motion_start_time: start,
            stable_frame_count: 0,
            intensity: 0.0,
        }
    }

    /// Seconds since the motion onset; keeps growing after the subject settles
    #[must_use]
    pub fn duration_secs(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.motion_start_time)
            .as_secs_f64()
    }
}

/// Mean displacement of the joints visible in `curr`
///
/// Returns 0 when no joint clears `visibility_threshold`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn motion_intensity(prev: &PoseSample, curr: &PoseSample, visibility_threshold: f64) -> f64 {
    let (sum, count) = curr
        .joints()
        .iter()
        .zip(prev.joints().iter())
        .filter(|(c, _)| c.visibility > visibility_threshold)
        .fold((0.0, 0usize), |(sum, count), (c, p)| (sum + c.distance(p), count + 1));

    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Tracks whether the subject is moving and for how long
#[derive(Debug, Clone)]
pub struct MotionStateTracker {
    config: MotionConfig,
    state: MotionState,
}

impl MotionStateTracker {
    #[must_use]
    pub const fn new(config: MotionConfig, start: Instant) -> Self {
        Self {
            config,
            state: MotionState::at_rest(start),
        }
    }

    /// Fold one frame into the motion state
    ///
    /// Without a previous frame the intensity is 0.
    pub fn update(&mut self, prev: Option<&PoseSample>, curr: &PoseSample, now: Instant) -> MotionState {
        let intensity = prev.map_or(0.0, |p| {
            motion_intensity(p, curr, self.config.visibility_threshold)
        });

        let state = &mut self.state;
        if intensity > self.config.motion_threshold {
            if !state.is_moving {
                state.is_moving = true;
                state.motion_start_time = now;
                tracing::trace!(intensity, "motion onset");
            }
            state.stable_frame_count = 0;
        } else {
            state.stable_frame_count = state.stable_frame_count.saturating_add(1);
            if state.is_moving && state.stable_frame_count > self.config.stable_frame_limit {
                state.is_moving = false;
                tracing::trace!(
                    stable_frames = state.stable_frame_count,
                    "motion settled"
                );
            }
        }
        state.intensity = intensity;

        *state
    }

    #[must_use]
    pub const fn state(&self) -> MotionState {
        self.state
    }

    /// Return to rest, anchoring the duration clock at `start`
    pub const fn reset(&mut self, start: Instant) {
        self.state = MotionState::at_rest(start);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gesture::types::{JOINT_COUNT, Joint};

    fn tracker(start: Instant) -> MotionStateTracker {
        MotionStateTracker::new(MotionConfig::default(), start)
    }

    #[test]
    fn intensity_is_mean_visible_displacement() {
        let prev = PoseSample::uniform(0.0, 0.0);
        let curr = PoseSample::uniform(0.03, 0.04);
        assert!((motion_intensity(&prev, &curr, 0.5) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn hidden_joints_are_ignored() {
        let prev = PoseSample::uniform(0.0, 0.0);
        let mut joints = [Joint::new(0.0, 0.0, 0.9); JOINT_COUNT];
        joints[0] = Joint::new(10.0, 0.0, 0.2);
        let curr = PoseSample::new(joints);
        assert!(motion_intensity(&prev, &curr, 0.5).abs() < f64::EPSILON);

        let invisible = PoseSample::new([Joint::new(5.0, 5.0, 0.0); JOINT_COUNT]);
        assert!(motion_intensity(&prev, &invisible, 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn onset_sets_start_time() {
        let t0 = Instant::now();
        let mut tracker = tracker(t0);
        let rest = PoseSample::uniform(0.0, 0.0);
        let moved = PoseSample::uniform(0.1, 0.0);

        let onset = t0 + Duration::from_millis(500);
        let state = tracker.update(Some(&rest), &moved, onset);
        assert!(state.is_moving);
        assert_eq!(state.motion_start_time, onset);
        assert_eq!(state.stable_frame_count, 0);

        // continued motion keeps the original onset
        let later = onset + Duration::from_millis(100);
        let state = tracker.update(Some(&moved), &rest, later);
        assert_eq!(state.motion_start_time, onset);
    }

    #[test]
    fn settles_after_stable_limit() {
        let t0 = Instant::now();
        let mut tracker = tracker(t0);
        let rest = PoseSample::uniform(0.0, 0.0);
        let moved = PoseSample::uniform(0.1, 0.0);
        tracker.update(Some(&rest), &moved, t0);

        for i in 1..=10 {
            let state = tracker.update(Some(&moved), &moved, t0 + Duration::from_millis(i * 33));
            assert!(state.is_moving, "still moving at stable frame {i}");
        }
        let now = t0 + Duration::from_secs(2);
        let state = tracker.update(Some(&moved), &moved, now);
        assert!(!state.is_moving);
        assert_eq!(state.stable_frame_count, 11);
        // duration keeps accumulating from the onset
        assert!((state.duration_secs(now) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn first_frame_has_zero_intensity() {
        let t0 = Instant::now();
        let mut tracker = tracker(t0);
        let state = tracker.update(None, &PoseSample::uniform(3.0, 3.0), t0);
        assert!(state.intensity.abs() < f64::EPSILON);
        assert!(!state.is_moving);
        assert_eq!(state.stable_frame_count, 1);
    }
}
