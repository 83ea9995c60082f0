//! Pose sample input boundary
//!
//! Samples arriving from the pose pipeline are already hip-centered and
//! shoulder-scaled; [`PoseSampleNormalizer::accept`] only rejects frames the
//! engine cannot use. [`PoseSampleNormalizer::from_landmarks`] performs the
//! normalization itself for sources that hand over raw 33-point landmarks.

use serde::{Deserialize, Serialize};

use super::types::{JOINT_COUNT, Joint, PoseSample};
use crate::{Error, Result};

/// Number of landmarks in a full-body pose estimate
pub const LANDMARK_COUNT: usize = 33;

/// Landmark indices kept as the 17 key joints
///
/// nose, eyes, shoulders, elbows, wrists, hips, knees, ankles, heels
pub const KEY_LANDMARKS: [usize; JOINT_COUNT] =
    [0, 2, 5, 11, 12, 13, 14, 15, 16, 23, 24, 25, 26, 27, 28, 29, 32];

const LEFT_SHOULDER: usize = 3;
const RIGHT_SHOULDER: usize = 4;
const LEFT_HIP: usize = 9;
const RIGHT_HIP: usize = 10;

/// Visibility a reference joint needs to anchor normalization
const ANCHOR_VISIBILITY: f64 = 0.5;

/// Raw landmark in image-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub visibility: f64,
}

/// Input contract for pose samples entering the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseSampleNormalizer;

impl PoseSampleNormalizer {
    /// Pass an upstream-normalized sample through unchanged
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSample` if any coordinate or visibility is not finite
    pub fn accept(sample: PoseSample) -> Result<PoseSample> {
        if let Some((idx, _)) = sample.joints().iter().enumerate().find(|(_, j)| {
            !(j.x.is_finite() && j.y.is_finite() && j.visibility.is_finite())
        }) {
            return Err(Error::InvalidSample(format!("joint {idx} is not finite")));
        }
        Ok(sample)
    }

    /// Select the key joints from raw landmarks, hip-center and shoulder-scale them
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSample` if fewer than 33 landmarks are given or
    /// the result is not finite
    pub fn from_landmarks(landmarks: &[Landmark]) -> Result<PoseSample> {
        if landmarks.len() < LANDMARK_COUNT {
            return Err(Error::InvalidSample(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                landmarks.len()
            )));
        }

        let raw: [Joint; JOINT_COUNT] = std::array::from_fn(|i| {
            let l = landmarks[KEY_LANDMARKS[i]];
            Joint::new(l.x, l.y, l.visibility)
        });
        let mut joints = raw;

        let visible = |idx: usize| raw[idx].visibility > ANCHOR_VISIBILITY;

        if visible(LEFT_HIP) && visible(RIGHT_HIP) {
            let cx = (raw[LEFT_HIP].x + raw[RIGHT_HIP].x) / 2.0;
            let cy = (raw[LEFT_HIP].y + raw[RIGHT_HIP].y) / 2.0;

            for (joint, source) in joints.iter_mut().zip(raw.iter()) {
                if source.visibility > ANCHOR_VISIBILITY {
                    joint.x -= cx;
                    joint.y -= cy;
                }
            }

            if visible(LEFT_SHOULDER) && visible(RIGHT_SHOULDER) {
                let width = raw[LEFT_SHOULDER].distance(&raw[RIGHT_SHOULDER]);
                if width > 0.0 {
                    for joint in &mut joints {
                        joint.x /= width;
                        joint.y /= width;
                    }
                }
            }
        }

        Self::accept(PoseSample::new(joints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks() -> Vec<Landmark> {
        let mut raw = vec![
            Landmark {
                x: 0.5,
                y: 0.5,
                visibility: 0.9,
            };
            LANDMARK_COUNT
        ];
        // shoulders 0.2 apart, hips centered on (0.5, 0.8)
        raw[11] = Landmark { x: 0.4, y: 0.4, visibility: 0.9 };
        raw[12] = Landmark { x: 0.6, y: 0.4, visibility: 0.9 };
        raw[23] = Landmark { x: 0.45, y: 0.8, visibility: 0.9 };
        raw[24] = Landmark { x: 0.55, y: 0.8, visibility: 0.9 };
        raw
    }

    #[test]
    fn accept_passes_sample_through() {
        let sample = PoseSample::uniform(0.1, -0.2);
        assert_eq!(PoseSampleNormalizer::accept(sample).unwrap(), sample);
    }

    #[test]
    fn accept_rejects_nan() {
        let mut joints = [Joint::new(0.0, 0.0, 1.0); JOINT_COUNT];
        joints[5].y = f64::NAN;
        let err = PoseSampleNormalizer::accept(PoseSample::new(joints)).unwrap_err();
        assert!(matches!(err, Error::InvalidSample(_)));
    }

    #[test]
    fn landmarks_are_hip_centered_and_shoulder_scaled() {
        let sample = PoseSampleNormalizer::from_landmarks(&landmarks()).unwrap();
        let joints = sample.joints();

        // hip midpoint maps to origin
        let hip_mid_x = (joints[LEFT_HIP].x + joints[RIGHT_HIP].x) / 2.0;
        assert!(hip_mid_x.abs() < 1e-9);

        // shoulder width becomes 1
        let width = joints[LEFT_SHOULDER].distance(&joints[RIGHT_SHOULDER]);
        assert!((width - 1.0).abs() < 1e-9);

        // left shoulder: (0.4 - 0.5, 0.4 - 0.8) / 0.2
        assert!((joints[LEFT_SHOULDER].x + 0.5).abs() < 1e-9);
        assert!((joints[LEFT_SHOULDER].y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn hidden_hips_leave_coordinates_raw() {
        let mut raw = landmarks();
        raw[23].visibility = 0.1;
        let sample = PoseSampleNormalizer::from_landmarks(&raw).unwrap();
        assert!((sample.joints()[LEFT_SHOULDER].x - 0.4).abs() < 1e-9);
    }

    #[test]
    fn short_landmark_set_is_rejected() {
        let raw = vec![
            Landmark {
                x: 0.0,
                y: 0.0,
                visibility: 1.0
            };
            10
        ];
        assert!(PoseSampleNormalizer::from_landmarks(&raw).is_err());
    }
}
