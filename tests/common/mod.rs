//! Shared test utilities

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::{Duration, Instant};

use marshal_gateway::gesture::{ClassifierError, ClassifierResult, GestureLabel, PoseClassifier, PoseSample};

/// Nominal camera frame interval (~30 Hz)
pub const FRAME: Duration = Duration::from_millis(33);

/// Classifier whose answer the test changes between frames
pub struct ScriptedClassifier {
    answer: Mutex<Option<ClassifierResult>>,
}

impl ScriptedClassifier {
    #[must_use]
    pub fn new(label: GestureLabel, confidence: f64) -> Self {
        Self {
            answer: Mutex::new(Some(ClassifierResult::new(label, confidence))),
        }
    }

    pub fn set(&self, label: GestureLabel, confidence: f64) {
        *self.answer.lock().unwrap() = Some(ClassifierResult::new(label, confidence));
    }

    pub fn fail(&self) {
        *self.answer.lock().unwrap() = None;
    }
}

impl PoseClassifier for ScriptedClassifier {
    fn predict(&self, _window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError> {
        let answer = *self.answer.lock().unwrap();
        answer.ok_or_else(|| ClassifierError::Inference("scripted failure".to_string()))
    }
}

/// A subject standing still
#[must_use]
pub fn still_pose() -> PoseSample {
    PoseSample::uniform(0.1, -0.2)
}

/// A pose displaced far enough from `still_pose` to count as motion
#[must_use]
pub fn moved_pose() -> PoseSample {
    PoseSample::uniform(0.2, -0.2)
}

/// Timestamps for frame `i`, starting `lead` after the session start
pub struct Clock {
    pub start: Instant,
    pub lead: Duration,
}

impl Clock {
    /// Frames begin three seconds into the session so the motion stage is settled
    #[must_use]
    pub fn settled() -> Self {
        Self {
            start: Instant::now(),
            lead: Duration::from_secs(3),
        }
    }

    #[must_use]
    pub fn frame(&self, i: u32) -> Instant {
        self.start + self.lead + FRAME * i
    }
}
