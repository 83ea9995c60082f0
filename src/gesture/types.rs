//! Core data types shared by the gesture confirmation pipeline

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of key joints in a pose sample
pub const JOINT_COUNT: usize = 17;

/// A single joint position with its landmark visibility score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub x: f64,
    pub y: f64,
    #[serde(default = "full_visibility")]
    pub visibility: f64,
}

const fn full_visibility() -> f64 {
    1.0
}

impl Joint {
    #[must_use]
    pub const fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, visibility }
    }

    /// Euclidean distance to another joint, ignoring visibility
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One frame of hip-centered, shoulder-scaled joint coordinates
///
/// Produced by the upstream pose pipeline and immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    joints: [Joint; JOINT_COUNT],
}

impl PoseSample {
    #[must_use]
    pub const fn new(joints: [Joint; JOINT_COUNT]) -> Self {
        Self { joints }
    }

    /// Sample with every joint at the same position, fully visible
    #[must_use]
    pub fn uniform(x: f64, y: f64) -> Self {
        Self::new([Joint::new(x, y, 1.0); JOINT_COUNT])
    }

    #[must_use]
    pub const fn joints(&self) -> &[Joint; JOINT_COUNT] {
        &self.joints
    }
}

/// Closed set of marshaling gestures the classifier can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureLabel {
    Stop,
    Forward,
    Left,
    Right,
}

impl GestureLabel {
    /// All labels in declaration order
    pub const ALL: [Self; 4] = [Self::Stop, Self::Forward, Self::Left, Self::Right];

    /// Upper-case command name sent to the ground-control simulator
    #[must_use]
    pub const fn command(self) -> &'static str {
        match self {
            Self::Stop => "STOP",
            Self::Forward => "MOVE_FORWARD",
            Self::Left => "TURN_LEFT",
            Self::Right => "TURN_RIGHT",
        }
    }

    /// Phrase spoken back to the pilot when the gesture is confirmed
    #[must_use]
    pub const fn announcement(self) -> &'static str {
        match self {
            Self::Stop => "Stop",
            Self::Forward => "Move forward",
            Self::Left => "Turn left",
            Self::Right => "Turn right",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Forward => "forward",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed lookup table keyed by [`GestureLabel`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerGesture<T> {
    pub stop: T,
    pub forward: T,
    pub left: T,
    pub right: T,
}

impl<T> PerGesture<T> {
    #[must_use]
    pub const fn get(&self, label: GestureLabel) -> &T {
        match label {
            GestureLabel::Stop => &self.stop,
            GestureLabel::Forward => &self.forward,
            GestureLabel::Left => &self.left,
            GestureLabel::Right => &self.right,
        }
    }

    pub const fn get_mut(&mut self, label: GestureLabel) -> &mut T {
        match label {
            GestureLabel::Stop => &mut self.stop,
            GestureLabel::Forward => &mut self.forward,
            GestureLabel::Left => &mut self.left,
            GestureLabel::Right => &mut self.right,
        }
    }

    /// Iterate `(label, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (GestureLabel, &T)> {
        GestureLabel::ALL.into_iter().map(move |label| (label, self.get(label)))
    }
}

/// Output of the external classifier for one resampled window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub label: GestureLabel,
    pub confidence: f64,
}

impl ClassifierResult {
    #[must_use]
    pub const fn new(label: GestureLabel, confidence: f64) -> Self {
        Self { label, confidence }
    }
}

/// A frame's final prediction, kept in the bounded prediction histories
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionEntry {
    pub label: GestureLabel,
    pub confidence: f64,
    pub at: Instant,
}

/// A confirmed marshaling gesture, emitted at most once per occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub label: GestureLabel,
    pub confidence: f64,
    /// Seconds since the current motion onset
    pub motion_duration: f64,
    pub consistency_score: f64,
    pub trend_stable: bool,
    pub confirmation_count: u32,
    pub gesture_completed: bool,
    pub timestamp: DateTime<Utc>,
}

impl GestureEvent {
    /// Command name for the confirmed label
    #[must_use]
    pub const fn command(&self) -> &'static str {
        self.label.command()
    }
}
