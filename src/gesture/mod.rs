//! Gesture recognition: pose windows in, confirmed marshaling gestures out
//!
//! Samples flow through the [`GestureEngine`] one frame at a time:
//! - [`WindowBufferManager`] keeps one ring buffer per window size
//! - [`MotionStateTracker`] measures motion intensity and duration
//! - [`EnsemblePredictor`] classifies selected windows and fuses the results
//! - [`ConsistencyAnalyzer`], [`TrendAnalyzer`] and [`TransitionDetector`]
//!   correct the fused prediction
//! - [`ConfirmationStateMachine`] decides when to emit a [`GestureEvent`]

mod classifier;
mod confirmation;
mod consistency;
mod engine;
mod ensemble;
mod motion;
mod normalizer;
mod transition;
mod trend;
mod types;
mod window;

pub use classifier::{ClassifierError, PoseClassifier};
pub use confirmation::{
    ConfirmationPhase, ConfirmationRecord, ConfirmationSample, ConfirmationState,
    ConfirmationStateMachine, Decision, gesture_completed,
};
pub use consistency::{ConsistencyAnalyzer, ConsistencyVerdict};
pub use engine::{FrameReport, GestureEngine};
pub use ensemble::{
    EnsembleOutput, EnsemblePredictor, FusedPrediction, WindowPrediction, classify_windows,
    dynamic_threshold, fuse, select_windows,
};
pub use motion::{MotionState, MotionStateTracker, motion_intensity};
pub use normalizer::{KEY_LANDMARKS, LANDMARK_COUNT, Landmark, PoseSampleNormalizer};
pub use transition::{TransitionDetector, TransitionMatch};
pub use trend::{TrendAnalyzer, TrendVerdict, linear_slope, std_dev};
pub use types::{
    ClassifierResult, GestureEvent, GestureLabel, JOINT_COUNT, Joint, PerGesture, PoseSample,
    PredictionEntry,
};
pub use window::{WindowBuffer, WindowBufferManager, resample};
