//! Pose classifier capability
//!
//! The network itself lives outside this crate. The engine resamples every
//! window to `EngineConfig::classifier_input_len` frames before calling it.

use std::sync::Arc;

use thiserror::Error;

use super::types::{ClassifierResult, PoseSample};

/// Failure of a single classifier invocation
///
/// Always recoverable: the affected window contributes nothing this frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    /// Window had the wrong shape for the model
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model produced a result the engine cannot use
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// Inference backend failed
    #[error("inference failed: {0}")]
    Inference(String),

    /// No model output available for this window
    #[error("classifier unavailable")]
    Unavailable,

    /// Worker thread panicked during inference
    #[error("classifier worker panicked")]
    WorkerPanicked,
}

/// Black-box gesture classifier over a fixed-length pose window
///
/// Implementations may be slow; they must be `Sync` so selected windows can be
/// classified concurrently within one frame.
pub trait PoseClassifier: Send + Sync {
    /// Classify a window of exactly `classifier_input_len` samples
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError` if inference fails for this window
    fn predict(&self, window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError>;
}

impl<T: PoseClassifier + ?Sized> PoseClassifier for Arc<T> {
    fn predict(&self, window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError> {
        (**self).predict(window)
    }
}

impl<T: PoseClassifier + ?Sized> PoseClassifier for Box<T> {
    fn predict(&self, window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError> {
        (**self).predict(window)
    }
}
