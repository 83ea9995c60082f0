//! Error types for the marshaling gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the marshaling gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Pose sample rejected at the input boundary
    #[error("invalid pose sample: {0}")]
    InvalidSample(String),

    /// Event delivery failure
    #[error("event sink error: {0}")]
    Sink(String),

    /// Recorded session could not be replayed
    #[error("replay error: {0}")]
    Replay(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
