//! Marshal Gateway - adaptive gesture confirmation for aircraft marshaling
//!
//! This library turns a noisy per-frame stream of pose-classifier outputs into
//! debounced, high-confidence marshaling commands:
//! - Multi-window buffering with motion-aware window selection
//! - Ensemble fusion under dynamic confidence thresholds
//! - Consistency, trend and transition-pattern corrections
//! - A confirmation state machine with history validation and cooldown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Pose Source                        │
//! │     camera + landmark pipeline  │  recorded session  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ PoseSample per frame
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Marshal Daemon                       │
//! │   Windows  │  Motion  │  Ensemble  │  Confirmation   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ GestureEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Event Sinks                         │
//! │   Channel  │  JSON lines  │  Log                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod gesture;
pub mod replay;

pub use config::{Config, EngineConfig, Profile};
pub use daemon::{ControlHandle, Daemon, DaemonStats, PoseSource, SourceFrame};
pub use error::{Error, Result};
pub use events::EventSink;
pub use gesture::{GestureEngine, GestureEvent, GestureLabel, PoseClassifier, PoseSample};
