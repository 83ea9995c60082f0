//! Gesture event delivery
//!
//! Delivery is best-effort: a sink reports failure through its `Result`, and
//! the recognition loop logs and drops the event. Nothing is retried or queued,
//! and no sink may block the loop.

use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::gesture::GestureEvent;
use crate::{Error, Result};

/// Event name for a confirmed marshaling gesture
pub const GESTURE_DETECTED: &str = "MARSHALING_GESTURE_DETECTED";

/// Receives confirmed gesture events
pub trait EventSink: Send + Sync {
    /// Deliver one event without blocking
    ///
    /// # Errors
    ///
    /// Returns `Error::Sink` if the event could not be delivered
    fn emit(&self, event: GestureEvent) -> Result<()>;
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&self, event: GestureEvent) -> Result<()> {
        (**self).emit(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: GestureEvent) -> Result<()> {
        (**self).emit(event)
    }
}

/// Outbound record for a confirmed gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarshalingEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    /// Command name (`STOP`, `MOVE_FORWARD`, ...)
    pub result: String,
    pub confidence: f64,
    pub motion_duration: f64,
    pub confirmation_count: u32,
    pub consistency_score: f64,
    pub trend_stable: bool,
    pub gesture_completed: bool,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl From<&GestureEvent> for MarshalingEvent {
    fn from(event: &GestureEvent) -> Self {
        Self {
            kind: "event".to_string(),
            event: GESTURE_DETECTED.to_string(),
            result: event.command().to_string(),
            confidence: event.confidence,
            motion_duration: event.motion_duration,
            confirmation_count: event.confirmation_count,
            consistency_score: event.consistency_score,
            trend_stable: event.trend_stable,
            gesture_completed: event.gesture_completed,
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Forwards events into a tokio channel with `try_send`
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<GestureEvent>,
}

impl ChannelSink {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<GestureEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: GestureEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => Error::Sink("event channel full".to_string()),
            TrySendError::Closed(_) => Error::Sink("event channel closed".to_string()),
        })
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer
    ///
    /// # Errors
    ///
    /// Returns `Error::Sink` if a writer panicked while holding the lock
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| Error::Sink("writer lock poisoned".to_string()))
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: GestureEvent) -> Result<()> {
        let line = serde_json::to_string(&MarshalingEvent::from(&event))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Sink("writer lock poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Logs each event at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: GestureEvent) -> Result<()> {
        tracing::info!(
            command = event.command(),
            confidence = event.confidence,
            motion_duration = event.motion_duration,
            confirmation_count = event.confirmation_count,
            "marshaling gesture detected"
        );
        Ok(())
    }
}

/// Delivers every event to all inner sinks
///
/// Every sink is tried; the first failure is reported.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[must_use]
    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: GestureEvent) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event.clone()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
