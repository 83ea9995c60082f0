//! Daemon - the frame-driven recognition loop
//!
//! Pulls frames from a [`PoseSource`], runs them through the
//! [`GestureEngine`] and hands confirmed events to an [`EventSink`]. The
//! loop owns all recognition state; other threads talk to it only through a
//! [`ControlHandle`], which is sampled once per frame.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::Result;
use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::gesture::{FrameReport, GestureEngine, PoseClassifier, PoseSample, PoseSampleNormalizer};

/// One tick of the pose source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceFrame {
    pub at: Instant,
    /// `None` when no pose was detected this tick
    pub pose: Option<PoseSample>,
}

/// Supplier of normalized pose frames, paced by the camera
pub trait PoseSource {
    /// Next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Option<SourceFrame>;
}

/// In-memory source, mostly for replays and tests
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    frames: VecDeque<SourceFrame>,
}

impl FrameQueue {
    pub fn push(&mut self, frame: SourceFrame) {
        self.frames.push_back(frame);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl From<Vec<SourceFrame>> for FrameQueue {
    fn from(frames: Vec<SourceFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl PoseSource for FrameQueue {
    fn next_frame(&mut self) -> Option<SourceFrame> {
        self.frames.pop_front()
    }
}

/// Cloneable control surface for a running [`Daemon`]
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    enabled: Arc<AtomicBool>,
    pending: Arc<Mutex<Option<EngineConfig>>>,
}

impl ControlHandle {
    /// Request gesture recognition on from the next frame
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Request recognition off; the loop flushes all state on the next frame
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Queue a configuration to apply between frames
    ///
    /// A later call before the next frame replaces an earlier one.
    pub fn configure(&self, config: EngineConfig) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(config);
    }

    fn take_pending(&self) -> Option<EngineConfig> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Counters accumulated by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStats {
    pub frames: u64,
    pub processed: u64,
    pub without_pose: u64,
    pub while_disabled: u64,
    pub rejected_samples: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub reconfigurations: u64,
}

/// Recognition loop: engine plus event sink
pub struct Daemon<C, E> {
    engine: GestureEngine<C>,
    sink: E,
    control: ControlHandle,
    stats: DaemonStats,
}

impl<C: PoseClassifier, E: EventSink> Daemon<C, E> {
    /// Create a daemon with recognition disabled
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration fails validation
    pub fn new(config: EngineConfig, classifier: C, sink: E) -> Result<Self> {
        let engine = GestureEngine::new(config, classifier)?;
        Ok(Self {
            engine,
            sink,
            control: ControlHandle::default(),
            stats: DaemonStats::default(),
        })
    }

    /// Handle for enabling, disabling and reconfiguring from elsewhere
    #[must_use]
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Process a single source frame
    ///
    /// Pending configuration and the enable flag are applied first, both at
    /// the frame's timestamp. Returns
    /// the engine's report when the frame carried a usable pose while enabled.
    pub fn step(&mut self, frame: SourceFrame) -> Option<FrameReport> {
        self.stats.frames += 1;

        if let Some(config) = self.control.take_pending() {
            match self.engine.configure(config, frame.at) {
                Ok(()) => self.stats.reconfigurations += 1,
                Err(e) => tracing::warn!(error = %e, "rejected engine configuration"),
            }
        }

        match (self.control.is_enabled(), self.engine.is_running()) {
            (true, false) => self.engine.start(frame.at),
            (false, true) => self.engine.stop(),
            _ => {}
        }

        if !self.engine.is_running() {
            self.stats.while_disabled += 1;
            return None;
        }

        let Some(pose) = frame.pose else {
            self.stats.without_pose += 1;
            return None;
        };

        let sample = match PoseSampleNormalizer::accept(pose) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(error = %e, "skipping frame");
                self.stats.rejected_samples += 1;
                return None;
            }
        };

        let report = self.engine.push_at(sample, frame.at)?;
        self.stats.processed += 1;

        if let Some(event) = report.event() {
            self.stats.events_emitted += 1;
            if let Err(e) = self.sink.emit(event.clone()) {
                self.stats.events_dropped += 1;
                tracing::warn!(command = event.command(), error = %e, "dropped gesture event");
            }
        }

        Some(report)
    }

    /// Drive the loop until `source` is exhausted
    pub fn run<S: PoseSource>(&mut self, source: &mut S) -> DaemonStats {
        tracing::info!(profile = %self.engine.config().profile, "recognition loop running");

        while let Some(frame) = source.next_frame() {
            self.step(frame);
        }
        self.engine.stop();

        tracing::info!(
            frames = self.stats.frames,
            events = self.stats.events_emitted,
            dropped = self.stats.events_dropped,
            "pose source exhausted"
        );
        self.stats
    }

    #[must_use]
    pub const fn engine(&self) -> &GestureEngine<C> {
        &self.engine
    }

    #[must_use]
    pub const fn sink(&self) -> &E {
        &self.sink
    }

    #[must_use]
    pub const fn stats(&self) -> DaemonStats {
        self.stats
    }
}
