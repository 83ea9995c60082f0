//! Recorded-session replay
//!
//! A recording is a JSON-lines file, one frame per line:
//!
//! ```json
//! {"t": 0.033, "pose": {"joints": [...]}, "prediction": {"label": "stop", "confidence": 0.93}, "truth": "stop"}
//! ```
//!
//! `t` is seconds since the start of the recording. A frame carries either a
//! normalized `pose` or raw `landmarks` (or neither, when no pose was
//! detected). `prediction` is what the classifier said for that frame; the
//! [`RecordedClassifier`] answers every window with it. `enabled` toggles
//! recognition the way the control surface would.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::daemon::{Daemon, DaemonStats, SourceFrame};
use crate::events::EventSink;
use crate::gesture::{
    ClassifierError, ClassifierResult, GestureEvent, GestureLabel, Landmark, PerGesture,
    PoseClassifier, PoseSample, PoseSampleNormalizer,
};
use crate::{Error, Result};

/// One line of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Seconds since the start of the recording
    pub t: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<PoseSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<ClassifierResult>,
    /// Gesture actually being performed, when annotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth: Option<GestureLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl RecordedFrame {
    /// Pose for this frame, normalizing raw landmarks when that is all there is
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSample` if the landmarks cannot be normalized
    pub fn pose_sample(&self) -> Result<Option<PoseSample>> {
        match (&self.pose, &self.landmarks) {
            (Some(pose), _) => Ok(Some(*pose)),
            (None, Some(landmarks)) => PoseSampleNormalizer::from_landmarks(landmarks).map(Some),
            (None, None) => Ok(None),
        }
    }
}

/// A loaded recording, frames in time order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedSession {
    frames: Vec<RecordedFrame>,
}

impl RecordedSession {
    /// Load a recording from a JSON-lines file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any line is malformed
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let session = Self::from_reader(BufReader::new(file))?;
        tracing::debug!(path = %path.display(), frames = session.len(), "loaded recording");
        Ok(session)
    }

    /// Parse a recording; blank lines are skipped
    ///
    /// # Errors
    ///
    /// Returns `Error::Replay` naming the offending line if it does not parse,
    /// has an invalid timestamp, or goes back in time
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut frames: Vec<RecordedFrame> = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }

            let frame: RecordedFrame = serde_json::from_str(&line)
                .map_err(|e| Error::Replay(format!("line {line_no}: {e}")))?;

            if !frame.t.is_finite() || frame.t < 0.0 {
                return Err(Error::Replay(format!("line {line_no}: invalid timestamp {}", frame.t)));
            }
            if let Some(prev) = frames.last()
                && frame.t < prev.t
            {
                return Err(Error::Replay(format!(
                    "line {line_no}: timestamp {} precedes {}",
                    frame.t, prev.t
                )));
            }
            frames.push(frame);
        }

        Ok(Self { frames })
    }

    #[must_use]
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
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

impl From<Vec<RecordedFrame>> for RecordedSession {
    fn from(frames: Vec<RecordedFrame>) -> Self {
        Self { frames }
    }
}

/// Classifier that answers with whatever was recorded for the current frame
#[derive(Debug, Default)]
pub struct RecordedClassifier {
    current: RwLock<Option<ClassifierResult>>,
}

impl RecordedClassifier {
    /// Set the answer for the next frame
    pub fn set(&self, prediction: Option<ClassifierResult>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = prediction;
    }
}

impl PoseClassifier for RecordedClassifier {
    fn predict(&self, _window: &[PoseSample]) -> std::result::Result<ClassifierResult, ClassifierError> {
        let current = *self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.ok_or(ClassifierError::Unavailable)
    }
}

/// An event confirmed during replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayEvent {
    /// Index of the frame that confirmed it
    pub frame: usize,
    pub t: f64,
    pub event: GestureEvent,
    pub truth: Option<GestureLabel>,
}

/// Outcome of replaying a recording
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub stats: DaemonStats,
    pub events: Vec<ReplayEvent>,
    pub per_label: PerGesture<u32>,
    /// Events whose label matched the annotated truth
    pub matched: u32,
    pub mismatched: u32,
    /// Events confirmed on frames without an annotation
    pub unannotated: u32,
}

impl ReplaySummary {
    fn record(&mut self, frame: usize, t: f64, event: GestureEvent, truth: Option<GestureLabel>) {
        *self.per_label.get_mut(event.label) += 1;
        match truth {
            Some(label) if label == event.label => self.matched += 1,
            Some(_) => self.mismatched += 1,
            None => self.unannotated += 1,
        }
        self.events.push(ReplayEvent {
            frame,
            t,
            event,
            truth,
        });
    }

    /// Share of annotated events that matched, if any were annotated
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        let annotated = self.matched + self.mismatched;
        (annotated > 0).then(|| f64::from(self.matched) / f64::from(annotated))
    }
}

/// Replay `session` through a fresh daemon, delivering events to `sink`
///
/// Recognition starts enabled. Frames whose landmarks cannot be normalized
/// are replayed as frames without a pose.
///
/// # Errors
///
/// Returns `Error::Config` if `config` fails validation
pub fn replay<E: EventSink>(session: &RecordedSession, config: EngineConfig, sink: E) -> Result<ReplaySummary> {
    let classifier = Arc::new(RecordedClassifier::default());
    let mut daemon = Daemon::new(config, Arc::clone(&classifier), sink)?;
    let control = daemon.control();
    control.enable();

    let base = Instant::now();
    let mut summary = ReplaySummary::default();

    for (idx, frame) in session.frames().iter().enumerate() {
        match frame.enabled {
            Some(true) => control.enable(),
            Some(false) => control.disable(),
            None => {}
        }
        classifier.set(frame.prediction);

        let pose = frame.pose_sample().unwrap_or_else(|e| {
            tracing::warn!(frame = idx, error = %e, "unusable landmarks");
            None
        });
        let offset = Duration::try_from_secs_f64(frame.t).unwrap_or_default();

        let report = daemon.step(SourceFrame {
            at: base + offset,
            pose,
        });
        if let Some(event) = report.and_then(crate::gesture::FrameReport::into_event) {
            tracing::info!(
                frame = idx,
                t = frame.t,
                command = event.command(),
                confidence = event.confidence,
                "replayed gesture"
            );
            summary.record(idx, frame.t, event, frame.truth);
        }
    }

    summary.stats = daemon.stats();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn parses_sparse_lines() {
        let text = r#"
{"t": 0.0}
{"t": 0.033, "prediction": {"label": "left", "confidence": 0.9}, "truth": "left"}

{"t": 0.066, "enabled": false}
"#;
        let session = RecordedSession::from_reader(Cursor::new(text)).unwrap();
        assert_eq!(session.len(), 3);
        assert_eq!(
            session.frames()[1].prediction,
            Some(ClassifierResult::new(GestureLabel::Left, 0.9))
        );
        assert_eq!(session.frames()[2].enabled, Some(false));
        assert_eq!(session.frames()[0].pose_sample().unwrap(), None);
    }

    #[test]
    fn rejects_bad_lines() {
        let err = RecordedSession::from_reader(Cursor::new("{\"t\": 0.0}\nnot json\n")).unwrap_err();
        assert!(matches!(err, Error::Replay(msg) if msg.starts_with("line 2")));

        let err = RecordedSession::from_reader(Cursor::new("{\"t\": 1.0}\n{\"t\": 0.5}\n")).unwrap_err();
        assert!(matches!(err, Error::Replay(_)));

        let err = RecordedSession::from_reader(Cursor::new("{\"t\": -1.0}\n")).unwrap_err();
        assert!(matches!(err, Error::Replay(_)));
    }

    #[test]
    fn recorded_classifier_reports_missing_prediction() {
        let classifier = RecordedClassifier::default();
        assert_eq!(classifier.predict(&[]), Err(ClassifierError::Unavailable));

        classifier.set(Some(ClassifierResult::new(GestureLabel::Right, 0.8)));
        assert_eq!(classifier.predict(&[]).unwrap().label, GestureLabel::Right);
    }

    #[test]
    fn accuracy_counts_annotated_events_only() {
        let mut summary = ReplaySummary::default();
        assert_eq!(summary.accuracy(), None);

        let event = |label| GestureEvent {
            label,
            confidence: 0.9,
            motion_duration: 2.0,
            consistency_score: 0.0,
            trend_stable: false,
            confirmation_count: 5,
            gesture_completed: true,
            timestamp: chrono::Utc::now(),
        };
        summary.record(10, 0.3, event(GestureLabel::Stop), Some(GestureLabel::Stop));
        summary.record(20, 0.6, event(GestureLabel::Left), Some(GestureLabel::Right));
        summary.record(30, 0.9, event(GestureLabel::Left), None);

        assert_eq!(summary.per_label.left, 2);
        assert_eq!(summary.unannotated, 1);
        assert!((summary.accuracy().unwrap() - 0.5).abs() < f64::EPSILON);
    }
}
