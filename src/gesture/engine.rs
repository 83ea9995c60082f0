//! Frame-by-frame gesture recognition pipeline
//!
//! ```text
//! sample ─▶ buffers ─▶ motion ─▶ ensemble ─▶ consistency/trend ─▶ transition ─▶ confirmation ─▶ event
//! ```
//!
//! All state is owned by the engine and mutated only from `push_at`, one
//! frame at a time. `stop()` discards everything; `start()` begins clean.

use std::collections::VecDeque;
use std::time::Instant;

use super::classifier::PoseClassifier;
use super::confirmation::{
    ConfirmationSample, ConfirmationState, ConfirmationStateMachine, Decision, gesture_completed,
};
use super::consistency::{ConsistencyAnalyzer, ConsistencyVerdict};
use super::ensemble::{EnsembleOutput, EnsemblePredictor};
use super::motion::{MotionState, MotionStateTracker};
use super::transition::{TransitionDetector, TransitionMatch};
use super::trend::{TrendAnalyzer, TrendVerdict};
use super::types::{ClassifierResult, GestureEvent, PoseSample, PredictionEntry};
use super::window::WindowBufferManager;
use crate::Result;
use crate::config::EngineConfig;

/// Diagnostics for one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub at: Instant,
    pub motion: MotionState,
    pub completed: bool,
    pub ensemble: EnsembleOutput,
    pub consistency: ConsistencyVerdict,
    /// Consistent candidate replaced the ensemble pick
    pub consistency_override: bool,
    pub trend: TrendVerdict,
    pub transition: Option<TransitionMatch>,
    /// Label and confidence after all corrections
    pub prediction: Option<ClassifierResult>,
    pub decision: Decision,
}

impl FrameReport {
    #[must_use]
    pub const fn event(&self) -> Option<&GestureEvent> {
        self.decision.event()
    }

    #[must_use]
    pub fn into_event(self) -> Option<GestureEvent> {
        match self.decision {
            Decision::Emitted(event) => Some(event),
            _ => None,
        }
    }
}

/// Post-correction prediction plus the signals that shaped it
struct Corrected {
    prediction: ClassifierResult,
    consistency: ConsistencyVerdict,
    consistency_override: bool,
    trend: TrendVerdict,
    transition: Option<TransitionMatch>,
}

/// Adaptive multi-window gesture confirmation engine
pub struct GestureEngine<C> {
    config: EngineConfig,
    classifier: C,
    running: bool,
    buffers: WindowBufferManager,
    motion: MotionStateTracker,
    predictor: EnsemblePredictor,
    consistency: ConsistencyAnalyzer,
    trend: TrendAnalyzer,
    transition: TransitionDetector,
    confirmation: ConfirmationStateMachine,
    long_history: VecDeque<PredictionEntry>,
    short_history: VecDeque<PredictionEntry>,
}

impl<C: PoseClassifier> GestureEngine<C> {
    /// Build a stopped engine
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration fails validation
    pub fn new(config: EngineConfig, classifier: C) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            buffers: WindowBufferManager::new(config.window_sizes()),
            motion: MotionStateTracker::new(config.motion.clone(), Instant::now()),
            predictor: EnsemblePredictor::new(config.clone()),
            consistency: ConsistencyAnalyzer::new(config.consistency.clone()),
            trend: TrendAnalyzer::new(config.trend.clone()),
            transition: TransitionDetector::new(config.transition.clone()),
            confirmation: ConfirmationStateMachine::new(&config),
            long_history: VecDeque::with_capacity(config.history.long_capacity),
            short_history: VecDeque::with_capacity(config.history.short_capacity),
            running: false,
            classifier,
            config,
        })
    }

    /// Begin recognizing; motion duration is measured from `now` until the first onset
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.motion.reset(now);
        self.running = true;
        tracing::info!(profile = %self.config.profile, "gesture recognition started");
    }

    /// Stop recognizing and discard all buffered state
    pub fn stop(&mut self) {
        let was_running = self.running;
        self.running = false;
        self.reset(Instant::now());
        if was_running {
            tracing::info!("gesture recognition stopped");
        }
    }

    /// Swap in a new configuration between frames
    ///
    /// State is reset and the motion clock restarts at `now`; the running
    /// flag is kept.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration fails validation; the
    /// current configuration stays in force.
    pub fn configure(&mut self, config: EngineConfig, now: Instant) -> Result<()> {
        config.validate()?;

        self.buffers = WindowBufferManager::new(config.window_sizes());
        self.motion = MotionStateTracker::new(config.motion.clone(), now);
        self.predictor = EnsemblePredictor::new(config.clone());
        self.consistency = ConsistencyAnalyzer::new(config.consistency.clone());
        self.trend = TrendAnalyzer::new(config.trend.clone());
        self.transition = TransitionDetector::new(config.transition.clone());
        self.confirmation = ConfirmationStateMachine::new(&config);
        self.long_history = VecDeque::with_capacity(config.history.long_capacity);
        self.short_history = VecDeque::with_capacity(config.history.short_capacity);
        self.config = config;

        tracing::info!(
            profile = %self.config.profile,
            required_confirmations = self.config.confirmation.required_confirmations,
            cooldown_seconds = self.config.confirmation.cooldown_seconds,
            "engine reconfigured"
        );
        Ok(())
    }

    fn reset(&mut self, now: Instant) {
        self.buffers.clear();
        self.motion.reset(now);
        self.transition.clear();
        self.confirmation.reset();
        self.long_history.clear();
        self.short_history.clear();
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Process one sample stamped with the current time
    pub fn push(&mut self, sample: PoseSample) -> Option<FrameReport> {
        self.push_at(sample, Instant::now())
    }

    /// Process one sample observed at `now`
    ///
    /// Returns `None` while stopped.
    pub fn push_at(&mut self, sample: PoseSample, now: Instant) -> Option<FrameReport> {
        if !self.running {
            return None;
        }

        let prev = self.buffers.latest().copied();
        self.buffers.push(sample);
        let motion = self.motion.update(prev.as_ref(), &sample, now);
        let duration = motion.duration_secs(now);

        let last_label = self.long_history.back().map(|e| e.label);
        let ensemble = self.predictor.predict(
            &self.classifier,
            &self.buffers,
            duration,
            motion.intensity,
            last_label,
        );
        let completed = gesture_completed(&motion, &self.config.completion, now);

        let corrected = ensemble.fused.as_ref().map(|fused| {
            let initial = ClassifierResult::new(fused.label, fused.confidence);
            if !self.config.auxiliary_checks {
                return Corrected {
                    prediction: initial,
                    consistency: ConsistencyVerdict::default(),
                    consistency_override: false,
                    trend: TrendVerdict::default(),
                    transition: None,
                };
            }

            // analyzers see the history as it stood before this frame
            let consistency = self.consistency.analyze(&self.short_history);
            let (mut prediction, consistency_override) = match self.consistency.apply(&consistency, fused) {
                Some((label, confidence)) => (ClassifierResult::new(label, confidence), true),
                None => (initial, false),
            };

            let confidences: Vec<f64> = self.short_history.iter().map(|e| e.confidence).collect();
            let trend = self.trend.analyze(&confidences);
            prediction.confidence = self.trend.apply(&trend, prediction.confidence);

            let transition = self.transition.observe(prediction.label, prediction.confidence);
            if let Some(matched) = &transition {
                prediction = ClassifierResult::new(matched.label, matched.confidence);
            }

            Corrected {
                prediction,
                consistency,
                consistency_override,
                trend,
                transition,
            }
        });

        if let Some(c) = &corrected {
            self.record(c.prediction, now);
        }

        let sample = corrected.as_ref().map(|c| ConfirmationSample {
            label: c.prediction.label,
            confidence: c.prediction.confidence,
            completed,
            motion_duration: duration,
            consistency_score: c.consistency.score,
            trend_stable: c.trend.stable_increasing,
        });
        let decision = self.confirmation.observe(sample, now);

        if decision.accepted() {
            tracing::debug!(
                ?decision,
                intensity = motion.intensity,
                duration,
                completed,
                "frame processed"
            );
        }

        let (consistency, consistency_override, trend, transition, prediction) = match corrected {
            Some(c) => (
                c.consistency,
                c.consistency_override,
                c.trend,
                c.transition,
                Some(c.prediction),
            ),
            None => (ConsistencyVerdict::default(), false, TrendVerdict::default(), None, None),
        };

        Some(FrameReport {
            at: now,
            motion,
            completed,
            ensemble,
            consistency,
            consistency_override,
            trend,
            transition,
            prediction,
            decision,
        })
    }

    /// Admit a confident final prediction to both histories
    fn record(&mut self, prediction: ClassifierResult, at: Instant) {
        if prediction.confidence <= self.config.history.min_confidence {
            return;
        }
        let entry = PredictionEntry {
            label: prediction.label,
            confidence: prediction.confidence,
            at,
        };
        push_bounded(&mut self.long_history, entry, self.config.history.long_capacity);
        push_bounded(&mut self.short_history, entry, self.config.history.short_capacity);
    }

    #[must_use]
    pub const fn confirmation_state(&self) -> &ConfirmationState {
        self.confirmation.state()
    }

    #[must_use]
    pub const fn buffers(&self) -> &WindowBufferManager {
        &self.buffers
    }

    #[must_use]
    pub const fn motion_state(&self) -> MotionState {
        self.motion.state()
    }

    /// Admitted predictions, oldest first
    pub fn prediction_history(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.long_history.iter()
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn classifier(&self) -> &C {
        &self.classifier
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while queue.len() >= capacity {
        queue.pop_front();
    }
    queue.push_back(item);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gesture::classifier::ClassifierError;
    use crate::gesture::types::GestureLabel;

    struct Fixed(GestureLabel, f64);

    impl PoseClassifier for Fixed {
        fn predict(&self, _window: &[PoseSample]) -> std::result::Result<ClassifierResult, ClassifierError> {
            Ok(ClassifierResult::new(self.0, self.1))
        }
    }

    fn still() -> PoseSample {
        PoseSample::uniform(0.0, 0.0)
    }

    #[test]
    fn stopped_engine_ignores_samples() {
        let mut engine = GestureEngine::new(EngineConfig::precision(), Fixed(GestureLabel::Stop, 0.99)).unwrap();
        assert!(engine.push(still()).is_none());
        assert!(engine.buffers().is_empty());
    }

    #[test]
    fn histories_admit_only_confident_predictions() {
        let mut engine = GestureEngine::new(EngineConfig::simple(), Fixed(GestureLabel::Left, 0.9)).unwrap();
        let t0 = Instant::now();
        engine.start(t0);

        for i in 0..40 {
            engine.push_at(still(), t0 + Duration::from_secs(3) + Duration::from_millis(33 * i));
        }
        // first prediction arrives once the 30 window is full
        assert_eq!(engine.prediction_history().count(), 11);
        assert!(engine.prediction_history().all(|e| e.label == GestureLabel::Left));
    }

    #[test]
    fn rejected_configuration_keeps_current() {
        let mut engine = GestureEngine::new(EngineConfig::precision(), Fixed(GestureLabel::Stop, 0.9)).unwrap();
        let mut bad = EngineConfig::precision();
        bad.confirmation.required_confirmations = 0;
        assert!(engine.configure(bad, Instant::now()).is_err());
        assert_eq!(engine.config().confirmation.required_confirmations, 5);
    }

    #[test]
    fn configure_resets_but_keeps_running() {
        let mut engine = GestureEngine::new(EngineConfig::precision(), Fixed(GestureLabel::Stop, 0.9)).unwrap();
        engine.start(Instant::now());
        for _ in 0..10 {
            engine.push(still());
        }
        engine.configure(EngineConfig::simple(), Instant::now()).unwrap();
        assert!(engine.is_running());
        assert!(engine.buffers().is_empty());
        assert!(engine.confirmation_state().is_idle());
        assert_eq!(engine.config().confirmation.required_confirmations, 30);
    }

    #[test]
    fn configure_restarts_motion_clock_at_given_time() {
        let mut engine = GestureEngine::new(EngineConfig::simple(), Fixed(GestureLabel::Stop, 0.9)).unwrap();
        let t0 = Instant::now();
        engine.start(t0);

        let at = t0 + Duration::from_secs(42);
        engine.configure(EngineConfig::simple(), at).unwrap();
        assert_eq!(engine.motion_state().motion_start_time, at);
    }
}
