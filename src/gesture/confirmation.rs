//! Confirmation state machine
//!
//! The gatekeeper between noisy per-frame predictions and discrete gesture
//! events. A label must be accepted on `required_confirmations` consecutive
//! samples, pass history validation, and clear the per-label cooldown before
//! a single [`GestureEvent`] is emitted.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::Utc;

use super::motion::MotionState;
use super::types::{GestureEvent, GestureLabel};
use crate::config::{CompletionConfig, ConfirmationConfig, EngineConfig};

/// Coarse view of the confirmation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationPhase {
    /// Nothing accepted since start
    Idle,
    /// Counting consecutive acceptances of one label
    Accumulating { candidate: GestureLabel, count: u32 },
    /// Just emitted `label`; the count starts over
    Confirmed { label: GestureLabel, at: Instant },
}

/// Candidate, consecutive count and last emission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmationState {
    candidate: Option<GestureLabel>,
    consecutive_count: u32,
    last_confirmed: Option<(GestureLabel, Instant)>,
}

impl ConfirmationState {
    #[must_use]
    pub const fn candidate(&self) -> Option<GestureLabel> {
        self.candidate
    }

    #[must_use]
    pub const fn consecutive_count(&self) -> u32 {
        self.consecutive_count
    }

    #[must_use]
    pub const fn last_confirmed(&self) -> Option<(GestureLabel, Instant)> {
        self.last_confirmed
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> ConfirmationPhase {
        match (self.candidate, self.last_confirmed) {
            (Some(candidate), Some((label, at))) if self.consecutive_count == 0 && candidate == label => {
                ConfirmationPhase::Confirmed { label, at }
            }
            (Some(candidate), _) => ConfirmationPhase::Accumulating {
                candidate,
                count: self.consecutive_count,
            },
            (None, _) => ConfirmationPhase::Idle,
        }
    }

    /// Count an accepted `label`, restarting at 1 when it differs from the candidate
    #[must_use]
    pub fn accept(self, label: GestureLabel, cap: u32) -> Self {
        let count = if self.candidate == Some(label) {
            self.consecutive_count.saturating_add(1).min(cap)
        } else {
            1
        };
        Self {
            candidate: Some(label),
            consecutive_count: count,
            last_confirmed: self.last_confirmed,
        }
    }

    /// Record an emission of `label` at `at` and zero the count
    #[must_use]
    pub const fn confirm(self, label: GestureLabel, at: Instant) -> Self {
        Self {
            candidate: Some(label),
            consecutive_count: 0,
            last_confirmed: Some((label, at)),
        }
    }

    /// Whether `label` was emitted less than `cooldown_secs` before `now`
    #[must_use]
    pub fn cooling_down(&self, label: GestureLabel, now: Instant, cooldown_secs: f64) -> bool {
        self.last_confirmed.is_some_and(|(last, at)| {
            last == label && now.saturating_duration_since(at).as_secs_f64() <= cooldown_secs
        })
    }
}

/// Heuristic for "the physical gesture has finished"
#[must_use]
pub fn gesture_completed(motion: &MotionState, config: &CompletionConfig, now: Instant) -> bool {
    motion.intensity < config.motion_threshold
        && motion.stable_frame_count > config.stable_frames
        && motion.duration_secs(now) > config.min_motion_duration
}

/// Post-correction prediction offered to the state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationSample {
    pub label: GestureLabel,
    pub confidence: f64,
    pub completed: bool,
    pub motion_duration: f64,
    pub consistency_score: f64,
    pub trend_stable: bool,
}

/// An accepted sample as kept for history validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfirmationRecord {
    pub label: GestureLabel,
    pub confidence: f64,
    pub completed: bool,
    pub consistency_score: f64,
    pub trend_stable: bool,
}

/// What the state machine did with this frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No prediction reached the state machine
    NoPrediction,
    /// Completion required but the gesture is still in progress
    Incomplete,
    /// Confidence did not clear the acceptance gate
    BelowAcceptance,
    Accumulating { candidate: GestureLabel, count: u32 },
    /// Count reached but the same label was emitted too recently
    CoolingDown { candidate: GestureLabel, count: u32 },
    /// Count reached but recent history did not back it up
    ValidationFailed { candidate: GestureLabel, count: u32 },
    Emitted(GestureEvent),
}

impl Decision {
    #[must_use]
    pub const fn event(&self) -> Option<&GestureEvent> {
        match self {
            Self::Emitted(event) => Some(event),
            _ => None,
        }
    }

    /// Whether the sample changed the confirmation state
    #[must_use]
    pub const fn accepted(&self) -> bool {
        !matches!(self, Self::NoPrediction | Self::Incomplete | Self::BelowAcceptance)
    }
}

/// Decides when a stream of accepted samples becomes a gesture event
#[derive(Debug, Clone)]
pub struct ConfirmationStateMachine {
    config: ConfirmationConfig,
    completion_required: bool,
    validate_history: bool,
    state: ConfirmationState,
    history: VecDeque<ConfirmationRecord>,
}

impl ConfirmationStateMachine {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.confirmation.clone(),
            completion_required: config.completion_required(),
            validate_history: config.auxiliary_checks,
            state: ConfirmationState::default(),
            history: VecDeque::with_capacity(config.confirmation.history_capacity),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &ConfirmationState {
        &self.state
    }

    pub fn history(&self) -> impl Iterator<Item = &ConfirmationRecord> {
        self.history.iter()
    }

    /// Feed one frame's (possibly absent) sample
    pub fn observe(&mut self, sample: Option<ConfirmationSample>, now: Instant) -> Decision {
        let Some(sample) = sample else {
            return Decision::NoPrediction;
        };
        if self.completion_required && !sample.completed {
            return Decision::Incomplete;
        }
        if sample.confidence <= self.config.acceptance_confidence {
            return Decision::BelowAcceptance;
        }

        let required = self.config.required_confirmations;
        self.state = self.state.accept(sample.label, required);
        self.record(&sample);

        let count = self.state.consecutive_count();
        let candidate = sample.label;
        if count < required {
            return Decision::Accumulating { candidate, count };
        }

        if self.state.cooling_down(candidate, now, self.config.cooldown_seconds) {
            tracing::debug!(label = %candidate, "confirmation held by cooldown");
            return Decision::CoolingDown { candidate, count };
        }

        if self.validate_history && !self.history_supports(candidate) {
            tracing::debug!(label = %candidate, "confirmation rejected by history validation");
            return Decision::ValidationFailed { candidate, count };
        }

        self.state = self.state.confirm(candidate, now);
        tracing::info!(
            label = %candidate,
            confidence = sample.confidence,
            count,
            "gesture confirmed"
        );

        Decision::Emitted(GestureEvent {
            label: candidate,
            confidence: sample.confidence,
            motion_duration: sample.motion_duration,
            consistency_score: sample.consistency_score,
            trend_stable: sample.trend_stable,
            confirmation_count: count,
            gesture_completed: sample.completed,
            timestamp: Utc::now(),
        })
    }

    fn record(&mut self, sample: &ConfirmationSample) {
        if self.config.history_capacity == 0 {
            return;
        }
        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(ConfirmationRecord {
            label: sample.label,
            confidence: sample.confidence,
            completed: sample.completed,
            consistency_score: sample.consistency_score,
            trend_stable: sample.trend_stable,
        });
    }

    /// Last `validation_window` accepted samples must mostly agree, be
    /// confident on average, and mostly be complete
    #[allow(clippy::cast_precision_loss)]
    fn history_supports(&self, label: GestureLabel) -> bool {
        let window = self.config.validation_window;
        if window == 0 || self.history.len() < window {
            return false;
        }
        let recent: Vec<&ConfirmationRecord> = self.history.iter().skip(self.history.len() - window).collect();

        let matching = recent.iter().filter(|r| r.label == label).count();
        let mean = recent.iter().map(|r| r.confidence).sum::<f64>() / window as f64;
        let completed = recent.iter().filter(|r| r.completed).count();

        matching >= self.config.validation_min_matching
            && mean >= self.config.validation_min_mean_confidence
            && completed >= self.config.validation_min_completed
    }

    /// Back to `Idle` with an empty history
    pub fn reset(&mut self) {
        self.state = ConfirmationState::default();
        self.history.clear();
    }
}
