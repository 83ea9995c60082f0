//! Transition-pattern correction
//!
//! During a maneuver changeover the ensemble tends to flicker between the old
//! and new gesture. When the most recent labels spell out a known changeover,
//! the current frame is pinned to the pattern's terminal label.

use std::collections::VecDeque;

use super::types::GestureLabel;
use crate::config::TransitionConfig;

/// A pattern matched against the label buffer
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatch {
    pub pattern: String,
    pub label: GestureLabel,
    pub confidence: f64,
}

/// Rolling buffer of recent labels checked against the transition table
#[derive(Debug, Clone)]
pub struct TransitionDetector {
    config: TransitionConfig,
    buffer: VecDeque<(GestureLabel, f64)>,
}

impl TransitionDetector {
    #[must_use]
    pub fn new(config: TransitionConfig) -> Self {
        let buffer = VecDeque::with_capacity(config.buffer_capacity);
        Self { config, buffer }
    }

    /// Record the current label, then look for a pattern ending here
    ///
    /// Patterns are tried in table order. Nothing matches until the buffer
    /// holds `min_history` entries.
    pub fn observe(&mut self, label: GestureLabel, confidence: f64) -> Option<TransitionMatch> {
        if self.config.buffer_capacity == 0 {
            return None;
        }
        if self.buffer.len() == self.config.buffer_capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back((label, confidence));

        if self.buffer.len() < self.config.min_history {
            return None;
        }

        let matched = self
            .config
            .patterns
            .iter()
            .find(|pattern| self.ends_with(&pattern.sequence))?;
        let terminal = matched.terminal()?;

        tracing::debug!(pattern = %matched.name, label = %terminal, "transition pattern matched");

        Some(TransitionMatch {
            pattern: matched.name.clone(),
            label: terminal,
            confidence: (confidence * self.config.boost).min(1.0),
        })
    }

    fn ends_with(&self, sequence: &[GestureLabel]) -> bool {
        if sequence.is_empty() || sequence.len() > self.buffer.len() {
            return false;
        }
        self.buffer
            .iter()
            .skip(self.buffer.len() - sequence.len())
            .map(|(label, _)| label)
            .eq(sequence.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
