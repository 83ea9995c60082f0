//! Recent-prediction consistency analysis
//!
//! A label that dominates the last `window` predictions with high confidence
//! may override the ensemble's pick for the current frame.

use std::collections::VecDeque;

use super::ensemble::FusedPrediction;
use super::types::{GestureLabel, PredictionEntry};
use crate::config::ConsistencyConfig;

/// Result of scanning the recent prediction history
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsistencyVerdict {
    /// Label occupying at least `min_share` of the window with the best score
    pub candidate: Option<GestureLabel>,
    pub score: f64,
}

/// Scores how steadily each label recurs in recent history
#[derive(Debug, Clone)]
pub struct ConsistencyAnalyzer {
    config: ConsistencyConfig,
}

impl ConsistencyAnalyzer {
    #[must_use]
    pub const fn new(config: ConsistencyConfig) -> Self {
        Self { config }
    }

    /// Find the consistent candidate over the last `window` entries
    ///
    /// `score = (occurrences / window) * mean(confidence)`. Nothing is
    /// reported until the history holds a full window.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn analyze(&self, history: &VecDeque<PredictionEntry>) -> ConsistencyVerdict {
        let window = self.config.window;
        if window == 0 || history.len() < window {
            return ConsistencyVerdict::default();
        }

        // (label, occurrences, confidence sum) in order of first appearance
        let mut tallies: Vec<(GestureLabel, usize, f64)> = Vec::with_capacity(GestureLabel::ALL.len());
        for entry in history.iter().skip(history.len() - window) {
            match tallies.iter_mut().find(|(label, _, _)| *label == entry.label) {
                Some((_, count, sum)) => {
                    *count += 1;
                    *sum += entry.confidence;
                }
                None => tallies.push((entry.label, 1, entry.confidence)),
            }
        }

        let required = (window as f64 * self.config.min_share).floor() as usize;
        let mut verdict = ConsistencyVerdict::default();
        for (label, count, sum) in tallies {
            if count < required {
                continue;
            }
            let score = count as f64 / window as f64 * (sum / count as f64);
            if score > verdict.score {
                verdict = ConsistencyVerdict {
                    candidate: Some(label),
                    score,
                };
            }
        }
        verdict
    }

    /// Let a strong consistent candidate take over this frame's fused pick
    ///
    /// Applies only when the candidate is the label the ensemble picked and
    /// its score reaches the threshold; the confidence becomes the larger of
    /// the fused confidence and the score.
    #[must_use]
    pub fn apply(
        &self,
        verdict: &ConsistencyVerdict,
        fused: &FusedPrediction,
    ) -> Option<(GestureLabel, f64)> {
        let candidate = verdict.candidate?;
        if fused.label == candidate && verdict.score >= self.config.threshold {
            Some((candidate, fused.confidence.max(verdict.score)))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn history(entries: &[(GestureLabel, f64, usize)]) -> VecDeque<PredictionEntry> {
        let at = Instant::now();
        entries
            .iter()
            .flat_map(|&(label, confidence, n)| {
                std::iter::repeat_n(PredictionEntry { label, confidence, at }, n)
            })
            .collect()
    }

    fn fused(label: GestureLabel, confidence: f64, contributors: Vec<GestureLabel>) -> FusedPrediction {
        FusedPrediction {
            label,
            confidence,
            contributors,
        }
    }

    #[test]
    fn needs_full_window() {
        let analyzer = ConsistencyAnalyzer::new(ConsistencyConfig::default());
        let verdict = analyzer.analyze(&history(&[(GestureLabel::Stop, 0.9, 29)]));
        assert_eq!(verdict.candidate, None);
    }

    #[test]
    fn dominant_label_scores_share_times_mean() {
        let analyzer = ConsistencyAnalyzer::new(ConsistencyConfig::default());
        let verdict = analyzer.analyze(&history(&[
            (GestureLabel::Left, 0.9, 6),
            (GestureLabel::Stop, 0.9, 24),
        ]));
        assert_eq!(verdict.candidate, Some(GestureLabel::Stop));
        assert!((verdict.score - 0.72).abs() < 1e-9);
    }

    #[test]
    fn below_share_is_not_a_candidate() {
        let analyzer = ConsistencyAnalyzer::new(ConsistencyConfig::default());
        let verdict = analyzer.analyze(&history(&[
            (GestureLabel::Left, 0.99, 10),
            (GestureLabel::Stop, 0.99, 20),
        ]));
        assert_eq!(verdict.candidate, None);
        assert!(verdict.score.abs() < f64::EPSILON);
    }

    #[test]
    fn only_last_window_counts() {
        let analyzer = ConsistencyAnalyzer::new(ConsistencyConfig::default());
        let verdict = analyzer.analyze(&history(&[
            (GestureLabel::Left, 0.99, 40),
            (GestureLabel::Forward, 0.95, 30),
        ]));
        assert_eq!(verdict.candidate, Some(GestureLabel::Forward));
        assert!((verdict.score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn override_requires_matching_pick_and_threshold() {
        let analyzer = ConsistencyAnalyzer::new(ConsistencyConfig::default());
        let verdict = ConsistencyVerdict {
            candidate: Some(GestureLabel::Stop),
            score: 0.85,
        };

        let low = fused(GestureLabel::Stop, 0.6, vec![GestureLabel::Stop]);
        assert_eq!(analyzer.apply(&verdict, &low), Some((GestureLabel::Stop, 0.85)));

        let same = fused(GestureLabel::Stop, 0.9, vec![GestureLabel::Stop]);
        assert_eq!(analyzer.apply(&verdict, &same), Some((GestureLabel::Stop, 0.9)));

        let absent = fused(GestureLabel::Left, 0.9, vec![GestureLabel::Left]);
        assert_eq!(analyzer.apply(&verdict, &absent), None);

        let weak = ConsistencyVerdict {
            candidate: Some(GestureLabel::Stop),
            score: 0.75,
        };
        assert_eq!(analyzer.apply(&weak, &same), None);
    }

    #[test]
    fn minority_contributor_does_not_override() {
        let analyzer = ConsistencyAnalyzer::new(ConsistencyConfig::default());
        let verdict = ConsistencyVerdict {
            candidate: Some(GestureLabel::Stop),
            score: 0.85,
        };

        // Stop contributed, but the ensemble picked Left
        let mixed = fused(GestureLabel::Left, 0.6, vec![GestureLabel::Left, GestureLabel::Stop]);
        assert_eq!(analyzer.apply(&verdict, &mixed), None);
    }
}
