//! Multi-window ensemble prediction
//!
//! Each frame the predictor picks which ready windows to classify, based on
//! how long the current motion has lasted and which gesture was last seen,
//! classifies them (optionally in parallel) and fuses the results that clear
//! a duration-dependent confidence threshold.

use std::collections::BTreeSet;
use std::thread;

use super::classifier::{ClassifierError, PoseClassifier};
use super::types::{ClassifierResult, GestureLabel, PoseSample};
use super::window::{WindowBufferManager, resample};
use crate::config::{DynamicThresholds, EngineConfig};

/// Motion shorter than this only uses short windows
const SHORT_MOTION_SECS: f64 = 1.0;

/// Motion longer than this only uses long windows
const LONG_MOTION_SECS: f64 = 2.0;

/// Largest window considered short
const SHORT_WINDOW_MAX: usize = 45;

/// Smallest window considered long
const LONG_WINDOW_MIN: usize = 60;

/// Classifier outcome for one window this frame
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPrediction {
    pub size: usize,
    pub outcome: Result<ClassifierResult, ClassifierError>,
}

/// Weighted fusion of the windows that cleared the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct FusedPrediction {
    pub label: GestureLabel,
    /// Winning label's share of the accumulated weight, in `[0, 1]`
    pub confidence: f64,
    /// Labels that received weight, in order of first contribution
    pub contributors: Vec<GestureLabel>,
}

/// Everything the predictor did for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleOutput {
    pub selected_windows: Vec<usize>,
    pub window_predictions: Vec<WindowPrediction>,
    pub threshold: f64,
    pub fused: Option<FusedPrediction>,
}

/// Choose which windows to classify for this frame
///
/// With smart selection off every ready window is used. Otherwise the
/// preferred windows of `last_label` (or the defaults) are narrowed by motion
/// duration, then intersected with `ready`.
#[must_use]
pub fn select_windows(
    config: &EngineConfig,
    duration_secs: f64,
    last_label: Option<GestureLabel>,
    ready: &BTreeSet<usize>,
) -> Vec<usize> {
    if !config.smart_window_selection {
        return config.window_sizes().filter(|s| ready.contains(s)).collect();
    }

    let preferred = last_label.map_or(&config.default_windows, |label| {
        config.preferred_windows.get(label)
    });

    preferred
        .iter()
        .copied()
        .filter(|&size| {
            if duration_secs < SHORT_MOTION_SECS {
                size <= SHORT_WINDOW_MAX
            } else if duration_secs > LONG_MOTION_SECS {
                size >= LONG_WINDOW_MIN
            } else {
                true
            }
        })
        .filter(|size| ready.contains(size))
        .collect()
}

/// Minimum per-window confidence for the current motion stage
///
/// Past the late stage the completion threshold only applies while motion has
/// died down; otherwise the late-stage threshold stays in force.
#[must_use]
pub fn dynamic_threshold(
    thresholds: &DynamicThresholds,
    completion_motion_threshold: f64,
    duration_secs: f64,
    intensity: f64,
) -> f64 {
    if duration_secs < thresholds.early_until {
        thresholds.early_stage
    } else if duration_secs < thresholds.mid_until {
        thresholds.mid_stage
    } else if duration_secs < thresholds.late_until {
        thresholds.late_stage
    } else if intensity < completion_motion_threshold {
        thresholds.completion
    } else {
        thresholds.late_stage
    }
}

/// Fuse per-window results whose confidence exceeds `threshold`
///
/// Ties go to the label that contributed first. Returns `None` when nothing
/// contributes.
#[must_use]
pub fn fuse(
    config: &EngineConfig,
    results: &[(usize, ClassifierResult)],
    threshold: f64,
) -> Option<FusedPrediction> {
    let mut weights: Vec<(GestureLabel, f64)> = Vec::with_capacity(GestureLabel::ALL.len());

    for (size, result) in results {
        if result.confidence <= threshold {
            continue;
        }
        let weight = config.window_weight(*size) * result.confidence;
        match weights.iter_mut().find(|(label, _)| *label == result.label) {
            Some((_, acc)) => *acc += weight,
            None => weights.push((result.label, weight)),
        }
    }

    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if weights.is_empty() || total <= 0.0 {
        return None;
    }

    let (label, best) = weights
        .iter()
        .copied()
        .fold(None, |best: Option<(GestureLabel, f64)>, (label, w)| match best {
            Some((_, bw)) if bw >= w => best,
            _ => Some((label, w)),
        })?;

    Some(FusedPrediction {
        label,
        confidence: (best / total).clamp(0.0, 1.0),
        contributors: weights.into_iter().map(|(label, _)| label).collect(),
    })
}

/// Run the classifier over each `(size, window)` input, preserving order
///
/// With `workers > 1` up to that many windows are classified concurrently on
/// scoped threads; every chunk is joined before the next starts, and all
/// results are available before this returns.
pub fn classify_windows<C: PoseClassifier>(
    classifier: &C,
    inputs: &[(usize, Vec<PoseSample>)],
    workers: usize,
) -> Vec<WindowPrediction> {
    if workers <= 1 || inputs.len() <= 1 {
        return inputs
            .iter()
            .map(|(size, window)| WindowPrediction {
                size: *size,
                outcome: checked_predict(classifier, window),
            })
            .collect();
    }

    let mut predictions = Vec::with_capacity(inputs.len());
    for chunk in inputs.chunks(workers) {
        thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|(size, window)| (*size, scope.spawn(move || checked_predict(classifier, window))))
                .collect();

            for (size, handle) in handles {
                let outcome = handle
                    .join()
                    .unwrap_or(Err(ClassifierError::WorkerPanicked));
                predictions.push(WindowPrediction { size, outcome });
            }
        });
    }
    predictions
}

/// Classify one window, treating a confidence outside `[0, 1]` (or NaN) as a failure
fn checked_predict<C: PoseClassifier>(
    classifier: &C,
    window: &[PoseSample],
) -> Result<ClassifierResult, ClassifierError> {
    let result = classifier.predict(window)?;
    if (0.0..=1.0).contains(&result.confidence) {
        Ok(result)
    } else {
        Err(ClassifierError::InvalidOutput(format!(
            "confidence {} outside [0, 1]",
            result.confidence
        )))
    }
}

/// Selects, classifies and fuses windows for one frame
#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    config: EngineConfig,
}

impl EnsemblePredictor {
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Produce this frame's ensemble prediction
    ///
    /// Classifier failures are logged and skip only the affected window.
    pub fn predict<C: PoseClassifier>(
        &self,
        classifier: &C,
        buffers: &WindowBufferManager,
        duration_secs: f64,
        intensity: f64,
        last_label: Option<GestureLabel>,
    ) -> EnsembleOutput {
        let config = &self.config;
        let selected = select_windows(config, duration_secs, last_label, &buffers.ready_sizes());
        let threshold = dynamic_threshold(
            &config.thresholds,
            config.completion.motion_threshold,
            duration_secs,
            intensity,
        );

        let inputs: Vec<(usize, Vec<_>)> = selected
            .iter()
            .filter_map(|&size| {
                buffers
                    .get(size)
                    .map(|b| (size, resample(&b.to_vec(), config.classifier_input_len)))
            })
            .collect();

        let window_predictions = classify_windows(classifier, &inputs, config.classifier_workers);

        let results: Vec<(usize, ClassifierResult)> = window_predictions
            .iter()
            .filter_map(|p| match &p.outcome {
                Ok(result) => {
                    tracing::trace!(
                        window = p.size,
                        label = %result.label,
                        confidence = result.confidence,
                        "window prediction"
                    );
                    Some((p.size, *result))
                }
                Err(e) => {
                    tracing::warn!(window = p.size, error = %e, "classifier failed, skipping window");
                    None
                }
            })
            .collect();

        let fused = fuse(config, &results, threshold);

        EnsembleOutput {
            selected_windows: selected,
            window_predictions,
            threshold,
            fused,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn ready(sizes: &[usize]) -> BTreeSet<usize> {
        sizes.iter().copied().collect()
    }

    #[test]
    fn selection_uses_defaults_without_history() {
        let config = EngineConfig::precision();
        let all = ready(&[30, 45, 60, 90]);
        assert_eq!(select_windows(&config, 1.5, None, &all), vec![45, 60]);
        assert_eq!(select_windows(&config, 0.3, None, &all), vec![45]);
        assert_eq!(select_windows(&config, 2.5, None, &all), vec![60]);
    }

    #[test]
    fn selection_follows_last_label() {
        let config = EngineConfig::precision();
        let all = ready(&[30, 45, 60, 90]);
        assert_eq!(
            select_windows(&config, 2.5, Some(GestureLabel::Forward), &all),
            vec![60, 90]
        );
        assert!(select_windows(&config, 0.5, Some(GestureLabel::Forward), &all).is_empty());
        assert_eq!(
            select_windows(&config, 1.5, Some(GestureLabel::Left), &all),
            vec![30, 45]
        );
    }

    #[test]
    fn selection_intersects_ready_windows() {
        let config = EngineConfig::precision();
        assert_eq!(
            select_windows(&config, 1.5, Some(GestureLabel::Forward), &ready(&[30, 45, 60])),
            vec![60]
        );
    }

    #[test]
    fn selection_without_smart_mode_uses_all_ready() {
        let config = EngineConfig::simple();
        assert_eq!(select_windows(&config, 0.1, None, &ready(&[30, 60])), vec![30, 60]);
    }

    #[test]
    fn threshold_stages() {
        let t = DynamicThresholds::default();
        let approx = |a: f64, b: f64| (a - b).abs() < f64::EPSILON;
        assert!(approx(dynamic_threshold(&t, 0.005, 0.2, 0.1), 0.95));
        assert!(approx(dynamic_threshold(&t, 0.005, 0.7, 0.1), 0.85));
        assert!(approx(dynamic_threshold(&t, 0.005, 1.5, 0.1), 0.80));
        assert!(approx(dynamic_threshold(&t, 0.005, 2.5, 0.001), 0.75));
        // still moving after the late stage: late-stage threshold stays
        assert!(approx(dynamic_threshold(&t, 0.005, 2.5, 0.01), 0.80));
    }

    #[test]
    fn fusion_weights_by_window_and_confidence() {
        let config = EngineConfig::precision();
        let results = [
            (45, ClassifierResult::new(GestureLabel::Stop, 0.9)),
            (60, ClassifierResult::new(GestureLabel::Stop, 0.9)),
            (90, ClassifierResult::new(GestureLabel::Left, 0.9)),
        ];
        let fused = fuse(&config, &results, 0.8).unwrap();
        assert_eq!(fused.label, GestureLabel::Stop);
        // (0.27 + 0.27) / (0.27 + 0.27 + 0.18)
        assert!((fused.confidence - 0.75).abs() < 1e-9);
        assert_eq!(fused.contributors, vec![GestureLabel::Stop, GestureLabel::Left]);
    }

    #[test]
    fn fusion_discards_results_at_threshold() {
        let config = EngineConfig::precision();
        let results = [(45, ClassifierResult::new(GestureLabel::Stop, 0.8))];
        assert!(fuse(&config, &results, 0.8).is_none());
        assert!(fuse(&config, &[], 0.5).is_none());
    }

    #[test]
    fn fusion_tie_goes_to_first_contributor() {
        let config = EngineConfig::precision();
        let results = [
            (45, ClassifierResult::new(GestureLabel::Right, 0.9)),
            (60, ClassifierResult::new(GestureLabel::Forward, 0.9)),
        ];
        let fused = fuse(&config, &results, 0.5).unwrap();
        assert_eq!(fused.label, GestureLabel::Right);
        assert!((fused.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn fused_confidence_stays_in_unit_interval() {
        let config = EngineConfig::precision();
        for conf in [0.51, 0.7, 0.99, 1.0] {
            for label in GestureLabel::ALL {
                let results = [
                    (30, ClassifierResult::new(label, conf)),
                    (90, ClassifierResult::new(GestureLabel::Stop, conf)),
                ];
                let fused = fuse(&config, &results, 0.5).unwrap();
                assert!((0.0..=1.0).contains(&fused.confidence));
            }
        }
    }

    struct CountingClassifier {
        calls: AtomicUsize,
    }

    impl PoseClassifier for CountingClassifier {
        fn predict(&self, window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if window.len() == 30 {
                Ok(ClassifierResult::new(GestureLabel::Stop, 0.9))
            } else {
                Err(ClassifierError::InvalidInput(format!("{} frames", window.len())))
            }
        }
    }

    #[test]
    fn parallel_classification_preserves_order() {
        let classifier = CountingClassifier {
            calls: AtomicUsize::new(0),
        };
        let inputs: Vec<_> = [30, 45, 60, 90]
            .into_iter()
            .map(|size| (size, vec![PoseSample::uniform(0.0, 0.0); if size == 60 { 5 } else { 30 }]))
            .collect();

        let predictions = classify_windows(&classifier, &inputs, 3);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 4);
        let sizes: Vec<_> = predictions.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![30, 45, 60, 90]);
        assert!(predictions[2].outcome.is_err());
        assert!(predictions[3].outcome.is_ok());
    }

    /// Fails on any window whose first sample sits at the origin
    struct OriginRejectingClassifier;

    impl PoseClassifier for OriginRejectingClassifier {
        fn predict(&self, window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError> {
            match window.first() {
                Some(s) if s.joints()[0].x.abs() < f64::EPSILON => {
                    Err(ClassifierError::Inference("origin".to_string()))
                }
                _ => Ok(ClassifierResult::new(GestureLabel::Stop, 0.9)),
            }
        }
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn predictor_skips_failed_windows() {
        let mut config = EngineConfig::precision();
        config.smart_window_selection = false;
        let predictor = EnsemblePredictor::new(config);

        // the 45 window starts at x = 0, the 30 window at x = 15
        let mut buffers = WindowBufferManager::new([30, 45]);
        for n in 0..45 {
            buffers.push(PoseSample::uniform(n as f64, 0.0));
        }

        let output = predictor.predict(&OriginRejectingClassifier, &buffers, 1.5, 0.0, None);
        assert_eq!(output.selected_windows, vec![30, 45]);
        assert!((output.threshold - 0.80).abs() < f64::EPSILON);
        assert!(output.window_predictions[0].outcome.is_ok());
        assert!(output.window_predictions[1].outcome.is_err());

        let fused = output.fused.unwrap();
        assert_eq!(fused.label, GestureLabel::Stop);
        assert!((fused.confidence - 1.0).abs() < 1e-9);
    }

    struct Garbage(f64);

    impl PoseClassifier for Garbage {
        fn predict(&self, _window: &[PoseSample]) -> Result<ClassifierResult, ClassifierError> {
            Ok(ClassifierResult::new(GestureLabel::Stop, self.0))
        }
    }

    #[test]
    fn out_of_range_confidence_fails_the_window() {
        let inputs = vec![(30, vec![PoseSample::uniform(0.0, 0.0); 30])];
        for confidence in [f64::NAN, f64::INFINITY, 1.5, -0.1] {
            let predictions = classify_windows(&Garbage(confidence), &inputs, 1);
            assert!(matches!(
                predictions[0].outcome,
                Err(ClassifierError::InvalidOutput(_))
            ));
        }

        let parallel: Vec<_> = [30, 45]
            .into_iter()
            .map(|size| (size, vec![PoseSample::uniform(0.0, 0.0); 30]))
            .collect();
        let predictions = classify_windows(&Garbage(f64::NAN), &parallel, 2);
        assert!(predictions.iter().all(|p| p.outcome.is_err()));
    }

    #[test]
    fn nan_confidence_never_fuses() {
        let mut config = EngineConfig::simple();
        config.smart_window_selection = false;
        let predictor = EnsemblePredictor::new(config);
        let mut buffers = WindowBufferManager::new([30]);
        for _ in 0..30 {
            buffers.push(PoseSample::uniform(0.0, 0.0));
        }

        let output = predictor.predict(&Garbage(f64::NAN), &buffers, 3.0, 0.0, None);
        assert_eq!(output.selected_windows, vec![30]);
        assert!(output.fused.is_none());
    }

    #[test]
    fn predictor_without_ready_windows_returns_none() {
        let predictor = EnsemblePredictor::new(EngineConfig::precision());
        let mut buffers = WindowBufferManager::new([30, 45, 60, 90]);
        buffers.push(PoseSample::uniform(1.0, 1.0));

        let output = predictor.predict(&OriginRejectingClassifier, &buffers, 1.5, 0.0, None);
        assert!(output.selected_windows.is_empty());
        assert!(output.fused.is_none());
    }
}
