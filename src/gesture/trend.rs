//! Confidence trend analysis over the most recent fused confidences

use crate::config::TrendConfig;

/// Slope and stability of the recent confidence series
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendVerdict {
    /// Whether a full window of samples was available
    pub sufficient: bool,
    pub slope: f64,
    /// `1 - stddev` of the window
    pub stability: f64,
    pub stable_increasing: bool,
}

/// Least-squares slope of `values` against their index
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    if den == 0.0 { 0.0 } else { num / den }
}

/// Population standard deviation
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Penalizes predictions whose confidence is not steadily rising
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    #[must_use]
    pub const fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    /// Analyze the last `window` values of `confidences` (oldest first)
    #[must_use]
    pub fn analyze(&self, confidences: &[f64]) -> TrendVerdict {
        let window = self.config.window;
        if confidences.len() < window {
            return TrendVerdict::default();
        }

        let recent = &confidences[confidences.len() - window..];
        let slope = linear_slope(recent);
        let stability = 1.0 - std_dev(recent);

        TrendVerdict {
            sufficient: true,
            slope,
            stability,
            stable_increasing: slope > self.config.min_gradient
                && stability > self.config.min_stability,
        }
    }

    /// Soft penalty: scale `confidence` down when a full window is not stable-increasing
    #[must_use]
    pub fn apply(&self, verdict: &TrendVerdict, confidence: f64) -> f64 {
        if verdict.sufficient && !verdict.stable_increasing {
            confidence * self.config.penalty
        } else {
            confidence
        }
    }
}
