//! Configuration management for the marshaling gateway
//!
//! An [`EngineConfig`] is an immutable snapshot: it is built once from a
//! [`Profile`] plus overrides and never mutated while the engine runs. A new
//! profile means constructing a new `EngineConfig` and handing it to
//! `GestureEngine::configure`.

pub mod file;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::gesture::{GestureLabel, PerGesture};
use crate::{Error, Result};

/// Window sizes the multi-window buffers support (frames at a nominal 30 Hz)
pub const SUPPORTED_WINDOW_SIZES: [usize; 4] = [30, 45, 60, 90];

/// Named confirmation profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Few confirmations backed by the full auxiliary checks
    #[default]
    Precision,
    /// Long run of high-confidence samples, auxiliary checks off
    Simple,
}

impl Profile {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Simple => "simple",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "precision" | "improved" => Ok(Self::Precision),
            "simple" => Ok(Self::Simple),
            other => Err(Error::Config(format!("unknown profile: {other}"))),
        }
    }
}

/// One configured window buffer and its fusion weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub size: usize,
    pub weight: f64,
}

/// Confidence threshold stages keyed on motion duration (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicThresholds {
    pub early_stage: f64,
    pub mid_stage: f64,
    pub late_stage: f64,
    pub completion: f64,
    pub early_until: f64,
    pub mid_until: f64,
    pub late_until: f64,
}

impl Default for DynamicThresholds {
    fn default() -> Self {
        Self {
            early_stage: 0.95,
            mid_stage: 0.85,
            late_stage: 0.80,
            completion: 0.75,
            early_until: 0.5,
            mid_until: 1.0,
            late_until: 2.0,
        }
    }
}

/// Per-frame motion detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Mean joint displacement above which the frame counts as moving
    pub motion_threshold: f64,
    /// Stable frames after which a moving subject is considered at rest
    pub stable_frame_limit: u32,
    /// Joints at or below this visibility are left out of the intensity
    pub visibility_threshold: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 0.02,
            stable_frame_limit: 10,
            visibility_threshold: 0.5,
        }
    }
}

/// Gesture completion gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Ignore samples until the gesture motion is judged complete
    pub required: bool,
    pub motion_threshold: f64,
    pub stable_frames: u32,
    /// Seconds
    pub min_motion_duration: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            required: true,
            motion_threshold: 0.005,
            stable_frames: 20,
            min_motion_duration: 1.2,
        }
    }
}

/// Recent-prediction consistency analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    pub window: usize,
    /// Share of the window a label must occupy to be a candidate
    pub min_share: f64,
    pub threshold: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            window: 30,
            min_share: 0.7,
            threshold: 0.8,
        }
    }
}

/// Confidence trend analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub window: usize,
    pub min_gradient: f64,
    pub min_stability: f64,
    /// Multiplier applied when the trend is not stable-increasing
    pub penalty: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: 10,
            min_gradient: 0.02,
            min_stability: 0.8,
            penalty: 0.9,
        }
    }
}

/// A known label sequence seen during a maneuver changeover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPattern {
    pub name: String,
    pub sequence: Vec<GestureLabel>,
}

impl TransitionPattern {
    #[must_use]
    pub fn new(name: &str, sequence: Vec<GestureLabel>) -> Self {
        Self {
            name: name.to_string(),
            sequence,
        }
    }

    /// `[from, from, to, to]`
    #[must_use]
    pub fn changeover(from: GestureLabel, to: GestureLabel) -> Self {
        Self::new(&format!("{from}_to_{to}"), vec![from, from, to, to])
    }

    /// Label the pattern settles on
    #[must_use]
    pub fn terminal(&self) -> Option<GestureLabel> {
        self.sequence.last().copied()
    }
}

/// Transition pattern correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub buffer_capacity: usize,
    /// Entries the buffer must hold before any pattern is matched
    pub min_history: usize,
    pub boost: f64,
    pub patterns: Vec<TransitionPattern>,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        use GestureLabel::{Forward, Left, Right, Stop};

        Self {
            buffer_capacity: 60,
            min_history: 20,
            boost: 1.1,
            patterns: vec![
                TransitionPattern::changeover(Stop, Forward),
                TransitionPattern::changeover(Left, Stop),
                TransitionPattern::changeover(Right, Stop),
                TransitionPattern::changeover(Forward, Left),
                TransitionPattern::changeover(Forward, Right),
            ],
        }
    }
}

/// Bounded prediction histories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub long_capacity: usize,
    pub short_capacity: usize,
    /// Frames at or below this confidence are not recorded
    pub min_confidence: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            long_capacity: 90,
            short_capacity: 30,
            min_confidence: 0.6,
        }
    }
}

/// Confirmation state machine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub required_confirmations: u32,
    pub cooldown_seconds: f64,
    /// Samples at or below this confidence are not accepted
    pub acceptance_confidence: f64,
    pub history_capacity: usize,
    pub validation_window: usize,
    pub validation_min_matching: usize,
    pub validation_min_mean_confidence: f64,
    pub validation_min_completed: usize,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 5,
            cooldown_seconds: 2.0,
            acceptance_confidence: 0.85,
            history_capacity: 20,
            validation_window: 5,
            validation_min_matching: 4,
            validation_min_mean_confidence: 0.85,
            validation_min_completed: 3,
        }
    }
}

/// Immutable configuration snapshot for the gesture engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub profile: Profile,
    pub windows: Vec<WindowSpec>,
    pub thresholds: DynamicThresholds,
    pub motion: MotionConfig,
    pub completion: CompletionConfig,
    pub consistency: ConsistencyConfig,
    pub trend: TrendConfig,
    pub transition: TransitionConfig,
    pub history: HistoryConfig,
    pub confirmation: ConfirmationConfig,
    pub preferred_windows: PerGesture<Vec<usize>>,
    /// Windows used before any prediction has been recorded
    pub default_windows: Vec<usize>,
    pub smart_window_selection: bool,
    /// Consistency, trend, transition, completion and history validation
    pub auxiliary_checks: bool,
    /// Frames per classifier input
    pub classifier_input_len: usize,
    /// Concurrent classifier calls per frame (1 = sequential)
    pub classifier_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::precision()
    }
}

impl EngineConfig {
    /// Build the default snapshot for a profile
    #[must_use]
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Precision => Self::precision(),
            Profile::Simple => Self::simple(),
        }
    }

    /// Five validated confirmations with every auxiliary check enabled
    #[must_use]
    pub fn precision() -> Self {
        Self {
            profile: Profile::Precision,
            windows: vec![
                WindowSpec { size: 30, weight: 0.2 },
                WindowSpec { size: 45, weight: 0.3 },
                WindowSpec { size: 60, weight: 0.3 },
                WindowSpec { size: 90, weight: 0.2 },
            ],
            thresholds: DynamicThresholds::default(),
            motion: MotionConfig::default(),
            completion: CompletionConfig::default(),
            consistency: ConsistencyConfig::default(),
            trend: TrendConfig::default(),
            transition: TransitionConfig::default(),
            history: HistoryConfig::default(),
            confirmation: ConfirmationConfig::default(),
            preferred_windows: PerGesture {
                stop: vec![45, 60],
                forward: vec![60, 90],
                left: vec![30, 45],
                right: vec![30, 45],
            },
            default_windows: vec![45, 60],
            smart_window_selection: true,
            auxiliary_checks: true,
            classifier_input_len: 30,
            classifier_workers: 1,
        }
    }

    /// Thirty consecutive high-confidence samples, no auxiliary checks
    #[must_use]
    pub fn simple() -> Self {
        let mut config = Self::precision();
        config.profile = Profile::Simple;
        config.auxiliary_checks = false;
        config.smart_window_selection = false;
        config.completion.required = false;
        config.confirmation.required_confirmations = 30;
        config.confirmation.cooldown_seconds = 3.0;
        config.confirmation.acceptance_confidence = 0.9;
        config
    }

    /// Whether the completion gate applies to incoming samples
    #[must_use]
    pub const fn completion_required(&self) -> bool {
        self.auxiliary_checks && self.completion.required
    }

    /// Configured window sizes in declaration order
    pub fn window_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.windows.iter().map(|w| w.size)
    }

    /// Fusion weight for a window size (0 when unconfigured)
    #[must_use]
    pub fn window_weight(&self, size: usize) -> f64 {
        self.windows
            .iter()
            .find(|w| w.size == size)
            .map_or(0.0, |w| w.weight)
    }

    /// Check internal consistency of the snapshot
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.windows.is_empty() {
            return Err(Error::Config("at least one window is required".to_string()));
        }

        let mut seen = HashSet::new();
        for window in &self.windows {
            if !SUPPORTED_WINDOW_SIZES.contains(&window.size) {
                return Err(Error::Config(format!(
                    "unsupported window size {} (expected one of {SUPPORTED_WINDOW_SIZES:?})",
                    window.size
                )));
            }
            if !seen.insert(window.size) {
                return Err(Error::Config(format!("duplicate window size {}", window.size)));
            }
            check_unit("window weight", window.weight)?;
        }

        for (label, sizes) in self.preferred_windows.iter() {
            if let Some(size) = sizes.iter().find(|s| !seen.contains(s)) {
                return Err(Error::Config(format!(
                    "preferred window {size} for {label} is not configured"
                )));
            }
        }
        if let Some(size) = self.default_windows.iter().find(|s| !seen.contains(s)) {
            return Err(Error::Config(format!(
                "default window {size} is not configured"
            )));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("early_stage", t.early_stage),
            ("mid_stage", t.mid_stage),
            ("late_stage", t.late_stage),
            ("completion", t.completion),
            ("consistency threshold", self.consistency.threshold),
            ("consistency min_share", self.consistency.min_share),
            ("history min_confidence", self.history.min_confidence),
            (
                "acceptance_confidence",
                self.confirmation.acceptance_confidence,
            ),
            (
                "validation_min_mean_confidence",
                self.confirmation.validation_min_mean_confidence,
            ),
        ] {
            check_unit(name, value)?;
        }
        if t.early_until > t.mid_until || t.mid_until > t.late_until {
            return Err(Error::Config(
                "threshold stage boundaries must be ascending".to_string(),
            ));
        }

        if self.confirmation.required_confirmations == 0 {
            return Err(Error::Config(
                "required_confirmations must be at least 1".to_string(),
            ));
        }
        let cooldown = self.confirmation.cooldown_seconds;
        if cooldown.is_nan() || cooldown < 0.0 {
            return Err(Error::Config("cooldown_seconds must be >= 0".to_string()));
        }
        if self.classifier_input_len == 0 {
            return Err(Error::Config(
                "classifier_input_len must be positive".to_string(),
            ));
        }
        if self.consistency.window == 0 || self.trend.window < 2 {
            return Err(Error::Config(
                "analysis windows are too small".to_string(),
            ));
        }
        if let Some(pattern) = self.transition.patterns.iter().find(|p| p.sequence.is_empty()) {
            return Err(Error::Config(format!(
                "transition pattern {} is empty",
                pattern.name
            )));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be within [0, 1], got {value}")))
    }
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine snapshot after profile, file and env layering
    pub engine: EngineConfig,

    /// Path to data directory (recordings, event logs)
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration for a profile
    ///
    /// # Errors
    ///
    /// Returns error if the resolved engine configuration is invalid
    pub fn load(profile: Option<Profile>) -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_file_config(profile, fc)
    }

    /// Resolve configuration from an already-parsed file (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a profile name is unknown or the result fails validation
    pub fn from_file_config(profile: Option<Profile>, fc: file::MarshalConfigFile) -> Result<Self> {
        let profile = match profile {
            Some(p) => p,
            None => {
                let name = std::env::var("MARSHAL_PROFILE")
                    .ok()
                    .or_else(|| fc.engine.profile.clone());
                name.map_or(Ok(Profile::default()), |n| n.parse())?
            }
        };

        let mut engine = EngineConfig::for_profile(profile);
        fc.engine.apply(&mut engine);

        if let Some(n) = env_parse("MARSHAL_REQUIRED_CONFIRMATIONS") {
            engine.confirmation.required_confirmations = n;
        }
        if let Some(secs) = env_parse("MARSHAL_COOLDOWN_SECONDS") {
            engine.confirmation.cooldown_seconds = secs;
        }
        if let Some(workers) = env_parse("MARSHAL_CLASSIFIER_WORKERS") {
            engine.classifier_workers = workers;
        }

        engine.validate()?;

        // Determine data directory (~/.local/share/marshal on Linux)
        let data_dir = fc.data_dir.map(PathBuf::from).unwrap_or_else(|| {
            directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("marshal"))
        });

        tracing::debug!(%profile, data_dir = %data_dir.display(), "resolved configuration");

        Ok(Self { engine, data_dir })
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
