//! TOML configuration file loading
//!
//! Supports `~/.config/marshal/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of the
//! selected profile.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::EngineConfig;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MarshalConfigFile {
    /// Directory for recordings and event logs
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Gesture engine overrides
    #[serde(default)]
    pub engine: EngineFileConfig,
}

/// Engine overrides applied on top of the selected profile
#[derive(Debug, Default, Deserialize)]
pub struct EngineFileConfig {
    /// Profile name ("precision" or "simple")
    pub profile: Option<String>,

    pub required_confirmations: Option<u32>,
    pub cooldown_seconds: Option<f64>,
    pub acceptance_confidence: Option<f64>,
    pub consistency_threshold: Option<f64>,
    pub min_gradient: Option<f64>,
    pub completion_required: Option<bool>,
    pub completion_stable_frames: Option<u32>,
    pub min_motion_duration: Option<f64>,
    pub auxiliary_checks: Option<bool>,
    pub smart_window_selection: Option<bool>,
    pub classifier_workers: Option<usize>,
}

impl EngineFileConfig {
    /// Overlay every set field onto `config`
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(n) = self.required_confirmations {
            config.confirmation.required_confirmations = n;
        }
        if let Some(secs) = self.cooldown_seconds {
            config.confirmation.cooldown_seconds = secs;
        }
        if let Some(c) = self.acceptance_confidence {
            config.confirmation.acceptance_confidence = c;
        }
        if let Some(t) = self.consistency_threshold {
            config.consistency.threshold = t;
        }
        if let Some(g) = self.min_gradient {
            config.trend.min_gradient = g;
        }
        if let Some(required) = self.completion_required {
            config.completion.required = required;
        }
        if let Some(frames) = self.completion_stable_frames {
            config.completion.stable_frames = frames;
        }
        if let Some(secs) = self.min_motion_duration {
            config.completion.min_motion_duration = secs;
        }
        if let Some(enabled) = self.auxiliary_checks {
            config.auxiliary_checks = enabled;
        }
        if let Some(enabled) = self.smart_window_selection {
            config.smart_window_selection = enabled;
        }
        if let Some(workers) = self.classifier_workers {
            config.classifier_workers = workers;
        }
    }
}

/// Load the TOML config file from the standard path
///
/// Returns `MarshalConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MarshalConfigFile {
    config_file_path().map_or_else(MarshalConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> MarshalConfigFile {
    if !path.exists() {
        return MarshalConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MarshalConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MarshalConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/marshal/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("marshal").join("config.toml"))
}
