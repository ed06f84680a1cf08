//! Session configuration, persisted as TOML.
//!
//! Every field has a serde default so a partial (or missing) config file
//! still yields a complete [`ChatConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::learn::LearningParams;

/// Errors from configuration loading and validation.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(chat::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(chat::config::parse),
        help("Check the TOML syntax. `chat-friend config show` prints a valid example.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(chat::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for {field}: {message}")]
    #[diagnostic(code(chat::config::invalid), help("Fix the value and try again."))]
    Invalid { field: &'static str, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Offline response bootstrap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "default_episodes")]
    pub episodes: usize,
    #[serde(default = "default_response_alpha")]
    pub alpha: f64,
    #[serde(default = "default_response_gamma")]
    pub gamma: f64,
    #[serde(default = "default_response_epsilon")]
    pub epsilon: f64,
    /// Classifier confidence must exceed this to answer.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

fn default_episodes() -> usize {
    100_000
}
fn default_response_alpha() -> f64 {
    0.1
}
fn default_response_gamma() -> f64 {
    0.6
}
fn default_response_epsilon() -> f64 {
    0.1
}
fn default_confidence_threshold() -> f32 {
    0.5
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            episodes: default_episodes(),
            alpha: default_response_alpha(),
            gamma: default_response_gamma(),
            epsilon: default_response_epsilon(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl ResponseConfig {
    pub fn params(&self) -> LearningParams {
        LearningParams {
            alpha: self.alpha,
            gamma: self.gamma,
            epsilon: self.epsilon,
        }
    }
}

/// Online engagement learner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementConfig {
    #[serde(default = "default_engagement_alpha")]
    pub alpha: f64,
    #[serde(default = "default_engagement_gamma")]
    pub gamma: f64,
    #[serde(default = "default_engagement_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_moderate_silence_secs")]
    pub moderate_silence_secs: u64,
    #[serde(default = "default_long_silence_secs")]
    pub long_silence_secs: u64,
}

fn default_engagement_alpha() -> f64 {
    0.1
}
fn default_engagement_gamma() -> f64 {
    0.9
}
fn default_engagement_epsilon() -> f64 {
    0.2
}
fn default_moderate_silence_secs() -> u64 {
    60
}
fn default_long_silence_secs() -> u64 {
    120
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            alpha: default_engagement_alpha(),
            gamma: default_engagement_gamma(),
            epsilon: default_engagement_epsilon(),
            moderate_silence_secs: default_moderate_silence_secs(),
            long_silence_secs: default_long_silence_secs(),
        }
    }
}

impl EngagementConfig {
    pub fn params(&self) -> LearningParams {
        LearningParams {
            alpha: self.alpha,
            gamma: self.gamma,
            epsilon: self.epsilon,
        }
    }
}

/// Inactivity monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_threshold_secs")]
    pub threshold_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_threshold_secs() -> u64 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            threshold_secs: default_threshold_secs(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceConfig {
    /// Preference file; defaults to the XDG data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub offline: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Wikipedia language edition for encyclopedia lookups.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_language() -> String {
    "pt".into()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            offline: false,
            timeout_secs: default_timeout_secs(),
            language: default_language(),
        }
    }
}

/// Complete session configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Seed for every RNG in the session; entropy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub preferences: PreferenceConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl ChatConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<memory>".into(),
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let rates = [
            ("response.alpha", self.response.alpha),
            ("response.gamma", self.response.gamma),
            ("response.epsilon", self.response.epsilon),
            ("engagement.alpha", self.engagement.alpha),
            ("engagement.gamma", self.engagement.gamma),
            ("engagement.epsilon", self.engagement.epsilon),
        ];
        for (field, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("{value} is outside [0, 1]"),
                });
            }
        }
        if !(0.0..=1.0).contains(&self.response.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "response.confidence_threshold",
                message: format!("{} is outside [0, 1]", self.response.confidence_threshold),
            });
        }
        if self.engagement.moderate_silence_secs >= self.engagement.long_silence_secs {
            return Err(ConfigError::Invalid {
                field: "engagement.moderate_silence_secs",
                message: "must be shorter than long_silence_secs".into(),
            });
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.poll_interval_secs",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
