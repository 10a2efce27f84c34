use crate::gate::{Profile, Thresholds};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid threshold {name}: {reason}")]
    InvalidThreshold { name: &'static str, reason: String },
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("unknown threshold profile: {0} (expected lenient or strict)")]
    UnknownProfile(String),
    #[error("unknown capture mode: {0} (expected register or match)")]
    UnknownMode(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// What the captured descriptor will be used for downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Register,
    Match,
}

impl CaptureMode {
    /// Status message shown once a descriptor has been captured.
    pub fn captured_message(&self) -> &'static str {
        match self {
            Self::Register => "Face detected successfully!",
            Self::Match => "Face captured.",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Register => "register",
            Self::Match => "match",
        })
    }
}

impl FromStr for CaptureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "register" => Ok(Self::Register),
            "match" => Ok(Self::Match),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Parameters for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    /// Named threshold preset.
    pub profile: Profile,
    /// Explicit thresholds; when set they replace the profile's values.
    pub thresholds: Option<Thresholds>,
    /// Consecutive aligned frames needed before capture.
    pub required_streak: u32,
    /// Interval between detector polls while detecting.
    pub poll_interval_ms: u64,
    /// Countdown length before detection starts. Zero skips the countdown.
    pub countdown_seconds: u32,
    /// Overall detection budget, measured from the end of the countdown.
    pub timeout_ms: u64,
    /// Minimum spacing between repeated "no face" notices.
    pub no_face_notice_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Register,
            profile: Profile::Lenient,
            thresholds: None,
            required_streak: 3,
            poll_interval_ms: 400,
            countdown_seconds: 3,
            timeout_ms: 15_000,
            no_face_notice_ms: 1_500,
        }
    }
}

impl CaptureConfig {
    /// Thresholds in effect: explicit overrides, else the profile preset.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds.unwrap_or_else(|| self.profile.thresholds())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds().validate()?;
        if self.required_streak == 0 {
            return Err(ConfigError::InvalidValue {
                name: "required_streak",
                reason: "must be at least 1".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "poll_interval_ms",
                reason: "must be at least 1".into(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "timeout_ms",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src)
    }
}
