use facegate_core::{CaptureConfig, CaptureMode, ConfigError, Profile};
use std::path::PathBuf;
use std::str::FromStr;

/// Which D-Bus bus to register on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Line-delimited JSON detections written by the external detector
    /// (a regular file or a FIFO).
    pub detections_path: PathBuf,
    /// Bus to serve on (default: session).
    pub bus: Bus,
    /// Defaults for every capture session started over D-Bus.
    pub capture: CaptureConfig,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    ///
    /// `FACEGATE_CONFIG` may name a TOML file with capture defaults; the
    /// individual variables override it.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut capture = match var("FACEGATE_CONFIG") {
            Some(path) => CaptureConfig::load(PathBuf::from(path).as_path())?,
            None => CaptureConfig::default(),
        };

        if let Some(mode) = var("FACEGATE_MODE") {
            capture.mode = CaptureMode::from_str(&mode)?;
        }
        if let Some(profile) = var("FACEGATE_PROFILE") {
            capture.profile = Profile::from_str(&profile)?;
            capture.thresholds = None;
        }
        if let Some(v) = parse_var(&var, "FACEGATE_REQUIRED_STREAK") {
            capture.required_streak = v;
        }
        if let Some(v) = parse_var(&var, "FACEGATE_POLL_INTERVAL_MS") {
            capture.poll_interval_ms = v;
        }
        if let Some(v) = parse_var(&var, "FACEGATE_COUNTDOWN_SECS") {
            capture.countdown_seconds = v;
        }
        if let Some(v) = parse_var(&var, "FACEGATE_TIMEOUT_MS") {
            capture.timeout_ms = v;
        }
        capture.validate()?;

        let runtime_dir = var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        Ok(Self {
            detections_path: var("FACEGATE_DETECTIONS")
                .map(PathBuf::from)
                .unwrap_or_else(|| runtime_dir.join("facegate/detections.jsonl")),
            bus: match var("FACEGATE_BUS").as_deref() {
                Some("system") => Bus::System,
                _ => Bus::Session,
            },
            capture,
        })
    }
}

/// Parse a numeric variable, ignoring (with a warning) values that do not parse.
fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable value");
            None
        }
    }
}
