//! Configuration loading and validation
//!
//! Everything comes from `BRAINGAME_*` environment variables, falling back
//! to defaults when unset.

use std::str::FromStr;
use std::time::Duration;

use crate::detect::{ArbitrationConfig, PipelineConfig, Thresholds};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse `{value}`")]
    Unparsable { var: &'static str, value: String },

    #[error("{var}: {reason}")]
    OutOfRange { var: &'static str, reason: &'static str },

    #[error("BRAINGAME_ROLE: unknown role `{0}` (expected all, detector, relay or viz)")]
    UnknownRole(String),

    #[error("BRAINGAME_SOURCE: unknown source `{0}` (expected synthetic, stdin or tcp://host:port)")]
    UnknownSource(String),
}

/// Which parts of the system this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    All,
    Detector,
    Relay,
    Viz,
}

impl Role {
    pub fn runs_detector(&self) -> bool {
        matches!(self, Role::All | Role::Detector)
    }

    pub fn runs_relay(&self) -> bool {
        matches!(self, Role::All | Role::Relay)
    }

    pub fn runs_viz(&self) -> bool {
        matches!(self, Role::All | Role::Viz)
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Role::All),
            "detector" => Ok(Role::Detector),
            "relay" => Ok(Role::Relay),
            "viz" => Ok(Role::Viz),
            _ => Err(ConfigError::UnknownRole(s.to_string())),
        }
    }
}

/// Where EEG readings come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Stdin,
    /// NDJSON over TCP from a headset bridge
    Tcp(String),
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(addr) = trimmed.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(ConfigError::UnknownSource(s.to_string()));
            }
            return Ok(SourceKind::Tcp(addr.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "synthetic" => Ok(SourceKind::Synthetic),
            "stdin" => Ok(SourceKind::Stdin),
            _ => Err(ConfigError::UnknownSource(s.to_string())),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub source: SourceKind,
    pub eye_threshold: f64,
    pub jaw_threshold: f64,
    pub window: Duration,
    pub cooldown: Duration,
    /// Address the relay server binds
    pub relay_addr: String,
    /// Endpoint relay clients connect to
    pub relay_url: String,
    pub relay_retry: Duration,
    /// How long an indicator stays lit
    pub display: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::All,
            source: SourceKind::Synthetic,
            eye_threshold: 300.0,
            jaw_threshold: 500.0,
            window: Duration::from_millis(300),
            cooldown: Duration::from_millis(1000),
            relay_addr: "127.0.0.1:3000".to_string(),
            relay_url: "ws://127.0.0.1:3000".to_string(),
            relay_retry: Duration::from_millis(2000),
            display: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load configuration from the environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            role: parse_or(&lookup, "BRAINGAME_ROLE", defaults.role, |v| v.parse())?,
            source: parse_or(&lookup, "BRAINGAME_SOURCE", defaults.source, |v| v.parse())?,
            eye_threshold: number_or(&lookup, "BRAINGAME_EYE_THRESHOLD", defaults.eye_threshold)?,
            jaw_threshold: number_or(&lookup, "BRAINGAME_JAW_THRESHOLD", defaults.jaw_threshold)?,
            window: millis_or(&lookup, "BRAINGAME_WINDOW_MS", defaults.window)?,
            cooldown: millis_or(&lookup, "BRAINGAME_COOLDOWN_MS", defaults.cooldown)?,
            relay_addr: lookup("BRAINGAME_RELAY_ADDR").unwrap_or(defaults.relay_addr),
            relay_url: lookup("BRAINGAME_RELAY_URL").unwrap_or(defaults.relay_url),
            relay_retry: millis_or(&lookup, "BRAINGAME_RELAY_RETRY_MS", defaults.relay_retry)?,
            display: millis_or(&lookup, "BRAINGAME_DISPLAY_MS", defaults.display)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (var, value) in [
            ("BRAINGAME_EYE_THRESHOLD", self.eye_threshold),
            ("BRAINGAME_JAW_THRESHOLD", self.jaw_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    var,
                    reason: "threshold must be a finite, non-negative number",
                });
            }
        }

        for (var, value) in [
            ("BRAINGAME_WINDOW_MS", self.window),
            ("BRAINGAME_COOLDOWN_MS", self.cooldown),
            ("BRAINGAME_RELAY_RETRY_MS", self.relay_retry),
            ("BRAINGAME_DISPLAY_MS", self.display),
        ] {
            if value.is_zero() {
                return Err(ConfigError::OutOfRange {
                    var,
                    reason: "duration must be greater than zero",
                });
            }
        }

        Ok(())
    }

    /// Detection pipeline settings
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            window: self.window,
            arbitration: ArbitrationConfig {
                thresholds: Thresholds {
                    eye: self.eye_threshold,
                    jaw: self.jaw_threshold,
                },
                cooldown: self.cooldown,
            },
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    parse: impl Fn(&str) -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => parse(&value),
        None => Ok(default),
    }
}

fn number_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: f64,
) -> Result<f64, ConfigError> {
    parse_or(lookup, var, default, |value| {
        value.trim().parse().map_err(|_| ConfigError::Unparsable {
            var,
            value: value.to_string(),
        })
    })
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_or(lookup, var, default, |value| {
        value
            .trim()
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Unparsable {
                var,
                value: value.to_string(),
            })
    })
}
