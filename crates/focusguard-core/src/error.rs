//! Core error types for focusguard-core.
//!
//! Errors that callers can act on are expressed with thiserror enums.
//! A rejected command (starting a session with nobody at the desk) is not an
//! error; see [`crate::timer::Rejection`].

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-specific errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Key not recognized by the configuration surface
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Failure reported by a presence detector.
///
/// These never escape the sensing layer: the adapter turns them into
/// sensor-error samples.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// Camera or model not available (permission denied, device busy)
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// Detector ran but failed to produce a reading
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Errors raised while loading a replay scenario.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read scenario {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid scenario step {index}: {message}")]
    InvalidStep { index: usize, message: String },

    #[error("Scenario configuration rejected: {0}")]
    Config(#[from] ConfigError),
}
