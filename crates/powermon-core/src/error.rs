//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal at startup; none can occur once the control
/// loop is running.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("sample interval must be greater than zero")]
    ZeroSampleInterval,

    #[error("worker roster is empty")]
    EmptyRoster,

    #[error("duplicate worker name: {0}")]
    DuplicateWorker(String),

    #[error("invalid worker {name}: {reason}")]
    InvalidWorker { name: String, reason: String },

    #[error("invalid telemetry settings: {0}")]
    InvalidTelemetry(String),

    #[error("invalid command settings: {0}")]
    InvalidCommand(String),
}
