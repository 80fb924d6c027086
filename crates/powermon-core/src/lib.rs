//! powermon-core — shared types and configuration for the power monitor.
//!
//! Everything here is loaded once at startup and immutable afterwards:
//! the worker roster, the hysteresis thresholds, and the telemetry and
//! command settings.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CommandConfig, PowermonConfig, SnmpVersion, StartupConfig, TelemetryConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
