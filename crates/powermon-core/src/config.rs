//! powermon.toml configuration parser.
//!
//! The file is read once at startup. Raw sections keep durations as
//! strings; [`PowermonConfig::from_toml_str`] resolves and validates
//! them into typed settings.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Thresholds, WorkerEndpoint, host_port, parse_duration};

// ── Raw file sections ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    thresholds: ThresholdsSection,
    telemetry: TelemetrySection,
    #[serde(default)]
    commands: CommandsSection,
    #[serde(default)]
    startup: StartupSection,
    #[serde(default)]
    workers: Vec<WorkerEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ThresholdsSection {
    high_watts: f64,
    low_watts: f64,
    #[serde(default = "default_cooldown")]
    cooldown: String,
    #[serde(default = "default_sample_interval")]
    sample_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TelemetrySection {
    host: String,
    #[serde(default = "default_snmp_port")]
    port: u16,
    #[serde(default = "default_community")]
    community: String,
    #[serde(default)]
    version: SnmpVersion,
    #[serde(default = "default_oid")]
    oid: String,
    #[serde(default = "default_telemetry_timeout")]
    timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommandsSection {
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_target_index")]
    target_index: i32,
    #[serde(default = "default_command_timeout")]
    connect_timeout: String,
    #[serde(default = "default_command_timeout")]
    reply_timeout: String,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            method: default_method(),
            target_index: default_target_index(),
            connect_timeout: default_command_timeout(),
            reply_timeout: default_command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StartupSection {
    #[serde(default = "default_true")]
    enable_on_start: bool,
}

impl Default for StartupSection {
    fn default() -> Self {
        Self {
            enable_on_start: true,
        }
    }
}

fn default_cooldown() -> String {
    "30s".to_string()
}

fn default_sample_interval() -> String {
    "250ms".to_string()
}

fn default_snmp_port() -> u16 {
    161
}

fn default_community() -> String {
    "private".to_string()
}

fn default_oid() -> String {
    "1.3.6.1.4.1.21111.1.2.5.5.1.3.0".to_string()
}

fn default_telemetry_timeout() -> String {
    "5s".to_string()
}

fn default_method() -> String {
    "control_gpu".to_string()
}

fn default_target_index() -> i32 {
    -1
}

fn default_command_timeout() -> String {
    "3s".to_string()
}

fn default_true() -> bool {
    true
}

// ── Resolved settings ────────────────────────────────────────────────

/// SNMP protocol version spoken to the monitoring agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpVersion {
    #[default]
    V1,
    V2c,
}

/// Where and how to fetch the load-power reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub host: String,
    pub port: u16,
    pub community: String,
    pub version: SnmpVersion,
    /// Dotted-decimal OID of the load-power metric.
    pub oid: String,
    pub timeout: Duration,
}

impl TelemetryConfig {
    pub fn address(&self) -> String {
        host_port(&self.host, self.port)
    }
}

/// Settings for the worker power command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// JSON-RPC method name understood by the workers.
    pub method: String,
    /// Worker-internal device index; `-1` addresses every device.
    pub target_index: i32,
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            target_index: default_target_index(),
            connect_timeout: Duration::from_secs(3),
            reply_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupConfig {
    /// Power every worker on before the first tick.
    pub enable_on_start: bool,
}

/// Fully resolved and validated configuration.
#[derive(Debug, Clone)]
pub struct PowermonConfig {
    pub thresholds: Thresholds,
    pub telemetry: TelemetryConfig,
    pub commands: CommandConfig,
    pub startup: StartupConfig,
    pub workers: Vec<WorkerEndpoint>,
}

impl PowermonConfig {
    /// Read and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let raw: ConfigFile = toml::from_str(content)?;

        let thresholds = Thresholds::new(
            raw.thresholds.high_watts,
            raw.thresholds.low_watts,
            duration_field("thresholds.cooldown", &raw.thresholds.cooldown)?,
            duration_field("thresholds.sample_interval", &raw.thresholds.sample_interval)?,
        )?;

        let telemetry = TelemetryConfig {
            host: raw.telemetry.host,
            port: raw.telemetry.port,
            community: raw.telemetry.community,
            version: raw.telemetry.version,
            oid: raw.telemetry.oid,
            timeout: duration_field("telemetry.timeout", &raw.telemetry.timeout)?,
        };
        validate_telemetry(&telemetry)?;

        let commands = CommandConfig {
            method: raw.commands.method,
            target_index: raw.commands.target_index,
            connect_timeout: duration_field(
                "commands.connect_timeout",
                &raw.commands.connect_timeout,
            )?,
            reply_timeout: duration_field("commands.reply_timeout", &raw.commands.reply_timeout)?,
        };
        if commands.method.trim().is_empty() {
            return Err(ConfigError::InvalidCommand(
                "method must not be empty".to_string(),
            ));
        }
        if commands.connect_timeout.is_zero() || commands.reply_timeout.is_zero() {
            return Err(ConfigError::InvalidCommand(
                "timeouts must not be 0".to_string(),
            ));
        }

        validate_workers(&raw.workers)?;

        Ok(Self {
            thresholds,
            telemetry,
            commands,
            startup: StartupConfig {
                enable_on_start: raw.startup.enable_on_start,
            },
            workers: raw.workers,
        })
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

fn validate_telemetry(telemetry: &TelemetryConfig) -> ConfigResult<()> {
    if telemetry.host.trim().is_empty() {
        return Err(ConfigError::InvalidTelemetry("host must not be empty".to_string()));
    }
    if telemetry.port == 0 {
        return Err(ConfigError::InvalidTelemetry("port must not be 0".to_string()));
    }
    if telemetry.timeout.is_zero() {
        return Err(ConfigError::InvalidTelemetry("timeout must not be 0".to_string()));
    }
    if !is_dotted_oid(&telemetry.oid) {
        return Err(ConfigError::InvalidTelemetry(format!(
            "oid {:?} is not a dotted-decimal object identifier",
            telemetry.oid
        )));
    }
    Ok(())
}

fn validate_workers(workers: &[WorkerEndpoint]) -> ConfigResult<()> {
    if workers.is_empty() {
        return Err(ConfigError::EmptyRoster);
    }
    let mut seen = HashSet::new();
    for worker in workers {
        if !seen.insert(worker.name.as_str()) {
            return Err(ConfigError::DuplicateWorker(worker.name.clone()));
        }
        if worker.host.trim().is_empty() {
            return Err(ConfigError::InvalidWorker {
                name: worker.name.clone(),
                reason: "host must not be empty".to_string(),
            });
        }
        if worker.port == 0 {
            return Err(ConfigError::InvalidWorker {
                name: worker.name.clone(),
                reason: "port must not be 0".to_string(),
            });
        }
    }
    Ok(())
}

/// At least two numeric arcs, first arc 0..=2, second arc below 40
/// unless the first is 2. Same rules the BER encoder enforces.
fn is_dotted_oid(oid: &str) -> bool {
    let Ok(arcs) = oid
        .trim()
        .trim_start_matches('.')
        .split('.')
        .map(str::parse::<u32>)
        .collect::<Result<Vec<_>, _>>()
    else {
        return false;
    };
    arcs.len() >= 2 && arcs[0] <= 2 && (arcs[0] == 2 || arcs[1] < 40)
}
