use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// A worker whose power state is toggled remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl WorkerEndpoint {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        host_port(&self.host, self.port)
    }
}

impl fmt::Display for WorkerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

/// Target power state for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Enable,
    Disable,
}

impl PowerAction {
    /// The on/off flag carried in the command's params.
    pub fn flag(self) -> i32 {
        match self {
            PowerAction::Enable => 1,
            PowerAction::Disable => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PowerAction::Enable => "ON",
            PowerAction::Disable => "OFF",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PowerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "enable" | "1" => Ok(PowerAction::Enable),
            "off" | "disable" | "0" => Ok(PowerAction::Disable),
            other => Err(format!("unknown power action: {other} (expected on/off)")),
        }
    }
}

/// Hysteresis thresholds for the control loop.
///
/// Readings at or above `high_watts` cut the load; readings at or below
/// `low_watts` start the cooldown that eventually restores it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high_watts: f64,
    pub low_watts: f64,
    pub cooldown: Duration,
    pub sample_interval: Duration,
}

impl Thresholds {
    /// Build and validate a threshold set.
    pub fn new(
        high_watts: f64,
        low_watts: f64,
        cooldown: Duration,
        sample_interval: Duration,
    ) -> ConfigResult<Self> {
        let thresholds = Self {
            high_watts,
            low_watts,
            cooldown,
            sample_interval,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check `high_watts > low_watts >= 0` and a non-zero interval.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.high_watts.is_finite() || !self.low_watts.is_finite() {
            return Err(ConfigError::InvalidThresholds(
                "watt limits must be finite".to_string(),
            ));
        }
        if self.low_watts < 0.0 {
            return Err(ConfigError::InvalidThresholds(format!(
                "low_watts ({}) must not be negative",
                self.low_watts
            )));
        }
        if self.high_watts <= self.low_watts {
            return Err(ConfigError::InvalidThresholds(format!(
                "high_watts ({}) must be greater than low_watts ({})",
                self.high_watts, self.low_watts
            )));
        }
        if self.sample_interval.is_zero() {
            return Err(ConfigError::ZeroSampleInterval);
        }
        Ok(())
    }

    /// Number of ticks the cooldown lasts: `ceil(cooldown / sample_interval)`.
    pub fn cooldown_ticks(&self) -> u32 {
        let interval = self.sample_interval.as_nanos();
        if interval == 0 {
            return 0;
        }
        let ticks = self.cooldown.as_nanos().div_ceil(interval);
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }
}

/// Join host and port, bracketing bare IPv6 literals.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Parse a duration string like "250ms", "5s", "1m".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(cooldown_ms: u64, interval_ms: u64) -> Thresholds {
        Thresholds {
            high_watts: 4100.0,
            low_watts: 2000.0,
            cooldown: Duration::from_millis(cooldown_ms),
            sample_interval: Duration::from_millis(interval_ms),
        }
    }

    #[test]
    fn cooldown_ticks_exact_division() {
        assert_eq!(thresholds(30_000, 250).cooldown_ticks(), 120);
    }

    #[test]
    fn cooldown_ticks_rounds_up() {
        assert_eq!(thresholds(1_001, 250).cooldown_ticks(), 5);
        assert_eq!(thresholds(100, 250).cooldown_ticks(), 1);
    }

    #[test]
    fn cooldown_ticks_zero_cooldown() {
        assert_eq!(thresholds(0, 250).cooldown_ticks(), 0);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(thresholds(30_000, 250).validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_limits() {
        let mut t = thresholds(30_000, 250);
        t.high_watts = 1500.0;
        assert!(matches!(t.validate(), Err(ConfigError::InvalidThresholds(_))));

        t.high_watts = 2000.0;
        assert!(matches!(t.validate(), Err(ConfigError::InvalidThresholds(_))));
    }

    #[test]
    fn validate_rejects_negative_low() {
        let mut t = thresholds(30_000, 250);
        t.low_watts = -1.0;
        assert!(matches!(t.validate(), Err(ConfigError::InvalidThresholds(_))));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let t = thresholds(30_000, 0);
        assert!(matches!(t.validate(), Err(ConfigError::ZeroSampleInterval)));
    }

    #[test]
    fn power_action_flags() {
        assert_eq!(PowerAction::Enable.flag(), 1);
        assert_eq!(PowerAction::Disable.flag(), 0);
        assert_eq!(PowerAction::Enable.to_string(), "ON");
    }

    #[test]
    fn power_action_from_str() {
        assert_eq!("on".parse::<PowerAction>(), Ok(PowerAction::Enable));
        assert_eq!("OFF".parse::<PowerAction>(), Ok(PowerAction::Disable));
        assert!("maybe".parse::<PowerAction>().is_err());
    }

    #[test]
    fn worker_address() {
        let w = WorkerEndpoint::new("Miner01", "192.168.8.20", 3333);
        assert_eq!(w.address(), "192.168.8.20:3333");
        assert_eq!(w.to_string(), "Miner01 (192.168.8.20:3333)");
    }

    #[test]
    fn worker_address_brackets_ipv6() {
        let w = WorkerEndpoint::new("Miner07", "fd00::20", 3333);
        assert_eq!(w.address(), "[fd00::20]:3333");
        assert!(w.address().parse::<std::net::SocketAddr>().is_ok());

        let w = WorkerEndpoint::new("Miner08", "[fd00::21]", 3333);
        assert_eq!(w.address(), "[fd00::21]:3333");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn parse_duration_overflowing_minutes() {
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert_eq!(
            parse_duration(&format!("{}m", u64::MAX / 60)),
            Some(Duration::from_secs(u64::MAX / 60 * 60))
        );
    }
}
