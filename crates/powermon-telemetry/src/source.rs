//! The telemetry seam between the control loop and the monitoring agent.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::ber::BerError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Why a sample could not be taken.
///
/// Every variant means the same thing to the control loop: skip this
/// tick. The distinction only matters for the operator log.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("monitoring agent unreachable: {0}")]
    Transport(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("metric {0} absent from response")]
    MetricAbsent(String),

    #[error("agent reported error status {status} at index {index}")]
    AgentError { status: i64, index: i64 },

    #[error("invalid telemetry settings: {0}")]
    InvalidSettings(String),
}

impl From<BerError> for TelemetryError {
    fn from(e: BerError) -> Self {
        TelemetryError::Malformed(e.to_string())
    }
}

/// A source of scalar load-power readings.
///
/// Each call performs exactly one bounded request/response exchange and
/// never retries; retry policy belongs to the caller.
pub trait TelemetrySource: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, TelemetryResult<f64>>;
}
