//! powermon-telemetry — load-power readings from the monitoring agent.
//!
//! # Architecture
//!
//! ```text
//! TelemetrySource (trait)
//!   └── SnmpSource
//!       ├── fresh UDP socket per sample
//!       ├── SnmpMessage::get_request() → BER bytes
//!       └── GetResponse → f64, or TelemetryError
//! ```
//!
//! One call is one request/response exchange. There are no internal
//! retries and no state kept between calls.

pub mod ber;
pub mod snmp;
pub mod source;

pub use snmp::SnmpSource;
pub use source::{BoxFuture, TelemetryError, TelemetryResult, TelemetrySource};
