//! SNMP GET client for the load-power metric.
//!
//! A fresh UDP socket is bound for every sample and dropped afterwards,
//! so nothing is kept between ticks. Datagrams whose request-id does not
//! match the outstanding request (late answers to an earlier tick) are
//! discarded until the timeout expires.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use powermon_core::{SnmpVersion, TelemetryConfig};

use crate::ber::{Oid, PduKind, SnmpMessage};
use crate::source::{BoxFuture, TelemetryError, TelemetryResult, TelemetrySource};

/// Largest datagram we accept from the agent.
const MAX_DATAGRAM: usize = 65_507;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_request_id() -> i32 {
    // Request-ids stay positive.
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed) & i32::MAX
}

/// Reads one OID from an SNMP agent.
#[derive(Debug, Clone)]
pub struct SnmpSource {
    agent: String,
    community: String,
    version: SnmpVersion,
    oid: Oid,
    timeout: Duration,
}

impl SnmpSource {
    pub fn new(config: &TelemetryConfig) -> TelemetryResult<Self> {
        let oid = config
            .oid
            .parse::<Oid>()
            .map_err(|e| TelemetryError::InvalidSettings(e.to_string()))?;
        Ok(Self {
            agent: config.address(),
            community: config.community.clone(),
            version: config.version,
            oid,
            timeout: config.timeout,
        })
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    /// Fetch the metric once, bounded by the configured timeout.
    pub async fn get(&self) -> TelemetryResult<f64> {
        match tokio::time::timeout(self.timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self) -> TelemetryResult<f64> {
        let agent = resolve(&self.agent).await?;
        let bind: SocketAddr = if agent.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(agent).await?;

        let request_id = next_request_id();
        let request = SnmpMessage::get_request(
            wire_version(self.version),
            &self.community,
            request_id,
            self.oid.clone(),
        );
        socket.send(&request.encode()).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let n = socket.recv(&mut buf).await?;
            let response = SnmpMessage::decode(&buf[..n])?;

            if response.pdu.kind != PduKind::GetResponse
                || response.pdu.request_id != request_id
            {
                debug!(
                    agent = %self.agent,
                    expected = request_id,
                    got = response.pdu.request_id,
                    "discarding unrelated SNMP datagram"
                );
                continue;
            }

            return self.interpret(response);
        }
    }

    fn interpret(&self, response: SnmpMessage) -> TelemetryResult<f64> {
        if response.pdu.error_status != 0 {
            return Err(TelemetryError::AgentError {
                status: response.pdu.error_status,
                index: response.pdu.error_index,
            });
        }

        let varbind = response
            .pdu
            .varbinds
            .into_iter()
            .find(|vb| vb.oid == self.oid)
            .ok_or_else(|| TelemetryError::MetricAbsent(self.oid.to_string()))?;

        if varbind.value.is_absent() {
            return Err(TelemetryError::MetricAbsent(self.oid.to_string()));
        }

        varbind.value.as_f64().ok_or_else(|| {
            TelemetryError::Malformed(format!(
                "metric {} is not numeric: {:?}",
                self.oid, varbind.value
            ))
        })
    }
}

impl TelemetrySource for SnmpSource {
    fn sample(&self) -> BoxFuture<'_, TelemetryResult<f64>> {
        Box::pin(self.get())
    }
}

fn wire_version(version: SnmpVersion) -> i64 {
    match version {
        SnmpVersion::V1 => 0,
        SnmpVersion::V2c => 1,
    }
}

async fn resolve(address: &str) -> TelemetryResult<SocketAddr> {
    tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| TelemetryError::InvalidSettings(format!("{address} did not resolve")))
}
