//! Minimal BER codec for SNMP GET exchanges.
//!
//! Only the subset needed to request one OID and read one scalar back is
//! supported. Every encoding is definite-length.
//!
//! # Message layout
//!
//! ```text
//! SEQUENCE {
//!   INTEGER       version          (0 = v1, 1 = v2c)
//!   OCTET STRING  community
//!   [PDU tag] {                    (0xA0 GetRequest, 0xA2 GetResponse)
//!     INTEGER  request-id
//!     INTEGER  error-status
//!     INTEGER  error-index
//!     SEQUENCE {                   varbind list
//!       SEQUENCE { OID name, value }
//!     }
//!   }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

/// Errors from decoding (or building) a BER message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BerError {
    #[error("message truncated")]
    Truncated,

    #[error("indefinite length encoding is not supported")]
    IndefiniteLength,

    #[error("length field too large")]
    LengthOverflow,

    #[error("expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported PDU tag {0:#04x}")]
    UnsupportedPdu(u8),

    #[error("integer does not fit in {0} bits")]
    IntegerOverflow(u32),

    #[error("invalid object identifier: {0}")]
    InvalidOid(String),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

// ── OID ──────────────────────────────────────────────────────────────

/// An SNMP object identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        // Validated on construction: at least two arcs, first in 0..=2.
        let first = u64::from(self.0[0]) * 40 + u64::from(self.0[1]);
        encode_base128(first, out);
        for &arc in &self.0[2..] {
            encode_base128(u64::from(arc), out);
        }
    }

    fn decode_body(body: &[u8]) -> Result<Self, BerError> {
        if body.is_empty() {
            return Err(BerError::InvalidOid("empty".to_string()));
        }
        let mut arcs = Vec::new();
        let mut acc: u64 = 0;
        let mut in_progress = false;
        for &byte in body {
            acc = (acc << 7) | u64::from(byte & 0x7f);
            if acc > u64::from(u32::MAX) + 80 {
                return Err(BerError::InvalidOid("sub-identifier too large".to_string()));
            }
            in_progress = byte & 0x80 != 0;
            if !in_progress {
                if arcs.is_empty() {
                    let (a, b) = match acc {
                        0..40 => (0, acc),
                        40..80 => (1, acc - 40),
                        _ => (2, acc - 80),
                    };
                    arcs.push(a as u32);
                    arcs.push(
                        u32::try_from(b)
                            .map_err(|_| BerError::InvalidOid("arc too large".to_string()))?,
                    );
                } else {
                    arcs.push(
                        u32::try_from(acc)
                            .map_err(|_| BerError::InvalidOid("arc too large".to_string()))?,
                    );
                }
                acc = 0;
            }
        }
        if in_progress {
            return Err(BerError::Truncated);
        }
        Ok(Oid(arcs))
    }
}

impl FromStr for Oid {
    type Err = BerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        let arcs = trimmed
            .split('.')
            .map(|arc| arc.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| BerError::InvalidOid(s.to_string()))?;
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return Err(BerError::InvalidOid(s.to_string()));
        }
        Ok(Oid(arcs))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

// ── Values ───────────────────────────────────────────────────────────

/// A varbind value.
#[derive(Debug, Clone, PartialEq)]
pub enum BerValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    Oid(Oid),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl BerValue {
    /// Numeric reading carried by this value, if any.
    ///
    /// Octet strings are accepted when they hold a decimal number, which
    /// some agents use for fractional readings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BerValue::Integer(v) => Some(*v as f64),
            BerValue::Counter32(v) | BerValue::Gauge32(v) | BerValue::TimeTicks(v) => {
                Some(f64::from(*v))
            }
            BerValue::Counter64(v) => Some(*v as f64),
            BerValue::OctetString(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// True for NULL and the v2c exception markers.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            BerValue::Null
                | BerValue::NoSuchObject
                | BerValue::NoSuchInstance
                | BerValue::EndOfMibView
        )
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            BerValue::Integer(v) => write_tlv(out, TAG_INTEGER, &signed_bytes(*v)),
            BerValue::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
            BerValue::Null => write_tlv(out, TAG_NULL, &[]),
            BerValue::Oid(oid) => {
                let mut body = Vec::new();
                oid.encode_body(&mut body);
                write_tlv(out, TAG_OID, &body);
            }
            BerValue::Counter32(v) => write_tlv(out, TAG_COUNTER32, &unsigned_bytes(u64::from(*v))),
            BerValue::Gauge32(v) => write_tlv(out, TAG_GAUGE32, &unsigned_bytes(u64::from(*v))),
            BerValue::TimeTicks(v) => write_tlv(out, TAG_TIMETICKS, &unsigned_bytes(u64::from(*v))),
            BerValue::Counter64(v) => write_tlv(out, TAG_COUNTER64, &unsigned_bytes(*v)),
            BerValue::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
            BerValue::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
            BerValue::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
        }
    }

    fn decode(tag: u8, body: &[u8]) -> Result<Self, BerError> {
        Ok(match tag {
            TAG_INTEGER => BerValue::Integer(decode_signed(body)?),
            TAG_OCTET_STRING => BerValue::OctetString(body.to_vec()),
            TAG_NULL => BerValue::Null,
            TAG_OID => BerValue::Oid(Oid::decode_body(body)?),
            TAG_COUNTER32 => BerValue::Counter32(decode_u32(body)?),
            TAG_GAUGE32 => BerValue::Gauge32(decode_u32(body)?),
            TAG_TIMETICKS => BerValue::TimeTicks(decode_u32(body)?),
            TAG_COUNTER64 => BerValue::Counter64(decode_unsigned(body, 64)?),
            TAG_NO_SUCH_OBJECT => BerValue::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => BerValue::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => BerValue::EndOfMibView,
            // Unknown application types are kept as opaque bytes.
            _ => BerValue::OctetString(body.to_vec()),
        })
    }
}

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetResponse,
}

impl PduKind {
    fn tag(self) -> u8 {
        match self {
            PduKind::GetRequest => 0xa0,
            PduKind::GetResponse => 0xa2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, BerError> {
        match tag {
            0xa0 => Ok(PduKind::GetRequest),
            0xa2 => Ok(PduKind::GetResponse),
            other => Err(BerError::UnsupportedPdu(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: BerValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

/// A complete SNMP message.
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpMessage {
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl SnmpMessage {
    /// A GET for a single OID.
    pub fn get_request(version: i64, community: &str, request_id: i32, oid: Oid) -> Self {
        Self {
            version,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                kind: PduKind::GetRequest,
                request_id,
                error_status: 0,
                error_index: 0,
                varbinds: vec![VarBind {
                    oid,
                    value: BerValue::Null,
                }],
            },
        }
    }

    /// A response carrying the given varbinds.
    pub fn get_response(
        version: i64,
        community: &str,
        request_id: i32,
        error_status: i64,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            version,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                kind: PduKind::GetResponse,
                request_id,
                error_status,
                error_index: if error_status == 0 { 0 } else { 1 },
                varbinds,
            },
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut varbinds = Vec::new();
        for vb in &self.pdu.varbinds {
            let mut entry = Vec::new();
            BerValue::Oid(vb.oid.clone()).encode(&mut entry);
            vb.value.encode(&mut entry);
            write_tlv(&mut varbinds, TAG_SEQUENCE, &entry);
        }

        let mut pdu = Vec::new();
        BerValue::Integer(i64::from(self.pdu.request_id)).encode(&mut pdu);
        BerValue::Integer(self.pdu.error_status).encode(&mut pdu);
        BerValue::Integer(self.pdu.error_index).encode(&mut pdu);
        write_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

        let mut body = Vec::new();
        BerValue::Integer(self.version).encode(&mut body);
        BerValue::OctetString(self.community.clone()).encode(&mut body);
        write_tlv(&mut body, self.pdu.kind.tag(), &pdu);

        let mut out = Vec::with_capacity(body.len() + 4);
        write_tlv(&mut out, TAG_SEQUENCE, &body);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, BerError> {
        let mut outer = Reader::new(data);
        let message = outer.expect(TAG_SEQUENCE)?;
        if outer.remaining() > 0 {
            return Err(BerError::TrailingBytes(outer.remaining()));
        }

        let mut r = Reader::new(message);
        let version = decode_signed(r.expect(TAG_INTEGER)?)?;
        let community = r.expect(TAG_OCTET_STRING)?.to_vec();
        let (pdu_tag, pdu_body) = r.read_tlv()?;
        let kind = PduKind::from_tag(pdu_tag)?;

        let mut p = Reader::new(pdu_body);
        let request_id = decode_signed(p.expect(TAG_INTEGER)?)?;
        let request_id =
            i32::try_from(request_id).map_err(|_| BerError::IntegerOverflow(32))?;
        let error_status = decode_signed(p.expect(TAG_INTEGER)?)?;
        let error_index = decode_signed(p.expect(TAG_INTEGER)?)?;

        let mut list = Reader::new(p.expect(TAG_SEQUENCE)?);
        let mut varbinds = Vec::new();
        while list.remaining() > 0 {
            let mut entry = Reader::new(list.expect(TAG_SEQUENCE)?);
            let oid = Oid::decode_body(entry.expect(TAG_OID)?)?;
            let (tag, body) = entry.read_tlv()?;
            varbinds.push(VarBind {
                oid,
                value: BerValue::decode(tag, body)?,
            });
        }

        Ok(Self {
            version,
            community,
            pdu: Pdu {
                kind,
                request_id,
                error_status,
                error_index,
                varbinds,
            },
        })
    }
}

// ── Primitive encoding ───────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn byte(&mut self) -> Result<u8, BerError> {
        let b = *self.buf.get(self.pos).ok_or(BerError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), BerError> {
        let tag = self.byte()?;
        let first = self.byte()?;
        let len = if first < 0x80 {
            usize::from(first)
        } else if first == 0x80 {
            return Err(BerError::IndefiniteLength);
        } else {
            let count = usize::from(first & 0x7f);
            if count > 4 {
                return Err(BerError::LengthOverflow);
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | usize::from(self.byte()?);
            }
            len
        };
        let end = self.pos.checked_add(len).ok_or(BerError::LengthOverflow)?;
        let body = self.buf.get(self.pos..end).ok_or(BerError::Truncated)?;
        self.pos = end;
        Ok((tag, body))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], BerError> {
        let (found, body) = self.read_tlv()?;
        if found != expected {
            return Err(BerError::UnexpectedTag { expected, found });
        }
        Ok(body)
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    let len = body.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(body);
}

fn encode_base128(mut value: u64, out: &mut Vec<u8>) {
    let mut chunk = [0u8; 10];
    let mut n = 0;
    loop {
        chunk[n] = (value & 0x7f) as u8;
        n += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let cont = if i == 0 { 0 } else { 0x80 };
        out.push(chunk[i] | cont);
    }
}

/// Minimal two's-complement big-endian encoding.
fn signed_bytes(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let b = bytes[start];
        let next_high = bytes[start + 1] & 0x80;
        if (b == 0x00 && next_high == 0) || (b == 0xff && next_high != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

/// Unsigned encoding with a leading zero when the high bit is set.
fn unsigned_bytes(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn decode_signed(body: &[u8]) -> Result<i64, BerError> {
    if body.is_empty() {
        return Err(BerError::Truncated);
    }
    if body.len() > 8 {
        return Err(BerError::IntegerOverflow(64));
    }
    let mut v: i64 = if body[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in body {
        v = (v << 8) | i64::from(b);
    }
    Ok(v)
}

fn decode_unsigned(body: &[u8], bits: u32) -> Result<u64, BerError> {
    if body.is_empty() {
        return Err(BerError::Truncated);
    }
    let digits = match body {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => body,
    };
    if digits.len() > 8 {
        return Err(BerError::IntegerOverflow(bits));
    }
    let mut v: u64 = 0;
    for &b in digits {
        v = (v << 8) | u64::from(b);
    }
    if bits < 64 && v >> bits != 0 {
        return Err(BerError::IntegerOverflow(bits));
    }
    Ok(v)
}

fn decode_u32(body: &[u8]) -> Result<u32, BerError> {
    decode_unsigned(body, 32).map(|v| v as u32)
}
