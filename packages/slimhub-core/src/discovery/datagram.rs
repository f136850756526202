//! Discovery datagram formats.
//!
//! - `d`: legacy probe from a player, answered with `D` + 16-byte hostname
//! - `e`: TLV request listing the fields the client wants, answered with `E`
//! - `E`: TLV response from another server, ignored
//! - `h`, `i`, `2`, `a`: hello, IR, i2c and ack datagrams, ignored

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{DiscoveryError, DiscoveryResult};
use crate::protocol_constants::{LEGACY_HOSTNAME_LEN, LEGACY_REQUEST_LEN, MAX_TLV_VALUE_LEN};
use crate::types::MacAddress;
use crate::utils::truncate_utf8;

const TLV_HEADER_LEN: usize = 5;

/// Four-character TLV field name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlvTag([u8; 4]);

impl TlvTag {
    pub const NAME: Self = Self(*b"NAME");
    pub const IPAD: Self = Self(*b"IPAD");
    pub const JSON: Self = Self(*b"JSON");
    pub const VERS: Self = Self(*b"VERS");
    pub const UUID: Self = Self(*b"UUID");
    pub const JVID: Self = Self(*b"JVID");

    pub const fn new(raw: [u8; 4]) -> Self {
        Self(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for TlvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for TlvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TlvTag({})", self)
    }
}

/// One tag/value pair. A zero-length value is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvEntry {
    pub tag: TlvTag,
    pub value: Option<Bytes>,
}

impl TlvEntry {
    pub fn new(tag: TlvTag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: Some(value.into()),
        }
    }

    pub fn empty(tag: TlvTag) -> Self {
        Self { tag, value: None }
    }
}

/// Legacy `d` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientProbe {
    pub device: u8,
    pub firmware: u8,
    pub mac: MacAddress,
}

/// A decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    Probe(ClientProbe),
    TlvRequest(Vec<TlvEntry>),
    TlvResponse(Vec<TlvEntry>),
    Hello,
    Ir,
    I2c,
    Ack,
}

impl Datagram {
    pub fn decode(data: &[u8]) -> DiscoveryResult<Self> {
        let Some(&kind) = data.first() else {
            return Err(DiscoveryError::Empty);
        };
        match kind {
            b'd' => decode_probe(data).map(Self::Probe),
            b'e' => decode_tlv(&data[1..]).map(Self::TlvRequest),
            b'E' => decode_tlv(&data[1..]).map(Self::TlvResponse),
            b'h' => Ok(Self::Hello),
            b'i' => Ok(Self::Ir),
            b'2' => Ok(Self::I2c),
            b'a' => Ok(Self::Ack),
            other => Err(DiscoveryError::UnknownType(other)),
        }
    }
}

/// Layout: `'d'`, pad, device id, firmware, 8 pad bytes, 6-byte MAC.
fn decode_probe(data: &[u8]) -> DiscoveryResult<ClientProbe> {
    if data.len() < LEGACY_REQUEST_LEN {
        return Err(DiscoveryError::Truncated {
            kind: "d",
            expected: LEGACY_REQUEST_LEN,
            actual: data.len(),
        });
    }
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&data[12..18]);
    Ok(ClientProbe {
        device: data[2],
        firmware: data[3],
        mac: MacAddress::new(mac),
    })
}

/// Parses TLV entries in order. Trailing bytes too short for a header are ignored.
fn decode_tlv(body: &[u8]) -> DiscoveryResult<Vec<TlvEntry>> {
    let mut entries = Vec::new();
    let mut idx = 0;
    while idx + TLV_HEADER_LEN <= body.len() {
        let tag = TlvTag([body[idx], body[idx + 1], body[idx + 2], body[idx + 3]]);
        let declared = usize::from(body[idx + 4]);
        idx += TLV_HEADER_LEN;

        if declared == 0 {
            entries.push(TlvEntry::empty(tag));
            continue;
        }
        let available = body.len() - idx;
        if declared > available {
            return Err(DiscoveryError::TruncatedValue {
                tag,
                declared,
                available,
            });
        }
        entries.push(TlvEntry::new(
            tag,
            Bytes::copy_from_slice(&body[idx..idx + declared]),
        ));
        idx += declared;
    }
    Ok(entries)
}

/// Encodes an `E` response. Values over 255 bytes are truncated.
pub fn encode_tlv_response(entries: &[TlvEntry]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + entries.len() * (TLV_HEADER_LEN + 16));
    buf.put_u8(b'E');
    for entry in entries {
        let value = entry.value.as_deref().unwrap_or_default();
        let value = if value.len() > MAX_TLV_VALUE_LEN {
            log::warn!(
                "[Discovery] Response {} too long, truncating to {} bytes",
                entry.tag,
                MAX_TLV_VALUE_LEN
            );
            &value[..MAX_TLV_VALUE_LEN]
        } else {
            value
        };
        buf.put_slice(entry.tag.as_bytes());
        buf.put_u8(value.len() as u8);
        buf.put_slice(value);
    }
    buf.freeze()
}

/// Encodes a `D` response carrying the hostname in a NUL-padded 16-byte field.
pub fn encode_legacy_response(hostname: &str) -> Bytes {
    let name = truncate_utf8(hostname, LEGACY_HOSTNAME_LEN);
    let mut buf = BytesMut::with_capacity(1 + LEGACY_HOSTNAME_LEN);
    buf.put_u8(b'D');
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, LEGACY_HOSTNAME_LEN - name.len());
    buf.freeze()
}
