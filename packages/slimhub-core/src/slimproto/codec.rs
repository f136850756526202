//! Framing for the SlimProto TCP stream.
//!
//! Inbound (player to server): 4-byte opcode, 4-byte big-endian payload
//! length, payload. Outbound (server to player): 2-byte big-endian length
//! covering tag and payload, 4-byte command tag, payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::command::ServerCommand;
use super::opcode::Opcode;
use super::ProtocolError;
use crate::protocol_constants::{INBOUND_HEADER_LEN, MAX_INBOUND_PAYLOAD, OUTBOUND_TAG_LEN};

/// A complete inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

/// Codec for a single player connection.
///
/// Bytes are held until a whole message is available, so messages split
/// across reads or packed into one read both decode correctly.
#[derive(Debug, Clone)]
pub struct SlimCodec {
    max_payload: usize,
}

impl SlimCodec {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_INBOUND_PAYLOAD,
        }
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for SlimCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SlimCodec {
    type Item = InboundFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<InboundFrame>, ProtocolError> {
        if src.len() < INBOUND_HEADER_LEN {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if length > self.max_payload {
            return Err(ProtocolError::PayloadTooLarge {
                length,
                max: self.max_payload,
            });
        }

        let total = INBOUND_HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let opcode = Opcode::from_wire([src[0], src[1], src[2], src[3]])?;
        src.advance(INBOUND_HEADER_LEN);
        let payload = src.split_to(length).freeze();
        Ok(Some(InboundFrame { opcode, payload }))
    }
}

impl Encoder<ServerCommand> for SlimCodec {
    type Error = ProtocolError;

    fn encode(&mut self, command: ServerCommand, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = command.payload();
        let length = payload.len() + OUTBOUND_TAG_LEN;
        let length = u16::try_from(length).map_err(|_| ProtocolError::CommandTooLarge(length))?;

        dst.reserve(2 + OUTBOUND_TAG_LEN + payload.len());
        dst.put_u16(length);
        dst.put_slice(command.tag());
        dst.put_slice(&payload);
        Ok(())
    }
}
