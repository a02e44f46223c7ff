//! # Envelope Framing
//!
//! Tokio codec that frames [`RawPacket`]s on a byte stream.
//!
//! ## Wire Format
//! ```text
//! [PayloadLen: u32 LE] [Opcode: u32 LE] [Status: i32 LE] [Payload(N)]
//! ```
//!
//! The session id never travels on the wire: one codec instance serves one
//! session and stamps its id on every decoded packet.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::packet::{RawPacket, SessionId};
use crate::error::{BridgeError, Result};

/// Bytes preceding the payload in every frame
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    session_id: SessionId,
    max_payload_size: usize,
}

impl EnvelopeCodec {
    pub fn new(session_id: SessionId) -> Self {
        Self::with_limit(session_id, MAX_PAYLOAD_SIZE)
    }

    pub fn with_limit(session_id: SessionId, max_payload_size: usize) -> Self {
        Self {
            session_id,
            max_payload_size,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

impl Decoder for EnvelopeCodec {
    type Item = RawPacket;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let payload_len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if payload_len > self.max_payload_size {
            warn!(
                session = %self.session_id,
                payload_len,
                limit = self.max_payload_size,
                "Rejecting oversized frame"
            );
            return Err(BridgeError::OversizedPacket(payload_len));
        }

        let frame_len = HEADER_LEN + payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let opcode = src.get_u32_le();
        let status = src.get_i32_le();
        let payload = src.split_to(payload_len).freeze();

        Ok(Some(RawPacket::from_wire(
            opcode,
            self.session_id,
            status,
            payload,
        )))
    }
}

impl Encoder<RawPacket> for EnvelopeCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: RawPacket, dst: &mut BytesMut) -> Result<()> {
        let payload_len = item.payload.len();
        if payload_len > self.max_payload_size {
            return Err(BridgeError::OversizedPacket(payload_len));
        }

        let len_prefix = length_prefix(payload_len)?;
        dst.reserve(HEADER_LEN + payload_len);
        dst.put_u32_le(len_prefix);
        dst.put_u32_le(item.opcode);
        dst.put_i32_le(item.status);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

/// Payload length as the frame's `u32` prefix, rejecting lengths it cannot carry.
fn length_prefix(payload_len: usize) -> Result<u32> {
    u32::try_from(payload_len).map_err(|_| BridgeError::OversizedPacket(payload_len))
}
