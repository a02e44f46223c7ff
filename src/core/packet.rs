//! # Packet Envelope
//!
//! Opcode + session + status + payload wrapper around one unit of exchange.
//!
//! A [`RawPacket`] is what the transport hands over on receipt. Once decoded,
//! the same envelope carries a typed payload (`Packet<T>`) into the handler.

use std::fmt;

use bytes::Bytes;

use crate::core::codec;
use crate::core::format::FieldDescriptor;
use crate::core::value::Value;
use crate::error::CodecError;

/// Status value meaning success by convention
pub const STATUS_OK: i32 = 0;

/// Opaque session handle owned by the transport collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        SessionId(id)
    }
}

/// One unit of exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet<P = Bytes> {
    pub opcode: u32,
    pub session_id: SessionId,
    pub status: i32,
    pub payload: P,
}

/// Packet whose payload has not been decoded yet.
pub type RawPacket = Packet<Bytes>;

impl RawPacket {
    /// Build the receipt-side envelope from transport metadata and raw bytes.
    pub fn from_wire(
        opcode: u32,
        session_id: SessionId,
        status: i32,
        raw: impl Into<Bytes>,
    ) -> Self {
        Packet {
            opcode,
            session_id,
            status,
            payload: raw.into(),
        }
    }

    /// Encode `values` and wrap them for sending.
    pub fn outbound(
        opcode: u32,
        session_id: SessionId,
        status: i32,
        values: &[Value],
        descriptors: &[FieldDescriptor],
    ) -> Result<Self, CodecError> {
        let payload = codec::encode(descriptors, values)?;
        Ok(Self::from_wire(opcode, session_id, status, payload))
    }

    /// Encode `values` into the payload bytes of an outbound packet.
    pub fn to_wire(
        opcode: u32,
        session_id: SessionId,
        status: i32,
        values: &[Value],
        descriptors: &[FieldDescriptor],
    ) -> Result<Bytes, CodecError> {
        Self::outbound(opcode, session_id, status, values, descriptors).map(|p| p.payload)
    }

    /// Decode the payload, returning values and bytes consumed.
    pub fn decode_payload(
        &self,
        descriptors: &[FieldDescriptor],
    ) -> Result<(Vec<Value>, usize), CodecError> {
        codec::decode(descriptors, &self.payload)
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl<P> Packet<P> {
    /// Same envelope, different payload.
    pub fn with_payload<Q>(&self, payload: Q) -> Packet<Q> {
        Packet {
            opcode: self.opcode,
            session_id: self.session_id,
            status: self.status,
            payload,
        }
    }

    pub fn map<Q, F>(self, f: F) -> Packet<Q>
    where
        F: FnOnce(P) -> Q,
    {
        Packet {
            opcode: self.opcode,
            session_id: self.session_id,
            status: self.status,
            payload: f(self.payload),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::parse;

    #[test]
    fn test_wire_roundtrip() {
        let descriptors = parse("iS").unwrap();
        let values = vec![Value::I32(42), Value::from("ok")];
        let packet =
            RawPacket::outbound(5, SessionId(9), STATUS_OK, &values, &descriptors).unwrap();
        assert_eq!(packet.opcode, 5);
        assert_eq!(packet.session_id, SessionId(9));
        assert!(packet.is_ok());

        let (decoded, consumed) = packet.decode_payload(&descriptors).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, packet.payload_len());
    }

    #[test]
    fn test_to_wire_matches_codec() {
        let descriptors = parse("[i]").unwrap();
        let values = vec![Value::from(vec![1i32, 3, 4, 5])];
        let bytes = RawPacket::to_wire(1, SessionId(1), 0, &values, &descriptors).unwrap();
        assert_eq!(bytes, codec::encode(&descriptors, &values).unwrap());
    }

    #[test]
    fn test_map_keeps_envelope() {
        let raw = RawPacket::from_wire(7, SessionId(3), -1, vec![1u8, 2, 3]);
        let mapped = raw.map(|bytes| bytes.len());
        assert_eq!(mapped.opcode, 7);
        assert_eq!(mapped.status, -1);
        assert!(!mapped.is_ok());
        assert_eq!(mapped.payload, 3);
    }
}
