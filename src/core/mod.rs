//! # Core Packet Components
//!
//! Format parsing, binary payload encoding, and the packet envelope.
//!
//! ## Components
//! - **Format**: specifier parser and memoizing cache
//! - **Value**: dynamically-typed values moved through the codec
//! - **Codec**: descriptor-driven binary encode/decode
//! - **Packet**: opcode/session/status envelope
//! - **Framing**: Tokio codec for envelopes over byte streams
//!
//! ## Wire Format
//! ```text
//! [PayloadLen(4)] [Opcode(4)] [Status(4)] [Payload(N)]
//! ```
//!
//! Payload fields are little-endian with 32-bit length and count prefixes.

pub mod codec;
pub mod format;
pub mod framing;
pub mod packet;
pub mod value;
