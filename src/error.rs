//! # Error Types
//!
//! Error handling for the packet bridge.
//!
//! Errors are layered the same way packets flow through the crate:
//!
//! ## Error Categories
//! - **Format Errors**: malformed format specifiers, raised at registration time
//! - **Codec Errors**: arity, truncation and encoding failures, raised per packet
//! - **Dispatch Errors**: routing failures and failures nobody handled
//! - **Transport Errors**: failures reported by the transport collaborator
//!
//! Format errors are setup-time and fail loudly. Codec and dispatch errors are
//! always isolated to the single packet or event that caused them.
//!
//! ## Example Usage
//! ```rust
//! use packet_bridge::core::format::parse;
//! use packet_bridge::error::{BridgeError, Result};
//!
//! fn field_count(spec: &str) -> Result<usize> {
//!     Ok(parse(spec)?.len())
//! }
//!
//! assert_eq!(field_count("iS").unwrap(), 2);
//! assert!(matches!(field_count("i]"), Err(BridgeError::Format(_))));
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

use crate::protocol::dispatcher::ServiceState;

/// Boxed error raised by user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Transport errors
    pub const ERR_OUTBOX_LOCK: &str = "Failed to acquire lock on transport engine";

    /// Codec errors
    pub const ERR_INVALID_UTF8: &str = "String payload is not valid UTF-8";
    pub const ERR_INVALID_BOOL: &str = "Boolean byte must be 0x00 or 0x01";
}

/// Failure while parsing a format specifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Malformed format specifier at position {position} ({found:?}): {reason}")]
    Malformed {
        /// Byte offset of the offending character (input length for unterminated groups)
        position: usize,
        /// Offending character, `None` at end of input
        found: Option<char>,
        reason: &'static str,
    },

    #[error("Format specifier describes no fields")]
    Empty,
}

/// Failure while encoding or decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Arity mismatch: expected {expected} values, got {found}")]
    Arity { expected: usize, found: usize },

    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(&'static str),

    #[error("Type mismatch: descriptor expects {expected}, value is {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Length {size} exceeds limit {limit}")]
    Oversized { size: usize, limit: usize },

    #[error("Value conversion failed: {0}")]
    Conversion(String),
}

/// Failure reported by the transport collaborator.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Unknown session: {0}")]
    UnknownSession(u64),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Step of the per-packet cycle that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    Decode,
    Handle,
    Encode,
    Send,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Decode => "decode",
            FailureStage::Handle => "handle",
            FailureStage::Encode => "encode",
            FailureStage::Send => "send",
        };
        f.write_str(name)
    }
}

/// Failure at the dispatch boundary.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No handler registered for opcode {0}")]
    NoHandlerForOpcode(u32),

    #[error("Type {0} is not registered for any opcode")]
    UnregisteredType(&'static str),

    #[error("Codec failure during {stage}: {source}")]
    Codec {
        stage: FailureStage,
        #[source]
        source: CodecError,
    },

    #[error("Handler for {type_name} raised: {source}")]
    HandlerRaised {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No exception handler registered for {type_name}: {source}")]
    NoExceptionHandlerRegistered {
        type_name: &'static str,
        #[source]
        source: Box<DispatchError>,
    },

    #[error("Event {event} is not valid in state {state:?}")]
    InvalidTransition {
        state: ServiceState,
        event: &'static str,
    },
}

impl DispatchError {
    /// Stage this failure happened in, if it is a per-packet failure.
    pub fn stage(&self) -> Option<FailureStage> {
        match self {
            DispatchError::Codec { stage, .. } => Some(*stage),
            DispatchError::HandlerRaised { .. } => Some(FailureStage::Handle),
            DispatchError::Transport(_) => Some(FailureStage::Send),
            DispatchError::NoExceptionHandlerRegistered { source, .. } => source.stage(),
            _ => None,
        }
    }
}

/// Failure while integrating a script bundle.
#[derive(Error, Debug)]
#[error("Failed to integrate script {name}: {source}")]
pub struct IntegrateError {
    /// Name of the first entry that failed
    pub name: String,
    #[source]
    pub source: BoxError,
}

/// BridgeError is the umbrella error for operations spanning several layers
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Integration error: {0}")]
    Integrate(#[from] IntegrateError),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
