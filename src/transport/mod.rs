//! # Transport Collaborator
//!
//! Interface to the socket engine that owns sessions and moves bytes.
//!
//! The bridge never performs I/O itself. It asks the transport to listen,
//! connect and send, and it receives engine events one at a time through
//! [`Transport::next_event`] or by direct injection into
//! [`Service::dispatch`](crate::service::Service::dispatch).
//!
//! ## Implementations
//! - **Memory**: in-process loopback engine used by tests and demos

pub mod memory;

use crate::core::packet::{RawPacket, SessionId};
use crate::error::TransportError;
use crate::protocol::event::ServiceEvent;

pub use memory::MemoryTransport;

pub trait Transport: Send {
    /// Bind a listener, returning the listen session id.
    fn listen(&mut self, addr: &str, port: u16) -> Result<SessionId, TransportError>;

    /// Open a connection, returning the new session id.
    fn connect(&mut self, addr: &str, port: u16) -> Result<SessionId, TransportError>;

    /// Push an encoded packet to `packet.session_id`.
    fn send(&mut self, packet: RawPacket) -> Result<(), TransportError>;

    /// Next pending engine event, if the engine queues them.
    fn next_event(&mut self) -> Option<ServiceEvent> {
        None
    }
}
