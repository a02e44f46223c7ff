//! In-process loopback transport.
//!
//! Sessions live in a shared table. A send on a connected session is framed
//! with [`EnvelopeCodec`], carried to the peer session, decoded there and
//! queued as a `PacketReceived` event. Every sent packet is also kept in an
//! outbox so callers can inspect what left the service.
//!
//! Clones share the same engine, so one handle can be moved into a
//! [`Service`](crate::service::Service) while another stays with the caller.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, instrument};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::framing::EnvelopeCodec;
use crate::core::packet::{RawPacket, SessionId};
use crate::error::constants::ERR_OUTBOX_LOCK;
use crate::error::{BridgeError, TransportError};
use crate::protocol::event::{ServiceEvent, SessionDestroyInfo, SessionInfo};
use crate::transport::Transport;

/// First port handed out to connecting sessions
const EPHEMERAL_PORT_BASE: u16 = 50_000;

const UNSPECIFIED: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

#[derive(Debug)]
struct Endpoint {
    peer: Option<SessionId>,
    local: SocketAddr,
    remote: SocketAddr,
    codec: EnvelopeCodec,
    inbound: BytesMut,
}

#[derive(Debug)]
struct Engine {
    next_session: u64,
    next_port: u16,
    max_payload_size: usize,
    listeners: HashMap<SocketAddr, SessionId>,
    endpoints: HashMap<SessionId, Endpoint>,
    pending: VecDeque<ServiceEvent>,
    sent: Vec<RawPacket>,
    closed: bool,
}

impl Engine {
    fn open(&mut self, peer: Option<SessionId>, local: SocketAddr, remote: SocketAddr) -> SessionId {
        self.next_session += 1;
        let id = SessionId(self.next_session);
        self.endpoints.insert(
            id,
            Endpoint {
                peer,
                local,
                remote,
                codec: EnvelopeCodec::with_limit(id, self.max_payload_size),
                inbound: BytesMut::new(),
            },
        );
        id
    }

    fn created(&mut self, id: SessionId, is_listen: bool) {
        if let Some(ep) = self.endpoints.get(&id) {
            let info = SessionInfo {
                session_id: id,
                socket: id.get() as i64,
                is_listen,
                local_addr: ep.local,
                peer_addr: ep.remote,
            };
            self.pending.push_back(ServiceEvent::SessionCreate(info));
        }
    }

    fn destroyed(&mut self, id: SessionId, reason: &str, from_service: bool) {
        if let Some(ep) = self.endpoints.remove(&id) {
            let info = SessionDestroyInfo {
                session_id: id,
                socket: id.get() as i64,
                reason: reason.to_owned(),
                destroyed_from_service: from_service,
                local_addr: ep.local,
                peer_addr: ep.remote,
                errno: 0,
                sub_errno: 0,
            };
            self.pending.push_back(ServiceEvent::SessionDestroy(info));
        }
    }

    /// Frame `packet` on the sending side and decode it on the peer side.
    fn carry(&mut self, from: SessionId, to: SessionId, packet: RawPacket) -> Result<(), BridgeError> {
        let mut frame = BytesMut::new();
        if let Some(sender) = self.endpoints.get_mut(&from) {
            sender.codec.encode(packet, &mut frame)?;
        }

        let Some(receiver) = self.endpoints.get_mut(&to) else {
            return Ok(());
        };
        receiver.inbound.extend_from_slice(&frame);
        while let Some(delivered) = receiver.codec.decode(&mut receiver.inbound)? {
            self.pending.push_back(ServiceEvent::PacketReceived(delivered));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    engine: Arc<Mutex<Engine>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_max_payload_size(MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine {
                next_session: 0,
                next_port: EPHEMERAL_PORT_BASE,
                max_payload_size,
                listeners: HashMap::new(),
                endpoints: HashMap::new(),
                pending: VecDeque::new(),
                sent: Vec::new(),
                closed: false,
            })),
        }
    }

    fn engine(&self) -> Result<MutexGuard<'_, Engine>, TransportError> {
        self.engine
            .lock()
            .map_err(|_| TransportError::Io(io::Error::other(ERR_OUTBOX_LOCK)))
    }

    fn inspect(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an engine event as if the socket layer produced it.
    pub fn inject(&self, event: ServiceEvent) {
        self.inspect().pending.push_back(event);
    }

    /// Packets sent so far, oldest first.
    pub fn sent(&self) -> Vec<RawPacket> {
        self.inspect().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<RawPacket> {
        std::mem::take(&mut self.inspect().sent)
    }

    pub fn pending_events(&self) -> usize {
        self.inspect().pending.len()
    }

    pub fn session_count(&self) -> usize {
        self.inspect().endpoints.len()
    }

    /// Close `session` and its peer, queueing a destroy event for each.
    pub fn disconnect(&self, session: SessionId, reason: &str) {
        let mut engine = self.inspect();
        let peer = engine.endpoints.get(&session).and_then(|ep| ep.peer);
        engine.listeners.retain(|_, id| *id != session);
        engine.destroyed(session, reason, true);
        if let Some(peer) = peer {
            engine.destroyed(peer, reason, false);
        }
    }

    /// Refuse every further operation.
    pub fn close(&self) {
        self.inspect().closed = true;
    }
}

fn resolve(addr: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let ip: IpAddr = addr.parse().map_err(|_| {
        TransportError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid address: {addr}"),
        ))
    })?;
    Ok(SocketAddr::new(ip, port))
}

impl Transport for MemoryTransport {
    #[instrument(skip(self))]
    fn listen(&mut self, addr: &str, port: u16) -> Result<SessionId, TransportError> {
        let local = resolve(addr, port)?;
        let mut engine = self.engine()?;
        if engine.closed {
            return Err(TransportError::Closed);
        }
        if engine.listeners.contains_key(&local) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{local} already bound"),
            )));
        }

        let id = engine.open(None, local, UNSPECIFIED);
        engine.listeners.insert(local, id);
        engine.created(id, true);
        debug!(session = %id, %local, "Listening");
        Ok(id)
    }

    #[instrument(skip(self))]
    fn connect(&mut self, addr: &str, port: u16) -> Result<SessionId, TransportError> {
        let remote = resolve(addr, port)?;
        let mut engine = self.engine()?;
        if engine.closed {
            return Err(TransportError::Closed);
        }
        if !engine.listeners.contains_key(&remote) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("nothing listening on {remote}"),
            )));
        }

        let port = engine.next_port;
        engine.next_port = engine.next_port.wrapping_add(1).max(EPHEMERAL_PORT_BASE);
        let client_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

        let client = engine.open(None, client_addr, remote);
        let accepted = engine.open(Some(client), remote, client_addr);
        if let Some(ep) = engine.endpoints.get_mut(&client) {
            ep.peer = Some(accepted);
        }
        engine.created(accepted, false);
        engine.created(client, false);
        debug!(session = %client, accepted = %accepted, %remote, "Connected");
        Ok(client)
    }

    fn send(&mut self, packet: RawPacket) -> Result<(), TransportError> {
        let mut engine = self.engine()?;
        if engine.closed {
            return Err(TransportError::Closed);
        }
        let from = packet.session_id;
        let peer = engine
            .endpoints
            .get(&from)
            .ok_or(TransportError::UnknownSession(from.get()))?
            .peer;

        // Only packets that made it onto the wire are recorded
        if let Some(to) = peer {
            engine.carry(from, to, packet.clone()).map_err(|e| match e {
                BridgeError::Io(io) => TransportError::Io(io),
                other => TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, other.to_string())),
            })?;
        }
        engine.sent.push(packet);
        Ok(())
    }

    fn next_event(&mut self) -> Option<ServiceEvent> {
        self.inspect().pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(transport: &mut MemoryTransport) -> Vec<ServiceEvent> {
        std::iter::from_fn(|| transport.next_event()).collect()
    }

    #[test]
    fn test_listen_connect_creates_sessions() {
        let mut transport = MemoryTransport::new();
        let listen = transport.listen("127.0.0.1", 7788).unwrap();
        let client = transport.connect("127.0.0.1", 7788).unwrap();
        assert_ne!(listen, client);
        assert_eq!(transport.session_count(), 3);

        let events = drain(&mut transport);
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            ServiceEvent::SessionCreate(info) if info.is_listen && info.session_id == listen
        ));
    }

    #[test]
    fn test_send_is_carried_to_peer() {
        let mut transport = MemoryTransport::new();
        transport.listen("127.0.0.1", 9000).unwrap();
        let client = transport.connect("127.0.0.1", 9000).unwrap();
        drain(&mut transport);

        transport
            .send(RawPacket::from_wire(5, client, 0, vec![1u8, 2, 3]))
            .unwrap();

        assert_eq!(transport.sent().len(), 1);
        let events = drain(&mut transport);
        match &events[..] {
            [ServiceEvent::PacketReceived(packet)] => {
                assert_eq!(packet.opcode, 5);
                assert_ne!(packet.session_id, client);
                assert_eq!(&packet.payload[..], &[1, 2, 3]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_failed_carry_is_not_recorded_as_sent() {
        let mut transport = MemoryTransport::with_max_payload_size(4);
        transport.listen("127.0.0.1", 9003).unwrap();
        let client = transport.connect("127.0.0.1", 9003).unwrap();
        drain(&mut transport);

        let result = transport.send(RawPacket::from_wire(5, client, 0, vec![0u8; 10]));
        assert!(matches!(result, Err(TransportError::Io(_))));
        assert!(transport.sent().is_empty());
        assert_eq!(transport.pending_events(), 0);

        transport
            .send(RawPacket::from_wire(5, client, 0, vec![1u8, 2]))
            .unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_connect_refused_and_unknown_session() {
        let mut transport = MemoryTransport::new();
        assert!(matches!(
            transport.connect("127.0.0.1", 1),
            Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::ConnectionRefused
        ));
        assert!(matches!(
            transport.send(RawPacket::from_wire(1, SessionId(42), 0, Vec::new())),
            Err(TransportError::UnknownSession(42))
        ));
    }

    #[test]
    fn test_disconnect_and_close() {
        let mut transport = MemoryTransport::new();
        transport.listen("127.0.0.1", 9001).unwrap();
        let client = transport.connect("127.0.0.1", 9001).unwrap();
        drain(&mut transport);

        transport.disconnect(client, "bye");
        let events = drain(&mut transport);
        assert_eq!(events.len(), 2);
        assert_eq!(transport.session_count(), 1);

        transport.close();
        assert!(matches!(
            transport.listen("127.0.0.1", 9002),
            Err(TransportError::Closed)
        ));
    }
}
