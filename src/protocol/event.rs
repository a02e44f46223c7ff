//! Service events delivered by the transport collaborator.

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::packet::{RawPacket, SessionId};

/// A session was opened (accepted, connected, or a listener was bound).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub socket: i64,
    pub is_listen: bool,
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

/// A session was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDestroyInfo {
    pub session_id: SessionId,
    pub socket: i64,
    pub reason: String,
    /// Closed by this service rather than by the peer or an error
    pub destroyed_from_service: bool,
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub errno: i32,
    pub sub_errno: i32,
}

/// Completion of a non-blocking connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncConnResult {
    pub connected: bool,
    pub reason: String,
    pub peer_addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Diagnostic emitted by a protocol layer of the transport stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoReport {
    pub session_id: SessionId,
    pub layer: u32,
    pub level: ReportLevel,
    pub message: String,
}

/// Everything a service instance can be asked to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Initialize,
    Start,
    Stop,
    Destroy,
    /// Scheduler tick
    Update,
    /// Scheduler had spare time this frame
    Idle(Duration),
    SessionCreate(SessionInfo),
    SessionDestroy(SessionDestroyInfo),
    AsyncConnectResult(AsyncConnResult),
    ProtocolReport(ProtoReport),
    PacketReceived(RawPacket),
}

impl ServiceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceEvent::Initialize => "Initialize",
            ServiceEvent::Start => "Start",
            ServiceEvent::Stop => "Stop",
            ServiceEvent::Destroy => "Destroy",
            ServiceEvent::Update => "Update",
            ServiceEvent::Idle(_) => "Idle",
            ServiceEvent::SessionCreate(_) => "SessionCreate",
            ServiceEvent::SessionDestroy(_) => "SessionDestroy",
            ServiceEvent::AsyncConnectResult(_) => "AsyncConnectResult",
            ServiceEvent::ProtocolReport(_) => "ProtocolReport",
            ServiceEvent::PacketReceived(_) => "PacketReceived",
        }
    }

    /// Session this event concerns, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ServiceEvent::SessionCreate(info) => Some(info.session_id),
            ServiceEvent::SessionDestroy(info) => Some(info.session_id),
            ServiceEvent::ProtocolReport(report) => Some(report.session_id),
            ServiceEvent::PacketReceived(packet) => Some(packet.session_id),
            _ => None,
        }
    }
}
