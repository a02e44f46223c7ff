//! Service handle passed to facades, packet handlers and exception handlers.

use std::any::type_name;

use bytes::Bytes;
use tracing::trace;

use crate::core::packet::{RawPacket, SessionId, STATUS_OK};
use crate::core::value::Value;
use crate::error::{DispatchError, FailureStage};
use crate::protocol::registry::Registry;
use crate::transport::Transport;
use crate::utils::metrics::Metrics;

/// Borrowed view of the originating service for the duration of one callback.
pub struct ServiceContext<'a> {
    service: &'a str,
    registry: &'a Registry,
    transport: &'a mut dyn Transport,
    metrics: &'a Metrics,
}

impl<'a> ServiceContext<'a> {
    pub(crate) fn new(
        service: &'a str,
        registry: &'a Registry,
        transport: &'a mut dyn Transport,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            service,
            registry,
            transport,
            metrics,
        }
    }

    pub fn service_name(&self) -> &str {
        self.service
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn metrics(&self) -> &Metrics {
        self.metrics
    }

    /// Encode `value` with its registration and send it to `session_id`.
    pub fn send<T: Send + 'static>(
        &mut self,
        session_id: SessionId,
        value: &T,
    ) -> Result<(), DispatchError> {
        let registration = self
            .registry
            .lookup_by_type::<T>()
            .ok_or(DispatchError::UnregisteredType(type_name::<T>()))?;
        let payload = registration
            .encode(value)
            .map_err(|source| DispatchError::Codec {
                stage: FailureStage::Encode,
                source,
            })?;
        let opcode = registration.opcode();
        self.send_raw(RawPacket::from_wire(opcode, session_id, STATUS_OK, payload))
    }

    /// Encode plain values with the descriptors registered for `opcode` and send them.
    pub fn send_values(
        &mut self,
        session_id: SessionId,
        opcode: u32,
        status: i32,
        values: &[Value],
    ) -> Result<(), DispatchError> {
        let registration = self
            .registry
            .lookup_by_opcode(opcode)
            .ok_or(DispatchError::NoHandlerForOpcode(opcode))?;
        let payload = registration
            .encode_values(values)
            .map_err(|source| DispatchError::Codec {
                stage: FailureStage::Encode,
                source,
            })?;
        self.send_raw(RawPacket::from_wire(opcode, session_id, status, payload))
    }

    /// Send already-encoded bytes, bypassing the registry.
    pub fn send_bytes(
        &mut self,
        session_id: SessionId,
        opcode: u32,
        status: i32,
        payload: impl Into<Bytes>,
    ) -> Result<(), DispatchError> {
        self.send_raw(RawPacket::from_wire(opcode, session_id, status, payload))
    }

    pub fn send_raw(&mut self, packet: RawPacket) -> Result<(), DispatchError> {
        let len = packet.payload_len();
        trace!(service = self.service, opcode = packet.opcode, session = %packet.session_id, len, "Sending packet");
        self.transport.send(packet)?;
        self.metrics.packet_sent(len);
        Ok(())
    }
}
