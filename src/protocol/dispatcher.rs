//! # Event Dispatcher
//!
//! Routes lifecycle, session and packet events for one service instance.
//!
//! Packets go through a fixed cycle: opcode lookup, decode with the
//! registered format, handler call, then encode and send of the optional
//! response. A failure at any step is diverted to the exception handler bound
//! to the packet's payload type. The service itself is never torn down by a
//! per-packet failure.

use std::any::Any;
use std::convert::identity;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::packet::{RawPacket, STATUS_OK};
use crate::error::{BoxError, CodecError, DispatchError, FailureStage};
use crate::protocol::context::ServiceContext;
use crate::protocol::event::ServiceEvent;
use crate::protocol::facade::Facade;
use crate::protocol::registry::{FailureContext, Registration, Registry};
use crate::transport::Transport;
use crate::utils::metrics::Metrics;

/// Lifecycle of one service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Created,
    Initialized,
    Started,
    Running,
    Idle,
    Stopped,
    Destroyed,
}

impl ServiceState {
    /// Started, running or idle.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ServiceState::Started | ServiceState::Running | ServiceState::Idle
        )
    }

    /// State after accepting `event`, or the reason it is rejected.
    pub fn on_event(self, event: &ServiceEvent) -> Result<ServiceState, DispatchError> {
        use ServiceState::*;

        let next = match (self, event) {
            (Created, ServiceEvent::Initialize) => Some(Initialized),
            (Initialized, ServiceEvent::Start) => Some(Started),
            (s, ServiceEvent::Stop) if s.is_active() => Some(Stopped),
            (Created | Initialized | Stopped, ServiceEvent::Destroy) => Some(Destroyed),
            (s, ServiceEvent::Idle(_)) if s.is_active() => Some(Idle),
            (s, ServiceEvent::Update) if s.is_active() => Some(Running),
            (
                s,
                ServiceEvent::SessionCreate(_)
                | ServiceEvent::SessionDestroy(_)
                | ServiceEvent::AsyncConnectResult(_)
                | ServiceEvent::ProtocolReport(_)
                | ServiceEvent::PacketReceived(_),
            ) if s.is_active() => Some(Running),
            _ => None,
        };

        next.ok_or(DispatchError::InvalidTransition {
            state: self,
            event: event.name(),
        })
    }
}

/// How an accepted event was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Forwarded to the facade, or nothing was installed to receive it
    Delivered,
    /// Decoded and handled; `responded` if the handler's return value was sent back
    Handled { responded: bool },
    /// No registration for the opcode; the facade's unhandled-packet callback ran
    Unhandled,
    /// A per-packet step failed and the type's exception handler ran
    ExceptionHandled,
}

/// Routes engine events for one service instance.
///
/// `dispatch` takes `&mut self`, so events reach one instance strictly one
/// at a time.
pub struct Dispatcher {
    name: String,
    registry: Registry,
    facade: Option<Box<dyn Facade>>,
    state: ServiceState,
    metrics: Arc<Metrics>,
    max_payload_size: usize,
}

impl Dispatcher {
    pub fn new(name: impl Into<String>, registry: Registry) -> Self {
        Self {
            name: name.into(),
            registry,
            facade: None,
            state: ServiceState::Created,
            metrics: Arc::new(Metrics::new()),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    pub fn with_facade<F: Facade + 'static>(mut self, facade: F) -> Self {
        self.set_facade(facade);
        self
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Install the facade, replacing any previous one.
    pub fn set_facade<F: Facade + 'static>(&mut self, facade: F) {
        if self.facade.replace(Box::new(facade)).is_some() {
            warn!(service = %self.name, "Facade replaced");
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Handle for sends made outside of a dispatch cycle.
    pub fn context<'a>(&'a self, transport: &'a mut dyn Transport) -> ServiceContext<'a> {
        ServiceContext::new(&self.name, &self.registry, transport, &*self.metrics)
    }

    /// Route one engine event.
    ///
    /// Per-packet failures reach the exception handler for the packet's
    /// payload type, or come back as
    /// [`DispatchError::NoExceptionHandlerRegistered`]. Neither changes the
    /// lifecycle state.
    pub fn dispatch(
        &mut self,
        transport: &mut dyn Transport,
        event: ServiceEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        let next = match self.state.on_event(&event) {
            Ok(next) => next,
            Err(e) => {
                self.metrics.event_rejected();
                warn!(service = %self.name, state = ?self.state, event = event.name(), "Rejecting out-of-order event");
                return Err(e);
            }
        };
        self.metrics.event_dispatched();
        debug!(service = %self.name, event = event.name(), session = ?event.session_id(), "Dispatching event");
        self.state = next;

        let Dispatcher {
            name,
            registry,
            facade,
            metrics,
            max_payload_size,
            ..
        } = self;
        let registry: &Registry = registry;
        let mut ctx = ServiceContext::new(name.as_str(), registry, transport, &**metrics);
        let facade = facade.as_deref_mut();

        if let ServiceEvent::PacketReceived(packet) = event {
            return deliver_packet(registry, facade, &mut ctx, packet, *max_payload_size);
        }

        if let Some(facade) = facade {
            let ctx = &mut ctx;
            match &event {
                ServiceEvent::Initialize => facade.on_initialize(ctx),
                ServiceEvent::Start => facade.on_start(ctx),
                ServiceEvent::Stop => facade.on_stop(ctx),
                ServiceEvent::Destroy => facade.on_destroy(ctx),
                ServiceEvent::Update => facade.on_update(ctx),
                ServiceEvent::Idle(idle_time) => facade.on_idle(ctx, *idle_time),
                ServiceEvent::SessionCreate(info) => facade.on_session_create(ctx, info),
                ServiceEvent::SessionDestroy(info) => facade.on_session_destroy(ctx, info),
                ServiceEvent::AsyncConnectResult(result) => facade.on_async_conn_result(ctx, result),
                ServiceEvent::ProtocolReport(report) => facade.on_proto_report(ctx, report),
                ServiceEvent::PacketReceived(_) => {}
            }
        }
        Ok(DispatchOutcome::Delivered)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .field("facade", &self.facade.is_some())
            .finish()
    }
}

fn deliver_packet(
    registry: &Registry,
    facade: Option<&mut (dyn Facade + 'static)>,
    ctx: &mut ServiceContext<'_>,
    packet: RawPacket,
    max_payload_size: usize,
) -> Result<DispatchOutcome, DispatchError> {
    ctx.metrics().packet_received(packet.payload_len());

    let Some(registration) = registry.lookup_by_opcode(packet.opcode) else {
        ctx.metrics().packet_unhandled();
        debug!(opcode = packet.opcode, session = %packet.session_id, "No registration for opcode");
        if let Some(facade) = facade {
            facade.on_unhandled_packet(ctx, &packet);
        }
        return Ok(DispatchOutcome::Unhandled);
    };

    let opcode = packet.opcode;
    let session_id = packet.session_id;
    match run_cycle(registration, ctx, packet, max_payload_size) {
        Ok(responded) => {
            ctx.metrics().packet_handled();
            Ok(DispatchOutcome::Handled { responded })
        }
        Err(err) => {
            let stage = err.stage().unwrap_or(FailureStage::Handle);
            ctx.metrics().failure(stage);
            let failure = FailureContext {
                service: ctx.service_name().to_owned(),
                opcode,
                session_id,
                stage,
                type_name: registration.type_name(),
            };
            route_failure(registry, registration, ctx, &failure, err)
        }
    }
}

/// Decode, handle and answer one packet. Returns whether a response was sent.
///
/// A panic in a codec or handler callback is caught and reported as a failure
/// of the stage it happened in.
fn run_cycle(
    registration: &Registration,
    ctx: &mut ServiceContext<'_>,
    packet: RawPacket,
    max_payload_size: usize,
) -> Result<bool, DispatchError> {
    let codec_failed = |stage, source| DispatchError::Codec { stage, source };
    let type_name = registration.type_name();

    let size = packet.payload_len();
    if size > max_payload_size {
        return Err(codec_failed(
            FailureStage::Decode,
            CodecError::Oversized {
                size,
                limit: max_payload_size,
            },
        ));
    }

    let decoded = isolate(type_name, FailureStage::Decode, || {
        registration.decode(&packet.payload)
    })
    .map_err(CodecError::Conversion)
    .and_then(identity)
    .map_err(|source| codec_failed(FailureStage::Decode, source))?;
    let opcode = packet.opcode;
    let session_id = packet.session_id;

    let response = isolate(type_name, FailureStage::Handle, || {
        registration.handle(ctx, packet.map(|_| decoded))
    })
    .map_err(BoxError::from)
    .and_then(identity)
    .map_err(|source| DispatchError::HandlerRaised { type_name, source })?;
    let Some(response) = response else {
        return Ok(false);
    };

    let payload = isolate(type_name, FailureStage::Encode, || {
        registration.encode(&*response)
    })
    .map_err(CodecError::Conversion)
    .and_then(identity)
    .map_err(|source| codec_failed(FailureStage::Encode, source))?;
    ctx.send_raw(RawPacket::from_wire(opcode, session_id, STATUS_OK, payload))?;
    ctx.metrics().response_sent();
    Ok(true)
}

/// Runs one user callback, turning a panic into its message.
fn isolate<R>(
    type_name: &'static str,
    stage: FailureStage,
    f: impl FnOnce() -> R,
) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload);
        warn!(payload = type_name, %stage, panic = %message, "Callback panicked");
        message
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(message) => (*message).to_owned(),
            None => "panicked with a non-string payload".to_owned(),
        },
    }
}

fn route_failure(
    registry: &Registry,
    registration: &Registration,
    ctx: &mut ServiceContext<'_>,
    failure: &FailureContext,
    err: DispatchError,
) -> Result<DispatchOutcome, DispatchError> {
    match registry.lookup_exception_handler(&registration.type_key()) {
        Some(handler) => {
            debug!(opcode = failure.opcode, payload = failure.type_name, stage = %failure.stage, error = %err, "Routing failure to exception handler");
            handler(ctx, failure, &err);
            ctx.metrics().exception_routed();
            Ok(DispatchOutcome::ExceptionHandled)
        }
        None => {
            error!(
                service = %failure.service,
                opcode = failure.opcode,
                session = %failure.session_id,
                payload = failure.type_name,
                stage = %failure.stage,
                error = %err,
                "Packet failed with no exception handler bound"
            );
            ctx.metrics().failure_unrouted();
            Err(DispatchError::NoExceptionHandlerRegistered {
                type_name: failure.type_name,
                source: Box::new(err),
            })
        }
    }
}
