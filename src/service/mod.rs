//! # Service
//!
//! One service instance: a dispatcher bound to its transport.
//!
//! The host pumps engine events into [`Service::dispatch`] (or lets the
//! service pull them with [`Service::poll_event`]). Dropping a service that
//! was never destroyed delivers `Stop` and `Destroy` first, so facades always
//! observe the end of the lifecycle.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::config::ServiceConfig;
use crate::core::packet::{RawPacket, SessionId};
use crate::error::{DispatchError, Result};
use crate::protocol::dispatcher::{DispatchOutcome, Dispatcher, ServiceState};
use crate::protocol::event::ServiceEvent;
use crate::protocol::facade::Facade;
use crate::protocol::registry::Registry;
use crate::transport::Transport;
use crate::utils::metrics::Metrics;

pub struct Service {
    dispatcher: Dispatcher,
    transport: Box<dyn Transport>,
}

impl Service {
    pub fn new<T>(name: impl Into<String>, registry: Registry, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            dispatcher: Dispatcher::new(name, registry),
            transport: Box::new(transport),
        }
    }

    pub fn from_config<T>(config: &ServiceConfig, registry: Registry, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            dispatcher: Dispatcher::new(config.name.clone(), registry)
                .with_max_payload_size(config.max_payload_size),
            transport: Box::new(transport),
        }
    }

    pub fn with_facade<F: Facade + 'static>(mut self, facade: F) -> Self {
        self.dispatcher.set_facade(facade);
        self
    }

    pub fn name(&self) -> &str {
        self.dispatcher.name()
    }

    pub fn state(&self) -> ServiceState {
        self.dispatcher.state()
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.dispatcher.metrics()
    }

    /// Deliver `Initialize` then `Start`.
    #[instrument(skip(self), fields(service = %self.name()))]
    pub fn start(&mut self) -> Result<()> {
        self.dispatch(ServiceEvent::Initialize)?;
        self.dispatch(ServiceEvent::Start)?;
        info!("Service started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.dispatch(ServiceEvent::Stop)?;
        info!(service = %self.name(), "Service stopped");
        Ok(())
    }

    /// Deliver `Destroy`, stopping first if the service is still active.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state().is_active() {
            self.stop()?;
        }
        self.dispatch(ServiceEvent::Destroy)?;
        self.dispatcher.metrics().log_summary(self.name());
        Ok(())
    }

    pub fn listen(&mut self, addr: &str, port: u16) -> Result<SessionId> {
        Ok(self.transport.listen(addr, port)?)
    }

    pub fn connect(&mut self, addr: &str, port: u16) -> Result<SessionId> {
        Ok(self.transport.connect(addr, port)?)
    }

    /// Encode `value` with the registration of its type and send it.
    pub fn send<T: Send + 'static>(&mut self, session_id: SessionId, value: &T) -> Result<()> {
        self.dispatcher
            .context(&mut *self.transport)
            .send(session_id, value)?;
        Ok(())
    }

    /// Send an already-encoded payload under `opcode`.
    pub fn send_raw(
        &mut self,
        session_id: SessionId,
        opcode: u32,
        status: i32,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        self.dispatcher
            .context(&mut *self.transport)
            .send_raw(RawPacket::from_wire(opcode, session_id, status, payload))?;
        Ok(())
    }

    pub fn dispatch(&mut self, event: ServiceEvent) -> std::result::Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(&mut *self.transport, event)
    }

    /// Pull one event from the transport and dispatch it.
    ///
    /// `None` when the transport has nothing queued.
    pub fn poll_event(&mut self) -> Option<std::result::Result<DispatchOutcome, DispatchError>> {
        let event = self.transport.next_event()?;
        Some(self.dispatch(event))
    }

    /// Dispatch queued transport events until none remain.
    ///
    /// Events queued by handlers during the drain are processed too. Returns
    /// how many events were dispatched; per-event failures are logged.
    pub fn drain_events(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(result) = self.poll_event() {
            dispatched += 1;
            if let Err(e) = result {
                warn!(service = %self.name(), error = %e, "Event failed");
            }
        }
        dispatched
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        let state = self.state();
        if state == ServiceState::Destroyed {
            return;
        }
        debug!(service = %self.name(), ?state, "Dropping live service");
        if let Err(e) = self.destroy() {
            warn!(service = %self.name(), error = %e, "Failed to destroy service on drop");
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::Packet;
    use crate::core::value::{fields, Value};
    use crate::error::{BridgeError, CodecError};
    use crate::protocol::context::ServiceContext;
    use crate::protocol::registry::PacketData;
    use crate::transport::MemoryTransport;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Chat(String);

    impl PacketData for Chat {
        const FORMAT: &'static str = "S";

        fn to_values(&self) -> Vec<Value> {
            vec![self.0.as_str().into()]
        }

        fn from_values(values: Vec<Value>) -> std::result::Result<Self, CodecError> {
            let [text] = fields(values)?;
            Ok(Chat(text.into_string()?))
        }
    }

    #[derive(Clone, Default)]
    struct Lifecycle(Arc<Mutex<Vec<&'static str>>>);

    impl Facade for Lifecycle {
        fn on_initialize(&mut self, _ctx: &mut ServiceContext<'_>) {
            self.0.lock().unwrap().push("initialize");
        }
        fn on_start(&mut self, _ctx: &mut ServiceContext<'_>) {
            self.0.lock().unwrap().push("start");
        }
        fn on_stop(&mut self, _ctx: &mut ServiceContext<'_>) {
            self.0.lock().unwrap().push("stop");
        }
        fn on_destroy(&mut self, _ctx: &mut ServiceContext<'_>) {
            self.0.lock().unwrap().push("destroy");
        }
    }

    fn echo_registry(received: Arc<Mutex<Vec<String>>>) -> Registry {
        let mut registry = Registry::new();
        registry
            .register::<Chat, _>(1, move |_ctx, packet: Packet<Chat>| {
                received.lock().unwrap().push(packet.payload.0);
                Ok(None)
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_drop_delivers_stop_and_destroy() {
        let lifecycle = Lifecycle::default();
        {
            let mut service = Service::new("svc", Registry::new(), MemoryTransport::new())
                .with_facade(lifecycle.clone());
            service.start().unwrap();
        }
        assert_eq!(
            *lifecycle.0.lock().unwrap(),
            vec!["initialize", "start", "stop", "destroy"]
        );
    }

    #[test]
    fn test_send_and_drain_roundtrip() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut service = Service::new(
            "chat",
            echo_registry(Arc::clone(&received)),
            MemoryTransport::new(),
        );
        service.start().unwrap();

        service.listen("127.0.0.1", 6000).unwrap();
        let client = service.connect("127.0.0.1", 6000).unwrap();
        assert_eq!(service.drain_events(), 3);

        service.send(client, &Chat("hi there".into())).unwrap();
        assert_eq!(service.drain_events(), 1);
        assert_eq!(*received.lock().unwrap(), vec!["hi there".to_string()]);

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.packets_sent, 1);
        assert_eq!(snapshot.packets_handled, 1);
    }

    #[test]
    fn test_send_unregistered_type_fails() {
        let mut service = Service::new("svc", Registry::new(), MemoryTransport::new());
        service.start().unwrap();
        let err = service.send(SessionId(1), &Chat("x".into())).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Dispatch(DispatchError::UnregisteredType(_))
        ));
    }

    #[test]
    fn test_from_config_applies_payload_limit() {
        let config = ServiceConfig {
            name: "limited".into(),
            max_payload_size: 4,
        };
        let service = Service::from_config(&config, Registry::new(), MemoryTransport::new());
        assert_eq!(service.name(), "limited");
        assert_eq!(service.dispatcher.max_payload_size(), 4);
    }

    #[test]
    fn test_explicit_destroy_then_drop_is_quiet() {
        let lifecycle = Lifecycle::default();
        let mut service = Service::new("svc", Registry::new(), MemoryTransport::new())
            .with_facade(lifecycle.clone());
        service.start().unwrap();
        service.destroy().unwrap();
        assert_eq!(service.state(), ServiceState::Destroyed);
        drop(service);
        assert_eq!(lifecycle.0.lock().unwrap().len(), 4);
    }
}
