//! # Protocol Layer
//!
//! Handler registry, service events, facades and the event dispatcher.
//!
//! ## Components
//! - **Registry**: opcode and type bindings for packet handlers
//! - **Event**: lifecycle, session and packet events
//! - **Facade**: per-service lifecycle callbacks
//! - **Dispatcher**: state machine and packet routing
//! - **Context**: service handle passed into callbacks

pub mod context;
pub mod dispatcher;
pub mod event;
pub mod facade;
pub mod registry;


pub use context::ServiceContext;
pub use dispatcher::{DispatchOutcome, Dispatcher, ServiceState};
pub use event::ServiceEvent;
pub use facade::Facade;
pub use registry::{FailureContext, PacketData, Registry, TypeKey};
