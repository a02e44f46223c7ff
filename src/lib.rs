//! # packet-bridge
//!
//! Format-string binary packet codec and event dispatch layer for
//! script-driven network services.
//!
//! ## Layers
//! - **core**: format parser, value model, binary codec, packet envelope and framing
//! - **protocol**: handler registry, service events, facades and the dispatcher
//! - **transport**: the socket-engine interface and an in-memory engine
//! - **service**: a dispatcher bound to its transport
//! - **integrator**: script bundles fed to an embedded interpreter
//!
//! ## Example
//! ```rust
//! use packet_bridge::core::format::FormatCache;
//! use packet_bridge::core::value::Value;
//!
//! let cache = FormatCache::new();
//! let bytes = cache.pack("[i]", &[Value::from(vec![1i32, 3, 4, 5])]).unwrap();
//! assert_eq!(bytes.len(), 20);
//!
//! let (values, consumed) = cache.unpack("[i]", &bytes).unwrap();
//! assert_eq!(consumed, 20);
//! assert_eq!(values[0], Value::from(vec![1i32, 3, 4, 5]));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod integrator;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::BridgeConfig;
pub use crate::core::packet::{Packet, RawPacket, SessionId};
pub use crate::core::value::Value;
pub use crate::error::{BridgeError, Result};
pub use crate::protocol::{DispatchOutcome, Facade, PacketData, Registry, ServiceContext, ServiceEvent};
pub use crate::service::Service;
