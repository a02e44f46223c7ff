//! # Handler Registry
//!
//! Binds opcodes to typed packet registrations and types to exception handlers.
//!
//! A registration couples one payload type with its format, its encode and
//! decode functions, and the handler that consumes decoded packets. Formats are
//! parsed when the registration is made, so a malformed specifier fails during
//! setup rather than on the first packet.
//!
//! The registry is built before the service starts and is read-only while
//! events are dispatched.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::core::codec;
use crate::core::format::{canonical, Descriptors, FormatCache};
use crate::core::packet::{Packet, SessionId};
use crate::core::value::Value;
use crate::error::{BoxError, CodecError, DispatchError, FailureStage, FormatError};
use crate::protocol::context::ServiceContext;

/// Type-erased decoded payload
pub type AnyPayload = Box<dyn Any + Send>;

type EncodeFn = dyn Fn(&dyn Any) -> Result<Bytes, CodecError> + Send + Sync;
type DecodeFn = dyn Fn(&[u8]) -> Result<AnyPayload, CodecError> + Send + Sync;
type HandleFn = dyn Fn(&mut ServiceContext<'_>, Packet<AnyPayload>) -> Result<Option<AnyPayload>, BoxError>
    + Send
    + Sync;

/// Callback invoked when decode, handle or encode fails for a packet type.
pub type ExceptionFn =
    dyn Fn(&mut ServiceContext<'_>, &FailureContext, &DispatchError) + Send + Sync;

/// A payload type with a fixed format specifier.
///
/// ```rust
/// use packet_bridge::core::value::{fields, Value};
/// use packet_bridge::error::CodecError;
/// use packet_bridge::protocol::registry::PacketData;
///
/// struct Login {
///     user: String,
///     level: i32,
/// }
///
/// impl PacketData for Login {
///     const FORMAT: &'static str = "Si";
///
///     fn to_values(&self) -> Vec<Value> {
///         vec![self.user.as_str().into(), self.level.into()]
///     }
///
///     fn from_values(values: Vec<Value>) -> Result<Self, CodecError> {
///         let [user, level] = fields(values)?;
///         Ok(Login { user: user.into_string()?, level: level.as_i32()? })
///     }
/// }
/// ```
pub trait PacketData: Sized + Send + 'static {
    const FORMAT: &'static str;

    fn to_values(&self) -> Vec<Value>;

    fn from_values(values: Vec<Value>) -> Result<Self, CodecError>;
}

/// Identity of a registered payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Where and why a packet failed, handed to exception handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub service: String,
    pub opcode: u32,
    pub session_id: SessionId,
    pub stage: FailureStage,
    pub type_name: &'static str,
}

/// One opcode's encode + decode + handle triple.
pub struct Registration {
    opcode: u32,
    type_key: TypeKey,
    descriptors: Descriptors,
    encode: Box<EncodeFn>,
    decode: Box<DecodeFn>,
    handle: Box<HandleFn>,
}

impl Registration {
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn type_name(&self) -> &'static str {
        self.type_key.name
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    /// Canonical form of the registered format
    pub fn format(&self) -> String {
        canonical(&self.descriptors)
    }

    /// Encode a payload of the registered type.
    pub fn encode(&self, value: &dyn Any) -> Result<Bytes, CodecError> {
        (self.encode)(value)
    }

    /// Decode raw payload bytes into the registered type.
    pub fn decode(&self, bytes: &[u8]) -> Result<AnyPayload, CodecError> {
        (self.decode)(bytes)
    }

    /// Encode plain values with the registered descriptors.
    pub fn encode_values(&self, values: &[Value]) -> Result<Bytes, CodecError> {
        codec::encode(&self.descriptors, values)
    }

    pub(crate) fn handle(
        &self,
        ctx: &mut ServiceContext<'_>,
        packet: Packet<AnyPayload>,
    ) -> Result<Option<AnyPayload>, BoxError> {
        (self.handle)(ctx, packet)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("opcode", &self.opcode)
            .field("type", &self.type_key.name)
            .field("format", &self.format())
            .finish()
    }
}

/// Registrations and exception bindings for one service instance.
#[derive(Default)]
pub struct Registry {
    formats: FormatCache,
    by_opcode: HashMap<u32, Registration>,
    by_type: HashMap<TypeKey, u32>,
    order: Vec<u32>,
    exception_handlers: HashMap<TypeKey, Box<ExceptionFn>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing format cache with this registry.
    pub fn with_format_cache(formats: FormatCache) -> Self {
        Self {
            formats,
            ..Self::default()
        }
    }

    pub fn formats(&self) -> &FormatCache {
        &self.formats
    }

    /// Register `T` under `opcode` using its [`PacketData`] conversions.
    pub fn register<T, H>(&mut self, opcode: u32, handle: H) -> Result<(), FormatError>
    where
        T: PacketData,
        H: Fn(&mut ServiceContext<'_>, Packet<T>) -> Result<Option<T>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.register_fn(
            opcode,
            T::FORMAT,
            |value: &T| Ok(value.to_values()),
            T::from_values,
            handle,
        )
    }

    /// Register `T` under `opcode` with explicit encode, decode and handle functions.
    pub fn register_fn<T, E, D, H>(
        &mut self,
        opcode: u32,
        format: &str,
        to_values: E,
        from_values: D,
        handle: H,
    ) -> Result<(), FormatError>
    where
        T: Send + 'static,
        E: Fn(&T) -> Result<Vec<Value>, CodecError> + Send + Sync + 'static,
        D: Fn(Vec<Value>) -> Result<T, CodecError> + Send + Sync + 'static,
        H: Fn(&mut ServiceContext<'_>, Packet<T>) -> Result<Option<T>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let descriptors = self.formats.get_or_parse(format)?;
        let type_key = TypeKey::of::<T>();

        let encode_descriptors = Arc::clone(&descriptors);
        let encode: Box<EncodeFn> = Box::new(move |value: &dyn Any| {
            let value = value.downcast_ref::<T>().ok_or_else(|| {
                CodecError::Conversion(format!("payload is not a {}", type_name::<T>()))
            })?;
            codec::encode(&encode_descriptors, &to_values(value)?)
        });

        let decode_descriptors = Arc::clone(&descriptors);
        let decode: Box<DecodeFn> = Box::new(move |bytes: &[u8]| {
            let (values, consumed) = codec::decode(&decode_descriptors, bytes)?;
            if consumed < bytes.len() {
                trace!(
                    payload = type_name::<T>(),
                    trailing = bytes.len() - consumed,
                    "Ignoring trailing payload bytes"
                );
            }
            Ok(Box::new(from_values(values)?) as AnyPayload)
        });

        let handle_fn: Box<HandleFn> = Box::new(
            move |ctx: &mut ServiceContext<'_>, packet: Packet<AnyPayload>| {
                let Packet {
                    opcode,
                    session_id,
                    status,
                    payload,
                } = packet;
                let payload = payload.downcast::<T>().map_err(|_| -> BoxError {
                    format!("payload is not a {}", type_name::<T>()).into()
                })?;
                let typed = Packet {
                    opcode,
                    session_id,
                    status,
                    payload: *payload,
                };
                Ok(handle(ctx, typed)?.map(|response| Box::new(response) as AnyPayload))
            },
        );

        self.insert(Registration {
            opcode,
            type_key,
            descriptors,
            encode,
            decode,
            handle: handle_fn,
        });
        Ok(())
    }

    fn insert(&mut self, registration: Registration) {
        let opcode = registration.opcode;
        let type_key = registration.type_key;

        if let Some(previous) = self.by_opcode.remove(&opcode) {
            warn!(
                opcode,
                previous = previous.type_name(),
                replacement = type_key.name,
                "Opcode registered twice, replacing earlier registration"
            );
            self.order.retain(|op| *op != opcode);
            if self.by_type.get(&previous.type_key) == Some(&opcode) {
                self.rebind_type(previous.type_key);
            }
        }

        if let Some(old_opcode) = self.by_type.insert(type_key, opcode) {
            if old_opcode != opcode {
                warn!(
                    payload = type_key.name,
                    old_opcode,
                    new_opcode = opcode,
                    "Type rebound to a new opcode, sends will use the new one"
                );
            }
        }

        debug!(opcode, payload = type_key.name, format = %registration.format(), "Registered packet");
        self.order.push(opcode);
        self.by_opcode.insert(opcode, registration);
    }

    /// Bind the exception handler for payload type `T`.
    pub fn register_exception_handler<T, F>(&mut self, handler: F)
    where
        T: 'static,
        F: Fn(&mut ServiceContext<'_>, &FailureContext, &DispatchError) + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        if self
            .exception_handlers
            .insert(key, Box::new(handler))
            .is_some()
        {
            warn!(payload = key.name, "Exception handler replaced");
        }
    }

    pub fn lookup_by_opcode(&self, opcode: u32) -> Option<&Registration> {
        self.by_opcode.get(&opcode)
    }

    /// Points `type_key` at its most recent surviving opcode, or unbinds it.
    fn rebind_type(&mut self, type_key: TypeKey) {
        let surviving = self
            .order
            .iter()
            .rev()
            .copied()
            .find(|op| self.by_opcode.get(op).is_some_and(|reg| reg.type_key == type_key));
        match surviving {
            Some(opcode) => {
                debug!(payload = type_key.name, opcode, "Type falls back to earlier opcode");
                self.by_type.insert(type_key, opcode);
            }
            None => {
                self.by_type.remove(&type_key);
            }
        }
    }

    pub fn lookup_by_type<T: 'static>(&self) -> Option<&Registration> {
        self.by_type
            .get(&TypeKey::of::<T>())
            .and_then(|opcode| self.by_opcode.get(opcode))
    }

    pub fn opcode_of<T: 'static>(&self) -> Option<u32> {
        self.lookup_by_type::<T>().map(Registration::opcode)
    }

    pub fn lookup_exception_handler(&self, key: &TypeKey) -> Option<&ExceptionFn> {
        self.exception_handlers.get(key).map(Box::as_ref)
    }

    /// Registered opcodes in registration order.
    pub fn opcodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.by_opcode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_opcode.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registrations", &self.order)
            .field("exception_handlers", &self.exception_handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::fields;

    #[derive(Debug, PartialEq)]
    struct Ping(i32);

    impl PacketData for Ping {
        const FORMAT: &'static str = "i";

        fn to_values(&self) -> Vec<Value> {
            vec![self.0.into()]
        }

        fn from_values(values: Vec<Value>) -> Result<Self, CodecError> {
            let [v] = fields(values)?;
            Ok(Ping(v.as_i32()?))
        }
    }

    struct Pong;

    fn noop<T>(_: &mut ServiceContext<'_>, _: Packet<T>) -> Result<Option<T>, BoxError> {
        Ok(None)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry.register::<Ping, _>(5, noop).unwrap();

        let reg = registry.lookup_by_opcode(5).unwrap();
        assert_eq!(reg.type_key(), TypeKey::of::<Ping>());
        assert_eq!(reg.format(), "i");
        assert_eq!(registry.opcode_of::<Ping>(), Some(5));
        assert!(registry.lookup_by_opcode(6).is_none());
    }

    #[test]
    fn test_registered_codec_roundtrip() {
        let mut registry = Registry::new();
        registry.register::<Ping, _>(1, noop).unwrap();
        let reg = registry.lookup_by_opcode(1).unwrap();

        let bytes = reg.encode(&Ping(77)).unwrap();
        assert_eq!(&bytes[..], &77i32.to_le_bytes());
        let decoded = reg.decode(&bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<Ping>(), Some(&Ping(77)));

        assert!(matches!(reg.encode(&"wrong"), Err(CodecError::Conversion(_))));
    }

    #[test]
    fn test_malformed_format_fails_registration() {
        let mut registry = Registry::new();
        let err = registry
            .register_fn::<Pong, _, _, _>(
                2,
                "i[",
                |_| Ok(vec![]),
                |_| Ok(Pong),
                noop,
            )
            .unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistering_opcode_replaces() {
        let mut registry = Registry::new();
        registry.register::<Ping, _>(5, noop).unwrap();
        registry
            .register_fn::<Pong, _, _, _>(5, "b", |_| Ok(vec![Value::Bool(true)]), |_| Ok(Pong), noop)
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup_by_opcode(5).unwrap().type_key(), TypeKey::of::<Pong>());
        assert_eq!(registry.opcode_of::<Ping>(), None);
        assert_eq!(registry.opcodes().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_replaced_opcode_falls_back_to_surviving_binding() {
        let mut registry = Registry::new();
        registry.register::<Ping, _>(1, noop).unwrap();
        registry.register::<Ping, _>(2, noop).unwrap();
        assert_eq!(registry.opcode_of::<Ping>(), Some(2));

        registry
            .register_fn::<Pong, _, _, _>(2, "b", |_| Ok(vec![Value::Bool(true)]), |_| Ok(Pong), noop)
            .unwrap();

        assert_eq!(registry.opcode_of::<Ping>(), Some(1));
        assert_eq!(registry.lookup_by_type::<Ping>().unwrap().format(), "i");
        assert_eq!(registry.opcode_of::<Pong>(), Some(2));
        assert_eq!(registry.opcodes().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_registration_order() {
        let mut registry = Registry::new();
        registry.register::<Ping, _>(30, noop).unwrap();
        registry
            .register_fn::<Pong, _, _, _>(10, "b", |_| Ok(vec![Value::Bool(false)]), |_| Ok(Pong), noop)
            .unwrap();
        assert_eq!(registry.opcodes().collect::<Vec<_>>(), vec![30, 10]);
    }

    #[test]
    fn test_exception_handler_lookup() {
        let mut registry = Registry::new();
        registry.register_exception_handler::<Ping, _>(|_, _, _| {});
        assert!(registry
            .lookup_exception_handler(&TypeKey::of::<Ping>())
            .is_some());
        assert!(registry
            .lookup_exception_handler(&TypeKey::of::<Pong>())
            .is_none());
    }
}
