//! # Values
//!
//! Dynamically-typed value tree exchanged with the binary codec.
//!
//! Each [`Value`] variant corresponds to one descriptor shape. Mappings are kept
//! as ordered `(key, value)` pairs; duplicate keys survive a decode untouched.

use crate::error::CodecError;

/// One field value, shaped like a [`FieldDescriptor`](crate::core::format::FieldDescriptor).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
}

/// Strict by-value accessors for the scalar variants. No widening.
macro_rules! scalar_accessors {
    ($($name:ident => $variant:ident($ty:ty), $kind:literal;)*) => {
        $(
            pub fn $name(&self) -> Result<$ty, CodecError> {
                match self {
                    Value::$variant(v) => Ok(*v),
                    other => Err(mismatch($kind, other)),
                }
            }
        )*
    };
}

impl Value {
    /// Variant name, used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "int8",
            Value::U8(_) => "uint8",
            Value::I16(_) => "int16",
            Value::U16(_) => "uint16",
            Value::I32(_) => "int32",
            Value::U32(_) => "uint32",
            Value::I64(_) => "int64",
            Value::U64(_) => "uint64",
            Value::F32(_) => "float",
            Value::F64(_) => "double",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Build a mapping from any iterator of convertible pairs.
    pub fn map<K, V, I>(pairs: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    scalar_accessors! {
        as_bool => Bool(bool), "bool";
        as_i8 => I8(i8), "int8";
        as_u8 => U8(u8), "uint8";
        as_i16 => I16(i16), "int16";
        as_u16 => U16(u16), "uint16";
        as_i32 => I32(i32), "int32";
        as_u32 => U32(u32), "uint32";
        as_i64 => I64(i64), "int64";
        as_u64 => U64(u64), "uint64";
        as_f32 => F32(f32), "float";
        as_f64 => F64(f64), "double";
    }

    pub fn as_str(&self) -> Result<&str, CodecError> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(mismatch("string", other)),
        }
    }

    pub fn into_string(self) -> Result<String, CodecError> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn into_seq(self) -> Result<Vec<Value>, CodecError> {
        match self {
            Value::Seq(v) => Ok(v),
            other => Err(mismatch("sequence", &other)),
        }
    }

    pub fn into_map(self) -> Result<Vec<(Value, Value)>, CodecError> {
        match self {
            Value::Map(v) => Ok(v),
            other => Err(mismatch("mapping", &other)),
        }
    }

    pub fn into_tuple(self) -> Result<Vec<Value>, CodecError> {
        match self {
            Value::Tuple(v) => Ok(v),
            other => Err(mismatch("tuple", &other)),
        }
    }
}

/// Split a decoded value list into exactly `N` fields.
///
/// `let [id, name] = fields(values)?;`
pub fn fields<const N: usize>(values: Vec<Value>) -> Result<[Value; N], CodecError> {
    values.try_into().map_err(|values: Vec<Value>| CodecError::Arity {
        expected: N,
        found: values.len(),
    })
}

fn mismatch(expected: &'static str, found: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected,
        found: found.kind_name(),
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Seq(v.into_iter().map(Into::into).collect())
    }
}
