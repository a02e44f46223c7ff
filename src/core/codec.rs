//! # Binary Codec
//!
//! Encodes [`Value`] tuples to bytes and back, driven by a parsed descriptor
//! sequence.
//!
//! ## Wire Format
//! All multi-byte integers and floats are little-endian.
//! ```text
//! bool        [u8: 0x00 | 0x01]
//! intN/uintN  [N/8 bytes LE]
//! float       [4 bytes IEEE-754 LE]     double [8 bytes IEEE-754 LE]
//! string      [len: u32 LE] [UTF-8 bytes]
//! sequence    [count: u32 LE] [element]*
//! mapping     [count: u32 LE] ([key] [value])*
//! tuple       [field]*                  (no prefix)
//! ```
//!
//! ## Guarantees
//! - `decode(D, encode(D, V)) == (V, encode(D, V).len())`
//! - Decode never reads past the supplied buffer and reports the bytes it consumed
//! - Count prefixes are checked against the remaining input before allocating

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::format::{FieldDescriptor, PrimitiveKind};
use crate::core::value::Value;
use crate::error::constants::{ERR_INVALID_BOOL, ERR_INVALID_UTF8};
use crate::error::CodecError;

/// Width of string length and collection count prefixes.
pub const PREFIX_WIDTH: usize = 4;

/// Encode `values` according to `descriptors`.
pub fn encode(descriptors: &[FieldDescriptor], values: &[Value]) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(encoded_len(descriptors, values)?);
    encode_into(descriptors, values, &mut buf)?;
    Ok(buf.freeze())
}

/// Append the encoding of `values` to `dst`.
///
/// On error `dst` is restored to its original length.
pub fn encode_into(
    descriptors: &[FieldDescriptor],
    values: &[Value],
    dst: &mut BytesMut,
) -> Result<(), CodecError> {
    check_arity(descriptors.len(), values.len())?;

    let start = dst.len();
    let result = descriptors
        .iter()
        .zip(values)
        .try_for_each(|(desc, value)| encode_field(desc, value, dst));
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

/// Exact number of bytes `encode` would produce.
pub fn encoded_len(descriptors: &[FieldDescriptor], values: &[Value]) -> Result<usize, CodecError> {
    check_arity(descriptors.len(), values.len())?;
    descriptors
        .iter()
        .zip(values)
        .try_fold(0usize, |acc, (desc, value)| Ok(acc + field_len(desc, value)?))
}

/// Decode one value per descriptor from the front of `input`.
///
/// Returns the values and the number of bytes consumed; trailing bytes are left
/// for the caller.
pub fn decode(
    descriptors: &[FieldDescriptor],
    input: &[u8],
) -> Result<(Vec<Value>, usize), CodecError> {
    let mut buf = input;
    let values = descriptors
        .iter()
        .map(|desc| decode_field(desc, &mut buf))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((values, input.len() - buf.remaining()))
}

fn check_arity(expected: usize, found: usize) -> Result<(), CodecError> {
    if expected != found {
        return Err(CodecError::Arity { expected, found });
    }
    Ok(())
}

fn mismatch(desc: &FieldDescriptor, value: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected: desc.kind_name(),
        found: value.kind_name(),
    }
}

fn put_prefix(len: usize, dst: &mut BytesMut) -> Result<(), CodecError> {
    let prefix = u32::try_from(len).map_err(|_| CodecError::Oversized {
        size: len,
        limit: u32::MAX as usize,
    })?;
    dst.put_u32_le(prefix);
    Ok(())
}

fn encode_field(desc: &FieldDescriptor, value: &Value, dst: &mut BytesMut) -> Result<(), CodecError> {
    use FieldDescriptor as D;
    use PrimitiveKind as K;

    match (desc, value) {
        (D::Primitive(K::Bool), Value::Bool(v)) => dst.put_u8(u8::from(*v)),
        (D::Primitive(K::I8), Value::I8(v)) => dst.put_i8(*v),
        (D::Primitive(K::U8), Value::U8(v)) => dst.put_u8(*v),
        (D::Primitive(K::I16), Value::I16(v)) => dst.put_i16_le(*v),
        (D::Primitive(K::U16), Value::U16(v)) => dst.put_u16_le(*v),
        (D::Primitive(K::I32), Value::I32(v)) => dst.put_i32_le(*v),
        (D::Primitive(K::U32), Value::U32(v)) => dst.put_u32_le(*v),
        (D::Primitive(K::I64), Value::I64(v)) => dst.put_i64_le(*v),
        (D::Primitive(K::U64), Value::U64(v)) => dst.put_u64_le(*v),
        (D::Primitive(K::F32), Value::F32(v)) => dst.put_f32_le(*v),
        (D::Primitive(K::F64), Value::F64(v)) => dst.put_f64_le(*v),
        (D::Primitive(K::Str), Value::Str(s)) => {
            put_prefix(s.len(), dst)?;
            dst.put_slice(s.as_bytes());
        }
        (D::Sequence(elem), Value::Seq(items)) => {
            put_prefix(items.len(), dst)?;
            for item in items {
                encode_field(elem, item, dst)?;
            }
        }
        (D::Mapping(key_desc, value_desc), Value::Map(pairs)) => {
            put_prefix(pairs.len(), dst)?;
            for (key, value) in pairs {
                encode_field(key_desc, key, dst)?;
                encode_field(value_desc, value, dst)?;
            }
        }
        (D::Tuple(fields), Value::Tuple(items)) => {
            check_arity(fields.len(), items.len())?;
            for (field, item) in fields.iter().zip(items) {
                encode_field(field, item, dst)?;
            }
        }
        (desc, value) => return Err(mismatch(desc, value)),
    }
    Ok(())
}

fn field_len(desc: &FieldDescriptor, value: &Value) -> Result<usize, CodecError> {
    use FieldDescriptor as D;

    match (desc, value) {
        (D::Primitive(PrimitiveKind::Str), Value::Str(s)) => Ok(PREFIX_WIDTH + s.len()),
        (D::Primitive(kind), value) => match kind.fixed_width() {
            Some(width) if kind.name() == value.kind_name() => Ok(width),
            _ => Err(mismatch(desc, value)),
        },
        (D::Sequence(elem), Value::Seq(items)) => items
            .iter()
            .try_fold(PREFIX_WIDTH, |acc, item| Ok(acc + field_len(elem, item)?)),
        (D::Mapping(key_desc, value_desc), Value::Map(pairs)) => {
            pairs.iter().try_fold(PREFIX_WIDTH, |acc, (key, value)| {
                Ok(acc + field_len(key_desc, key)? + field_len(value_desc, value)?)
            })
        }
        (D::Tuple(fields), Value::Tuple(items)) => {
            check_arity(fields.len(), items.len())?;
            fields
                .iter()
                .zip(items)
                .try_fold(0, |acc, (field, item)| Ok(acc + field_len(field, item)?))
        }
        (desc, value) => Err(mismatch(desc, value)),
    }
}

#[inline]
fn need(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Read a count prefix and check that `count` elements of at least
/// `min_width` bytes each could still fit in the input.
fn read_count(buf: &mut &[u8], min_width: usize) -> Result<usize, CodecError> {
    need(buf, PREFIX_WIDTH)?;
    let count = buf.get_u32_le() as usize;
    need(buf, count.saturating_mul(min_width))?;
    Ok(count)
}

fn decode_field(desc: &FieldDescriptor, buf: &mut &[u8]) -> Result<Value, CodecError> {
    use FieldDescriptor as D;

    let value = match desc {
        D::Primitive(PrimitiveKind::Str) => {
            need(buf, PREFIX_WIDTH)?;
            let len = buf.get_u32_le() as usize;
            need(buf, len)?;
            let text = std::str::from_utf8(&buf[..len])
                .map_err(|_| CodecError::InvalidEncoding(ERR_INVALID_UTF8))?
                .to_owned();
            buf.advance(len);
            Value::Str(text)
        }
        D::Primitive(kind) => {
            need(buf, kind.fixed_width().unwrap_or(0))?;
            decode_fixed(*kind, buf)?
        }
        D::Sequence(elem) => {
            let count = read_count(buf, elem.min_encoded_len())?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_field(elem, buf)?);
            }
            Value::Seq(items)
        }
        D::Mapping(key_desc, value_desc) => {
            let count = read_count(buf, key_desc.min_encoded_len() + value_desc.min_encoded_len())?;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = decode_field(key_desc, buf)?;
                let value = decode_field(value_desc, buf)?;
                pairs.push((key, value));
            }
            Value::Map(pairs)
        }
        D::Tuple(fields) => Value::Tuple(
            fields
                .iter()
                .map(|field| decode_field(field, buf))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };
    Ok(value)
}

/// Width has already been checked by the caller.
fn decode_fixed(kind: PrimitiveKind, buf: &mut &[u8]) -> Result<Value, CodecError> {
    let value = match kind {
        PrimitiveKind::Bool => match buf.get_u8() {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            _ => return Err(CodecError::InvalidEncoding(ERR_INVALID_BOOL)),
        },
        PrimitiveKind::I8 => Value::I8(buf.get_i8()),
        PrimitiveKind::U8 => Value::U8(buf.get_u8()),
        PrimitiveKind::I16 => Value::I16(buf.get_i16_le()),
        PrimitiveKind::U16 => Value::U16(buf.get_u16_le()),
        PrimitiveKind::I32 => Value::I32(buf.get_i32_le()),
        PrimitiveKind::U32 => Value::U32(buf.get_u32_le()),
        PrimitiveKind::I64 => Value::I64(buf.get_i64_le()),
        PrimitiveKind::U64 => Value::U64(buf.get_u64_le()),
        PrimitiveKind::F32 => Value::F32(buf.get_f32_le()),
        PrimitiveKind::F64 => Value::F64(buf.get_f64_le()),
        PrimitiveKind::Str => unreachable!("strings are decoded by decode_field"),
    };
    Ok(value)
}
