//! # Format Specifiers
//!
//! Parser for the format-string mini-language that describes packet payloads,
//! plus a memoizing cache so each distinct specifier is parsed only once.
//!
//! ## Grammar
//! ```text
//! spec     := field*
//! field    := primitive | '[' field ']' | '{' field ':' field '}' | '(' field+ ')'
//! primitive:= 'b' | 'c' | 'C' | 'h' | 'H' | 'i' | 'I' | 'l' | 'L' | 'f' | 'd' | 'S'
//! ```
//!
//! ASCII whitespace between tokens is ignored, so `"i S [ i ] { i : S }"` and
//! `"iS[i]{i:S}"` describe the same payload.
//!
//! ## Tokens
//! | Token | Kind     | Wire width                |
//! |-------|----------|---------------------------|
//! | `b`   | bool     | 1                         |
//! | `c`/`C` | int8/uint8   | 1                   |
//! | `h`/`H` | int16/uint16 | 2                   |
//! | `i`/`I` | int32/uint32 | 4                   |
//! | `l`/`L` | int64/uint64 | 8                   |
//! | `f`   | float    | 4                         |
//! | `d`   | double   | 8                         |
//! | `S`   | string   | 4 (length) + UTF-8 bytes  |

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tracing::trace;

use crate::core::codec;
use crate::core::value::Value;
use crate::error::{FormatError, Result};

/// Parsed, shareable descriptor sequence.
pub type Descriptors = Arc<[FieldDescriptor]>;

/// Fixed-width and string primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Str,
}

impl PrimitiveKind {
    /// Map a format token to its primitive kind
    pub fn from_token(token: char) -> Option<Self> {
        let kind = match token {
            'b' => PrimitiveKind::Bool,
            'c' => PrimitiveKind::I8,
            'C' => PrimitiveKind::U8,
            'h' => PrimitiveKind::I16,
            'H' => PrimitiveKind::U16,
            'i' => PrimitiveKind::I32,
            'I' => PrimitiveKind::U32,
            'l' => PrimitiveKind::I64,
            'L' => PrimitiveKind::U64,
            'f' => PrimitiveKind::F32,
            'd' => PrimitiveKind::F64,
            'S' => PrimitiveKind::Str,
            _ => return None,
        };
        Some(kind)
    }

    /// The format token for this kind
    pub fn token(self) -> char {
        match self {
            PrimitiveKind::Bool => 'b',
            PrimitiveKind::I8 => 'c',
            PrimitiveKind::U8 => 'C',
            PrimitiveKind::I16 => 'h',
            PrimitiveKind::U16 => 'H',
            PrimitiveKind::I32 => 'i',
            PrimitiveKind::U32 => 'I',
            PrimitiveKind::I64 => 'l',
            PrimitiveKind::U64 => 'L',
            PrimitiveKind::F32 => 'f',
            PrimitiveKind::F64 => 'd',
            PrimitiveKind::Str => 'S',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I8 => "int8",
            PrimitiveKind::U8 => "uint8",
            PrimitiveKind::I16 => "int16",
            PrimitiveKind::U16 => "uint16",
            PrimitiveKind::I32 => "int32",
            PrimitiveKind::U32 => "uint32",
            PrimitiveKind::I64 => "int64",
            PrimitiveKind::U64 => "uint64",
            PrimitiveKind::F32 => "float",
            PrimitiveKind::F64 => "double",
            PrimitiveKind::Str => "string",
        }
    }

    /// Encoded width, `None` for length-prefixed strings.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            PrimitiveKind::Bool | PrimitiveKind::I8 | PrimitiveKind::U8 => Some(1),
            PrimitiveKind::I16 | PrimitiveKind::U16 => Some(2),
            PrimitiveKind::I32 | PrimitiveKind::U32 | PrimitiveKind::F32 => Some(4),
            PrimitiveKind::I64 | PrimitiveKind::U64 | PrimitiveKind::F64 => Some(8),
            PrimitiveKind::Str => None,
        }
    }
}

/// Shape of one field in a format specifier.
///
/// Descriptors own their children, so a descriptor tree is finite and always
/// bottoms out in primitives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldDescriptor {
    Primitive(PrimitiveKind),
    Sequence(Box<FieldDescriptor>),
    Mapping(Box<FieldDescriptor>, Box<FieldDescriptor>),
    Tuple(Vec<FieldDescriptor>),
}

impl FieldDescriptor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldDescriptor::Primitive(kind) => kind.name(),
            FieldDescriptor::Sequence(_) => "sequence",
            FieldDescriptor::Mapping(_, _) => "mapping",
            FieldDescriptor::Tuple(_) => "tuple",
        }
    }

    /// Smallest number of bytes any value of this shape encodes to.
    pub fn min_encoded_len(&self) -> usize {
        match self {
            FieldDescriptor::Primitive(kind) => kind.fixed_width().unwrap_or(codec::PREFIX_WIDTH),
            FieldDescriptor::Sequence(_) | FieldDescriptor::Mapping(_, _) => codec::PREFIX_WIDTH,
            FieldDescriptor::Tuple(fields) => fields.iter().map(Self::min_encoded_len).sum(),
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDescriptor::Primitive(kind) => write!(f, "{}", kind.token()),
            FieldDescriptor::Sequence(elem) => write!(f, "[{elem}]"),
            FieldDescriptor::Mapping(key, value) => write!(f, "{{{key}:{value}}}"),
            FieldDescriptor::Tuple(fields) => {
                f.write_str("(")?;
                for field in fields {
                    write!(f, "{field}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Render a descriptor sequence back to its canonical (whitespace-free) specifier.
pub fn canonical(descriptors: &[FieldDescriptor]) -> String {
    descriptors.iter().map(ToString::to_string).collect()
}

/// Parse a format specifier into its descriptor sequence.
pub fn parse(spec: &str) -> std::result::Result<Vec<FieldDescriptor>, FormatError> {
    let mut parser = Parser {
        len: spec.len(),
        chars: spec.char_indices().peekable(),
    };
    let fields = parser.fields(None)?;
    if fields.is_empty() {
        return Err(FormatError::Empty);
    }
    Ok(fields.into_iter().map(|(_, field)| field).collect())
}

struct Parser<'a> {
    len: usize,
    chars: Peekable<CharIndices<'a>>,
}

type Positioned = (usize, FieldDescriptor);

impl Parser<'_> {
    fn peek(&mut self) -> Option<(usize, char)> {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
        self.chars.peek().copied()
    }

    /// Parse fields until `terminator` (left unconsumed) or end of input.
    fn fields(
        &mut self,
        terminator: Option<char>,
    ) -> std::result::Result<Vec<Positioned>, FormatError> {
        let mut fields = Vec::new();
        loop {
            let Some((pos, c)) = self.peek() else {
                if terminator.is_some() {
                    return Err(FormatError::Malformed {
                        position: self.len,
                        found: None,
                        reason: "unterminated group",
                    });
                }
                return Ok(fields);
            };
            if Some(c) == terminator {
                return Ok(fields);
            }
            self.chars.next();

            let field = match c {
                '[' => {
                    let elem = self.single(']', "sequence must hold exactly one field")?;
                    FieldDescriptor::Sequence(Box::new(elem))
                }
                '{' => {
                    let key = self.single(':', "mapping key must be exactly one field")?;
                    let value = self.single('}', "mapping value must be exactly one field")?;
                    FieldDescriptor::Mapping(Box::new(key), Box::new(value))
                }
                '(' => {
                    let inner = self.fields(Some(')'))?;
                    let (close, _) = self.close();
                    if inner.is_empty() {
                        return Err(FormatError::Malformed {
                            position: close,
                            found: Some(')'),
                            reason: "tuple must hold at least one field",
                        });
                    }
                    FieldDescriptor::Tuple(inner.into_iter().map(|(_, f)| f).collect())
                }
                ']' | '}' | ')' | ':' => {
                    return Err(FormatError::Malformed {
                        position: pos,
                        found: Some(c),
                        reason: "unexpected delimiter",
                    });
                }
                token => match PrimitiveKind::from_token(token) {
                    Some(kind) => FieldDescriptor::Primitive(kind),
                    None => {
                        return Err(FormatError::Malformed {
                            position: pos,
                            found: Some(token),
                            reason: "unknown token",
                        });
                    }
                },
            };
            fields.push((pos, field));
        }
    }

    /// Parse exactly one field followed by `close`.
    fn single(
        &mut self,
        close: char,
        reason: &'static str,
    ) -> std::result::Result<FieldDescriptor, FormatError> {
        let mut inner = self.fields(Some(close))?;
        let (close_pos, close_char) = self.close();
        match inner.len() {
            1 => Ok(inner.remove(0).1),
            0 => Err(FormatError::Malformed {
                position: close_pos,
                found: Some(close_char),
                reason,
            }),
            _ => {
                let (position, _) = inner[1];
                Err(FormatError::Malformed {
                    position,
                    found: None,
                    reason,
                })
            }
        }
    }

    /// Consume the terminator `fields` stopped on.
    fn close(&mut self) -> (usize, char) {
        self.chars.next().unwrap_or((self.len, '\0'))
    }
}

/// Memoizing, thread-safe cache of parsed specifiers.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct FormatCache {
    entries: Arc<RwLock<HashMap<String, Descriptors>>>,
}

impl FormatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached descriptors for `spec`, parsing it on first use.
    pub fn get_or_parse(&self, spec: &str) -> std::result::Result<Descriptors, FormatError> {
        // Entries are immutable once inserted, so a poisoned lock still holds valid data.
        if let Some(hit) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(spec)
        {
            return Ok(Arc::clone(hit));
        }

        let parsed: Descriptors = parse(spec)?.into();
        trace!(spec, fields = parsed.len(), "Parsed format specifier");

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(spec.to_owned())
            .or_insert_with(|| Arc::clone(&parsed));
        Ok(Arc::clone(entry))
    }

    /// Encode `values` with the specifier `spec`.
    pub fn pack(&self, spec: &str, values: &[Value]) -> Result<Bytes> {
        let descriptors = self.get_or_parse(spec)?;
        Ok(codec::encode(&descriptors, values)?)
    }

    /// Decode a payload with the specifier `spec`, returning values and bytes consumed.
    pub fn unpack(&self, spec: &str, input: &[u8]) -> Result<(Vec<Value>, usize)> {
        let descriptors = self.get_or_parse(spec)?;
        Ok(codec::decode(&descriptors, input)?)
    }

    /// Number of distinct specifiers cached
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
