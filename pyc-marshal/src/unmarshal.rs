//! Tag dispatch: one marshal value at a time.
//!
//! Each value starts with a tag byte. The high bit (`FLAG_REF`) asks the
//! reader to record the finished value in the shared-object table so a later
//! `r` tag can point back at it; the remaining seven bits select the rule.

use std::sync::Arc;

use num_bigint::BigInt;
use num_complex::Complex64;
use num_traits::Zero;

use crate::code::{CodeBuilder, CodeObject};
use crate::error::{MarshalError, Result, TagByte};
use crate::reader::Reader;
use crate::revision::{RefOpcodes, Revision};
use crate::tables::RefTables;
use crate::value::DecodedValue;

pub const FLAG_REF: u8 = 0x80;

/// Nesting limit applied when no [`DecodeOptions`] are given.
pub const DEFAULT_MAX_DEPTH: usize = 2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Maximum nesting of compound values (tuples, sets, code objects).
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Null = b'0',
    None = b'N',
    False = b'F',
    True = b'T',
    StopIteration = b'S',
    Ellipsis = b'.',
    Int = b'i',
    Int64 = b'I',
    Float = b'f',
    BinaryFloat = b'g',
    Complex = b'x',
    BinaryComplex = b'y',
    Long = b'l',
    String = b's',
    Interned = b't',
    StringRef = b'R',
    ObjectRef = b'r',
    Tuple = b'(',
    SmallTuple = b')',
    List = b'[',
    Dict = b'{',
    Code = b'c',
    OldCode = b'C',
    Unicode = b'u',
    Unknown = b'?',
    Set = b'<',
    FrozenSet = b'>',
    Ascii = b'a',
    AsciiInterned = b'A',
    ShortAscii = b'z',
    ShortAsciiInterned = b'Z',
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(b: u8) -> std::result::Result<Self, u8> {
        let tag = match b {
            b'0' => Tag::Null,
            b'N' => Tag::None,
            b'F' => Tag::False,
            b'T' => Tag::True,
            b'S' => Tag::StopIteration,
            b'.' => Tag::Ellipsis,
            b'i' => Tag::Int,
            b'I' => Tag::Int64,
            b'f' => Tag::Float,
            b'g' => Tag::BinaryFloat,
            b'x' => Tag::Complex,
            b'y' => Tag::BinaryComplex,
            b'l' => Tag::Long,
            b's' => Tag::String,
            b't' => Tag::Interned,
            b'R' => Tag::StringRef,
            b'r' => Tag::ObjectRef,
            b'(' => Tag::Tuple,
            b')' => Tag::SmallTuple,
            b'[' => Tag::List,
            b'{' => Tag::Dict,
            b'c' => Tag::Code,
            b'C' => Tag::OldCode,
            b'u' => Tag::Unicode,
            b'?' => Tag::Unknown,
            b'<' => Tag::Set,
            b'>' => Tag::FrozenSet,
            b'a' => Tag::Ascii,
            b'A' => Tag::AsciiInterned,
            b'z' => Tag::ShortAscii,
            b'Z' => Tag::ShortAsciiInterned,
            _ => return Err(b),
        };
        Ok(tag)
    }
}

#[cold]
fn unsupported(byte: u8, offset: usize) -> MarshalError {
    MarshalError::UnsupportedTag {
        tag: TagByte(byte),
        offset,
    }
}

/// Text payloads are UTF-8 in every revision that has a text type; anything
/// else is replaced rather than rejected.
pub(crate) fn decode_text(bytes: &[u8], offset: usize) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            log::warn!("invalid UTF-8 in text at offset 0x{:X}, replacing", offset);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Compound value whose elements are still being read.
enum Pending {
    Seq {
        kind: SeqKind,
        len: usize,
        items: Vec<DecodedValue>,
    },
    Code(Box<CodeBuilder>),
}

#[derive(Clone, Copy)]
enum SeqKind {
    Tuple,
    Set,
    FrozenSet,
}

struct Frame {
    pending: Pending,
    flagged: bool,
    offset: usize,
}

impl Frame {
    fn is_complete(&self) -> bool {
        match &self.pending {
            Pending::Seq { len, items, .. } => items.len() == *len,
            Pending::Code(code) => code.is_complete(),
        }
    }
}

/// Per-call decoding state. Everything it mutates is borrowed from the caller.
///
/// Nesting is tracked on an explicit frame stack, so input depth costs heap
/// rather than native stack; `max_depth` bounds that stack.
pub(crate) struct Unmarshaller<'r, 'a> {
    pub(crate) reader: &'r mut Reader<'a>,
    pub(crate) revision: &'r Revision,
    pub(crate) tables: &'r mut RefTables,
    max_depth: usize,
}

impl<'r, 'a> Unmarshaller<'r, 'a> {
    pub(crate) fn new(
        reader: &'r mut Reader<'a>,
        revision: &'r Revision,
        tables: &'r mut RefTables,
        options: &DecodeOptions,
    ) -> Self {
        Self {
            reader,
            revision,
            tables,
            max_depth: options.max_depth,
        }
    }

    pub(crate) fn value(&mut self) -> Result<DecodedValue> {
        self.drive(Vec::new())
    }

    /// Body of a code object whose `c` tag has already been consumed.
    pub(crate) fn code_object(&mut self) -> Result<CodeObject> {
        let offset = self.reader.position();
        let frame = Frame {
            pending: Pending::Code(Box::new(self.code_header()?)),
            flagged: false,
            offset,
        };
        match self.drive(vec![frame])? {
            DecodedValue::Code(code) => {
                Ok(Arc::try_unwrap(code).unwrap_or_else(|shared| CodeObject::clone(&shared)))
            }
            other => Err(MarshalError::FieldType {
                field: "top level",
                expected: "code",
                found: other.type_name(),
            }),
        }
    }

    fn drive(&mut self, mut stack: Vec<Frame>) -> Result<DecodedValue> {
        let mut ready: Option<(DecodedValue, usize)> = None;
        loop {
            if let Some((value, at)) = ready.take() {
                let Some(parent) = stack.last_mut() else {
                    return Ok(value);
                };
                match &mut parent.pending {
                    Pending::Seq { items, .. } => items.push(value),
                    Pending::Code(code) => code.accept(value, at, self.reader, self.revision)?,
                }
            }

            if stack.last().is_some_and(Frame::is_complete) {
                if let Some(frame) = stack.pop() {
                    let at = frame.offset;
                    ready = Some((self.close(frame), at));
                }
                continue;
            }

            let offset = self.reader.position();
            ready = self.open(offset, &mut stack)?.map(|value| (value, offset));
        }
    }

    /// Read one tag. Scalars come back finished; compound values push a frame.
    fn open(&mut self, offset: usize, stack: &mut Vec<Frame>) -> Result<Option<DecodedValue>> {
        if stack.len() >= self.max_depth {
            return Err(MarshalError::TooDeep {
                limit: self.max_depth,
                offset,
            });
        }

        let byte = self.reader.read_u8()?;
        let flagged = byte & FLAG_REF != 0;
        if flagged {
            self.require_refs(RefOpcodes::ObjectRefs, byte, offset)?;
        }
        let tag = Tag::try_from(byte & !FLAG_REF).map_err(|b| unsupported(b, offset))?;
        log::trace!("{:?} at 0x{:X}", tag, offset);

        let pending = match tag {
            Tag::Tuple => self.seq(SeqKind::Tuple, "tuple")?,
            Tag::SmallTuple => {
                let len = self.reader.read_short_count("small tuple", 1)?;
                Pending::Seq {
                    kind: SeqKind::Tuple,
                    len,
                    items: Vec::with_capacity(len),
                }
            }
            Tag::Set => self.seq(SeqKind::Set, "set")?,
            Tag::FrozenSet => self.seq(SeqKind::FrozenSet, "frozenset")?,
            Tag::Code => Pending::Code(Box::new(self.code_header()?)),
            _ => {
                let value = self.scalar(tag, byte, offset)?;
                return Ok(Some(self.record(value, flagged)));
            }
        };
        stack.push(Frame {
            pending,
            flagged,
            offset,
        });
        Ok(None)
    }

    fn seq(&mut self, kind: SeqKind, what: &'static str) -> Result<Pending> {
        let len = self.reader.read_count(what, 1)?;
        Ok(Pending::Seq {
            kind,
            len,
            items: Vec::with_capacity(len),
        })
    }

    fn close(&mut self, frame: Frame) -> DecodedValue {
        let value = match frame.pending {
            Pending::Seq { kind, items, .. } => match kind {
                SeqKind::Tuple => DecodedValue::Tuple(items),
                SeqKind::Set => DecodedValue::Set(items),
                SeqKind::FrozenSet => DecodedValue::FrozenSet(items),
            },
            Pending::Code(code) => DecodedValue::Code(Arc::new(code.finish(self.revision))),
        };
        self.record(value, frame.flagged)
    }

    /// Flagged values go into the shared table once complete.
    fn record(&mut self, value: DecodedValue, flagged: bool) -> DecodedValue {
        if flagged {
            let index = self.tables.record(value.clone());
            log::trace!("recorded shared object #{} ({})", index, value.type_name());
        }
        value
    }

    fn require_refs(&self, needed: RefOpcodes, byte: u8, offset: usize) -> Result<()> {
        if self.revision.policy().ref_opcodes != needed {
            return Err(MarshalError::TagNotInRevision {
                tag: TagByte(byte),
                magic: self.revision.magic(),
                offset,
            });
        }
        Ok(())
    }

    fn scalar(&mut self, tag: Tag, byte: u8, offset: usize) -> Result<DecodedValue> {
        let value = match tag {
            Tag::Null => DecodedValue::Null,
            Tag::None => DecodedValue::None,
            Tag::False => DecodedValue::Bool(false),
            Tag::True => DecodedValue::Bool(true),
            Tag::StopIteration => DecodedValue::StopIteration,
            Tag::Ellipsis => DecodedValue::Ellipsis,
            Tag::Int => DecodedValue::SmallInt(i64::from(self.reader.read_i32()?)),
            Tag::Int64 => DecodedValue::SmallInt(self.reader.read_i64()?),
            Tag::Float => DecodedValue::Float(self.ascii_float()?),
            Tag::BinaryFloat => DecodedValue::Float(self.reader.read_f64()?),
            Tag::BinaryComplex => {
                let re = self.reader.read_f64()?;
                let im = self.reader.read_f64()?;
                DecodedValue::Complex(Complex64::new(re, im))
            }
            Tag::Long => DecodedValue::BigInt(self.long()?),
            Tag::String => {
                let n = self.reader.read_count("string", 1)?;
                DecodedValue::Bytes(self.reader.read_bytes(n)?.to_vec())
            }
            Tag::Unicode | Tag::Ascii => DecodedValue::Text(self.text(false)?),
            Tag::ShortAscii => DecodedValue::Text(self.text(true)?),
            Tag::Interned | Tag::AsciiInterned => DecodedValue::Text(self.interned_text(false)?),
            Tag::ShortAsciiInterned => DecodedValue::Text(self.interned_text(true)?),
            Tag::StringRef => {
                self.require_refs(RefOpcodes::StringRefs, byte, offset)?;
                let index = self.reader.read_i32()?;
                DecodedValue::Text(self.tables.interned(i64::from(index))?.to_string())
            }
            Tag::ObjectRef => {
                self.require_refs(RefOpcodes::ObjectRefs, byte, offset)?;
                let index = self.reader.read_i32()?;
                self.tables.shared(i64::from(index))?.clone()
            }
            Tag::Tuple
            | Tag::SmallTuple
            | Tag::Set
            | Tag::FrozenSet
            | Tag::Code
            | Tag::List
            | Tag::Dict
            | Tag::Complex
            | Tag::OldCode
            | Tag::Unknown => return Err(unsupported(byte, offset)),
        };
        Ok(value)
    }

    fn text(&mut self, short: bool) -> Result<String> {
        let n = if short {
            self.reader.read_short_count("short text", 1)?
        } else {
            self.reader.read_count("text", 1)?
        };
        let offset = self.reader.position();
        Ok(decode_text(self.reader.read_bytes(n)?, offset))
    }

    fn interned_text(&mut self, short: bool) -> Result<String> {
        let s = self.text(short)?;
        self.tables.intern(s.clone());
        Ok(s)
    }

    /// `f`: the float's repr as a length-prefixed ASCII literal.
    fn ascii_float(&mut self) -> Result<f64> {
        let n = self.reader.read_short_count("float literal", 1)?;
        let offset = self.reader.position();
        let raw = self.reader.read_bytes(n)?;
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(|| MarshalError::BadFloat {
                literal: String::from_utf8_lossy(raw).into_owned(),
                offset,
            })
    }

    /// `l`: signed digit count, then 15-bit digits, least significant first.
    fn long(&mut self) -> Result<BigInt> {
        let offset = self.reader.position();
        let n = self.reader.read_i32()?;
        let size = n.unsigned_abs() as usize;
        if size.checked_mul(2).map_or(true, |need| need > self.reader.remaining()) {
            return Err(MarshalError::MalformedCount {
                what: "long digit",
                count: i64::from(n),
                offset,
            });
        }

        let mut digits = Vec::with_capacity(size);
        for _ in 0..size {
            let at = self.reader.position();
            let digit = self.reader.read_u16()?;
            if digit >= 1 << 15 {
                return Err(MarshalError::BadLongDigit { digit, offset: at });
            }
            digits.push(digit);
        }

        let mut value = BigInt::zero();
        for &digit in digits.iter().rev() {
            value = (value << 15usize) + BigInt::from(digit);
        }
        Ok(if n < 0 { -value } else { value })
    }
}

/// Decode one value, recording interned text and flagged objects in `tables`.
///
/// The reader is left directly after the value; trailing bytes are untouched.
pub fn decode_value(
    reader: &mut Reader<'_>,
    revision: &Revision,
    tables: &mut RefTables,
) -> Result<DecodedValue> {
    decode_value_with(reader, revision, tables, &DecodeOptions::default())
}

pub fn decode_value_with(
    reader: &mut Reader<'_>,
    revision: &Revision,
    tables: &mut RefTables,
    options: &DecodeOptions,
) -> Result<DecodedValue> {
    Unmarshaller::new(reader, revision, tables, options).value()
}
