//! Code objects: the `c` tag.
//!
//! The field sequence is fixed, but which argument counts are present and how
//! wide the leading integer fields are depends on the revision. Counts a
//! revision does not encode are filled with 0 and listed in
//! [`CodeObject::synthesized`], so consumers keyed to a newer layout can tell
//! a real zero from a missing field.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::Serialize;

use crate::error::{MarshalError, Result};
use crate::reader::Reader;
use crate::revision::{FieldWidth, Revision};
use crate::tables::RefTables;
use crate::unmarshal::{decode_text, DecodeOptions, Unmarshaller};
use crate::value::DecodedValue;

bitflags! {
    /// Typed view of `co_flags`. Unknown bits are retained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x0001;
        const NEWLOCALS = 0x0002;
        const VARARGS = 0x0004;
        const VARKEYWORDS = 0x0008;
        const NESTED = 0x0010;
        const GENERATOR = 0x0020;
        const NOFREE = 0x0040;
        const COROUTINE = 0x0080;
        const ITERABLE_COROUTINE = 0x0100;
        const ASYNC_GENERATOR = 0x0200;
    }
}

bitflags! {
    /// Fields the decoded revision does not encode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct Synthesized: u8 {
        const POSONLYARGCOUNT = 0x01;
        const KWONLYARGCOUNT = 0x02;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CodeObject {
    pub argcount: i32,
    pub posonlyargcount: i32,
    pub kwonlyargcount: i32,
    pub nlocals: i32,
    pub stacksize: i32,
    pub flags: u32,
    /// Raw bytecode, not interpreted here.
    pub code: Vec<u8>,
    /// Index in this list is the bytecode operand of constant loads.
    pub consts: Vec<DecodedValue>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
    pub filename: String,
    pub name: String,
    pub firstlineno: i32,
    /// Line-number table; its encoding is revision-specific and opaque here.
    pub lnotab: Vec<u8>,

    /// Magic of the revision this record was built from.
    pub magic: u16,
    pub synthesized: Synthesized,
}

impl CodeObject {
    #[inline]
    pub fn code_flags(&self) -> CodeFlags {
        CodeFlags::from_bits_retain(self.flags)
    }

    /// Names of the declared parameters: positional (including positional-only),
    /// keyword-only, then `*args` and `**kwargs` when the flags say so.
    pub fn arg_names(&self) -> &[String] {
        let flags = self.code_flags();
        let mut n = self.argcount.max(0) as usize + self.kwonlyargcount.max(0) as usize;
        if flags.contains(CodeFlags::VARARGS) {
            n += 1;
        }
        if flags.contains(CodeFlags::VARKEYWORDS) {
            n += 1;
        }
        &self.varnames[..n.min(self.varnames.len())]
    }

    /// Code objects stored directly in `consts`.
    pub fn nested_code(&self) -> impl Iterator<Item = &Arc<CodeObject>> {
        self.consts.iter().filter_map(DecodedValue::as_code)
    }

    /// This code object followed by every nested one, breadth first.
    pub fn walk(&self) -> Vec<&CodeObject> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([self]);
        while let Some(co) = queue.pop_front() {
            out.push(co);
            queue.extend(co.nested_code().map(Arc::as_ref));
        }
        out
    }
}

impl fmt::Display for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<code object {}, file {:?}, line {}>",
            self.name, self.filename, self.firstlineno
        )
    }
}

fn field_type(field: &'static str, expected: &'static str, found: &DecodedValue) -> MarshalError {
    MarshalError::FieldType {
        field,
        expected,
        found: found.type_name(),
    }
}

/// Recursively decoded fields, in stream order. `firstlineno` sits between
/// `Name` and `Lnotab` as a plain integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Code,
    Consts,
    Names,
    Varnames,
    Freevars,
    Cellvars,
    Filename,
    Name,
    Lnotab,
}

const FIELDS: [Field; 9] = [
    Field::Code,
    Field::Consts,
    Field::Names,
    Field::Varnames,
    Field::Freevars,
    Field::Cellvars,
    Field::Filename,
    Field::Name,
    Field::Lnotab,
];

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Code => "code",
            Field::Consts => "consts",
            Field::Names => "names",
            Field::Varnames => "varnames",
            Field::Freevars => "freevars",
            Field::Cellvars => "cellvars",
            Field::Filename => "filename",
            Field::Name => "name",
            Field::Lnotab => "lnotab",
        }
    }
}

/// A code object under construction: the integer header has been read and
/// the remaining fields arrive one decoded value at a time.
pub(crate) struct CodeBuilder {
    code: CodeObject,
    next: usize,
}

impl CodeBuilder {
    pub(crate) fn is_complete(&self) -> bool {
        self.next == FIELDS.len()
    }

    /// Check and store the next field. `offset` is where the value started.
    pub(crate) fn accept(
        &mut self,
        value: DecodedValue,
        offset: usize,
        reader: &mut Reader<'_>,
        revision: &Revision,
    ) -> Result<()> {
        let Some(&field) = FIELDS.get(self.next) else {
            return Ok(());
        };
        let str_is_bytes = revision.policy().str_is_bytes;
        let co = &mut self.code;
        match field {
            Field::Code => co.code = byte_string(field, value, str_is_bytes)?,
            Field::Consts => {
                co.consts = match value {
                    DecodedValue::Tuple(items) => items,
                    other => return Err(field_type(field.name(), "tuple", &other)),
                }
            }
            Field::Names => co.names = identifiers(field, value, offset, str_is_bytes)?,
            Field::Varnames => co.varnames = identifiers(field, value, offset, str_is_bytes)?,
            Field::Freevars => co.freevars = identifiers(field, value, offset, str_is_bytes)?,
            Field::Cellvars => co.cellvars = identifiers(field, value, offset, str_is_bytes)?,
            Field::Filename => co.filename = identifier(field, value, offset, str_is_bytes)?,
            Field::Name => {
                co.name = identifier(field, value, offset, str_is_bytes)?;
                co.firstlineno = reader.read_i32()?;
            }
            Field::Lnotab => co.lnotab = byte_string(field, value, str_is_bytes)?,
        }
        self.next += 1;
        Ok(())
    }

    pub(crate) fn finish(self, revision: &Revision) -> CodeObject {
        let co = self.code;
        log::debug!(
            "code object {} ({}:{}) consts={} names={} magic={}",
            co.name,
            co.filename,
            co.firstlineno,
            co.consts.len(),
            co.names.len(),
            revision.magic()
        );
        co
    }
}

/// Text, or a byte string where the revision's `str` is one.
fn identifier(
    field: Field,
    value: DecodedValue,
    offset: usize,
    str_is_bytes: bool,
) -> Result<String> {
    match value {
        DecodedValue::Text(s) => Ok(s),
        DecodedValue::Bytes(b) if str_is_bytes => Ok(decode_text(&b, offset)),
        other => Err(field_type(field.name(), "text", &other)),
    }
}

fn identifiers(
    field: Field,
    value: DecodedValue,
    offset: usize,
    str_is_bytes: bool,
) -> Result<Vec<String>> {
    match value {
        DecodedValue::Tuple(items) => items
            .into_iter()
            .map(|item| identifier(field, item, offset, str_is_bytes))
            .collect(),
        other => Err(field_type(field.name(), "tuple", &other)),
    }
}

/// Interned text only stands in for bytes where `str` is a byte string.
fn byte_string(field: Field, value: DecodedValue, str_is_bytes: bool) -> Result<Vec<u8>> {
    match value {
        DecodedValue::Bytes(b) => Ok(b),
        DecodedValue::Text(s) if str_is_bytes => Ok(s.into_bytes()),
        other => Err(field_type(field.name(), "bytes", &other)),
    }
}

impl Unmarshaller<'_, '_> {
    fn int_field(&mut self, width: FieldWidth) -> Result<i32> {
        match width {
            FieldWidth::Short => Ok(i32::from(self.reader.read_i16()?)),
            FieldWidth::Long => self.reader.read_i32(),
        }
    }

    fn flags_field(&mut self, width: FieldWidth) -> Result<u32> {
        match width {
            FieldWidth::Short => Ok(u32::from(self.reader.read_u16()?)),
            FieldWidth::Long => Ok(self.reader.read_i32()? as u32),
        }
    }

    /// Read the integer header of a code object; the `c` tag has been consumed.
    pub(crate) fn code_header(&mut self) -> Result<CodeBuilder> {
        let policy = self.revision.policy();
        let width = policy.arg_width;
        let mut synthesized = Synthesized::empty();

        let argcount = self.int_field(width)?;
        let posonlyargcount = if policy.has_posonlyarg_count {
            self.reader.read_i32()?
        } else {
            synthesized |= Synthesized::POSONLYARGCOUNT;
            0
        };
        let kwonlyargcount = if policy.has_kwonlyarg_count {
            self.reader.read_i32()?
        } else {
            synthesized |= Synthesized::KWONLYARGCOUNT;
            0
        };
        let nlocals = self.int_field(width)?;
        let stacksize = self.int_field(width)?;
        let flags = self.flags_field(width)?;

        Ok(CodeBuilder {
            code: CodeObject {
                argcount,
                posonlyargcount,
                kwonlyargcount,
                nlocals,
                stacksize,
                flags,
                code: Vec::new(),
                consts: Vec::new(),
                names: Vec::new(),
                varnames: Vec::new(),
                freevars: Vec::new(),
                cellvars: Vec::new(),
                filename: String::new(),
                name: String::new(),
                firstlineno: 0,
                lnotab: Vec::new(),
                magic: self.revision.magic(),
                synthesized,
            },
            next: 0,
        })
    }
}

/// Decode a code object body (the reader is positioned after the `c` tag).
pub fn decode_code_object(
    reader: &mut Reader<'_>,
    revision: &Revision,
    tables: &mut RefTables,
) -> Result<CodeObject> {
    Unmarshaller::new(reader, revision, tables, &DecodeOptions::default()).code_object()
}
