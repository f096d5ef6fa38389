//! pyc-marshal
//!
//! Decoder for the marshal serialization used by precompiled script files,
//! covering every format revision from 1.5 through 3.10.
//!
//! The caller supplies the bytes that follow the file header and the header's
//! magic number; the magic selects a [`Revision`], which decides how code
//! objects are laid out and which back-reference opcodes may appear. Decoding
//! is purely in-memory and never executes anything.
//!
//! ```
//! use pyc_marshal::{load_value, DecodedValue, Reader};
//!
//! let mut reader = Reader::new(b")\x02Ni\x07\x00\x00\x00");
//! let value = load_value(&mut reader, 3413).unwrap();
//! assert_eq!(
//!     value,
//!     DecodedValue::Tuple(vec![DecodedValue::None, DecodedValue::SmallInt(7)])
//! );
//! ```

use std::sync::Arc;

pub mod code;
pub mod error;
pub mod reader;
pub mod revision;
pub mod tables;
pub mod unmarshal;
pub mod value;

/// Stream builders for tests (kept as a module so integration tests can use it).
pub mod test;

pub use code::{decode_code_object, CodeFlags, CodeObject, Synthesized};
pub use error::{ErrorKind, MarshalError, RefTable, Result, TagByte};
pub use reader::Reader;
pub use revision::{FieldWidth, Layout, RefOpcodes, Revision, RevisionPolicy};
pub use tables::RefTables;
pub use unmarshal::{decode_value, decode_value_with, DecodeOptions, Tag, FLAG_REF};
pub use value::DecodedValue;

/// Decode one value with fresh back-reference tables.
pub fn load_value(reader: &mut Reader<'_>, magic: u16) -> Result<DecodedValue> {
    let revision = Revision::from_magic(magic)?;
    decode_value(reader, &revision, &mut RefTables::new())
}

/// Decode the top-level code object of a precompiled file.
///
/// Fails with [`MarshalError::NotCodeObject`] without consuming anything when
/// the stream does not start with a code tag.
pub fn load_code(reader: &mut Reader<'_>, magic: u16) -> Result<Arc<CodeObject>> {
    let revision = Revision::from_magic(magic)?;
    let tag = reader.peek_u8()?;
    if tag & !FLAG_REF != Tag::Code as u8 {
        return Err(MarshalError::NotCodeObject { tag: TagByte(tag) });
    }

    match decode_value(reader, &revision, &mut RefTables::new())? {
        DecodedValue::Code(code) => {
            log::debug!(
                "loaded {} ({} nested code objects)",
                code,
                code.walk().len() - 1
            );
            Ok(code)
        }
        other => Err(MarshalError::FieldType {
            field: "top level",
            expected: "code",
            found: other.type_name(),
        }),
    }
}
