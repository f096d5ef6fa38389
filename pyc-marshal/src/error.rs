use std::fmt;

/// Which back-reference table an index was resolved against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefTable {
    /// Interned text, addressed from 0 by the `R` tag.
    Interned,
    /// Shared objects, addressed from 1 by the `r` tag.
    Shared,
}

impl fmt::Display for RefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTable::Interned => write!(f, "interned-text"),
            RefTable::Shared => write!(f, "shared-object"),
        }
    }
}

/// Coarse classification of a [`MarshalError`].
///
/// Callers that only report failures per input file usually match on this
/// rather than on the detailed error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TruncatedInput,
    UnsupportedTag,
    UnknownRevision,
    BadBackReference,
    MalformedCount,
}

/// Renders a tag byte the way it appears in format tables (`'c'`), falling
/// back to hex for non-printable bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagByte(pub u8);

impl fmt::Display for TagByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "'{}' (0x{:02X})", self.0 as char, self.0)
        } else {
            write!(f, "0x{:02X}", self.0)
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("truncated input at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unsupported tag {tag} at offset {offset}")]
    UnsupportedTag { tag: TagByte, offset: usize },

    #[error("tag {tag} is not used by magic {magic} (offset {offset})")]
    TagNotInRevision {
        tag: TagByte,
        magic: u16,
        offset: usize,
    },

    #[error("expected a code object at the top level, found tag {tag}")]
    NotCodeObject { tag: TagByte },

    #[error("unknown format revision: magic {magic}")]
    UnknownRevision { magic: u16 },

    #[error("bad {table} back-reference {index} (table holds {len} entries)")]
    BadBackReference {
        table: RefTable,
        index: i64,
        len: usize,
    },

    #[error("malformed {what} count {count} at offset {offset}")]
    MalformedCount {
        what: &'static str,
        count: i64,
        offset: usize,
    },

    #[error("malformed float literal {literal:?} at offset {offset}")]
    BadFloat { literal: String, offset: usize },

    #[error("long digit 0x{digit:04X} out of range at offset {offset}")]
    BadLongDigit { digit: u16, offset: usize },

    #[error("code object field `{field}` decoded as {found}, expected {expected}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("values nested deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },
}

impl MarshalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarshalError::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            MarshalError::UnsupportedTag { .. }
            | MarshalError::TagNotInRevision { .. }
            | MarshalError::NotCodeObject { .. } => ErrorKind::UnsupportedTag,
            MarshalError::UnknownRevision { .. } => ErrorKind::UnknownRevision,
            MarshalError::BadBackReference { .. } => ErrorKind::BadBackReference,
            MarshalError::MalformedCount { .. }
            | MarshalError::BadFloat { .. }
            | MarshalError::BadLongDigit { .. }
            | MarshalError::FieldType { .. }
            | MarshalError::TooDeep { .. } => ErrorKind::MalformedCount,
        }
    }
}

pub type Result<T> = std::result::Result<T, MarshalError>;
