use std::fmt::{self, Write};
use std::sync::Arc;

use num_bigint::BigInt;
use num_complex::Complex64;
use serde::Serialize;

use crate::code::CodeObject;

/// A decoded marshal value.
///
/// Type mapping (tag → variant):
/// - `0`: Null, `N`: None, `F`/`T`: Bool, `S`: StopIteration, `.`: Ellipsis
/// - `i`/`I`: SmallInt, `l`: BigInt
/// - `f`/`g`: Float, `y`: Complex
/// - `s`: Bytes (the byte-string type of every revision)
/// - `t`/`u`/`a`/`A`/`z`/`Z`: Text
/// - `(`/`)`: Tuple, `<`: Set, `>`: FrozenSet
/// - `c`: Code
///
/// `R` and `r` back-references never appear here; they resolve to a copy of
/// the referenced value (code objects are shared through the `Arc`).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum DecodedValue {
    Null,
    None,
    Bool(bool),
    StopIteration,
    Ellipsis,
    SmallInt(i64),
    BigInt(BigInt),
    Float(f64),
    Complex(Complex64),
    Bytes(Vec<u8>),
    Text(String),
    Tuple(Vec<DecodedValue>),
    Set(Vec<DecodedValue>),
    FrozenSet(Vec<DecodedValue>),
    Code(Arc<CodeObject>),
}

impl DecodedValue {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            DecodedValue::Null => "null",
            DecodedValue::None => "None",
            DecodedValue::Bool(_) => "bool",
            DecodedValue::StopIteration => "StopIteration",
            DecodedValue::Ellipsis => "ellipsis",
            DecodedValue::SmallInt(_) | DecodedValue::BigInt(_) => "int",
            DecodedValue::Float(_) => "float",
            DecodedValue::Complex(_) => "complex",
            DecodedValue::Bytes(_) => "bytes",
            DecodedValue::Text(_) => "text",
            DecodedValue::Tuple(_) => "tuple",
            DecodedValue::Set(_) => "set",
            DecodedValue::FrozenSet(_) => "frozenset",
            DecodedValue::Code(_) => "code",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of a tuple, set or frozenset.
    pub fn as_seq(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::Tuple(v) | DecodedValue::Set(v) | DecodedValue::FrozenSet(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&Arc<CodeObject>> {
        match self {
            DecodedValue::Code(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DecodedValue::None)
    }
}

impl From<i64> for DecodedValue {
    fn from(v: i64) -> Self {
        DecodedValue::SmallInt(v)
    }
}

impl From<&str> for DecodedValue {
    fn from(s: &str) -> Self {
        DecodedValue::Text(s.to_string())
    }
}

impl From<CodeObject> for DecodedValue {
    fn from(c: CodeObject) -> Self {
        DecodedValue::Code(Arc::new(c))
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        write!(f, "nan")
    } else if v.is_infinite() {
        write!(f, "{}", if v > 0.0 { "inf" } else { "-inf" })
    } else {
        // Debug already switches to exponent form at the same magnitudes as
        // repr, but writes `1e20` / `1e-5` where repr writes `1e+20` / `1e-05`.
        let s = format!("{v:?}");
        match s.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exp),
                };
                write!(f, "{mantissa}e{sign}{digits:0>2}")
            }
            None => f.write_str(&s),
        }
    }
}

fn write_text_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

fn write_bytes_repr(f: &mut fmt::Formatter<'_>, b: &[u8]) -> fmt::Result {
    f.write_str("b'")?;
    for &byte in b {
        match byte {
            b'\\' => f.write_str("\\\\")?,
            b'\'' => f.write_str("\\'")?,
            b'\n' => f.write_str("\\n")?,
            b'\r' => f.write_str("\\r")?,
            b'\t' => f.write_str("\\t")?,
            0x20..=0x7E => f.write_char(byte as char)?,
            _ => write!(f, "\\x{byte:02x}")?,
        }
    }
    f.write_char('\'')
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[DecodedValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Renders values the way the runtime's `repr` would, for listings.
impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Null => write!(f, "<NULL>"),
            DecodedValue::None => write!(f, "None"),
            DecodedValue::Bool(true) => write!(f, "True"),
            DecodedValue::Bool(false) => write!(f, "False"),
            DecodedValue::StopIteration => write!(f, "StopIteration"),
            DecodedValue::Ellipsis => write!(f, "Ellipsis"),
            DecodedValue::SmallInt(v) => write!(f, "{v}"),
            DecodedValue::BigInt(v) => write!(f, "{v}"),
            DecodedValue::Float(v) => write_float(f, *v),
            DecodedValue::Complex(c) => {
                if c.re == 0.0 && c.re.is_sign_positive() {
                    write!(f, "{}j", c.im)
                } else {
                    write!(f, "({}{:+}j)", c.re, c.im)
                }
            }
            DecodedValue::Bytes(b) => write_bytes_repr(f, b),
            DecodedValue::Text(s) => write_text_repr(f, s),
            DecodedValue::Tuple(items) => {
                f.write_char('(')?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            DecodedValue::Set(items) if items.is_empty() => write!(f, "set()"),
            DecodedValue::Set(items) => {
                f.write_char('{')?;
                write_items(f, items)?;
                f.write_char('}')
            }
            DecodedValue::FrozenSet(items) if items.is_empty() => write!(f, "frozenset()"),
            DecodedValue::FrozenSet(items) => {
                f.write_str("frozenset({")?;
                write_items(f, items)?;
                f.write_str("})")
            }
            DecodedValue::Code(code) => write!(f, "{code}"),
        }
    }
}
