//! Helpers for writing marshal streams by hand in tests.

use std::mem;

use byteorder::{ByteOrder, LittleEndian};

use crate::revision::{FieldWidth, Revision};
use crate::unmarshal::FLAG_REF;

/// Appends tagged values to a byte buffer.
///
/// Every method returns `&mut Self` so streams read top to bottom:
///
/// ```
/// use pyc_marshal::test::MarshalBuilder;
///
/// let bytes = MarshalBuilder::new().small_tuple(2).none().int(7).finish();
/// assert_eq!(bytes, b")\x02Ni\x07\x00\x00\x00");
/// ```
#[derive(Debug, Default)]
pub struct MarshalBuilder {
    buf: Vec<u8>,
    flag_next: bool,
}

impl MarshalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference flag on the next tag written.
    pub fn flagged(&mut self) -> &mut Self {
        self.flag_next = true;
        self
    }

    pub fn tag(&mut self, tag: u8) -> &mut Self {
        let tag = if mem::take(&mut self.flag_next) {
            tag | FLAG_REF
        } else {
            tag
        };
        self.buf.push(tag);
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        let mut b = [0; 2];
        LittleEndian::write_i16(&mut b, v);
        self.raw(&b)
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        let mut b = [0; 2];
        LittleEndian::write_u16(&mut b, v);
        self.raw(&b)
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        let mut b = [0; 4];
        LittleEndian::write_i32(&mut b, v);
        self.raw(&b)
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        let mut b = [0; 8];
        LittleEndian::write_i64(&mut b, v);
        self.raw(&b)
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        let mut b = [0; 8];
        LittleEndian::write_f64(&mut b, v);
        self.raw(&b)
    }

    pub fn none(&mut self) -> &mut Self {
        self.tag(b'N')
    }

    pub fn int(&mut self, v: i32) -> &mut Self {
        self.tag(b'i').i32(v)
    }

    pub fn int64(&mut self, v: i64) -> &mut Self {
        self.tag(b'I').i64(v)
    }

    /// `l` with an explicit signed digit count and 15-bit digits, low first.
    pub fn long(&mut self, size: i32, digits: &[u16]) -> &mut Self {
        self.tag(b'l').i32(size);
        for &d in digits {
            self.u16(d);
        }
        self
    }

    pub fn ascii_float(&mut self, literal: &str) -> &mut Self {
        self.tag(b'f').u8(literal.len() as u8).raw(literal.as_bytes())
    }

    pub fn binary_float(&mut self, v: f64) -> &mut Self {
        self.tag(b'g').f64(v)
    }

    pub fn binary_complex(&mut self, re: f64, im: f64) -> &mut Self {
        self.tag(b'y').f64(re).f64(im)
    }

    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.tag(b's').i32(b.len() as i32).raw(b)
    }

    pub fn unicode(&mut self, s: &str) -> &mut Self {
        self.tag(b'u').i32(s.len() as i32).raw(s.as_bytes())
    }

    pub fn interned(&mut self, s: &str) -> &mut Self {
        self.tag(b't').i32(s.len() as i32).raw(s.as_bytes())
    }

    pub fn short_ascii(&mut self, s: &str) -> &mut Self {
        self.tag(b'z').u8(s.len() as u8).raw(s.as_bytes())
    }

    pub fn short_ascii_interned(&mut self, s: &str) -> &mut Self {
        self.tag(b'Z').u8(s.len() as u8).raw(s.as_bytes())
    }

    pub fn string_ref(&mut self, index: i32) -> &mut Self {
        self.tag(b'R').i32(index)
    }

    pub fn object_ref(&mut self, index: i32) -> &mut Self {
        self.tag(b'r').i32(index)
    }

    /// Tuple header; the caller writes `n` elements after it.
    pub fn tuple(&mut self, n: i32) -> &mut Self {
        self.tag(b'(').i32(n)
    }

    pub fn small_tuple(&mut self, n: u8) -> &mut Self {
        self.tag(b')').u8(n)
    }

    pub fn set(&mut self, n: i32) -> &mut Self {
        self.tag(b'<').i32(n)
    }

    pub fn frozenset(&mut self, n: i32) -> &mut Self {
        self.tag(b'>').i32(n)
    }

    /// Write a whole code object laid out for `revision`. Argument counts the
    /// revision does not encode are skipped.
    pub fn code(&mut self, revision: &Revision, spec: &CodeSpec<'_>) -> &mut Self {
        let policy = revision.policy();
        let width = policy.arg_width;
        let string = |b: &mut Self, s: &str| {
            if policy.str_is_bytes {
                b.bytes(s.as_bytes());
            } else {
                b.unicode(s);
            }
        };
        let names = |b: &mut Self, names: &[&str]| {
            b.tuple(names.len() as i32);
            for &n in names {
                string(b, n);
            }
        };

        self.tag(b'c');
        self.field(width, spec.argcount);
        if policy.has_posonlyarg_count {
            self.i32(spec.posonlyargcount);
        }
        if policy.has_kwonlyarg_count {
            self.i32(spec.kwonlyargcount);
        }
        self.field(width, spec.nlocals);
        self.field(width, spec.stacksize);
        match width {
            FieldWidth::Short => self.u16(spec.flags as u16),
            FieldWidth::Long => self.i32(spec.flags as i32),
        };
        self.bytes(spec.code);
        self.raw(spec.consts);
        match spec.raw_names {
            Some(raw) => {
                self.raw(raw);
            }
            None => names(self, spec.names),
        }
        names(self, spec.varnames);
        names(self, spec.freevars);
        names(self, spec.cellvars);
        string(self, spec.filename);
        string(self, spec.name);
        self.i32(spec.firstlineno);
        self.bytes(spec.lnotab)
    }

    fn field(&mut self, width: FieldWidth, v: i32) -> &mut Self {
        match width {
            FieldWidth::Short => self.i16(v as i16),
            FieldWidth::Long => self.i32(v),
        }
    }

    /// Take the bytes written so far, leaving the builder empty.
    pub fn finish(&mut self) -> Vec<u8> {
        self.flag_next = false;
        mem::take(&mut self.buf)
    }
}

/// Field values for [`MarshalBuilder::code`].
///
/// `consts` (and `raw_names` when set) are already-encoded values, so tests
/// can nest code objects or inject back-references.
#[derive(Clone, Copy, Debug)]
pub struct CodeSpec<'a> {
    pub argcount: i32,
    pub posonlyargcount: i32,
    pub kwonlyargcount: i32,
    pub nlocals: i32,
    pub stacksize: i32,
    pub flags: u32,
    pub code: &'a [u8],
    pub consts: &'a [u8],
    pub names: &'a [&'a str],
    pub raw_names: Option<&'a [u8]>,
    pub varnames: &'a [&'a str],
    pub freevars: &'a [&'a str],
    pub cellvars: &'a [&'a str],
    pub filename: &'a str,
    pub name: &'a str,
    pub firstlineno: i32,
    pub lnotab: &'a [u8],
}

impl Default for CodeSpec<'_> {
    fn default() -> Self {
        Self {
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            nlocals: 0,
            stacksize: 1,
            flags: 0x40,
            code: b"",
            consts: b"(\x00\x00\x00\x00",
            names: &[],
            raw_names: None,
            varnames: &[],
            freevars: &[],
            cellvars: &[],
            filename: "<test>",
            name: "<module>",
            firstlineno: 1,
            lnotab: b"",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_applies_to_one_tag() {
        let bytes = MarshalBuilder::new().small_tuple(2).flagged().int(1).none().finish();
        assert_eq!(bytes, b")\x02\xe9\x01\x00\x00\x00N");
    }

    #[test]
    fn code_layout_follows_field_width() {
        let old = Revision::from_magic(20121).unwrap();
        let new = Revision::from_magic(3413).unwrap();
        let spec = CodeSpec::default();
        let short = MarshalBuilder::new().code(&old, &spec).finish();
        let long = MarshalBuilder::new().code(&new, &spec).finish();

        assert_eq!(&short[..3], b"c\x00\x00");
        assert_eq!(short[1 + 2 * 3..1 + 2 * 4], [0x40, 0x00]);
        // posonly, kwonly and two more bytes per header field
        assert!(long.len() > short.len());
        assert_eq!(&long[1..13], &[0; 12]);
    }
}
