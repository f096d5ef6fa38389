//! Forward-only cursor over an in-memory marshal stream.
//!
//! Every multi-byte field of the format is little-endian, independent of the
//! host. A read that would run past the end fails with
//! [`MarshalError::TruncatedInput`] and leaves the cursor where it was.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{MarshalError, Result};

#[derive(Clone, Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Offset of the next unread byte.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the stream.
    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn ensure(&self, need: usize) -> Result<()> {
        if need > self.remaining() {
            return Err(MarshalError::TruncatedInput {
                offset: self.pos,
                needed: need,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.bytes[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Read a 4-byte length prefix.
    ///
    /// `elem_size` is the smallest number of bytes one counted element can
    /// occupy; a prefix that is negative or claims more elements than the
    /// rest of the input could hold is rejected as `MalformedCount`.
    pub fn read_count(&mut self, what: &'static str, elem_size: usize) -> Result<usize> {
        let offset = self.pos;
        let n = self.read_i32()?;
        self.check_count(what, i64::from(n), elem_size, offset)
    }

    /// Read a 1-byte length prefix (short strings, small tuples).
    pub fn read_short_count(&mut self, what: &'static str, elem_size: usize) -> Result<usize> {
        let offset = self.pos;
        let n = self.read_u8()?;
        self.check_count(what, i64::from(n), elem_size, offset)
    }

    fn check_count(
        &self,
        what: &'static str,
        count: i64,
        elem_size: usize,
        offset: usize,
    ) -> Result<usize> {
        let malformed = MarshalError::MalformedCount {
            what,
            count,
            offset,
        };
        let n = usize::try_from(count).map_err(|_| malformed.clone())?;
        match n.checked_mul(elem_size) {
            Some(total) if total <= self.remaining() => Ok(n),
            _ => Err(malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn little_endian_fields() {
        let bytes = [
            0x34, 0x12, // i16
            0xFE, 0xFF, 0xFF, 0xFF, // i32 -2
            0x01, 0, 0, 0, 0, 0, 0, 0x80, // i64
        ];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_i16().unwrap(), 0x1234);
        assert_eq!(r.read_i32().unwrap(), -2);
        assert_eq!(r.read_i64().unwrap(), i64::MIN + 1);
        assert!(r.is_empty());
    }

    #[test]
    fn f64_is_little_endian() {
        let bytes = 1.5f64.to_le_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_f64().unwrap(), 1.5);
    }

    #[test]
    fn truncated_read_does_not_advance() {
        let bytes = [1, 2, 3];
        let mut r = Reader::new(&bytes);
        r.read_u8().unwrap();
        let err = r.read_i32().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
        assert_eq!(
            err,
            MarshalError::TruncatedInput {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_bytes(2).unwrap(), &[2, 3]);
    }

    #[test]
    fn negative_count_is_malformed() {
        let bytes = (-1i32).to_le_bytes();
        let mut r = Reader::new(&bytes);
        let err = r.read_count("tuple", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedCount);
    }

    #[test]
    fn count_beyond_input_is_malformed() {
        let mut bytes = 3i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"ab");
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            r.read_count("string", 1),
            Err(MarshalError::MalformedCount { count: 3, offset: 0, .. })
        ));
        assert_eq!(Reader::new(&[2, b'a', b'b']).read_short_count("short string", 1).unwrap(), 2);
    }

    #[test]
    fn peek_leaves_cursor() {
        let mut r = Reader::new(b"cx");
        assert_eq!(r.peek_u8().unwrap(), b'c');
        assert_eq!(r.position(), 0);
        assert_eq!(r.read_u8().unwrap(), b'c');
        assert_eq!(r.rest(), b"x");
    }
}
