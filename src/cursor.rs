//! Forward-only reader over a DXB byte buffer.
//!
//! Every read either consumes exactly the bytes it reports or fails with
//! [`DecodeError::UnexpectedEof`] and leaves the offset where it was.

use crate::error::DecodeError;

pub type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Read `len` bytes as UTF-8 text.
    pub fn text(&mut self, len: usize) -> Result<&'a str> {
        let start = self.pos;
        let raw = self.bytes(len)?;
        std::str::from_utf8(raw).map_err(|_| {
            self.pos = start;
            DecodeError::InvalidUtf8 { offset: start }
        })
    }

    /// Text with a one-byte length prefix.
    pub fn short_text(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let len = self.u8()? as usize;
        self.text(len).inspect_err(|_| self.pos = start)
    }

    /// Text with a four-byte length prefix.
    pub fn long_text(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let len = self.u32()? as usize;
        self.text(len).inspect_err(|_| self.pos = start)
    }

    /// Raw bytes with a four-byte length prefix.
    pub fn long_bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let len = self.u32()? as usize;
        self.bytes(len).inspect_err(|_| self.pos = start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_widths() -> Result<()> {
        let data = [
            0xff, 0x34, 0x12, 0xd6, 0xff, 0xff, 0xff, 1, 0, 0, 0, 0, 0, 0, 0x80,
        ];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.i8()?, -1);
        assert_eq!(cur.u16()?, 0x1234);
        assert_eq!(cur.i32()?, -42);
        assert_eq!(cur.u64()?, 0x8000_0000_0000_0001);
        assert!(!cur.has_remaining());
        Ok(())
    }

    #[test]
    fn reads_length_prefixed_text() -> Result<()> {
        let data = [2, b'h', b'i', 3, 0, 0, 0, b'a', b'b', b'c'];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.short_text()?, "hi");
        assert_eq!(cur.long_text()?, "abc");
        assert_eq!(cur.offset(), data.len());
        Ok(())
    }

    #[test]
    fn reading_past_end_is_an_error_and_does_not_advance() {
        let data = [5, b'a'];
        let mut cur = Cursor::new(&data);
        let err = cur.short_text().unwrap_err();
        assert_eq!(err, DecodeError::UnexpectedEof { offset: 1, needed: 4 });
        assert_eq!(cur.offset(), 0);
        assert!(cur.u32().is_err());
        assert_eq!(cur.offset(), 0);
    }

    #[test]
    fn float_is_read_bit_exact() -> Result<()> {
        let data = 1.5f64.to_le_bytes();
        assert_eq!(Cursor::new(&data).f64()?, 1.5);
        Ok(())
    }
}
