//! Cursor over an immutable byte buffer.

use super::CborError;

/// Forward-only reader used by the CBOR decoder and the binary structure
/// parsers built on top of it (authenticator data, TPM structures).
#[derive(Debug, Clone)]
pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Consume exactly `n` bytes.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], CborError> {
        if n > self.remaining() {
            return Err(CborError::UnexpectedEnd {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CborError> {
        let bytes = self.read(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CborError> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CborError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CborError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CborError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a big-endian u16 length prefix followed by that many bytes
    /// (TPM2B_* encoding).
    pub fn read_sized(&mut self) -> Result<&'a [u8], CborError> {
        let len = self.read_u16()? as usize;
        self.read(len)
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Bytes between two absolute offsets already passed by the cursor.
    pub fn span(&self, start: usize, end: usize) -> &'a [u8] {
        &self.data[start.min(end)..end.min(self.data.len())]
    }

    /// Fail unless every byte has been consumed.
    pub fn expect_eof(&self) -> Result<(), CborError> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(CborError::TrailingBytes(self.remaining()))
        }
    }
}
