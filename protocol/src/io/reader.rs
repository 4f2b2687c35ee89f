use crate::error::ProtocolError;

/// Helper for reading binary data with automatic cursor advancement.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    /// Reads exactly `N` bytes into a fixed array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or(ProtocolError::PacketTooShort {
                expected: self.pos + len,
                got: self.data.len(),
            })?;
        self.pos += len;
        Ok(bytes)
    }

    /// Splits off the last `len` bytes, leaving them out of `remaining`.
    pub fn split_tail(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(ProtocolError::PacketTooShort {
                expected: self.pos + len,
                got: self.data.len(),
            });
        }
        let split = self.data.len() - len;
        let tail = &self.data[split..];
        self.data = &self.data[..split];
        Ok(tail)
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}
