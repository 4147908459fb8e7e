use byteorder::{ByteOrder, LittleEndian};

use crate::status::{PointCloudError, PointCloudResult};

/// Bounds-checked little-endian reader over a byte slice.
///
/// Used for the hierarchy and payload headers. Every read either succeeds or
/// fails with `PointCloudError::InsufficientData`; it never reads past the
/// end of the slice.
///
/// # Example
///
/// ```
/// use pcloud_core::decoder_buffer::DecoderBuffer;
///
/// let data = [0x02, 0x00, 0x00, 0x00, 0xFF];
/// let mut buffer = DecoderBuffer::new(&data);
///
/// assert_eq!(buffer.decode_u32().unwrap(), 2);
/// assert_eq!(buffer.remaining_size(), 1);
/// ```
pub struct DecoderBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DecoderBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the current read position in bytes.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of bytes remaining in the buffer.
    pub fn remaining_size(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_size() == 0
    }

    /// Returns the next `len` bytes and advances past them.
    ///
    /// # Errors
    ///
    /// Returns `PointCloudError::InsufficientData` if fewer than `len` bytes
    /// remain.
    pub fn decode_slice(&mut self, len: usize) -> PointCloudResult<&'a [u8]> {
        if len > self.remaining_size() {
            return Err(PointCloudError::InsufficientData {
                needed: len,
                available: self.remaining_size(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn decode_u8(&mut self) -> PointCloudResult<u8> {
        Ok(self.decode_slice(1)?[0])
    }

    /// Decodes a little-endian u32.
    pub fn decode_u32(&mut self) -> PointCloudResult<u32> {
        Ok(LittleEndian::read_u32(self.decode_slice(4)?))
    }

    /// Decodes a little-endian f64.
    pub fn decode_f64(&mut self) -> PointCloudResult<f64> {
        Ok(LittleEndian::read_f64(self.decode_slice(8)?))
    }

    pub fn decode_bool(&mut self) -> PointCloudResult<bool> {
        Ok(self.decode_u8()? != 0)
    }

    /// Returns everything after the read position without advancing.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}
