use byteorder::{LittleEndian, WriteBytesExt};

/// Growable little-endian byte sink, the writing counterpart of
/// [`DecoderBuffer`](crate::decoder_buffer::DecoderBuffer).
#[derive(Debug, Clone, Default)]
pub struct EncoderBuffer {
    buffer: Vec<u8>,
}

impl EncoderBuffer {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a buffer with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    pub fn encode_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn encode_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    // Writes into a Vec cannot fail.
    pub fn encode_u32(&mut self, value: u32) {
        let _ = self.buffer.write_u32::<LittleEndian>(value);
    }

    pub fn encode_f64(&mut self, value: f64) {
        let _ = self.buffer.write_f64::<LittleEndian>(value);
    }

    pub fn encode_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }
}
