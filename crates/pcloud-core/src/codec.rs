//! Raw point codec.
//!
//! A [`RawPointCodec`] is compiled once per schema into an ordered list of
//! steps, one per present field, each holding the field's offset and length
//! and the encode/decode function for its encoding. Every call site receives
//! the codec explicitly; nothing is cached globally.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::data_types::Encoding;
use crate::point::{FieldValue, PointFields};
use crate::schema::{FieldKind, PointSchema};
use crate::status::{PointCloudError, PointCloudResult};

type EncodeFn = fn(&FieldValue, &mut [u8]) -> bool;
type DecodeFn = fn(&[u8]) -> FieldValue;

#[derive(Clone, Copy)]
struct CodecStep {
    field: FieldKind,
    encoding: Encoding,
    offset: usize,
    len: usize,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl std::fmt::Debug for CodecStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecStep")
            .field("field", &self.field)
            .field("encoding", &self.encoding)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

macro_rules! scalar_fns {
    ($enc:ident, $dec:ident, $variant:ident, $write:ident, $read:ident) => {
        fn $enc(value: &FieldValue, out: &mut [u8]) -> bool {
            match value {
                FieldValue::$variant(v) => {
                    LittleEndian::$write(out, *v);
                    true
                }
                _ => false,
            }
        }

        fn $dec(bytes: &[u8]) -> FieldValue {
            FieldValue::$variant(LittleEndian::$read(bytes))
        }
    };
}

scalar_fns!(encode_i16, decode_i16, Int16, write_i16, read_i16);
scalar_fns!(encode_u16, decode_u16, UInt16, write_u16, read_u16);
scalar_fns!(encode_i32, decode_i32, Int32, write_i32, read_i32);
scalar_fns!(encode_u32, decode_u32, UInt32, write_u32, read_u32);
scalar_fns!(encode_i64, decode_i64, Int64, write_i64, read_i64);
scalar_fns!(encode_u64, decode_u64, UInt64, write_u64, read_u64);
scalar_fns!(encode_f32, decode_f32, Float32, write_f32, read_f32);
scalar_fns!(encode_f64, decode_f64, Float64, write_f64, read_f64);

fn encode_i8(value: &FieldValue, out: &mut [u8]) -> bool {
    match value {
        FieldValue::Int8(v) => {
            out[0] = *v as u8;
            true
        }
        _ => false,
    }
}

fn decode_i8(bytes: &[u8]) -> FieldValue {
    FieldValue::Int8(bytes[0] as i8)
}

fn encode_u8(value: &FieldValue, out: &mut [u8]) -> bool {
    match value {
        FieldValue::UInt8(v) => {
            out[0] = *v;
            true
        }
        _ => false,
    }
}

fn decode_u8(bytes: &[u8]) -> FieldValue {
    FieldValue::UInt8(bytes[0])
}

fn encode_f3_32(value: &FieldValue, out: &mut [u8]) -> bool {
    match value {
        FieldValue::Float3_32(v) => {
            LittleEndian::write_f32_into(v, out);
            true
        }
        _ => false,
    }
}

fn decode_f3_32(bytes: &[u8]) -> FieldValue {
    let mut v = [0f32; 3];
    LittleEndian::read_f32_into(bytes, &mut v);
    FieldValue::Float3_32(v)
}

fn encode_f3_64(value: &FieldValue, out: &mut [u8]) -> bool {
    match value {
        FieldValue::Float3_64(v) => {
            LittleEndian::write_f64_into(v, out);
            true
        }
        _ => false,
    }
}

fn decode_f3_64(bytes: &[u8]) -> FieldValue {
    let mut v = [0f64; 3];
    LittleEndian::read_f64_into(bytes, &mut v);
    FieldValue::Float3_64(v)
}

fn step_fns(encoding: Encoding) -> (EncodeFn, DecodeFn) {
    match encoding {
        Encoding::Int8 => (encode_i8, decode_i8),
        Encoding::UInt8 => (encode_u8, decode_u8),
        Encoding::Int16 => (encode_i16, decode_i16),
        Encoding::UInt16 => (encode_u16, decode_u16),
        Encoding::Int32 => (encode_i32, decode_i32),
        Encoding::UInt32 => (encode_u32, decode_u32),
        Encoding::Int64 => (encode_i64, decode_i64),
        Encoding::UInt64 => (encode_u64, decode_u64),
        Encoding::Float32 => (encode_f32, decode_f32),
        Encoding::Float64 => (encode_f64, decode_f64),
        Encoding::Float3_32 => (encode_f3_32, decode_f3_32),
        Encoding::Float3_64 => (encode_f3_64, decode_f3_64),
    }
}

/// Encoder/decoder between point records and fixed-layout raw point buffers.
#[derive(Debug, Clone)]
pub struct RawPointCodec {
    schema: Arc<PointSchema>,
    steps: Vec<CodecStep>,
    point_len: usize,
}

impl RawPointCodec {
    pub fn new(schema: Arc<PointSchema>) -> Self {
        let offsets = schema.offsets();
        let steps = offsets
            .iter()
            .map(|slot| {
                let (encode, decode) = step_fns(slot.encoding);
                CodecStep {
                    field: slot.field,
                    encoding: slot.encoding,
                    offset: slot.offset,
                    len: slot.len,
                    encode,
                    decode,
                }
            })
            .collect();
        let point_len = offsets.point_len();
        Self {
            schema,
            steps,
            point_len,
        }
    }

    pub fn schema(&self) -> &Arc<PointSchema> {
        &self.schema
    }

    /// Length of one raw point buffer.
    pub fn point_len(&self) -> usize {
        self.point_len
    }

    /// Encodes one point into a freshly allocated buffer.
    pub fn encode<P: PointFields>(&self, point: &P) -> PointCloudResult<Vec<u8>> {
        let mut out = vec![0u8; self.point_len];
        self.encode_into(point, &mut out)?;
        Ok(out)
    }

    /// Encodes one point into the first `point_len` bytes of `out`.
    ///
    /// Fields the point does not carry are written as zeros.
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if `out` is shorter than one point
    /// - `UnsupportedEncoding` if the point holds a field in a different
    ///   encoding than the schema
    pub fn encode_into<P: PointFields>(&self, point: &P, out: &mut [u8]) -> PointCloudResult<()> {
        if out.len() < self.point_len {
            return Err(PointCloudError::InsufficientData {
                needed: self.point_len,
                available: out.len(),
            });
        }
        for step in &self.steps {
            let dst = &mut out[step.offset..step.offset + step.len];
            match point.field(step.field) {
                Some(value) => {
                    if !(step.encode)(&value, dst) {
                        return Err(PointCloudError::UnsupportedEncoding(format!(
                            "{} holds {} but the schema encodes it as {}",
                            step.field,
                            value.encoding(),
                            step.encoding
                        )));
                    }
                }
                None => dst.fill(0),
            }
        }
        Ok(())
    }

    /// Decodes the first `point_len` bytes of `bytes` into `point`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` without touching `point` if `bytes` is
    /// shorter than one point.
    pub fn decode<P: PointFields>(&self, bytes: &[u8], point: &mut P) -> PointCloudResult<()> {
        if bytes.len() < self.point_len {
            return Err(PointCloudError::InsufficientData {
                needed: self.point_len,
                available: bytes.len(),
            });
        }
        for step in &self.steps {
            let value = (step.decode)(&bytes[step.offset..step.offset + step.len]);
            point.set_field(step.field, value);
        }
        Ok(())
    }

    pub fn decode_point<P: PointFields>(&self, bytes: &[u8]) -> PointCloudResult<P> {
        let mut point = P::default();
        self.decode(bytes, &mut point)?;
        Ok(point)
    }

    /// Encodes a slice of points back to back.
    pub fn encode_all<P: PointFields>(&self, points: &[P]) -> PointCloudResult<Vec<u8>> {
        let mut out = vec![0u8; self.point_len * points.len()];
        for (point, chunk) in points.iter().zip(out.chunks_exact_mut(self.point_len.max(1))) {
            self.encode_into(point, chunk)?;
        }
        Ok(out)
    }

    /// Decodes `count` consecutive points.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if `bytes` holds fewer than `count` points.
    pub fn decode_all<P: PointFields>(&self, bytes: &[u8], count: usize) -> PointCloudResult<Vec<P>> {
        let needed = self.point_len * count;
        if bytes.len() < needed {
            return Err(PointCloudError::InsufficientData {
                needed,
                available: bytes.len(),
            });
        }
        let mut points = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * self.point_len;
            points.push(self.decode_point(&bytes[start..start + self.point_len])?);
        }
        Ok(points)
    }
}
