//! Typed field values and the point record abstraction.

use glam::DVec3;
use num_traits::ToPrimitive;

use crate::data_types::Encoding;
use crate::schema::{FieldKind, PointSchema};

/// One field value in one of the supported encodings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Float3_32([f32; 3]),
    Float3_64([f64; 3]),
}

impl FieldValue {
    pub fn encoding(&self) -> Encoding {
        match self {
            FieldValue::Int8(_) => Encoding::Int8,
            FieldValue::UInt8(_) => Encoding::UInt8,
            FieldValue::Int16(_) => Encoding::Int16,
            FieldValue::UInt16(_) => Encoding::UInt16,
            FieldValue::Int32(_) => Encoding::Int32,
            FieldValue::UInt32(_) => Encoding::UInt32,
            FieldValue::Int64(_) => Encoding::Int64,
            FieldValue::UInt64(_) => Encoding::UInt64,
            FieldValue::Float32(_) => Encoding::Float32,
            FieldValue::Float64(_) => Encoding::Float64,
            FieldValue::Float3_32(_) => Encoding::Float3_32,
            FieldValue::Float3_64(_) => Encoding::Float3_64,
        }
    }

    /// The value a field takes when a point does not set it.
    pub fn zero(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Int8 => FieldValue::Int8(0),
            Encoding::UInt8 => FieldValue::UInt8(0),
            Encoding::Int16 => FieldValue::Int16(0),
            Encoding::UInt16 => FieldValue::UInt16(0),
            Encoding::Int32 => FieldValue::Int32(0),
            Encoding::UInt32 => FieldValue::UInt32(0),
            Encoding::Int64 => FieldValue::Int64(0),
            Encoding::UInt64 => FieldValue::UInt64(0),
            Encoding::Float32 => FieldValue::Float32(0.0),
            Encoding::Float64 => FieldValue::Float64(0.0),
            Encoding::Float3_32 => FieldValue::Float3_32([0.0; 3]),
            Encoding::Float3_64 => FieldValue::Float3_64([0.0; 3]),
        }
    }

    /// Scalar value widened to `f64`. `None` for vector values.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::Int8(v) => v.to_f64(),
            FieldValue::UInt8(v) => v.to_f64(),
            FieldValue::Int16(v) => v.to_f64(),
            FieldValue::UInt16(v) => v.to_f64(),
            FieldValue::Int32(v) => v.to_f64(),
            FieldValue::UInt32(v) => v.to_f64(),
            FieldValue::Int64(v) => v.to_f64(),
            FieldValue::UInt64(v) => v.to_f64(),
            FieldValue::Float32(v) => v.to_f64(),
            FieldValue::Float64(v) => Some(v),
            FieldValue::Float3_32(_) | FieldValue::Float3_64(_) => None,
        }
    }

    /// Vector value widened to `DVec3`. `None` for scalar values.
    pub fn as_dvec3(&self) -> Option<DVec3> {
        match *self {
            FieldValue::Float3_32([x, y, z]) => Some(DVec3::new(x as f64, y as f64, z as f64)),
            FieldValue::Float3_64(v) => Some(DVec3::from_array(v)),
            _ => None,
        }
    }

    /// Converts a scalar into `encoding`, saturating where the target is narrower.
    ///
    /// Returns `None` if either side is a vector encoding of a different shape.
    pub fn convert(&self, encoding: Encoding) -> Option<FieldValue> {
        if self.encoding() == encoding {
            return Some(*self);
        }
        if let Some(v) = self.as_dvec3() {
            return match encoding {
                Encoding::Float3_32 => Some(FieldValue::Float3_32(v.as_vec3().to_array())),
                Encoding::Float3_64 => Some(FieldValue::Float3_64(v.to_array())),
                _ => None,
            };
        }
        let v = self.as_f64()?;
        let clamp = |lo: f64, hi: f64| v.round().clamp(lo, hi);
        Some(match encoding {
            Encoding::Int8 => FieldValue::Int8(clamp(i8::MIN as f64, i8::MAX as f64) as i8),
            Encoding::UInt8 => FieldValue::UInt8(clamp(0.0, u8::MAX as f64) as u8),
            Encoding::Int16 => FieldValue::Int16(clamp(i16::MIN as f64, i16::MAX as f64) as i16),
            Encoding::UInt16 => FieldValue::UInt16(clamp(0.0, u16::MAX as f64) as u16),
            Encoding::Int32 => FieldValue::Int32(clamp(i32::MIN as f64, i32::MAX as f64) as i32),
            Encoding::UInt32 => FieldValue::UInt32(clamp(0.0, u32::MAX as f64) as u32),
            Encoding::Int64 => FieldValue::Int64(v.round() as i64),
            Encoding::UInt64 => FieldValue::UInt64(v.round().max(0.0) as u64),
            Encoding::Float32 => FieldValue::Float32(v as f32),
            Encoding::Float64 => FieldValue::Float64(v),
            Encoding::Float3_32 | Encoding::Float3_64 => return None,
        })
    }
}

/// Typed access to the fields of one point record.
///
/// The raw point codec only talks to points through this trait, so any
/// record type can be streamed as long as it can store the fields of the
/// schema it is decoded with.
pub trait PointFields: Default + Clone + Send + Sync + 'static {
    fn field(&self, field: FieldKind) -> Option<FieldValue>;
    fn set_field(&mut self, field: FieldKind, value: FieldValue);

    fn position(&self) -> Option<DVec3> {
        self.field(FieldKind::Position).and_then(|v| v.as_dvec3())
    }
}

/// Schema-agnostic point record with one optional slot per field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    values: [Option<FieldValue>; FieldKind::COUNT],
}

impl Point {
    pub fn new() -> Self {
        Self::default()
    }

    /// A point with every field of `schema` set to zero.
    pub fn zeroed(schema: &PointSchema) -> Self {
        let mut point = Self::default();
        for (field, encoding) in schema.fields() {
            point.values[field.index()] = Some(FieldValue::zero(encoding));
        }
        point
    }

    pub fn with(mut self, field: FieldKind, value: FieldValue) -> Self {
        self.values[field.index()] = Some(value);
        self
    }

    pub fn intensity(&self) -> Option<f64> {
        self.values[FieldKind::Intensity.index()].and_then(|v| v.as_f64())
    }

    pub fn normal(&self) -> Option<DVec3> {
        self.values[FieldKind::Normal.index()].and_then(|v| v.as_dvec3())
    }

    pub fn color(&self) -> Option<FieldValue> {
        self.values[FieldKind::Color.index()]
    }
}

impl PointFields for Point {
    fn field(&self, field: FieldKind) -> Option<FieldValue> {
        self.values[field.index()]
    }

    fn set_field(&mut self, field: FieldKind, value: FieldValue) {
        self.values[field.index()] = Some(value);
    }
}
