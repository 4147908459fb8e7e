//! Point schemas.
//!
//! A [`PointSchema`] records, per semantic field, whether the field is present
//! in a point record and in which [`Encoding`]. Each field carries at most one
//! encoding; the combination is validated once when the schema is built and
//! never changes afterwards.
//!
//! The byte layout of a raw point follows from the schema: present fields are
//! packed in canonical [`FieldKind`] order, and the resulting
//! [`FieldOffsetTable`] is computed on first use and cached on the schema.

use std::fmt;
use std::sync::OnceLock;

use crate::data_types::Encoding;
use crate::status::{configuration_error, PointCloudError, PointCloudResult};

/// Semantic field of a point record, in canonical layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    Position = 0,
    Intensity = 1,
    Normal = 2,
    Color = 3,
    Label = 4,
    Curvature = 5,
    HitCount = 6,
    GpsTime = 7,
}

impl FieldKind {
    pub const COUNT: usize = 8;

    /// All fields in canonical order.
    pub const ALL: [FieldKind; FieldKind::COUNT] = [
        FieldKind::Position,
        FieldKind::Intensity,
        FieldKind::Normal,
        FieldKind::Color,
        FieldKind::Label,
        FieldKind::Curvature,
        FieldKind::HitCount,
        FieldKind::GpsTime,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Position => "Position",
            FieldKind::Intensity => "Intensity",
            FieldKind::Normal => "Normal",
            FieldKind::Color => "Color",
            FieldKind::Label => "Label",
            FieldKind::Curvature => "Curvature",
            FieldKind::HitCount => "HitCount",
            FieldKind::GpsTime => "GpsTime",
        }
    }

    /// Whether `encoding` is a legal representation of this field.
    pub fn accepts(self, encoding: Encoding) -> bool {
        match self {
            FieldKind::Position | FieldKind::Normal => encoding.is_vector(),
            FieldKind::Color => true,
            FieldKind::Intensity
            | FieldKind::Label
            | FieldKind::Curvature
            | FieldKind::HitCount
            | FieldKind::GpsTime => !encoding.is_vector(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of one present field inside a raw point buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub field: FieldKind,
    pub encoding: Encoding,
    pub offset: usize,
    pub len: usize,
}

/// Byte offsets of every present field, derived once per schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOffsetTable {
    slots: [Option<FieldSlot>; FieldKind::COUNT],
    point_len: usize,
}

impl FieldOffsetTable {
    fn compute(encodings: &[Option<Encoding>; FieldKind::COUNT]) -> Self {
        let mut slots = [None; FieldKind::COUNT];
        let mut offset = 0;
        for field in FieldKind::ALL {
            if let Some(encoding) = encodings[field.index()] {
                let len = encoding.byte_length();
                slots[field.index()] = Some(FieldSlot {
                    field,
                    encoding,
                    offset,
                    len,
                });
                offset += len;
            }
        }
        Self {
            slots,
            point_len: offset,
        }
    }

    pub fn get(&self, field: FieldKind) -> Option<&FieldSlot> {
        self.slots[field.index()].as_ref()
    }

    /// Total length of one raw point in bytes.
    pub fn point_len(&self) -> usize {
        self.point_len
    }

    /// Present fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldSlot> + '_ {
        self.slots.iter().flatten()
    }
}

/// Field/encoding capability matrix of one point type.
#[derive(Debug, Clone)]
pub struct PointSchema {
    encodings: [Option<Encoding>; FieldKind::COUNT],
    offsets: OnceLock<FieldOffsetTable>,
}

impl PartialEq for PointSchema {
    fn eq(&self, other: &Self) -> bool {
        self.encodings == other.encodings
    }
}

impl Eq for PointSchema {}

impl PointSchema {
    pub fn builder() -> PointSchemaBuilder {
        PointSchemaBuilder::new()
    }

    pub fn encoding(&self, field: FieldKind) -> Option<Encoding> {
        self.encodings[field.index()]
    }

    pub fn has_field(&self, field: FieldKind) -> bool {
        self.encodings[field.index()].is_some()
    }

    /// Capability query: is `field` present in exactly this encoding?
    pub fn has(&self, field: FieldKind, encoding: Encoding) -> bool {
        self.encodings[field.index()] == Some(encoding)
    }

    /// Present fields and their encodings, in canonical order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldKind, Encoding)> + '_ {
        FieldKind::ALL
            .iter()
            .filter_map(move |&f| self.encodings[f.index()].map(|e| (f, e)))
    }

    /// Names of all true capabilities, e.g. `["PositionFloat3_32", "IntensityUInt16"]`.
    pub fn capability_names(&self) -> Vec<String> {
        self.fields()
            .map(|(field, encoding)| capability_name(field, encoding))
            .collect()
    }

    /// Rebuilds a schema from the names produced by [`capability_names`](Self::capability_names).
    ///
    /// # Errors
    ///
    /// Returns `PointCloudError::Configuration` for unknown names and for any
    /// combination the builder rejects.
    pub fn from_capability_names<S: AsRef<str>>(names: &[S]) -> PointCloudResult<Self> {
        let mut builder = PointSchemaBuilder::new();
        for name in names {
            let (field, encoding) = parse_capability_name(name.as_ref())?;
            builder = builder.with(field, encoding);
        }
        builder.build()
    }

    /// Field offsets, computed on first call and cached for the schema's lifetime.
    pub fn offsets(&self) -> &FieldOffsetTable {
        self.offsets
            .get_or_init(|| FieldOffsetTable::compute(&self.encodings))
    }

    pub fn point_len(&self) -> usize {
        self.offsets().point_len()
    }
}

impl fmt::Display for PointSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.capability_names().join(", "))
    }
}

pub fn capability_name(field: FieldKind, encoding: Encoding) -> String {
    format!("{}{}", field.name(), encoding.name())
}

fn parse_capability_name(name: &str) -> PointCloudResult<(FieldKind, Encoding)> {
    FieldKind::ALL
        .iter()
        .find_map(|&field| {
            name.strip_prefix(field.name())
                .and_then(Encoding::from_name)
                .map(|encoding| (field, encoding))
        })
        .ok_or_else(|| configuration_error(format!("Unknown capability name '{}'", name)))
}

/// Collects field encodings and validates them on [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct PointSchemaBuilder {
    encodings: [Option<Encoding>; FieldKind::COUNT],
    error: Option<PointCloudError>,
}

impl PointSchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: FieldKind, encoding: Encoding) -> Self {
        if self.error.is_some() {
            return self;
        }
        let slot = &mut self.encodings[field.index()];
        if let Some(existing) = slot {
            self.error = Some(configuration_error(format!(
                "{} already has encoding {}, cannot add {}",
                field, existing, encoding
            )));
        } else if !field.accepts(encoding) {
            self.error = Some(configuration_error(format!(
                "{} cannot be encoded as {}",
                field, encoding
            )));
        } else {
            *slot = Some(encoding);
        }
        self
    }

    pub fn position(self, encoding: Encoding) -> Self {
        self.with(FieldKind::Position, encoding)
    }

    pub fn intensity(self, encoding: Encoding) -> Self {
        self.with(FieldKind::Intensity, encoding)
    }

    pub fn normal(self, encoding: Encoding) -> Self {
        self.with(FieldKind::Normal, encoding)
    }

    pub fn color(self, encoding: Encoding) -> Self {
        self.with(FieldKind::Color, encoding)
    }

    pub fn label(self, encoding: Encoding) -> Self {
        self.with(FieldKind::Label, encoding)
    }

    pub fn curvature(self, encoding: Encoding) -> Self {
        self.with(FieldKind::Curvature, encoding)
    }

    pub fn hit_count(self, encoding: Encoding) -> Self {
        self.with(FieldKind::HitCount, encoding)
    }

    pub fn gps_time(self, encoding: Encoding) -> Self {
        self.with(FieldKind::GpsTime, encoding)
    }

    /// # Errors
    ///
    /// Returns `PointCloudError::Configuration` if a field was given two
    /// encodings, an encoding the field cannot hold, or no position.
    pub fn build(self) -> PointCloudResult<PointSchema> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.encodings[FieldKind::Position.index()].is_none() {
            return Err(configuration_error("Point schema requires a position field"));
        }
        Ok(PointSchema {
            encodings: self.encodings,
            offsets: OnceLock::new(),
        })
    }
}

/// Predefined point layouts of commonly imported clouds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointType {
    Pos64,
    Pos64Col32IShort,
    Pos64IShort,
    Pos64Col32,
    Pos64Label8,
    Pos64Nor32Col32IShort,
    Pos64Nor32IShort,
    Pos64Nor32Col32,
}

impl PointType {
    pub fn schema(self) -> PointSchema {
        let b = PointSchema::builder().position(Encoding::Float3_64);
        let b = match self {
            PointType::Pos64 => b,
            PointType::Pos64Col32IShort => {
                b.intensity(Encoding::UInt16).color(Encoding::Float3_32)
            }
            PointType::Pos64IShort => b.intensity(Encoding::UInt16),
            PointType::Pos64Col32 => b.color(Encoding::Float3_32),
            PointType::Pos64Label8 => b.label(Encoding::UInt8),
            PointType::Pos64Nor32Col32IShort => b
                .intensity(Encoding::UInt16)
                .normal(Encoding::Float3_32)
                .color(Encoding::Float3_32),
            PointType::Pos64Nor32IShort => {
                b.intensity(Encoding::UInt16).normal(Encoding::Float3_32)
            }
            PointType::Pos64Nor32Col32 => {
                b.normal(Encoding::Float3_32).color(Encoding::Float3_32)
            }
        };
        PointSchema {
            encodings: b.encodings,
            offsets: OnceLock::new(),
        }
    }
}
