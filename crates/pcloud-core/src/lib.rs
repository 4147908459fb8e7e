//! Point cloud core library
//!
//! Schema-driven point records: a [`PointSchema`] describes which fields a
//! point carries and how each is encoded, a [`RawPointCodec`] turns points
//! into fixed-layout byte buffers and back, and a [`PointCloud`] holds a
//! shared, read-only set of decoded points.

pub mod codec;
pub mod container;
pub mod data_types;
pub mod decoder_buffer;
pub mod encoder_buffer;
pub mod point;
pub mod schema;
pub mod status;

pub use codec::RawPointCodec;
pub use container::{Aabb, PointCloud};
pub use data_types::Encoding;
pub use point::{FieldValue, Point, PointFields};
pub use schema::{FieldKind, FieldOffsetTable, PointSchema, PointSchemaBuilder, PointType};
pub use status::{PointCloudError, PointCloudResult};
