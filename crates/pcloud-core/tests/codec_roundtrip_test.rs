//! Raw point codec round trips across schemas.

use std::sync::Arc;

use pcloud_core::codec::RawPointCodec;
use pcloud_core::data_types::Encoding;
use pcloud_core::point::{FieldValue, Point, PointFields};
use pcloud_core::schema::{FieldKind, PointSchema};
use pcloud_core::status::PointCloudError;
use proptest::prelude::*;

#[test]
fn test_position_and_color_float3_32() {
    let schema = PointSchema::builder()
        .position(Encoding::Float3_32)
        .color(Encoding::Float3_32)
        .build()
        .unwrap();
    let codec = RawPointCodec::new(Arc::new(schema));

    let point = Point::new()
        .with(FieldKind::Position, FieldValue::Float3_32([1.0, 2.0, 3.0]))
        .with(FieldKind::Color, FieldValue::Float3_32([0.1, 0.2, 0.3]));

    let bytes = codec.encode(&point).unwrap();
    assert_eq!(bytes.len(), 24, "position + color should pack into 24 bytes");

    let decoded: Point = codec.decode_point(&bytes).unwrap();
    assert_eq!(
        decoded.field(FieldKind::Position),
        Some(FieldValue::Float3_32([1.0, 2.0, 3.0]))
    );
    assert_eq!(
        decoded.field(FieldKind::Color),
        Some(FieldValue::Float3_32([0.1, 0.2, 0.3]))
    );
}

#[test]
fn test_introspection_lists_only_present_capabilities() {
    let schema = PointSchema::builder()
        .position(Encoding::Float3_32)
        .intensity(Encoding::UInt16)
        .build()
        .unwrap();
    let codec = RawPointCodec::new(Arc::new(schema.clone()));
    let point = Point::new()
        .with(FieldKind::Position, FieldValue::Float3_32([0.0, 0.0, 0.0]))
        .with(FieldKind::Intensity, FieldValue::UInt16(500));
    let decoded: Point = codec.decode_point(&codec.encode(&point).unwrap()).unwrap();

    assert_eq!(
        schema.capability_names(),
        vec!["PositionFloat3_32".to_string(), "IntensityUInt16".to_string()]
    );
    assert!(schema.has(FieldKind::Intensity, Encoding::UInt16));
    assert!(!schema.has(FieldKind::Intensity, Encoding::UInt8));
    assert_eq!(decoded.intensity(), Some(500.0));
}

#[test]
fn test_second_encoding_for_field_is_rejected() {
    let result = PointSchema::builder()
        .position(Encoding::Float3_32)
        .intensity(Encoding::UInt16)
        .intensity(Encoding::UInt8)
        .build();
    assert!(matches!(result, Err(PointCloudError::Configuration(_))));
}

#[test]
fn test_illegal_combinations_are_rejected() {
    assert!(PointSchema::builder().intensity(Encoding::UInt8).build().is_err());
    assert!(PointSchema::builder().position(Encoding::Float64).build().is_err());
    assert!(PointSchema::builder()
        .position(Encoding::Float3_64)
        .label(Encoding::Float3_32)
        .build()
        .is_err());
    assert!(PointSchema::builder()
        .position(Encoding::Float3_64)
        .color(Encoding::UInt32)
        .build()
        .is_ok());
}

#[test]
fn test_decode_shorter_than_point_fails() {
    let schema = PointSchema::builder()
        .position(Encoding::Float3_64)
        .gps_time(Encoding::Float64)
        .build()
        .unwrap();
    let codec = RawPointCodec::new(Arc::new(schema));
    let err = codec.decode_point::<Point>(&[0u8; 30]).unwrap_err();
    assert_eq!(
        err,
        PointCloudError::InsufficientData {
            needed: 32,
            available: 30
        }
    );
}

#[test]
fn test_decode_all_contiguous() {
    let schema = PointSchema::builder()
        .position(Encoding::Float3_64)
        .label(Encoding::UInt8)
        .build()
        .unwrap();
    let codec = RawPointCodec::new(Arc::new(schema));
    let points: Vec<Point> = (0..5)
        .map(|i| {
            Point::new()
                .with(FieldKind::Position, FieldValue::Float3_64([i as f64, 0.0, -1.0]))
                .with(FieldKind::Label, FieldValue::UInt8(i as u8))
        })
        .collect();
    let bytes = codec.encode_all(&points).unwrap();
    assert_eq!(bytes.len(), 5 * 25);
    let decoded: Vec<Point> = codec.decode_all(&bytes, 5).unwrap();
    assert_eq!(decoded, points);
    assert!(codec.decode_all::<Point>(&bytes, 6).is_err());
}

fn value_for(encoding: Encoding) -> BoxedStrategy<FieldValue> {
    // Floats are kept finite so that equality is meaningful.
    let f32s = -1.0e6f32..1.0e6f32;
    let f64s = -1.0e12f64..1.0e12f64;
    match encoding {
        Encoding::Int8 => any::<i8>().prop_map(FieldValue::Int8).boxed(),
        Encoding::UInt8 => any::<u8>().prop_map(FieldValue::UInt8).boxed(),
        Encoding::Int16 => any::<i16>().prop_map(FieldValue::Int16).boxed(),
        Encoding::UInt16 => any::<u16>().prop_map(FieldValue::UInt16).boxed(),
        Encoding::Int32 => any::<i32>().prop_map(FieldValue::Int32).boxed(),
        Encoding::UInt32 => any::<u32>().prop_map(FieldValue::UInt32).boxed(),
        Encoding::Int64 => any::<i64>().prop_map(FieldValue::Int64).boxed(),
        Encoding::UInt64 => any::<u64>().prop_map(FieldValue::UInt64).boxed(),
        Encoding::Float32 => f32s.prop_map(FieldValue::Float32).boxed(),
        Encoding::Float64 => f64s.prop_map(FieldValue::Float64).boxed(),
        Encoding::Float3_32 => [f32s.clone(), f32s.clone(), f32s]
            .prop_map(FieldValue::Float3_32)
            .boxed(),
        Encoding::Float3_64 => [f64s.clone(), f64s.clone(), f64s]
            .prop_map(FieldValue::Float3_64)
            .boxed(),
    }
}

/// A random valid schema: a vector position plus any legal subset of the
/// other fields.
fn schema_strategy() -> impl Strategy<Value = PointSchema> {
    let pick = |field: FieldKind| {
        let legal: Vec<Encoding> = Encoding::ALL
            .iter()
            .copied()
            .filter(|e| field.accepts(*e))
            .collect();
        proptest::option::of(proptest::sample::select(legal))
    };
    (
        proptest::sample::select(vec![Encoding::Float3_32, Encoding::Float3_64]),
        pick(FieldKind::Intensity),
        pick(FieldKind::Normal),
        pick(FieldKind::Color),
        pick(FieldKind::Label),
        pick(FieldKind::Curvature),
        pick(FieldKind::HitCount),
        pick(FieldKind::GpsTime),
    )
        .prop_map(|(pos, i, n, c, l, cu, h, g)| {
            let mut b = PointSchema::builder().position(pos);
            let rest = [
                (FieldKind::Intensity, i),
                (FieldKind::Normal, n),
                (FieldKind::Color, c),
                (FieldKind::Label, l),
                (FieldKind::Curvature, cu),
                (FieldKind::HitCount, h),
                (FieldKind::GpsTime, g),
            ];
            for (field, encoding) in rest {
                if let Some(encoding) = encoding {
                    b = b.with(field, encoding);
                }
            }
            b.build().unwrap()
        })
}

fn schema_and_point() -> impl Strategy<Value = (PointSchema, Point)> {
    schema_strategy().prop_flat_map(|schema| {
        let values: Vec<_> = schema
            .fields()
            .map(|(field, encoding)| value_for(encoding).prop_map(move |v| (field, v)))
            .collect();
        (Just(schema), values).prop_map(|(schema, values)| {
            let point = values
                .into_iter()
                .fold(Point::new(), |p, (field, v)| p.with(field, v));
            (schema, point)
        })
    })
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode((schema, point) in schema_and_point()) {
        let codec = RawPointCodec::new(Arc::new(schema));
        let bytes = codec.encode(&point).unwrap();
        let decoded: Point = codec.decode_point(&bytes).unwrap();
        prop_assert_eq!(decoded, point);
    }

    #[test]
    fn prop_encoded_length_is_sum_of_fields(schema in schema_strategy()) {
        let expected: usize = schema.fields().map(|(_, e)| e.byte_length()).sum();
        let codec = RawPointCodec::new(Arc::new(schema.clone()));
        let bytes = codec.encode(&Point::zeroed(&schema)).unwrap();
        prop_assert_eq!(bytes.len(), expected);
        prop_assert_eq!(codec.point_len(), expected);
    }
}
