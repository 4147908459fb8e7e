use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use pcloud_core::codec::RawPointCodec;
use pcloud_core::point::{FieldValue, Point};
use pcloud_core::schema::{FieldKind, PointType};

const POINTS: usize = 100_000;

fn sample_points() -> Vec<Point> {
    (0..POINTS)
        .map(|i| {
            let t = i as f64;
            Point::new()
                .with(FieldKind::Position, FieldValue::Float3_64([t, t * 0.5, -t]))
                .with(FieldKind::Intensity, FieldValue::UInt16((i % 65536) as u16))
                .with(FieldKind::Normal, FieldValue::Float3_32([0.0, 0.0, 1.0]))
                .with(FieldKind::Color, FieldValue::Float3_32([0.2, 0.4, 0.6]))
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let codec = RawPointCodec::new(Arc::new(PointType::Pos64Nor32Col32IShort.schema()));
    let points = sample_points();
    let bytes = codec.encode_all(&points).unwrap();

    let mut group = c.benchmark_group("raw_point_codec");
    group.throughput(Throughput::Elements(POINTS as u64));
    group.bench_function("encode_all", |b| {
        b.iter(|| codec.encode_all(black_box(&points)).unwrap())
    });
    group.bench_function("decode_all", |b| {
        b.iter(|| codec.decode_all::<Point>(black_box(&bytes), POINTS).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
