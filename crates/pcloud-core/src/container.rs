//! Point cloud container: one schema, a shared read-only point array and the
//! bounding metadata of the set.

use std::sync::Arc;

use glam::DVec3;

use crate::codec::RawPointCodec;
use crate::point::{Point, PointFields};
use crate::schema::PointSchema;
use crate::status::{configuration_error, PointCloudResult};

/// Axis-aligned bounding box in double precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// An inverted box that any `extend` call replaces.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Cube centered on `center` with edge length `size`.
    pub fn from_center_size(center: DVec3, size: f64) -> Self {
        let half = DVec3::splat(size * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.size().max_element()
        }
    }

    pub fn extend(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn contains(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bounding box of every point that has a position.
pub fn bounds_of<P: PointFields>(points: &[P]) -> Aabb {
    let mut bounds = Aabb::empty();
    for p in points.iter().filter_map(|p| p.position()) {
        bounds.extend(p);
    }
    bounds
}

/// Immutable, cheaply clonable set of points sharing one schema.
#[derive(Debug, Clone)]
pub struct PointCloud<P = Point> {
    schema: Arc<PointSchema>,
    points: Arc<[P]>,
    bounds: Aabb,
    spacing: f64,
    source: String,
}

impl<P: PointFields> PointCloud<P> {
    pub fn new(
        schema: Arc<PointSchema>,
        points: impl Into<Arc<[P]>>,
        bounds: Aabb,
        spacing: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            points: points.into(),
            bounds,
            spacing,
            source: source.into(),
        }
    }

    /// Decodes `count` raw points and wraps them with bounds computed from
    /// their positions.
    pub fn from_raw(
        codec: &RawPointCodec,
        bytes: &[u8],
        count: usize,
        spacing: f64,
        source: impl Into<String>,
    ) -> PointCloudResult<Self> {
        let points: Vec<P> = codec.decode_all(bytes, count)?;
        let bounds = bounds_of(&points);
        Ok(Self::new(
            codec.schema().clone(),
            points,
            bounds,
            spacing,
            source,
        ))
    }

    /// Wraps points under a schema, rejecting points without a position.
    pub fn from_points(
        schema: Arc<PointSchema>,
        points: Vec<P>,
        source: impl Into<String>,
    ) -> PointCloudResult<Self> {
        if let Some(i) = points.iter().position(|p| p.position().is_none()) {
            return Err(configuration_error(format!("Point {} has no position", i)));
        }
        let bounds = bounds_of(&points);
        Ok(Self::new(schema, points, bounds, 0.0, source))
    }

    pub fn schema(&self) -> &Arc<PointSchema> {
        &self.schema
    }

    pub fn points(&self) -> &[P] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn positions(&self) -> impl Iterator<Item = DVec3> + '_ {
        self.points.iter().filter_map(|p| p.position())
    }
}
