//! Partitions a point set into a level-of-detail octree.
//!
//! Every octant keeps at most one point per cell of a regular grid whose cell
//! edge is the octant's spacing, so coarse octants hold an even subsample of
//! the points below them. Points that find their cell occupied overflow. An
//! octant whose overflow reaches the bucket size hands the overflow down to
//! its children; otherwise it becomes a leaf and keeps the overflow itself.

use std::collections::HashSet;

use glam::DVec3;
use log::{debug, info};
use pcloud_core::container::bounds_of;
use pcloud_core::point::PointFields;
use pcloud_core::status::{configuration_error, PointCloudResult};

use crate::octant::{Octant, OctantId, OctantIndex, OctreeHierarchy, MAX_LEVEL};

#[derive(Debug, Clone, PartialEq)]
pub struct OctreeBuilderOptions {
    /// Overflow count at which an octant is subdivided.
    pub max_points_in_bucket: u32,
    /// Grid cells per axis; the root spacing is the root size divided by this.
    pub grid_resolution: u32,
}

impl Default for OctreeBuilderOptions {
    fn default() -> Self {
        Self {
            max_points_in_bucket: 10_000,
            grid_resolution: 128,
        }
    }
}

impl OctreeBuilderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_points_in_bucket(mut self, max: u32) -> Self {
        self.max_points_in_bucket = max;
        self
    }

    pub fn with_grid_resolution(mut self, cells: u32) -> Self {
        self.grid_resolution = cells;
        self
    }
}

/// Octree structure together with the points of every octant, indexed like
/// the hierarchy's arena.
#[derive(Debug, Clone)]
pub struct BuiltOctree<P> {
    pub hierarchy: OctreeHierarchy,
    pub payloads: Vec<Vec<P>>,
    pub max_points_in_bucket: u32,
}

impl<P> BuiltOctree<P> {
    pub fn payload(&self, index: OctantIndex) -> &[P] {
        &self.payloads[usize::from(index)]
    }

    pub fn total_points(&self) -> usize {
        self.payloads.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OctreeBuilder {
    options: OctreeBuilderOptions,
}

/// Child position of `p` inside a cube centered on `center`.
pub fn child_position(center: DVec3, p: DVec3) -> u8 {
    u8::from(p.x >= center.x) | (u8::from(p.y >= center.y) << 1) | (u8::from(p.z >= center.z) << 2)
}

impl OctreeBuilder {
    pub fn new(options: OctreeBuilderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OctreeBuilderOptions {
        &self.options
    }

    /// # Errors
    ///
    /// Returns `PointCloudError::Configuration` for an empty input, points
    /// without a position, or zero-valued options.
    pub fn build<P: PointFields>(&self, points: Vec<P>) -> PointCloudResult<BuiltOctree<P>> {
        if self.options.max_points_in_bucket == 0 || self.options.grid_resolution == 0 {
            return Err(configuration_error(
                "Bucket size and grid resolution must be positive",
            ));
        }
        if points.is_empty() {
            return Err(configuration_error("Cannot build an octree without points"));
        }
        if points.iter().any(|p| p.position().is_none()) {
            return Err(configuration_error("Every point needs a position"));
        }

        let bounds = bounds_of(&points);
        let mut size = bounds.max_extent();
        // Grow slightly so that no point lies exactly on the outer faces.
        size += size * 0.0001;
        if size <= 0.0 {
            size = 1.0;
        }

        let mut root = Octant::new(OctantId::ROOT, bounds.center(), size);
        root.spacing = size / self.options.grid_resolution as f64;
        let mut hierarchy = OctreeHierarchy::new(root);
        let mut payloads: Vec<Vec<P>> = vec![Vec::new()];

        info!(
            "Building octree over {} points, root size {:.3}, spacing {:.5}",
            points.len(),
            size,
            hierarchy[hierarchy.root()].spacing
        );

        let mut queue = vec![(hierarchy.root(), points)];
        while let Some((index, incoming)) = queue.pop() {
            let (mut kept, overflow) = self.sample_grid(&hierarchy[index], incoming);
            let can_split = hierarchy[index].id.level() < MAX_LEVEL;

            if overflow.len() >= self.options.max_points_in_bucket as usize && can_split {
                let center = hierarchy[index].center;
                let mut buckets: [Vec<P>; 8] = Default::default();
                for p in overflow {
                    if let Some(pos) = p.position() {
                        buckets[child_position(center, pos) as usize].push(p);
                    }
                }
                for (pos, bucket) in buckets.into_iter().enumerate() {
                    if bucket.is_empty() {
                        continue;
                    }
                    let child = hierarchy.add_child(index, pos as u8).ok_or_else(|| {
                        configuration_error(format!("Octant {} cannot be split", hierarchy[index].id))
                    })?;
                    payloads.push(Vec::new());
                    queue.push((child, bucket));
                }
            } else {
                kept.extend(overflow);
            }

            hierarchy.set_point_count(index, kept.len() as u32);
            payloads[usize::from(index)] = kept;
        }

        debug!(
            "Octree has {} octants, max level {}",
            hierarchy.len(),
            hierarchy.max_level()
        );

        Ok(BuiltOctree {
            hierarchy,
            payloads,
            max_points_in_bucket: self.options.max_points_in_bucket,
        })
    }

    /// Splits `points` into grid occupants of `octant` and overflow.
    fn sample_grid<P: PointFields>(&self, octant: &Octant, points: Vec<P>) -> (Vec<P>, Vec<P>) {
        let cells = self.options.grid_resolution as i64;
        let min = octant.center - DVec3::splat(octant.size / 2.0);
        let mut occupied = HashSet::with_capacity(points.len().min(1 << 16));
        let mut kept = Vec::new();
        let mut overflow = Vec::new();
        for p in points {
            let Some(pos) = p.position() else { continue };
            let cell = ((pos - min) / octant.spacing).floor();
            let key = (
                (cell.x as i64).clamp(0, cells - 1),
                (cell.y as i64).clamp(0, cells - 1),
                (cell.z as i64).clamp(0, cells - 1),
            );
            if occupied.insert(key) {
                kept.push(p);
            } else {
                overflow.push(p);
            }
        }
        (kept, overflow)
    }
}
