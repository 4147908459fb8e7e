//! Common traits for point importers.

use pcloud_core::point::Point;
use pcloud_core::schema::PointSchema;
use pcloud_core::status::PointCloudResult;

/// A source of raw points to build an octree from.
///
/// ```ignore
/// use pcloud_octree::{PlyReader, PointCloudReader};
///
/// let mut reader = PlyReader::open("scan.ply")?;
/// let schema = reader.schema().clone();
/// let points = reader.read_points()?;
/// ```
pub trait PointCloudReader {
    /// Schema the returned points are encoded with.
    fn schema(&self) -> &PointSchema;

    /// Reads all points.
    fn read_points(&mut self) -> PointCloudResult<Vec<Point>>;
}
