//! Out-of-core octree storage for point clouds.
//!
//! A point cloud folder holds `meta.json` (root cube, bucket size, point
//! schema), `octree.hierarchy` (octant structure) and `Octants/<id>.node`
//! payload files. [`OctreeBuilder`] and [`OctreeFileWriter`] produce such a
//! folder; [`OctreeFileReader`] parses its structure and a
//! [`PayloadSource`] serves octant payloads on demand.

pub mod builder;
pub mod hierarchy;
pub mod meta;
pub mod octant;
pub mod payload;
pub mod ply_reader;
pub mod reader;
pub mod traits;
pub mod writer;

pub use builder::{BuiltOctree, OctreeBuilder, OctreeBuilderOptions};
pub use meta::OctreeMeta;
pub use octant::{Octant, OctantId, OctantIndex, OctreeHierarchy};
pub use payload::{FolderPayloadSource, PayloadSource};
pub use ply_reader::PlyReader;
pub use reader::OctreeFileReader;
pub use traits::PointCloudReader;
pub use writer::OctreeFileWriter;
