//! Reader for point cloud folders written by [`OctreeFileWriter`](crate::writer::OctreeFileWriter).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info};
use pcloud_core::codec::RawPointCodec;
use pcloud_core::container::PointCloud;
use pcloud_core::point::PointFields;
use pcloud_core::schema::PointSchema;
use pcloud_core::status::{corruption_error, PointCloudError, PointCloudResult};

use crate::hierarchy::{decode_hierarchy, HIERARCHY_FILE_NAME};
use crate::meta::OctreeMeta;
use crate::octant::{Octant, OctreeHierarchy};
use crate::payload::{load_octant, node_file_path, FolderPayloadSource};

/// Parses the structure of an out-of-core point cloud.
///
/// [`get_scene`](Self::get_scene) reads `meta.json` and `octree.hierarchy`
/// only; payloads are loaded on demand with [`load_points`](Self::load_points)
/// or through a [`FolderPayloadSource`].
#[derive(Debug)]
pub struct OctreeFileReader {
    folder: PathBuf,
    meta: Option<OctreeMeta>,
    schema: Option<Arc<PointSchema>>,
    number_of_octants: usize,
}

impl OctreeFileReader {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            meta: None,
            schema: None,
            number_of_octants: 0,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Parses the hierarchy into an octant arena and caches the octant count.
    ///
    /// # Errors
    ///
    /// Returns `PointCloudError::StructuralCorruption` if `meta.json` or
    /// `octree.hierarchy` is missing or malformed. The reader keeps no
    /// partial state in that case.
    pub fn get_scene(&mut self) -> PointCloudResult<OctreeHierarchy> {
        self.meta = None;
        self.schema = None;
        self.number_of_octants = 0;

        let meta = OctreeMeta::read_from(&self.folder)?;
        let schema = meta
            .schema()
            .map_err(|e| corruption_error(format!("Invalid point type in metadata: {}", e)))?;

        let path = self.folder.join(HIERARCHY_FILE_NAME);
        let bytes = fs::read(&path)
            .map_err(|e| corruption_error(format!("Cannot read {}: {}", path.display(), e)))?;
        let hierarchy = decode_hierarchy(&bytes, meta.root_center(), meta.root_size())?;

        info!(
            "Opened point cloud {} with {} octants, schema {}",
            self.folder.display(),
            hierarchy.len(),
            schema
        );
        debug!(
            "Root center {:?}, size {}, max level {}",
            meta.root_center(),
            meta.root_size(),
            hierarchy.max_level()
        );

        self.number_of_octants = hierarchy.len();
        self.schema = Some(Arc::new(schema));
        self.meta = Some(meta);
        Ok(hierarchy)
    }

    /// Octants counted by the last successful [`get_scene`](Self::get_scene).
    pub fn number_of_octants(&self) -> usize {
        self.number_of_octants
    }

    pub fn meta(&self) -> Option<&OctreeMeta> {
        self.meta.as_ref()
    }

    pub fn schema(&self) -> Option<&Arc<PointSchema>> {
        self.schema.as_ref()
    }

    /// Codec for the schema of the opened cloud.
    pub fn codec(&self) -> Option<RawPointCodec> {
        self.schema.as_ref().map(|s| RawPointCodec::new(Arc::clone(s)))
    }

    pub fn payload_source(&self) -> FolderPayloadSource {
        FolderPayloadSource::new(&self.folder)
    }

    /// Point count stored in the payload header of `octant`, without
    /// reading its points. Octants without points have no payload file.
    pub fn payload_point_count(&self, octant: &Octant) -> PointCloudResult<u32> {
        if octant.point_count == 0 {
            return Ok(0);
        }
        let path = node_file_path(&self.folder, &octant.id);
        let fail = |e: std::io::Error| PointCloudError::LoadFailure {
            octant: octant.id.to_string(),
            reason: format!("cannot read header of {}: {}", path.display(), e),
        };
        let mut file = fs::File::open(&path).map_err(fail)?;
        let count = file.read_u32::<LittleEndian>().map_err(fail)?;
        // Point length follows; only its presence is checked.
        let mut point_len = [0u8; 4];
        file.read_exact(&mut point_len).map_err(fail)?;
        Ok(count)
    }

    /// Reads and decodes the payload of one octant.
    pub fn load_points<P: PointFields>(
        &self,
        codec: &RawPointCodec,
        octant: &Octant,
    ) -> PointCloudResult<PointCloud<P>> {
        load_octant(&self.payload_source(), codec, octant)
    }
}
