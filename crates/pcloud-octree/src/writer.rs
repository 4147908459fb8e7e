use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use pcloud_core::codec::RawPointCodec;
use pcloud_core::point::PointFields;
use pcloud_core::status::PointCloudResult;

use crate::builder::BuiltOctree;
use crate::hierarchy::{encode_hierarchy, HIERARCHY_FILE_NAME};
use crate::meta::OctreeMeta;
use crate::payload::{encode_payload, node_file_path, OCTANTS_DIR};

/// Writes a built octree as an out-of-core point cloud folder:
/// `meta.json`, `octree.hierarchy` and one `Octants/<id>.node` per
/// non-empty octant.
#[derive(Debug, Clone)]
pub struct OctreeFileWriter {
    folder: PathBuf,
}

impl OctreeFileWriter {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn write<P: PointFields>(
        &self,
        tree: &BuiltOctree<P>,
        codec: &RawPointCodec,
    ) -> PointCloudResult<()> {
        fs::create_dir_all(self.folder.join(OCTANTS_DIR))?;
        self.write_meta(tree, codec)?;
        self.write_hierarchy(tree)?;

        let mut written = 0usize;
        for index in tree.hierarchy.depth_first() {
            let points = tree.payload(index);
            if points.is_empty() {
                continue;
            }
            let octant = &tree.hierarchy[index];
            let bytes = encode_payload(codec, points)?;
            fs::write(node_file_path(&self.folder, &octant.id), bytes)?;
            written += 1;
        }

        info!(
            "Wrote {} octants ({} with payload, {} points) to {}",
            tree.hierarchy.len(),
            written,
            tree.total_points(),
            self.folder.display()
        );
        Ok(())
    }

    pub fn write_meta<P: PointFields>(
        &self,
        tree: &BuiltOctree<P>,
        codec: &RawPointCodec,
    ) -> PointCloudResult<()> {
        let root = &tree.hierarchy[tree.hierarchy.root()];
        let mut meta = OctreeMeta::new(
            codec.schema(),
            root.center,
            root.size,
            root.spacing,
            tree.hierarchy.max_level(),
            tree.max_points_in_bucket,
        );
        meta.number_of_points = Some(tree.total_points() as u64);
        meta.write_to(&self.folder)
    }

    pub fn write_hierarchy<P>(&self, tree: &BuiltOctree<P>) -> PointCloudResult<()> {
        let bytes = encode_hierarchy(&tree.hierarchy);
        debug!("Hierarchy is {} bytes", bytes.len());
        fs::write(self.folder.join(HIERARCHY_FILE_NAME), bytes)?;
        Ok(())
    }
}
