//! `meta.json` of a point cloud folder.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glam::DVec3;
use pcloud_core::schema::PointSchema;
use pcloud_core::status::{corruption_error, PointCloudError, PointCloudResult};
use serde::{Deserialize, Serialize};

pub const META_FILE_NAME: &str = "meta.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootNodeMeta {
    pub center: [f64; 3],
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OctreeMetaInfo {
    pub max_level: u32,
    pub max_no_of_points_in_bucket: u32,
    /// Spacing of the root octant.
    pub spacing_factor: f64,
    pub root_node: RootNodeMeta,
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OctreeMeta {
    pub octree: OctreeMetaInfo,
    /// Capability names of the point schema mapped to `true`.
    pub point_type: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_points: Option<u64>,
}

impl OctreeMeta {
    pub fn new(
        schema: &PointSchema,
        root_center: DVec3,
        root_size: f64,
        spacing: f64,
        max_level: u32,
        max_points_in_bucket: u32,
    ) -> Self {
        Self {
            octree: OctreeMetaInfo {
                max_level,
                max_no_of_points_in_bucket: max_points_in_bucket,
                spacing_factor: spacing,
                root_node: RootNodeMeta {
                    center: root_center.to_array(),
                    size: root_size,
                },
            },
            point_type: schema
                .capability_names()
                .into_iter()
                .map(|name| (name, true))
                .collect(),
            number_of_points: None,
        }
    }

    pub fn root_center(&self) -> DVec3 {
        DVec3::from_array(self.octree.root_node.center)
    }

    pub fn root_size(&self) -> f64 {
        self.octree.root_node.size
    }

    /// Rebuilds the point schema from the `pointType` entries set to `true`.
    pub fn schema(&self) -> PointCloudResult<PointSchema> {
        let names: Vec<&str> = self
            .point_type
            .iter()
            .filter(|(_, set)| **set)
            .map(|(name, _)| name.as_str())
            .collect();
        PointSchema::from_capability_names(&names)
    }

    /// # Errors
    ///
    /// Returns `PointCloudError::StructuralCorruption` if the file is missing
    /// or not valid metadata.
    pub fn read_from(folder: &Path) -> PointCloudResult<Self> {
        let path = folder.join(META_FILE_NAME);
        let text = fs::read_to_string(&path)
            .map_err(|e| corruption_error(format!("Cannot read {}: {}", path.display(), e)))?;
        let meta: OctreeMeta = serde_json::from_str(&text)
            .map_err(|e| corruption_error(format!("Malformed {}: {}", path.display(), e)))?;
        if !(meta.root_size() > 0.0) || !meta.root_center().is_finite() {
            return Err(corruption_error(format!(
                "{} has an invalid root node",
                path.display()
            )));
        }
        Ok(meta)
    }

    pub fn write_to(&self, folder: &Path) -> PointCloudResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| PointCloudError::Io(e.to_string()))?;
        fs::write(folder.join(META_FILE_NAME), text)?;
        Ok(())
    }
}
