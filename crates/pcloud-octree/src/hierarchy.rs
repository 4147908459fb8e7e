//! Binary `octree.hierarchy` format.
//!
//! ```text
//! header:  b"OOCH"  u32 version  u32 node_count
//! node:    u32 level  f64 spacing  u32 point_count  u8 is_leaf  u8 child_mask
//! ```
//!
//! Nodes are stored depth-first in pre-order; a node's children follow it in
//! ascending position order, one record per bit set in its child mask. All
//! values are little-endian. Centers and sizes are not stored: they follow
//! from the root node in `meta.json`.

use glam::DVec3;
use pcloud_core::decoder_buffer::DecoderBuffer;
use pcloud_core::encoder_buffer::EncoderBuffer;
use pcloud_core::status::{corruption_error, PointCloudError, PointCloudResult};

use crate::octant::{Octant, OctantId, OctantIndex, OctreeHierarchy};

pub const HIERARCHY_FILE_NAME: &str = "octree.hierarchy";
pub const HIERARCHY_MAGIC: &[u8; 4] = b"OOCH";
pub const HIERARCHY_VERSION: u32 = 1;

const RECORD_LEN: usize = 4 + 8 + 4 + 1 + 1;

struct NodeRecord {
    level: u32,
    spacing: f64,
    point_count: u32,
    is_leaf: bool,
    child_mask: u8,
}

fn truncated(err: PointCloudError) -> PointCloudError {
    match err {
        PointCloudError::InsufficientData { needed, available } => corruption_error(format!(
            "Hierarchy is truncated: need {} more bytes, have {}",
            needed, available
        )),
        other => other,
    }
}

fn read_record(buffer: &mut DecoderBuffer) -> PointCloudResult<NodeRecord> {
    let level = buffer.decode_u32()?;
    let spacing = buffer.decode_f64()?;
    let point_count = buffer.decode_u32()?;
    let is_leaf = buffer.decode_bool()?;
    let child_mask = buffer.decode_u8()?;
    if is_leaf && child_mask != 0 {
        return Err(corruption_error(format!(
            "Leaf node at level {} declares children (mask {:#010b})",
            level, child_mask
        )));
    }
    Ok(NodeRecord {
        level,
        spacing,
        point_count,
        is_leaf,
        child_mask,
    })
}

fn apply_record(octant: &mut Octant, record: &NodeRecord) {
    octant.spacing = record.spacing;
    octant.point_count = record.point_count;
    octant.is_leaf = record.is_leaf;
}

fn read_children(
    buffer: &mut DecoderBuffer,
    hierarchy: &mut OctreeHierarchy,
    parent: OctantIndex,
    child_mask: u8,
) -> PointCloudResult<()> {
    for pos in 0..8u8 {
        if child_mask & (1 << pos) == 0 {
            continue;
        }
        let record = read_record(buffer)?;
        let expected = hierarchy[parent].level() + 1;
        if record.level != expected {
            return Err(corruption_error(format!(
                "Child {} of octant {} has level {}, expected {}",
                pos, hierarchy[parent].id, record.level, expected
            )));
        }
        let child = hierarchy.add_child(parent, pos).ok_or_else(|| {
            corruption_error(format!("Octant {} is nested too deep", hierarchy[parent].id))
        })?;
        apply_record(hierarchy.get_mut(child), &record);
        read_children(buffer, hierarchy, child, record.child_mask)?;
    }
    Ok(())
}

/// Parses a hierarchy file into an arena rooted at a cube of `root_size`
/// centered on `root_center`.
///
/// # Errors
///
/// Returns `PointCloudError::StructuralCorruption` for a wrong header,
/// truncated or trailing data, inconsistent levels, or a node count that
/// disagrees with the header.
pub fn decode_hierarchy(
    data: &[u8],
    root_center: DVec3,
    root_size: f64,
) -> PointCloudResult<OctreeHierarchy> {
    let mut buffer = DecoderBuffer::new(data);
    let magic = buffer.decode_slice(4).map_err(truncated)?;
    if magic != HIERARCHY_MAGIC {
        return Err(corruption_error("Not an octree hierarchy file"));
    }
    let version = buffer.decode_u32().map_err(truncated)?;
    if version != HIERARCHY_VERSION {
        return Err(corruption_error(format!(
            "Unsupported hierarchy version {}",
            version
        )));
    }
    let node_count = buffer.decode_u32().map_err(truncated)? as usize;
    if node_count == 0 {
        return Err(corruption_error("Hierarchy has no root node"));
    }
    if node_count.saturating_mul(RECORD_LEN) > buffer.remaining_size() {
        return Err(corruption_error(format!(
            "Hierarchy declares {} nodes but holds only {} bytes of records",
            node_count,
            buffer.remaining_size()
        )));
    }

    let root_record = read_record(&mut buffer).map_err(truncated)?;
    if root_record.level != 0 {
        return Err(corruption_error(format!(
            "Root node has level {}",
            root_record.level
        )));
    }
    let mut root = Octant::new(OctantId::ROOT, root_center, root_size);
    apply_record(&mut root, &root_record);
    let mut hierarchy = OctreeHierarchy::new(root);
    let root_index = hierarchy.root();
    read_children(&mut buffer, &mut hierarchy, root_index, root_record.child_mask)
        .map_err(truncated)?;

    if !buffer.is_exhausted() {
        return Err(corruption_error(format!(
            "{} trailing bytes after the last hierarchy node",
            buffer.remaining_size()
        )));
    }
    if hierarchy.len() != node_count {
        return Err(corruption_error(format!(
            "Hierarchy header declares {} nodes, found {}",
            node_count,
            hierarchy.len()
        )));
    }
    Ok(hierarchy)
}

pub fn encode_hierarchy(hierarchy: &OctreeHierarchy) -> Vec<u8> {
    let mut out = EncoderBuffer::with_capacity(12 + hierarchy.len() * RECORD_LEN);
    out.encode_bytes(HIERARCHY_MAGIC);
    out.encode_u32(HIERARCHY_VERSION);
    out.encode_u32(hierarchy.len() as u32);
    for index in hierarchy.depth_first() {
        let octant = &hierarchy[index];
        out.encode_u32(octant.level());
        out.encode_f64(octant.spacing);
        out.encode_u32(octant.point_count);
        out.encode_bool(octant.is_leaf);
        out.encode_u8(octant.child_mask());
    }
    out.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OctreeHierarchy {
        let mut root = Octant::new(OctantId::ROOT, DVec3::ZERO, 16.0);
        root.spacing = 1.0;
        root.point_count = 10;
        let mut h = OctreeHierarchy::new(root);
        let r = h.root();
        let a = h.add_child(r, 3).unwrap();
        let b = h.add_child(r, 5).unwrap();
        let c = h.add_child(a, 0).unwrap();
        h.get_mut(a).point_count = 4;
        h.get_mut(b).point_count = 7;
        h.get_mut(c).point_count = 2;
        h
    }

    #[test]
    fn test_hierarchy_bytes_parse_back() {
        let h = sample();
        let bytes = encode_hierarchy(&h);
        assert_eq!(bytes.len(), 12 + 4 * RECORD_LEN);
        let parsed = decode_hierarchy(&bytes, DVec3::ZERO, 16.0).unwrap();
        assert_eq!(parsed.len(), 4);
        for index in h.depth_first() {
            let id = h[index].id;
            let (a, b) = (&h[index], &parsed[parsed.find(&id).unwrap()]);
            assert_eq!(a.center, b.center, "octant {}", id);
            assert_eq!(a.size, b.size, "octant {}", id);
            assert_eq!(a.spacing, b.spacing, "octant {}", id);
            assert_eq!(a.point_count, b.point_count, "octant {}", id);
            assert_eq!(a.is_leaf, b.is_leaf, "octant {}", id);
            assert_eq!(a.child_mask(), b.child_mask(), "octant {}", id);
        }
    }

    #[test]
    fn test_truncated_hierarchy_is_corrupt() {
        let bytes = encode_hierarchy(&sample());
        for cut in [0, 3, 11, 12, 20, bytes.len() - 1] {
            let err = decode_hierarchy(&bytes[..cut], DVec3::ZERO, 16.0).unwrap_err();
            assert!(
                matches!(err, PointCloudError::StructuralCorruption(_)),
                "cut at {}: {:?}",
                cut,
                err
            );
        }
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let mut bytes = encode_hierarchy(&sample());
        bytes.push(0);
        assert!(decode_hierarchy(&bytes, DVec3::ZERO, 16.0).is_err());
    }

    #[test]
    fn test_wrong_child_level_is_corrupt() {
        let mut bytes = encode_hierarchy(&sample());
        // Level field of the second record (first child of the root).
        bytes[12 + RECORD_LEN] = 5;
        let err = decode_hierarchy(&bytes, DVec3::ZERO, 16.0).unwrap_err();
        assert!(matches!(err, PointCloudError::StructuralCorruption(_)));
    }
}
