use std::collections::{HashMap, VecDeque};

use log::warn;
use pcloud_octree::{OctantIndex, OctreeHierarchy};

pub const BYTES_PER_TEXEL: usize = 4;

/// One-dimensional RGBA8 texture describing the visible part of an octree.
///
/// Visible octants get one texel each in breadth-first order. For a visible
/// octant with visible children, byte 0 of its texel is the mask of those
/// children (bit i = child at position i) and byte 1 is the texel distance to
/// its first visible child. Bytes 2 and 3 are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleOctreeHierarchyTexture {
    data: Vec<u8>,
    positions: HashMap<OctantIndex, u32>,
}

impl VisibleOctreeHierarchyTexture {
    /// Builds the texture for the octants for which `is_visible` holds.
    ///
    /// The texture is empty unless the root is visible.
    pub fn build(hierarchy: &OctreeHierarchy, is_visible: impl Fn(OctantIndex) -> bool) -> Self {
        let mut texture = Self::default();
        if hierarchy.is_empty() || !is_visible(hierarchy.root()) {
            return texture;
        }

        let mut queue = VecDeque::from([hierarchy.root()]);
        while let Some(index) = queue.pop_front() {
            if is_visible(index) {
                let pos = texture.positions.len() as u32;
                texture.positions.insert(index, pos);
                texture.data.extend_from_slice(&[0; BYTES_PER_TEXEL]);

                let octant = &hierarchy[index];
                let parent = octant.parent.and_then(|p| texture.positions.get(&p).copied());
                if let (Some(parent_pos), Some(child_pos)) = (parent, octant.id.pos_in_parent()) {
                    let base = parent_pos as usize * BYTES_PER_TEXEL;
                    if texture.data[base] == 0 {
                        let offset = pos - parent_pos;
                        texture.data[base + 1] = u8::try_from(offset).unwrap_or_else(|_| {
                            warn!("Child offset {} of octant {} exceeds one byte", offset, octant.id);
                            u8::MAX
                        });
                    }
                    texture.data[base] |= 1 << child_pos;
                }
            }
            queue.extend(hierarchy.children(index).map(|(_, child)| child));
        }
        texture
    }

    /// Number of texels.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Raw RGBA8 bytes, `len() * 4` of them.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn texel(&self, pos: usize) -> Option<[u8; 4]> {
        let bytes = self.data.get(pos * BYTES_PER_TEXEL..(pos + 1) * BYTES_PER_TEXEL)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Texel position of a visible octant.
    pub fn position_of(&self, index: OctantIndex) -> Option<u32> {
        self.positions.get(&index).copied()
    }
}
