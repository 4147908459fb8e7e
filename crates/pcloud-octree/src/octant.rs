//! Octants, octant ids and the octree hierarchy arena.

use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use pcloud_core::container::Aabb;
use pcloud_core::status::{configuration_error, PointCloudError};

/// Deepest level an [`OctantId`] can address (three bits per level in 64 bits).
pub const MAX_LEVEL: u8 = 21;

/// Path of an octant from the root: one child position (0-7) per level.
///
/// Bit 0 of a position selects +x, bit 1 +y and bit 2 +z. The string form is
/// `r` followed by one digit per level, e.g. `r` for the root and `r053` for
/// the child 3 of child 5 of child 0. Payload files are named after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OctantId {
    level: u8,
    path: u64,
}

impl OctantId {
    pub const ROOT: OctantId = OctantId { level: 0, path: 0 };

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// Id of the child at `pos`; `None` below [`MAX_LEVEL`] or for `pos > 7`.
    pub fn child(&self, pos: u8) -> Option<OctantId> {
        if pos > 7 || self.level >= MAX_LEVEL {
            return None;
        }
        Some(OctantId {
            level: self.level + 1,
            path: (self.path << 3) | pos as u64,
        })
    }

    pub fn parent(&self) -> Option<OctantId> {
        if self.level == 0 {
            return None;
        }
        Some(OctantId {
            level: self.level - 1,
            path: self.path >> 3,
        })
    }

    pub fn pos_in_parent(&self) -> Option<u8> {
        if self.level == 0 {
            None
        } else {
            Some((self.path & 7) as u8)
        }
    }

    /// Child positions from the root downwards.
    pub fn positions(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.level)
            .rev()
            .map(move |i| ((self.path >> (3 * i as u32)) & 7) as u8)
    }
}

impl fmt::Display for OctantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("r")?;
        for pos in self.positions() {
            write!(f, "{}", pos)?;
        }
        Ok(())
    }
}

impl FromStr for OctantId {
    type Err = PointCloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('r')
            .ok_or_else(|| configuration_error(format!("Octant id '{}' must start with 'r'", s)))?;
        let mut id = OctantId::ROOT;
        for c in digits.chars() {
            let pos = c
                .to_digit(8)
                .ok_or_else(|| configuration_error(format!("Invalid octant id '{}'", s)))?;
            id = id
                .child(pos as u8)
                .ok_or_else(|| configuration_error(format!("Octant id '{}' is too deep", s)))?;
        }
        Ok(id)
    }
}

/// Index of an octant inside an [`OctreeHierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OctantIndex(pub u32);

impl From<usize> for OctantIndex {
    fn from(val: usize) -> Self {
        Self(val as u32)
    }
}

impl From<OctantIndex> for usize {
    fn from(val: OctantIndex) -> Self {
        val.0 as usize
    }
}

impl fmt::Display for OctantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Center of the child cube at `pos` of a cube with edge length `size`.
pub fn child_center(center: DVec3, size: f64, pos: u8) -> DVec3 {
    let q = size / 4.0;
    let sign = |bit: u8| if pos & bit != 0 { q } else { -q };
    center + DVec3::new(sign(1), sign(2), sign(4))
}

/// Structural metadata of one octant. The payload lives elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Octant {
    pub id: OctantId,
    pub center: DVec3,
    pub size: f64,
    pub spacing: f64,
    pub point_count: u32,
    pub is_leaf: bool,
    pub parent: Option<OctantIndex>,
    pub children: [Option<OctantIndex>; 8],
}

impl Octant {
    pub fn new(id: OctantId, center: DVec3, size: f64) -> Self {
        Self {
            id,
            center,
            size,
            spacing: 0.0,
            point_count: 0,
            is_leaf: true,
            parent: None,
            children: [None; 8],
        }
    }

    pub fn level(&self) -> u32 {
        self.id.level() as u32
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_size(self.center, self.size)
    }

    /// Bit i is set when child i exists.
    pub fn child_mask(&self) -> u8 {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }

    pub fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// Estimated on-screen extent in pixels of this octant seen from `camera`.
    pub fn projected_size(&self, camera: DVec3, viewport_height: u32, fov_y: f64) -> f64 {
        let distance = (self.center - camera).length().max(0.0001);
        let slope = (fov_y / 2.0).tan().abs();
        viewport_height as f64 / 2.0 * (self.size / 2.0) / (slope * distance)
    }
}

/// Arena of octants with the root at index 0.
#[derive(Debug, Clone, Default)]
pub struct OctreeHierarchy {
    octants: Vec<Octant>,
}

impl OctreeHierarchy {
    pub fn new(root: Octant) -> Self {
        Self {
            octants: vec![root],
        }
    }

    pub fn root(&self) -> OctantIndex {
        OctantIndex(0)
    }

    pub fn len(&self) -> usize {
        self.octants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octants.is_empty()
    }

    pub fn get(&self, index: OctantIndex) -> Option<&Octant> {
        self.octants.get(usize::from(index))
    }

    pub fn octants(&self) -> &[Octant] {
        &self.octants
    }

    /// Creates the child at `pos` of `parent` with the derived center, size
    /// and id, or returns the existing one.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not an index of this hierarchy or `pos > 7`.
    pub fn add_child(&mut self, parent: OctantIndex, pos: u8) -> Option<OctantIndex> {
        let p = &self.octants[usize::from(parent)];
        if let Some(existing) = p.children[pos as usize] {
            return Some(existing);
        }
        let id = p.id.child(pos)?;
        let mut child = Octant::new(id, child_center(p.center, p.size, pos), p.size / 2.0);
        child.spacing = p.spacing / 2.0;
        child.parent = Some(parent);
        let index = OctantIndex::from(self.octants.len());
        self.octants.push(child);
        let p = &mut self.octants[usize::from(parent)];
        p.children[pos as usize] = Some(index);
        p.is_leaf = false;
        Some(index)
    }

    pub fn children(&self, index: OctantIndex) -> impl Iterator<Item = (u8, OctantIndex)> + '_ {
        self.octants[usize::from(index)]
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|c| (i as u8, c)))
    }

    /// Pre-order depth-first walk, children in position order.
    pub fn depth_first(&self) -> Vec<OctantIndex> {
        let mut order = Vec::with_capacity(self.octants.len());
        if self.octants.is_empty() {
            return order;
        }
        let mut stack = vec![self.root()];
        while let Some(index) = stack.pop() {
            order.push(index);
            let octant = &self.octants[usize::from(index)];
            stack.extend(octant.children.iter().rev().flatten());
        }
        order
    }

    pub fn find(&self, id: &OctantId) -> Option<OctantIndex> {
        if self.octants.is_empty() {
            return None;
        }
        let mut index = self.root();
        for pos in id.positions() {
            index = self.octants[usize::from(index)].children[pos as usize]?;
        }
        Some(index)
    }

    pub fn total_points(&self) -> u64 {
        self.octants.iter().map(|o| o.point_count as u64).sum()
    }

    pub fn max_level(&self) -> u32 {
        self.octants.iter().map(Octant::level).max().unwrap_or(0)
    }

    /// Sets the number of points stored in the payload of `index`.
    pub fn set_point_count(&mut self, index: OctantIndex, count: u32) {
        self.get_mut(index).point_count = count;
    }

    pub(crate) fn get_mut(&mut self, index: OctantIndex) -> &mut Octant {
        &mut self.octants[usize::from(index)]
    }
}

impl std::ops::Index<OctantIndex> for OctreeHierarchy {
    type Output = Octant;

    fn index(&self, index: OctantIndex) -> &Octant {
        &self.octants[usize::from(index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octant_id_string_form() {
        let id = OctantId::ROOT.child(0).unwrap().child(5).unwrap().child(3).unwrap();
        assert_eq!(id.to_string(), "r053");
        assert_eq!(id.level(), 3);
        assert_eq!(id.pos_in_parent(), Some(3));
        assert_eq!("r053".parse::<OctantId>().unwrap(), id);
        assert_eq!(id.parent().unwrap().to_string(), "r05");
        assert_eq!(OctantId::ROOT.to_string(), "r");
        assert!("r9".parse::<OctantId>().is_err());
        assert!("053".parse::<OctantId>().is_err());
    }

    #[test]
    fn test_octant_id_depth_limit() {
        let mut id = OctantId::ROOT;
        for _ in 0..MAX_LEVEL {
            id = id.child(7).unwrap();
        }
        assert!(id.child(0).is_none());
        assert_eq!(id.positions().count(), MAX_LEVEL as usize);
    }

    #[test]
    fn test_child_centers() {
        let c = DVec3::ZERO;
        assert_eq!(child_center(c, 4.0, 0), DVec3::new(-1.0, -1.0, -1.0));
        assert_eq!(child_center(c, 4.0, 1), DVec3::new(1.0, -1.0, -1.0));
        assert_eq!(child_center(c, 4.0, 2), DVec3::new(-1.0, 1.0, -1.0));
        assert_eq!(child_center(c, 4.0, 4), DVec3::new(-1.0, -1.0, 1.0));
        assert_eq!(child_center(c, 4.0, 7), DVec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_hierarchy_add_and_walk() {
        let mut root = Octant::new(OctantId::ROOT, DVec3::ZERO, 8.0);
        root.spacing = 1.0;
        let mut h = OctreeHierarchy::new(root);
        let a = h.add_child(h.root(), 6).unwrap();
        let b = h.add_child(h.root(), 1).unwrap();
        let c = h.add_child(a, 2).unwrap();
        assert_eq!(h.add_child(h.root(), 6), Some(a));

        assert_eq!(h[h.root()].child_mask(), 0b0100_0010);
        assert!(!h[h.root()].is_leaf);
        assert_eq!(h[c].size, 2.0);
        assert_eq!(h[c].spacing, 0.25);
        assert_eq!(h[c].id.to_string(), "r62");
        assert_eq!(h.depth_first(), vec![h.root(), b, a, c]);
        assert_eq!(h.find(&"r62".parse().unwrap()), Some(c));
        assert_eq!(h.find(&"r3".parse().unwrap()), None);
    }

    #[test]
    fn test_projected_size_shrinks_with_distance() {
        let o = Octant::new(OctantId::ROOT, DVec3::ZERO, 2.0);
        let fov = std::f64::consts::FRAC_PI_2;
        let near = o.projected_size(DVec3::new(0.0, 0.0, 10.0), 1000, fov);
        let far = o.projected_size(DVec3::new(0.0, 0.0, 20.0), 1000, fov);
        assert!((near - 50.0).abs() < 1e-9, "{}", near);
        assert!((far - 25.0).abs() < 1e-9, "{}", far);
        assert!(o.projected_size(DVec3::ZERO, 1000, fov).is_finite());
    }
}
