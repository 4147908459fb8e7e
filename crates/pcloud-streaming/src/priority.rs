use std::cmp::Ordering;

use pcloud_octree::OctantIndex;

/// An octant considered during traversal, ranked by projected size.
///
/// Larger projected sizes rank higher. Ties go to the lower octant index so
/// that traversal order is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub index: OctantIndex,
    pub projected_size: f64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.projected_size
            .total_cmp(&other.projected_size)
            .then_with(|| other.index.cmp(&self.index))
    }
}
