use glam::{DMat4, DVec3, DVec4};
use pcloud_core::container::Aabb;

/// Six clip planes extracted from a view-projection matrix.
///
/// Plane normals point inwards. Boxes are tested conservatively: a box is
/// rejected only when it lies completely behind one plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    pub fn from_view_projection(view_projection: DMat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(|p| {
            let len = p.truncate().length();
            if len > 0.0 {
                p / len
            } else {
                p
            }
        });
        Self { planes }
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            // Corner furthest along the plane normal.
            let corner = DVec3::select(normal.cmpge(DVec3::ZERO), aabb.max, aabb.min);
            normal.dot(corner) + plane.w >= 0.0
        })
    }

    pub fn contains_point(&self, p: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(p) + plane.w >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frustum() -> Frustum {
        let view = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO, DVec3::Y);
        let proj = DMat4::perspective_rh_gl(std::f64::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(proj * view)
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let f = frustum();
        assert!(f.contains_point(DVec3::ZERO));
        assert!(f.intersects_aabb(&Aabb::from_center_size(DVec3::ZERO, 2.0)));
    }

    #[test]
    fn test_box_behind_camera_is_culled() {
        let f = frustum();
        assert!(!f.intersects_aabb(&Aabb::from_center_size(DVec3::new(0.0, 0.0, 20.0), 2.0)));
        assert!(!f.contains_point(DVec3::new(0.0, 0.0, 11.0)));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let f = frustum();
        assert!(!f.intersects_aabb(&Aabb::from_center_size(DVec3::new(0.0, 0.0, -200.0), 2.0)));
    }

    #[test]
    fn test_straddling_box_is_visible() {
        let f = frustum();
        // Mostly off to the side but one corner pokes into the view.
        assert!(f.intersects_aabb(&Aabb::from_center_size(DVec3::new(8.0, 0.0, 0.0), 10.0)));
        assert!(!f.intersects_aabb(&Aabb::from_center_size(DVec3::new(50.0, 0.0, 0.0), 2.0)));
    }
}
