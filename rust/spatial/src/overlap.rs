// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Triangle / box intersection.

use bimdex_geometry::{BoundingBox3D, Point3D, Vector3D};

/// Test if a triangle intersects an axis-aligned box using the Separating
/// Axis Theorem: box axes, triangle normal and the 9 edge cross products.
/// Touching counts as intersecting.
pub fn triangle_intersects_box(tri: &[Point3D; 3], bbox: &BoundingBox3D) -> bool {
    let center = bbox.center();
    let half = bbox.extent() / 2.0;

    // Translate triangle to box-local space
    let t = [tri[0] - center, tri[1] - center, tri[2] - center];
    let edges = [t[1] - t[0], t[2] - t[1], t[0] - t[2]];

    let separated = |axis: &Vector3D| -> bool {
        let p0 = t[0].dot(axis);
        let p1 = t[1].dot(axis);
        let p2 = t[2].dot(axis);
        let radius = half.x * axis.x.abs() + half.y * axis.y.abs() + half.z * axis.z.abs();
        p0.min(p1).min(p2) > radius || p0.max(p1).max(p2) < -radius
    };

    // Box axes
    for k in 0..3 {
        let lo = t[0][k].min(t[1][k]).min(t[2][k]);
        let hi = t[0][k].max(t[1][k]).max(t[2][k]);
        if lo > half[k] || hi < -half[k] {
            return false;
        }
    }

    // Triangle plane
    let normal = edges[0].cross(&edges[1]);
    if normal.norm_squared() > 1e-24 && separated(&normal) {
        return false;
    }

    // Box edge x triangle edge
    let box_axes = [Vector3D::x(), Vector3D::y(), Vector3D::z()];
    for box_axis in &box_axes {
        for edge in &edges {
            let axis = box_axis.cross(edge);
            // parallel edges give no axis
            if axis.norm_squared() < 1e-20 {
                continue;
            }
            if separated(&axis) {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingBox3D {
        BoundingBox3D::new(Point3D::origin(), Point3D::new(1.0, 1.0, 1.0))
    }

    fn tri(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> [Point3D; 3] {
        [Point3D::from(a), Point3D::from(b), Point3D::from(c)]
    }

    #[test]
    fn triangle_inside_box() {
        let t = tri([0.2, 0.2, 0.5], [0.8, 0.2, 0.5], [0.5, 0.8, 0.5]);
        assert!(triangle_intersects_box(&t, &unit_box()));
    }

    #[test]
    fn large_triangle_cutting_through_box() {
        let t = tri([-5.0, -5.0, 0.5], [5.0, -5.0, 0.5], [0.0, 10.0, 0.5]);
        assert!(triangle_intersects_box(&t, &unit_box()));
    }

    #[test]
    fn triangle_outside_box() {
        let t = tri([2.0, 2.0, 2.0], [3.0, 2.0, 2.0], [2.0, 3.0, 2.0]);
        assert!(!triangle_intersects_box(&t, &unit_box()));
    }

    #[test]
    fn diagonal_triangle_missing_the_corner() {
        // plane x + y + z = 3.2 passes beyond the (1,1,1) corner
        let t = tri([3.2, 0.0, 0.0], [0.0, 3.2, 0.0], [0.0, 0.0, 3.2]);
        assert!(!triangle_intersects_box(&t, &unit_box()));
        let t = tri([2.8, 0.0, 0.0], [0.0, 2.8, 0.0], [0.0, 0.0, 2.8]);
        assert!(triangle_intersects_box(&t, &unit_box()));
    }

    #[test]
    fn triangle_on_box_face_touches() {
        let t = tri([0.2, 0.2, 1.0], [0.8, 0.2, 1.0], [0.5, 0.8, 1.0]);
        assert!(triangle_intersects_box(&t, &unit_box()));
        let shrunk = unit_box().inflated(-1e-4);
        assert!(!triangle_intersects_box(&t, &shrunk));
    }
}
