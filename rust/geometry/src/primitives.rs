// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Foundational value types: points, vectors, segments and planes.

use nalgebra::{Point3, Vector3};

use crate::tolerance::Tolerance;

pub type Point3D = Point3<f64>;
pub type Vector3D = Vector3<f64>;

/// A point quantized to the tolerance's decimal precision. Two points that
/// round to the same key are treated as the same vertex in hash lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey(pub [i64; 3]);

/// Directed segment identity used for O(1) edge adjacency lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub start: PointKey,
    pub end: PointKey,
}

impl SegmentKey {
    /// The key of the same segment traversed the other way.
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            start: self.end,
            end: self.start,
        }
    }
}

/// World axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Returns the world axis a vector is aligned with (either direction), if any.
pub fn axis_alignment(v: &Vector3D, tol: &Tolerance) -> Option<Axis> {
    let len = v.norm();
    if !len.is_finite() || len <= tol.tol {
        return None;
    }
    let u = v / len;
    if tol.eq(u.x.abs(), 1.0) {
        Some(Axis::X)
    } else if tol.eq(u.y.abs(), 1.0) {
        Some(Axis::Y)
    } else if tol.eq(u.z.abs(), 1.0) {
        Some(Axis::Z)
    } else {
        None
    }
}

/// Normalizes `v`, returning `None` for zero-length or NaN vectors.
#[inline]
pub fn try_normalize(v: &Vector3D, tol: &Tolerance) -> Option<Vector3D> {
    let len = v.norm();
    if !len.is_finite() || len <= tol.tol * tol.tol {
        return None;
    }
    Some(v / len)
}

/// Newell's method polygon normal (unnormalized). Works for convex and
/// concave planar loops; the direction follows the right-hand rule relative
/// to the winding. The closing point of a closed loop may be present.
pub fn newell_normal(points: &[Point3D]) -> Vector3D {
    let mut normal = Vector3D::zeros();
    let n = points.len();
    for i in 0..n {
        let curr = &points[i];
        let next = &points[(i + 1) % n];
        normal.x += (curr.y - next.y) * (curr.z + next.z);
        normal.y += (curr.z - next.z) * (curr.x + next.x);
        normal.z += (curr.x - next.x) * (curr.y + next.y);
    }
    normal
}

/// Ordered line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSegment3D {
    pub start: Point3D,
    pub end: Point3D,
}

impl LineSegment3D {
    pub fn new(start: Point3D, end: Point3D) -> Self {
        Self { start, end }
    }

    /// Euclidean length.
    #[inline]
    pub fn extent(&self) -> f64 {
        (self.end - self.start).norm()
    }

    #[inline]
    pub fn direction(&self) -> Vector3D {
        self.end - self.start
    }

    /// The same segment traversed from `end` to `start`.
    #[inline]
    pub fn reversed(&self) -> Self {
        Self {
            start: self.end,
            end: self.start,
        }
    }

    #[inline]
    pub fn directed_key(&self, tol: &Tolerance) -> SegmentKey {
        SegmentKey {
            start: tol.point_key(&self.start),
            end: tol.point_key(&self.end),
        }
    }

    /// Segment identity regardless of direction.
    pub fn same_segment(&self, other: &LineSegment3D, tol: &Tolerance) -> bool {
        (tol.points_eq(&self.start, &other.start) && tol.points_eq(&self.end, &other.end))
            || self.is_reverse_of(other, tol)
    }

    /// True if `other` is this segment traversed the opposite way, which is
    /// how two consistently wound faces see their common edge.
    pub fn is_reverse_of(&self, other: &LineSegment3D, tol: &Tolerance) -> bool {
        tol.points_eq(&self.start, &other.end) && tol.points_eq(&self.end, &other.start)
    }

    /// Closest distance from `p` to the segment.
    pub fn distance_to_point(&self, p: &Point3D) -> f64 {
        let d = self.direction();
        let len_sq = d.norm_squared();
        if len_sq == 0.0 {
            return (p - self.start).norm();
        }
        let t = ((p - self.start).dot(&d) / len_sq).clamp(0.0, 1.0);
        (p - (self.start + d * t)).norm()
    }
}

/// Plane through `point` with unit `normal`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plane3D {
    pub point: Point3D,
    pub normal: Vector3D,
}

impl Plane3D {
    pub fn new(point: Point3D, normal: Vector3D) -> Self {
        Self { point, normal }
    }

    /// Signed distance of `p` from the plane.
    #[inline]
    pub fn signed_distance(&self, p: &Point3D) -> f64 {
        (p - self.point).dot(&self.normal)
    }

    #[inline]
    pub fn contains(&self, p: &Point3D, tol: &Tolerance) -> bool {
        self.signed_distance(p).abs() <= tol.tol
    }

    /// Indices of the two coordinates kept when projecting onto the plane
    /// most aligned with this one's normal.
    pub fn projection_axes(&self) -> (usize, usize) {
        let n = self.normal;
        let (ax, ay, az) = (n.x.abs(), n.y.abs(), n.z.abs());
        if az >= ax && az >= ay {
            (0, 1)
        } else if ay >= ax {
            (0, 2)
        } else {
            (1, 2)
        }
    }
}
