// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Axis-aligned bounding boxes.

use crate::primitives::{Point3D, Vector3D};
use crate::tolerance::Tolerance;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox3D {
    pub min: Point3D,
    pub max: Point3D,
}

impl BoundingBox3D {
    pub fn new(min: Point3D, max: Point3D) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all `points`, or `None` if there are none.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3D>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(*first, *first);
        for p in iter {
            bbox.include(p);
        }
        Some(bbox)
    }

    /// Grows the box to include `p`.
    #[inline]
    pub fn include(&mut self, p: &Point3D) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn union(&self, other: &BoundingBox3D) -> Self {
        let mut out = *self;
        out.include(&other.min);
        out.include(&other.max);
        out
    }

    #[inline]
    pub fn center(&self) -> Point3D {
        nalgebra::center(&self.min, &self.max)
    }

    #[inline]
    pub fn extent(&self) -> Vector3D {
        self.max - self.min
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    /// Returns a copy grown by `amount` on every side (negative shrinks).
    pub fn inflated(&self, amount: f64) -> Self {
        let d = Vector3D::repeat(amount);
        Self::new(self.min - d, self.max + d)
    }

    /// Returns a copy grown by `ratio` of its extent on every side.
    pub fn scaled(&self, ratio: f64) -> Self {
        let d = self.extent() * ratio;
        Self::new(self.min - d, self.max + d)
    }

    pub fn contains_point(&self, p: &Point3D, tol: &Tolerance) -> bool {
        p.x >= self.min.x - tol.tol
            && p.x <= self.max.x + tol.tol
            && p.y >= self.min.y - tol.tol
            && p.y <= self.max.y + tol.tol
            && p.z >= self.min.z - tol.tol
            && p.z <= self.max.z + tol.tol
    }

    /// True if `other` lies within this box (boundaries may coincide).
    pub fn contains_box(&self, other: &BoundingBox3D, tol: &Tolerance) -> bool {
        self.contains_point(&other.min, tol) && self.contains_point(&other.max, tol)
    }

    /// Closed overlap test: touching boxes overlap.
    pub fn overlaps(&self, other: &BoundingBox3D, tol: &Tolerance) -> bool {
        self.max.x >= other.min.x - tol.tol
            && self.min.x <= other.max.x + tol.tol
            && self.max.y >= other.min.y - tol.tol
            && self.min.y <= other.max.y + tol.tol
            && self.max.z >= other.min.z - tol.tol
            && self.min.z <= other.max.z + tol.tol
    }

    /// Open overlap test: the interiors must share volume thicker than the
    /// tolerance, so boxes that only touch along a face do not overlap.
    pub fn overlaps_interior(&self, other: &BoundingBox3D, tol: &Tolerance) -> bool {
        self.max.x > other.min.x + tol.tol
            && self.min.x < other.max.x - tol.tol
            && self.max.y > other.min.y + tol.tol
            && self.min.y < other.max.y - tol.tol
            && self.max.z > other.min.z + tol.tol
            && self.min.z < other.max.z - tol.tol
    }

    /// The 8 corners, bottom ring first (same winding as the OBB corners).
    pub fn corners(&self) -> [Point3D; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3D::new(a.x, a.y, a.z),
            Point3D::new(b.x, a.y, a.z),
            Point3D::new(b.x, b.y, a.z),
            Point3D::new(a.x, b.y, a.z),
            Point3D::new(a.x, a.y, b.z),
            Point3D::new(b.x, a.y, b.z),
            Point3D::new(b.x, b.y, b.z),
            Point3D::new(a.x, b.y, b.z),
        ]
    }
}
