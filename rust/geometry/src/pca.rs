// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Principal component analysis and oriented bounding boxes.
//!
//! The principal axes of an element's vertex cloud give its major axes and an
//! object-aligned box that is usually much tighter than the axis-aligned one.
//! A second, "projected" box keeps one axis vertical so that its footprint can
//! be used for 2D queries.

use nalgebra::{Matrix3, SymmetricEigen};

use crate::polyhedron::Polyhedron;
use crate::primitives::{Point3D, Vector3D};
use crate::tolerance::Tolerance;
use crate::{Error, Result};

/// Minimum length of an axis' horizontal projection for it to define a
/// footprint direction.
const MIN_HORIZONTAL: f64 = 1e-6;

/// Principal axes of a point cloud.
#[derive(Debug, Clone)]
pub struct PrincipalComponentAnalysis {
    centroid: Point3D,
    axes: [Vector3D; 3],
    variances: [f64; 3],
    points: Vec<Point3D>,
}

impl PrincipalComponentAnalysis {
    /// Runs the analysis over `points`.
    ///
    /// Axes are sorted by descending variance, the third one being recomputed
    /// as the cross product of the first two so that the frame is right-handed.
    pub fn from_points(points: &[Point3D]) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::EmptyPointSet);
        }

        let n = points.len() as f64;
        let centroid = Point3D::from(points.iter().map(|p| p.coords).sum::<Vector3D>() / n);
        let covariance = points
            .iter()
            .map(|p| {
                let d = p - centroid;
                d * d.transpose()
            })
            .fold(Matrix3::zeros(), |acc, m| acc + m)
            / n;

        let eigen = SymmetricEigen::new(covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let column = |i: usize| -> Vector3D { eigen.eigenvectors.column(order[i]).into_owned() };
        let (axes, variances) = match orthonormal_frame(column(0), column(1)) {
            Some(axes) => (
                axes,
                [
                    eigen.eigenvalues[order[0]],
                    eigen.eigenvalues[order[1]],
                    eigen.eigenvalues[order[2]],
                ],
            ),
            None => (
                [Vector3D::x(), Vector3D::y(), Vector3D::z()],
                [covariance[(0, 0)], covariance[(1, 1)], covariance[(2, 2)]],
            ),
        };

        Ok(Self {
            centroid,
            axes,
            variances,
            points: points.to_vec(),
        })
    }

    /// Runs the analysis over the distinct vertices of `polyhedron`.
    pub fn from_polyhedron(polyhedron: &Polyhedron, tol: &Tolerance) -> Result<Self> {
        Self::from_points(&polyhedron.vertices(tol))
    }

    pub fn centroid(&self) -> Point3D {
        self.centroid
    }

    /// Major axes, largest variance first.
    pub fn axes(&self) -> &[Vector3D; 3] {
        &self.axes
    }

    pub fn variances(&self) -> &[f64; 3] {
        &self.variances
    }

    /// Box aligned to the principal axes.
    pub fn oriented_box(&self) -> OrientedBox {
        OrientedBox::fit(&self.points, self.axes, self.centroid)
    }

    /// Box with a vertical third axis. The footprint direction is the first
    /// principal axis whose horizontal projection is usable.
    pub fn projected_box(&self) -> OrientedBox {
        let u = self
            .axes
            .iter()
            .map(|a| Vector3D::new(a.x, a.y, 0.0))
            .find(|h| h.norm() > MIN_HORIZONTAL)
            .map(|h| canonical_sign(h.normalize()))
            .unwrap_or_else(Vector3D::x);
        let w = Vector3D::z();
        let v = w.cross(&u);
        OrientedBox::fit(&self.points, [u, v, w], self.centroid)
    }
}

/// Builds a right-handed orthonormal frame from two approximate axes.
fn orthonormal_frame(a0: Vector3D, a1: Vector3D) -> Option<[Vector3D; 3]> {
    let a0 = canonical_sign(a0.try_normalize(f64::EPSILON)?);
    let a1 = canonical_sign((a1 - a0 * a0.dot(&a1)).try_normalize(f64::EPSILON)?);
    Some([a0, a1, a0.cross(&a1)])
}

/// Flips `v` so that its largest component is positive. Eigenvectors are only
/// defined up to sign.
fn canonical_sign(v: Vector3D) -> Vector3D {
    let largest = v.iter().copied().max_by(|a, b| a.abs().total_cmp(&b.abs())).unwrap_or(0.0);
    if largest < 0.0 {
        -v
    } else {
        v
    }
}

/// Oriented bounding box.
///
/// Corner `i` takes the low or high extent along each local axis:
///
/// ```text
/// 0:(-,-,-) 1:(+,-,-) 2:(+,+,-) 3:(-,+,-)
/// 4:(-,-,+) 5:(+,-,+) 6:(+,+,+) 7:(-,+,+)
/// ```
///
/// [`crate::polyhedron::BOX_FACE_INDICES`] turns them into a closed solid with
/// outward normals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrientedBox {
    /// Unit axes of the box frame (right-handed).
    pub axes: [Vector3D; 3],
    /// Centroid of the point cloud the box was fitted to.
    pub centroid: Point3D,
    /// Centre of the box.
    pub center: Point3D,
    /// Full edge lengths along each axis.
    pub extents: Vector3D,
    pub corners: [Point3D; 8],
}

impl OrientedBox {
    /// Fits a box with the given frame around `points`.
    pub fn fit(points: &[Point3D], axes: [Vector3D; 3], origin: Point3D) -> Self {
        let mut lo = Vector3D::repeat(f64::INFINITY);
        let mut hi = Vector3D::repeat(f64::NEG_INFINITY);
        for p in points {
            let d = p - origin;
            for k in 0..3 {
                let t = d.dot(&axes[k]);
                lo[k] = lo[k].min(t);
                hi[k] = hi[k].max(t);
            }
        }
        if points.is_empty() {
            lo = Vector3D::zeros();
            hi = Vector3D::zeros();
        }

        let world = |local: Vector3D| -> Point3D {
            origin + axes[0] * local.x + axes[1] * local.y + axes[2] * local.z
        };
        let corner = |i: usize| -> Point3D {
            let pick = |k: usize, high: bool| if high { hi[k] } else { lo[k] };
            let (x, y) = match i % 4 {
                0 => (false, false),
                1 => (true, false),
                2 => (true, true),
                _ => (false, true),
            };
            world(Vector3D::new(pick(0, x), pick(1, y), pick(2, i >= 4)))
        };

        Self {
            axes,
            centroid: origin,
            center: world((lo + hi) / 2.0),
            extents: hi - lo,
            corners: std::array::from_fn(corner),
        }
    }

    pub fn volume(&self) -> f64 {
        self.extents.x * self.extents.y * self.extents.z
    }

    /// True if `point` lies inside the box or within `tol` of it.
    pub fn contains(&self, point: &Point3D, tol: &Tolerance) -> bool {
        let d = point - self.center;
        (0..3).all(|k| d.dot(&self.axes[k]).abs() <= self.extents[k] / 2.0 + tol.tol)
    }

    /// The 6-face box solid.
    pub fn to_polyhedron(&self, tol: &Tolerance) -> Polyhedron {
        Polyhedron::from_box_corners(&self.corners, tol)
    }
}
