// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar faces with holes.
//!
//! A [`Face3D`] owns one outer loop and zero or more inner loops. Every loop is
//! stored closed (first point repeated at the end). Derived attributes (base
//! plane, bounding box, boundary edges and the edge lookup map) are computed
//! once on construction with the tolerance the face was built with; use
//! [`Face3D::rekeyed`] to re-derive them under a different tolerance.

use nalgebra::Point2;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bbox::BoundingBox3D;
use crate::primitives::{
    newell_normal, try_normalize, LineSegment3D, Plane3D, Point3D, SegmentKey, Vector3D,
};
use crate::tolerance::Tolerance;
use crate::triangulation::{point_in_polygon, project, triangulate_polygon_with_holes};
use crate::{Error, Result};

/// Planar polygon with optional holes.
#[derive(Debug, Clone)]
pub struct Face3D {
    loops: Vec<Vec<Point3D>>,
    plane: Option<Plane3D>,
    bbox: BoundingBox3D,
    edges: Vec<LineSegment3D>,
    loop_offsets: Vec<usize>,
    edge_index: FxHashMap<SegmentKey, SmallVec<[usize; 1]>>,
    tolerance: Tolerance,
}

impl Face3D {
    /// Builds a face from an outer loop and its holes. Loops may be given open
    /// or closed; consecutive duplicate points are dropped. The face is not
    /// validated, see [`Face3D::validate`].
    pub fn new(outer: Vec<Point3D>, inner: Vec<Vec<Point3D>>, tol: &Tolerance) -> Self {
        let mut loops = Vec::with_capacity(1 + inner.len());
        loops.push(close_loop(outer, tol));
        for hole in inner {
            let hole = close_loop(hole, tol);
            if !hole.is_empty() {
                loops.push(hole);
            }
        }
        Self::from_closed_loops(loops, tol)
    }

    /// Builds a face without holes.
    pub fn from_outer(outer: Vec<Point3D>, tol: &Tolerance) -> Self {
        Self::new(outer, Vec::new(), tol)
    }

    fn from_closed_loops(loops: Vec<Vec<Point3D>>, tol: &Tolerance) -> Self {
        let outer_open = open_slice(&loops[0]);
        let plane = try_normalize(&newell_normal(outer_open), tol).map(|normal| {
            let n = outer_open.len().max(1) as f64;
            let sum = outer_open
                .iter()
                .fold(Vector3D::zeros(), |acc, p| acc + p.coords);
            Plane3D::new(Point3D::from(sum / n), normal)
        });

        let bbox = BoundingBox3D::from_points(loops.iter().flatten())
            .unwrap_or_else(|| BoundingBox3D::new(Point3D::origin(), Point3D::origin()));

        let mut edges = Vec::new();
        let mut loop_offsets = Vec::with_capacity(loops.len() + 1);
        for lp in &loops {
            loop_offsets.push(edges.len());
            edges.extend(lp.windows(2).map(|w| LineSegment3D::new(w[0], w[1])));
        }
        loop_offsets.push(edges.len());

        let mut edge_index: FxHashMap<SegmentKey, SmallVec<[usize; 1]>> = FxHashMap::default();
        for (i, e) in edges.iter().enumerate() {
            edge_index.entry(e.directed_key(tol)).or_default().push(i);
        }

        Self {
            loops,
            plane,
            bbox,
            edges,
            loop_offsets,
            edge_index,
            tolerance: *tol,
        }
    }

    /// Re-derives plane, keys and edge map under `tol`.
    pub fn rekeyed(&self, tol: &Tolerance) -> Self {
        Self::from_closed_loops(self.loops.clone(), tol)
    }

    /// A new face with every loop's winding reversed (normal negated).
    pub fn reversed(&self) -> Self {
        let loops = self
            .loops
            .iter()
            .map(|lp| lp.iter().rev().copied().collect())
            .collect();
        Self::from_closed_loops(loops, &self.tolerance)
    }

    /// Closed outer loop.
    pub fn outer(&self) -> &[Point3D] {
        &self.loops[0]
    }

    /// Closed inner loops (holes).
    pub fn inner(&self) -> &[Vec<Point3D>] {
        &self.loops[1..]
    }

    /// All closed loops, outer first.
    pub fn loops(&self) -> &[Vec<Point3D>] {
        &self.loops
    }

    pub fn hole_count(&self) -> usize {
        self.loops.len() - 1
    }

    pub fn plane(&self) -> Option<&Plane3D> {
        self.plane.as_ref()
    }

    /// Unit normal, `None` when the outer loop is degenerate.
    pub fn normal(&self) -> Option<Vector3D> {
        self.plane.map(|p| p.normal)
    }

    pub fn is_degenerate(&self) -> bool {
        self.plane.is_none()
    }

    pub fn bounding_box(&self) -> &BoundingBox3D {
        &self.bbox
    }

    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    /// Boundary edges: outer loop first, then each inner loop.
    pub fn edges(&self) -> &[LineSegment3D] {
        &self.edges
    }

    /// Edges of loop `index` (0 = outer).
    pub fn loop_edges(&self, index: usize) -> &[LineSegment3D] {
        &self.edges[self.loop_offsets[index]..self.loop_offsets[index + 1]]
    }

    /// Indices into [`Face3D::edges`] of edges with the given directed key.
    pub fn find_edge(&self, key: &SegmentKey) -> Option<&[usize]> {
        self.edge_index.get(key).map(|v| v.as_slice())
    }

    pub fn has_edge(&self, key: &SegmentKey) -> bool {
        self.edge_index.contains_key(key)
    }

    /// Distinct vertices of every loop (closing points skipped).
    pub fn vertices(&self) -> impl Iterator<Item = &Point3D> {
        self.loops.iter().flat_map(|lp| open_slice(lp).iter())
    }

    /// Perimeter of loop `index`.
    pub fn perimeter(&self, index: usize) -> f64 {
        self.loop_edges(index).iter().map(|e| e.extent()).sum()
    }

    /// Area of the outer loop minus the holes.
    pub fn area(&self) -> f64 {
        let outer = newell_normal(open_slice(&self.loops[0])).norm() / 2.0;
        let holes: f64 = self.loops[1..]
            .iter()
            .map(|h| newell_normal(open_slice(h)).norm() / 2.0)
            .sum();
        outer - holes
    }

    /// Vertex average of the outer loop.
    pub fn centroid(&self) -> Point3D {
        let outer = open_slice(&self.loops[0]);
        if outer.is_empty() {
            return Point3D::origin();
        }
        let sum = outer
            .iter()
            .fold(Vector3D::zeros(), |acc, p| acc + p.coords);
        Point3D::from(sum / outer.len() as f64)
    }

    /// Checks the invariants of a storable face: the normal is defined and
    /// every loop is a simple closed polygon with at least 3 distinct vertices.
    pub fn validate(&self, tol: &Tolerance) -> Result<()> {
        let plane = self.plane.ok_or(Error::DegenerateFace)?;
        let axes = plane.projection_axes();

        for (index, lp) in self.loops.iter().enumerate() {
            let open = open_slice(lp);
            if open.len() < 3 {
                return Err(Error::InvalidLoop {
                    index,
                    reason: format!("{} distinct vertices", open.len()),
                });
            }

            let mut keys: Vec<_> = open.iter().map(|p| tol.point_key(p)).collect();
            keys.sort_unstable();
            keys.dedup();
            if keys.len() != open.len() {
                return Err(Error::SelfIntersectingLoop(index));
            }

            if !is_simple(&project(open, axes), tol) {
                return Err(Error::SelfIntersectingLoop(index));
            }
        }
        Ok(())
    }

    /// True if every hole lies inside the outer loop.
    pub fn holes_inside_outer(&self) -> bool {
        let Some(plane) = self.plane else {
            return self.loops.len() == 1;
        };
        let axes = plane.projection_axes();
        let outer = project(open_slice(&self.loops[0]), axes);
        self.loops[1..].iter().all(|hole| {
            let hole2d = project(open_slice(hole), axes);
            // hole vertices may sit on the outer boundary
            hole2d.iter().all(|p| {
                point_in_polygon(p, &outer) || on_polygon_boundary(p, &outer, self.tolerance.tol)
            })
        })
    }

    /// True if `point` lies on the face's plane, inside the outer loop and
    /// outside every hole.
    pub fn inside(&self, point: &Point3D, tol: &Tolerance) -> bool {
        let Some(plane) = self.plane else {
            return false;
        };
        if !plane.contains(point, tol) {
            return false;
        }
        let axes = plane.projection_axes();
        let p = Point2::new(point[axes.0], point[axes.1]);
        if !point_in_polygon(&p, &project(open_slice(&self.loops[0]), axes)) {
            return false;
        }
        !self.loops[1..]
            .iter()
            .any(|hole| point_in_polygon(&p, &project(open_slice(hole), axes)))
    }

    /// Triangulates the face (holes respected).
    pub fn triangulate(&self) -> Result<Vec<[Point3D; 3]>> {
        let plane = self.plane.ok_or(Error::DegenerateFace)?;
        let axes = plane.projection_axes();

        let mut all: Vec<Point3D> = open_slice(&self.loops[0]).to_vec();
        let outer2d = project(&all, axes);
        let mut holes2d = Vec::with_capacity(self.loops.len() - 1);
        for hole in &self.loops[1..] {
            let open = open_slice(hole);
            if open.len() < 3 {
                continue;
            }
            holes2d.push(project(open, axes));
            all.extend_from_slice(open);
        }

        let indices = triangulate_polygon_with_holes(&outer2d, &holes2d)?;
        Ok(indices
            .chunks_exact(3)
            .map(|c| [all[c[0]], all[c[1]], all[c[2]]])
            .collect())
    }

    /// A copy with vertices lying on the straight line between their
    /// neighbours removed. Loops never drop below 3 vertices.
    pub fn without_collinear_vertices(&self, tol: &Tolerance) -> Self {
        let loops = self
            .loops
            .iter()
            .map(|lp| {
                let mut open = open_slice(lp).to_vec();
                let mut i = 0;
                while open.len() > 3 && i < open.len() {
                    let n = open.len();
                    let prev = open[(i + n - 1) % n];
                    let next = open[(i + 1) % n];
                    let seg = LineSegment3D::new(prev, next);
                    let straight = (open[i] - prev).dot(&(next - open[i])) > 0.0;
                    if straight && seg.distance_to_point(&open[i]) <= tol.tol {
                        open.remove(i);
                        i = i.saturating_sub(1);
                    } else {
                        i += 1;
                    }
                }
                close_loop(open, tol)
            })
            .collect();
        Self::from_closed_loops(loops, &self.tolerance)
    }
}

/// Returns the loop without its closing point.
#[inline]
pub(crate) fn open_slice(lp: &[Point3D]) -> &[Point3D] {
    if lp.len() > 1 && lp.first() == lp.last() {
        &lp[..lp.len() - 1]
    } else {
        lp
    }
}

/// Drops consecutive duplicates and closes the loop.
fn close_loop(points: Vec<Point3D>, tol: &Tolerance) -> Vec<Point3D> {
    let mut out: Vec<Point3D> = Vec::with_capacity(points.len() + 1);
    for p in points {
        if out.last().map_or(true, |last| !tol.points_eq(last, &p)) {
            out.push(p);
        }
    }
    while out.len() > 1 && tol.points_eq(&out[0], &out[out.len() - 1]) {
        out.pop();
    }
    if let Some(first) = out.first().copied() {
        out.push(first);
    }
    out
}

#[inline]
fn orient(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: &Point2<f64>, b: &Point2<f64>, p: &Point2<f64>, eps: f64) -> bool {
    p.x >= a.x.min(b.x) - eps
        && p.x <= a.x.max(b.x) + eps
        && p.y >= a.y.min(b.y) - eps
        && p.y <= a.y.max(b.y) + eps
}

fn segments_touch(
    a0: &Point2<f64>,
    a1: &Point2<f64>,
    b0: &Point2<f64>,
    b1: &Point2<f64>,
    tol: f64,
) -> bool {
    let len = (a1 - a0).norm().max((b1 - b0).norm()).max(1.0);
    let eps = tol * len;
    let d1 = orient(b0, b1, a0);
    let d2 = orient(b0, b1, a1);
    let d3 = orient(a0, a1, b0);
    let d4 = orient(a0, a1, b1);

    if ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
    {
        return true;
    }
    (d1.abs() <= eps && on_segment(b0, b1, a0, tol))
        || (d2.abs() <= eps && on_segment(b0, b1, a1, tol))
        || (d3.abs() <= eps && on_segment(a0, a1, b0, tol))
        || (d4.abs() <= eps && on_segment(a0, a1, b1, tol))
}

fn on_polygon_boundary(p: &Point2<f64>, polygon: &[Point2<f64>], tol: f64) -> bool {
    let n = polygon.len();
    (0..n).any(|i| {
        let a = &polygon[i];
        let b = &polygon[(i + 1) % n];
        let len = (b - a).norm().max(1.0);
        orient(a, b, p).abs() <= tol * len && on_segment(a, b, p, tol)
    })
}

/// Simple polygon test on an open projected loop: non-adjacent edges never
/// touch and adjacent edges never fold back onto each other.
fn is_simple(points: &[Point2<f64>], tol: &Tolerance) -> bool {
    let n = points.len();
    for i in 0..n {
        let a0 = &points[i];
        let a1 = &points[(i + 1) % n];
        let a2 = &points[(i + 2) % n];

        // spike: a1 doubles back along a0-a1
        let u = a1 - a0;
        let v = a2 - a1;
        let len = u.norm().max(v.norm()).max(1.0);
        if orient(a0, a1, a2).abs() <= tol.tol * len && u.dot(&v) < 0.0 {
            return false;
        }

        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let b0 = &points[j];
            let b1 = &points[(j + 1) % n];
            if segments_touch(a0, a1, b0, b1, tol.tol) {
                return false;
            }
        }
    }
    true
}
