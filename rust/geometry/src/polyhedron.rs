// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Faceted bodies.

use rustc_hash::FxHashSet;

use crate::bbox::BoundingBox3D;
use crate::face::Face3D;
use crate::mesh::RawMesh;
use crate::primitives::{Point3D, Vector3D};
use crate::tolerance::Tolerance;
use crate::{Error, Result};

/// Vertex index groups of a box solid built from 8 corners in the winding
/// documented on [`crate::pca::OrientedBox`]: bottom, top, front, right,
/// back, left. Every face's normal points outward.
pub const BOX_FACE_INDICES: [[usize; 4]; 6] = [
    [0, 3, 2, 1],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

/// One element's body as a collection of faces. The faces need not form a
/// closed shell.
#[derive(Debug, Clone, Default)]
pub struct Polyhedron {
    faces: Vec<Face3D>,
}

impl Polyhedron {
    pub fn new(faces: Vec<Face3D>) -> Self {
        Self { faces }
    }

    /// Reconstitutes a polyhedron from the reader's raw mesh.
    ///
    /// Faces with fewer than 3 distinct vertices are dropped; faces with an
    /// undefined normal are kept (the merge engine may still use them). Fails
    /// if an index is out of range or no face has a defined normal.
    pub fn from_raw_mesh(mesh: &RawMesh, tol: &Tolerance) -> Result<Self> {
        let lookup = |indices: &[u32]| -> Result<Vec<Point3D>> {
            indices
                .iter()
                .map(|&i| {
                    mesh.vertices
                        .get(i as usize)
                        .map(|v| Point3D::new(v[0], v[1], v[2]))
                        .ok_or_else(|| {
                            Error::InvalidPolyhedron(format!(
                                "vertex index {} out of range ({} vertices)",
                                i,
                                mesh.vertices.len()
                            ))
                        })
                })
                .collect()
        };

        let mut faces = Vec::with_capacity(mesh.faces.len());
        for raw in &mesh.faces {
            let outer = lookup(&raw.outer)?;
            let inner = raw
                .inner
                .iter()
                .map(|h| lookup(h))
                .collect::<Result<Vec<_>>>()?;
            let face = Face3D::new(outer, inner, tol);
            if face.outer().len() < 4 {
                continue;
            }
            if coordinates_invalid(&face) {
                return Err(Error::InvalidPolyhedron(
                    "non-finite vertex coordinate".to_string(),
                ));
            }
            faces.push(face);
        }

        if faces.iter().all(|f| f.is_degenerate()) {
            return Err(Error::InvalidPolyhedron(format!(
                "no valid face among {} raw faces",
                mesh.faces.len()
            )));
        }

        Ok(Self { faces })
    }

    /// Box solid from 8 corners (see [`BOX_FACE_INDICES`]).
    pub fn from_box_corners(corners: &[Point3D; 8], tol: &Tolerance) -> Self {
        let faces = BOX_FACE_INDICES
            .iter()
            .map(|idx| Face3D::from_outer(idx.iter().map(|&i| corners[i]).collect(), tol))
            .collect();
        Self { faces }
    }

    pub fn faces(&self) -> &[Face3D] {
        &self.faces
    }

    pub fn into_faces(self) -> Vec<Face3D> {
        self.faces
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn bounding_box(&self) -> Option<BoundingBox3D> {
        BoundingBox3D::from_points(self.faces.iter().flat_map(|f| f.vertices()))
    }

    /// Distinct vertices (by quantized key), in first-seen order.
    pub fn vertices(&self, tol: &Tolerance) -> Vec<Point3D> {
        let mut seen = FxHashSet::default();
        self.faces
            .iter()
            .flat_map(|f| f.vertices())
            .filter(|p| seen.insert(tol.point_key(p)))
            .copied()
            .collect()
    }

    /// Triangles of every face that triangulates.
    pub fn triangles(&self) -> Vec<[Point3D; 3]> {
        self.faces
            .iter()
            .filter_map(|f| f.triangulate().ok())
            .flatten()
            .collect()
    }

    /// Total face area.
    pub fn surface_area(&self) -> f64 {
        self.faces.iter().map(|f| f.area()).sum()
    }

    /// Enclosed volume by the signed tetrahedron method. Only meaningful for
    /// closed, consistently oriented bodies.
    pub fn volume(&self) -> f64 {
        let volume: f64 = self
            .triangles()
            .iter()
            .map(|t| t[0].coords.dot(&t[1].coords.cross(&t[2].coords)))
            .sum();
        (volume / 6.0).abs()
    }

    /// Ray-casting containment test for closed bodies.
    ///
    /// Casts a ray in a slightly perturbed direction and counts triangle
    /// crossings. Odd count = inside.
    pub fn contains_point(&self, point: &Point3D) -> bool {
        contains_point(&self.triangles(), point)
    }
}

/// Ray-casting containment over a prepared triangle soup.
pub fn contains_point(triangles: &[[Point3D; 3]], point: &Point3D) -> bool {
    // perturbed direction avoids edge/vertex hits on axis-aligned bodies
    let dir = Vector3D::new(1.0, 1e-7, 1e-8);
    let crossings = triangles
        .iter()
        .filter(|t| ray_intersects_triangle(point, &dir, &t[0], &t[1], &t[2]))
        .count();
    crossings % 2 == 1
}

/// Möller–Trumbore ray-triangle intersection test.
fn ray_intersects_triangle(
    origin: &Point3D,
    dir: &Vector3D,
    v0: &Point3D,
    v1: &Point3D,
    v2: &Point3D,
) -> bool {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = dir.cross(&edge2);
    let a = edge1.dot(&h);

    if a.abs() < 1e-12 {
        return false;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);

    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(&edge1);
    let v = f * dir.dot(&q);

    if v < 0.0 || u + v > 1.0 {
        return false;
    }

    let t = f * edge2.dot(&q);
    t > 1e-12
}

fn coordinates_invalid(face: &Face3D) -> bool {
    face.vertices()
        .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::RawFace;
    use approx::assert_relative_eq;

    fn unit_box(tol: &Tolerance) -> Polyhedron {
        let bbox = BoundingBox3D::new(Point3D::origin(), Point3D::new(2.0, 3.0, 4.0));
        Polyhedron::from_box_corners(&bbox.corners(), tol)
    }

    #[test]
    fn box_faces_point_outward() {
        let tol = Tolerance::default();
        let solid = unit_box(&tol);
        let center = Point3D::new(1.0, 1.5, 2.0);
        for face in solid.faces() {
            let n = face.normal().unwrap();
            assert!((face.centroid() - center).dot(&n) > 0.0);
        }
        assert_relative_eq!(solid.volume(), 24.0, epsilon = 1e-9);
        assert_relative_eq!(solid.surface_area(), 52.0, epsilon = 1e-9);
    }

    #[test]
    fn contains_point_inside_and_outside() {
        let tol = Tolerance::default();
        let solid = unit_box(&tol);
        assert!(solid.contains_point(&Point3D::new(1.0, 1.0, 1.0)));
        assert!(!solid.contains_point(&Point3D::new(5.0, 1.0, 1.0)));
    }

    #[test]
    fn from_raw_mesh_rejects_bad_indices() {
        let tol = Tolerance::default();
        let mesh = RawMesh {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            faces: vec![RawFace::new(vec![0, 1, 7])],
        };
        assert!(matches!(
            Polyhedron::from_raw_mesh(&mesh, &tol),
            Err(Error::InvalidPolyhedron(_))
        ));
    }

    #[test]
    fn from_raw_mesh_keeps_degenerate_faces_as_material() {
        let tol = Tolerance::default();
        let positions = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 2.0, 0.0, 0.0,
        ];
        // second triangle is collinear
        let mesh = RawMesh::from_triangles(&positions, &[0, 1, 2, 0, 1, 3]);
        let poly = Polyhedron::from_raw_mesh(&mesh, &tol).unwrap();
        assert_eq!(poly.face_count(), 2);
        assert!(poly.faces()[1].is_degenerate());
        assert_eq!(poly.vertices(&tol).len(), 4);
    }

    #[test]
    fn from_raw_mesh_fails_without_valid_faces() {
        let tol = Tolerance::default();
        let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0];
        let mesh = RawMesh::from_triangles(&positions, &[0, 1, 2]);
        assert!(Polyhedron::from_raw_mesh(&mesh, &tol).is_err());
    }
}
