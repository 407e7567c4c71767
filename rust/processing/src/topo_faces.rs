// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology face records of one element.

use bimdex_geometry::{Face3D, Point3D, Tolerance, Vector3D};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::records::{FaceCategory, FaceRecord};

/// Signed angle in degrees from `north` to the horizontal projection of
/// `normal`, counter-clockwise about +Z in `(-180, 180]`. `None` when the
/// normal is vertical (horizontal face) or north has no horizontal part.
pub fn angle_from_north(normal: &Vector3D, north: &Vector3D, tol: &Tolerance) -> Option<f64> {
    let n = Vector3D::new(normal.x, normal.y, 0.0);
    let north = Vector3D::new(north.x, north.y, 0.0);
    if n.norm() <= tol.tol || north.norm() <= tol.tol {
        return None;
    }
    let cross = north.x * n.y - north.y * n.x;
    let angle = cross.atan2(north.dot(&n)).to_degrees();
    let angle = tol.round_float(angle);
    // atan2 gives -180 for a normal pointing exactly south
    Some(if angle <= -180.0 { 180.0 } else { angle })
}

/// Builds the records of `faces`: one per face (outer ring plus holes) and
/// one extra [`FaceCategory::Hole`] record per hole, with face id
/// `"<faceid>-<n>"`. Faces failing validation are skipped with a diagnostic.
pub fn face_records(
    element_id: &str,
    faces: &[Face3D],
    category: FaceCategory,
    north: &Vector3D,
    tol: &Tolerance,
    diagnostics: &mut Diagnostics,
) -> Vec<FaceRecord> {
    let mut records = Vec::with_capacity(faces.len());

    for (index, face) in faces.iter().enumerate() {
        let face_id = (index + category.id_offset()).to_string();
        if let Err(err) = face.validate(tol) {
            diagnostics.push(
                Some(element_id),
                DiagnosticKind::InvalidFace,
                format!("{} face {} skipped: {}", category, face_id, err),
            );
            continue;
        }
        let Some(normal) = face.normal() else {
            continue;
        };

        let angle = angle_from_north(&normal, north, tol);
        let normal_out = round_vector(&normal, tol);

        records.push(FaceRecord {
            element_id: element_id.to_string(),
            face_id: face_id.clone(),
            category,
            outer: ring(face.outer(), tol),
            holes: face.inner().iter().map(|hole| ring(hole, tol)).collect(),
            normal: normal_out,
            angle_from_north: angle,
            centroid: round_point(&face.centroid(), tol),
        });

        for (n, hole) in face.inner().iter().enumerate() {
            // holes wind against the outer loop; flip so the ring matches the normal
            let flipped: Vec<Point3D> = hole.iter().rev().copied().collect();
            records.push(FaceRecord {
                element_id: element_id.to_string(),
                face_id: format!("{}-{}", face_id, n + 1),
                category: FaceCategory::Hole,
                outer: ring(&flipped, tol),
                holes: Vec::new(),
                normal: normal_out,
                angle_from_north: angle,
                centroid: round_point(&loop_centroid(hole), tol),
            });
        }
    }

    records
}

fn loop_centroid(closed: &[Point3D]) -> Point3D {
    let open = match closed.len() {
        0 => return Point3D::origin(),
        1 => closed,
        n => &closed[..n - 1],
    };
    let sum = open.iter().fold(Vector3D::zeros(), |acc, p| acc + p.coords);
    Point3D::from(sum / open.len() as f64)
}

fn ring(points: &[Point3D], tol: &Tolerance) -> Vec<[f64; 3]> {
    points.iter().map(|p| round_point(p, tol)).collect()
}

fn round_point(p: &Point3D, tol: &Tolerance) -> [f64; 3] {
    [tol.round_double(p.x), tol.round_double(p.y), tol.round_double(p.z)]
}

fn round_vector(v: &Vector3D, tol: &Tolerance) -> [f64; 3] {
    [tol.round_float(v.x), tol.round_float(v.y), tol.round_float(v.z)]
}
