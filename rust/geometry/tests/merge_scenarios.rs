// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw mesh → polyhedron → merged faces, the way element bodies arrive from
//! the model reader.

use approx::assert_relative_eq;
use bimdex_geometry::{
    axis_alignment, simplify_and_merge_faces, BoundingBox3D, Point3D, Polyhedron,
    PrincipalComponentAnalysis, RawMesh, Tolerance, BOX_FACE_INDICES,
};

/// Unit cube as 12 triangles over 8 shared vertices.
fn triangulated_cube() -> RawMesh {
    let corners = BoundingBox3D::new(Point3D::origin(), Point3D::new(1.0, 1.0, 1.0)).corners();
    let positions: Vec<f64> = corners.iter().flat_map(|c| [c.x, c.y, c.z]).collect();
    let indices: Vec<u32> = BOX_FACE_INDICES
        .iter()
        .flat_map(|q| [q[0], q[1], q[2], q[0], q[2], q[3]])
        .map(|i| i as u32)
        .collect();
    RawMesh::from_triangles(&positions, &indices)
}

/// 4x4 square with a 2x2 hole, as eight triangles.
fn triangulated_frame() -> RawMesh {
    let pts = [
        [0.0, 0.0],
        [4.0, 0.0],
        [4.0, 4.0],
        [0.0, 4.0],
        [1.0, 1.0],
        [3.0, 1.0],
        [3.0, 3.0],
        [1.0, 3.0],
    ];
    let positions: Vec<f64> = pts.iter().flat_map(|p| [p[0], p[1], 2.5]).collect();
    let indices = [
        0, 1, 5, 0, 5, 4, // bottom
        1, 2, 6, 1, 6, 5, // right
        2, 3, 7, 2, 7, 6, // top
        3, 0, 4, 3, 4, 7, // left
    ];
    RawMesh::from_triangles(&positions, &indices)
}

#[test]
fn triangulated_cube_merges_to_six_quads() {
    let tol = Tolerance::default();
    let cube = Polyhedron::from_raw_mesh(&triangulated_cube(), &tol).unwrap();
    assert_eq!(cube.face_count(), 12);

    let outcome = simplify_and_merge_faces(&cube, &tol);
    assert_eq!(outcome.faces.len(), 6);
    assert_eq!(outcome.merges, 6);

    let area: f64 = outcome.faces.iter().map(|f| f.area()).sum();
    assert_relative_eq!(area, 6.0, epsilon = 1e-9);
    for face in &outcome.faces {
        assert_eq!(face.outer().len() - 1, 4);
        assert!(axis_alignment(&face.normal().unwrap(), &tol).is_some());
        assert!(face.validate(&tol).is_ok());
    }

    let merged = Polyhedron::new(outcome.faces);
    assert_relative_eq!(merged.volume(), 1.0, epsilon = 1e-9);
}

#[test]
fn triangulated_frame_merges_into_face_with_hole() {
    let tol = Tolerance::default();
    let frame = Polyhedron::from_raw_mesh(&triangulated_frame(), &tol).unwrap();
    let area_in = frame.surface_area();

    let outcome = simplify_and_merge_faces(&frame, &tol);
    assert_eq!(outcome.faces.len(), 1);

    let face = &outcome.faces[0];
    assert_eq!(face.hole_count(), 1);
    assert_eq!(face.outer().len() - 1, 4);
    assert_eq!(face.inner()[0].len() - 1, 4);
    assert_relative_eq!(face.area(), area_in, epsilon = 1e-9);
    assert_relative_eq!(face.area(), 12.0, epsilon = 1e-9);

    assert!(!face.inside(&Point3D::new(2.0, 2.0, 2.5), &tol));
    assert!(face.inside(&Point3D::new(0.5, 2.0, 2.5), &tol));
}

#[test]
fn obb_of_merged_body_feeds_back_through_merge() {
    let tol = Tolerance::default();
    let cube = Polyhedron::from_raw_mesh(&triangulated_cube(), &tol).unwrap();
    let pca = PrincipalComponentAnalysis::from_polyhedron(&cube, &tol).unwrap();
    let obb = pca.oriented_box();
    assert_relative_eq!(obb.volume(), 1.0, epsilon = 1e-9);

    let solid = obb.to_polyhedron(&tol);
    let outcome = simplify_and_merge_faces(&solid, &tol);
    assert_eq!(outcome.faces.len(), 6);
    assert_eq!(outcome.merges, 0);
    for v in cube.vertices(&tol) {
        assert!(obb.contains(&v, &tol));
    }
}
