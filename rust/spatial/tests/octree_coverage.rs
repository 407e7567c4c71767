// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Coverage of random elements by octree cells.

use bimdex_geometry::{BoundingBox3D, Point3D, Polyhedron, Tolerance};
use bimdex_spatial::{CellId, IndexGeometry, IndexRow, Octree, OctreeFrame};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEPTH: u8 = 5;

fn frame() -> OctreeFrame {
    OctreeFrame::new(BoundingBox3D::new(
        Point3D::new(-20.0, -20.0, -5.0),
        Point3D::new(20.0, 20.0, 15.0),
    ))
    .unwrap()
}

fn random_box(rng: &mut StdRng) -> BoundingBox3D {
    let min = Point3D::new(
        rng.random_range(-19.0..10.0),
        rng.random_range(-19.0..10.0),
        rng.random_range(-4.0..8.0),
    );
    let size = [
        rng.random_range(0.3..9.0),
        rng.random_range(0.3..9.0),
        rng.random_range(0.3..6.0),
    ];
    BoundingBox3D::new(min, Point3D::new(min.x + size[0], min.y + size[1], min.z + size[2]))
}

fn covering_rows<'a>(rows: &'a [IndexRow], element: &'a str) -> impl Iterator<Item = &'a IndexRow> {
    rows.iter().filter(move |r| r.element_id == element)
}

#[test]
fn every_interior_point_is_covered_and_every_cell_touches_the_element() {
    let tol = Tolerance::default();
    let frame = frame();
    let mut rng = StdRng::seed_from_u64(7);

    for mode in [IndexGeometry::BoundingBox, IndexGeometry::Polyhedron] {
        let mut octree = Octree::new(frame, DEPTH, mode).unwrap();
        let boxes: Vec<BoundingBox3D> = (0..12).map(|_| random_box(&mut rng)).collect();
        for (i, bbox) in boxes.iter().enumerate() {
            let solid = Polyhedron::from_box_corners(&bbox.corners(), &tol);
            let assigned = octree.compute_octree(&format!("E{i}"), &solid, &tol);
            assert!(assigned > 0);
        }
        let rows = octree.into_rows();

        for (i, bbox) in boxes.iter().enumerate() {
            let element = format!("E{i}");
            let cells: Vec<CellId> = covering_rows(&rows, &element).map(|r| r.cell_id).collect();

            for _ in 0..200 {
                let inner = bbox.inflated(-1e-3);
                let p = Point3D::new(
                    rng.random_range(inner.min.x..inner.max.x),
                    rng.random_range(inner.min.y..inner.max.y),
                    rng.random_range(inner.min.z..inner.max.z),
                );
                let leaf = frame.locate(&p, DEPTH).unwrap();
                assert!(
                    cells.iter().any(|c| c.contains(leaf)),
                    "{mode}: point {p:?} of {element} not covered"
                );
            }

            for cell in &cells {
                assert!(frame.cell_box(*cell).overlaps_interior(bbox, &tol));
            }

            // assigned cells never nest
            for a in &cells {
                assert!(!cells.iter().any(|b| a != b && a.contains(*b)));
            }
        }
    }
}

#[test]
fn bbox_and_polyhedron_modes_agree_on_boxes() {
    let tol = Tolerance::default();
    let frame = frame();
    let mut rng = StdRng::seed_from_u64(42);
    let bbox = random_box(&mut rng);
    let solid = Polyhedron::from_box_corners(&bbox.corners(), &tol);

    let mut by_box = Octree::new(frame, 4, IndexGeometry::BoundingBox).unwrap();
    by_box.compute_octree("A", &solid, &tol);
    let mut by_faces = Octree::new(frame, 4, IndexGeometry::Polyhedron).unwrap();
    by_faces.compute_octree("A", &solid, &tol);

    assert_eq!(by_box.into_rows(), by_faces.into_rows());
}

#[test]
fn rows_serialize_with_key_strings() {
    let row = IndexRow::new("2O2Fr$t4X7Zf8NOew3FLOH", CellId::ROOT);
    let json = serde_json::to_value(&row).unwrap();
    assert_eq!(json["cell_id"], serde_json::json!(CellId::ROOT.to_key_string()));
    assert_eq!(json["depth"], serde_json::json!(0));
    let back: IndexRow = serde_json::from_value(json).unwrap();
    assert_eq!(back, row);
}
