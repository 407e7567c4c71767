// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end model passes against the in-memory store.

use bimdex_geometry::{BoundingBox3D, Point3D, RawFace, RawMesh, BOX_FACE_INDICES};
use bimdex_processing::{
    DiagnosticKind, Error, FaceCategory, IndexSelection, MemorySink, ModelProcessor, ModelSource,
    PipelineConfig, StoreError,
};
use bimdex_spatial::{IndexGeometry, IndexRow};

fn box_mesh(min: [f64; 3], max: [f64; 3]) -> RawMesh {
    let bbox = BoundingBox3D::new(Point3D::from(min), Point3D::from(max));
    RawMesh {
        vertices: bbox.corners().iter().map(|c| [c.x, c.y, c.z]).collect(),
        faces: BOX_FACE_INDICES
            .iter()
            .map(|idx| RawFace::new(idx.iter().map(|&i| i as u32).collect()))
            .collect(),
    }
}

/// 3x3 square with a 1x1 hole in the middle, at z = 0.
fn square_with_hole() -> RawMesh {
    let mut mesh = RawMesh::new();
    let outer = [[0.0, 0.0], [3.0, 0.0], [3.0, 3.0], [0.0, 3.0]]
        .map(|[x, y]| mesh.add_vertex([x, y, 0.0]));
    let hole = [[1.0, 1.0], [1.0, 2.0], [2.0, 2.0], [2.0, 1.0]]
        .map(|[x, y]| mesh.add_vertex([x, y, 0.0]));
    mesh.add_face(RawFace::with_holes(outer.to_vec(), vec![hole.to_vec()]));
    mesh
}

fn sorted(mut rows: Vec<IndexRow>) -> Vec<IndexRow> {
    rows.sort_by(|a, b| (a.cell_id, &a.element_id).cmp(&(b.cell_id, &b.element_id)));
    rows
}

#[test]
fn face_with_hole_gives_body_and_hole_records() {
    let mut model = ModelSource::new();
    model.push("slab", square_with_hole());
    let config = PipelineConfig {
        compute_obb: false,
        ..PipelineConfig::default()
    };

    let mut sink = MemorySink::new();
    let report = ModelProcessor::new(config)
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap();

    assert_eq!(report.elements_processed, 1);
    assert_eq!(report.face_records, 2);
    let categories: Vec<FaceCategory> = sink.faces.iter().map(|f| f.category).collect();
    assert_eq!(categories, [FaceCategory::Body, FaceCategory::Hole]);
    assert_eq!(sink.faces[0].holes.len(), 1);
    assert_eq!(sink.faces[1].face_id, "0-1");
    assert!(report.index_rows > 0);
    assert_eq!(sink.index_rows.len(), report.index_rows);
}

#[test]
fn box_element_gets_body_and_box_records() {
    let mut model = ModelSource::new();
    model.push("beam", box_mesh([0.0, 0.0, 0.0], [4.0, 2.0, 1.0]));

    let mut sink = MemorySink::new();
    let report = ModelProcessor::new(PipelineConfig::default())
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap();

    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.face_records, 18);
    let count = |category| sink.faces.iter().filter(|f| f.category == category).count();
    assert_eq!(count(FaceCategory::Body), 6);
    assert_eq!(count(FaceCategory::Obb), 6);
    assert_eq!(count(FaceCategory::ProjectedObb), 6);
    assert!(sink
        .faces_of("beam")
        .filter(|f| f.category == FaceCategory::Obb)
        .all(|f| f.face_id.starts_with("1000")));
    assert!(sink
        .faces_of("beam")
        .filter(|f| f.category == FaceCategory::ProjectedObb)
        .all(|f| f.face_id.starts_with("1010")));

    let mut angles: Vec<Option<i64>> = sink
        .faces_of("beam")
        .filter(|f| f.category == FaceCategory::Body)
        .map(|f| f.angle_from_north.map(|a| a.round() as i64))
        .collect();
    angles.sort();
    assert_eq!(angles, [None, None, Some(-90), Some(0), Some(90), Some(180)]);

    let update = &sink.elements["beam"];
    assert_eq!(update.bbox_max, [4.0, 2.0, 1.0]);
    assert_eq!(update.centroid, [2.0, 1.0, 0.5]);
    let obb = update.obb.as_ref().unwrap();
    assert!((obb.axes[0][0].abs() - 1.0).abs() < 1e-9);
    assert!(update.projected_obb.is_some());

    assert!(!sink.index_rows.is_empty());
    assert!(sink.index_rows.iter().all(|r| r.element_id == "beam"));
}

#[test]
fn element_on_a_leaf_cell_gives_one_row() {
    for geometry in [IndexGeometry::BoundingBox, IndexGeometry::Polyhedron] {
        let mut model = ModelSource::new();
        model.world_bounds = Some(BoundingBox3D::new(
            Point3D::origin(),
            Point3D::new(8.0, 8.0, 8.0),
        ));
        model.push("column", box_mesh([2.0, 4.0, 0.0], [4.0, 6.0, 2.0]));
        let config = PipelineConfig {
            octree_max_depth: 2,
            index_geometry: geometry,
            ..PipelineConfig::default()
        };

        let mut sink = MemorySink::new();
        let report = ModelProcessor::new(config)
            .process(&mut model, &mut sink, &IndexSelection::All)
            .unwrap();

        assert_eq!(report.index_rows, 1, "{geometry}");
        let row = &sink.index_rows[0];
        assert_eq!(row.depth, 2);
        let size = bimdex_spatial::CellBounds::size_at(2);
        assert_eq!(row.min, [size, 2 * size, 0]);
        assert_eq!(row.max, [2 * size, 3 * size, size]);
    }
}

#[test]
fn malformed_elements_are_skipped() {
    let mut model = ModelSource::new();
    model.push("good", box_mesh([0.0; 3], [1.0; 3]));
    let mut bad = box_mesh([2.0; 3], [3.0; 3]);
    bad.faces[0].outer[0] = 99;
    model.push("bad", bad);
    model.push("empty", RawMesh::new());

    let mut sink = MemorySink::new();
    let report = ModelProcessor::new(PipelineConfig::default())
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap();

    assert_eq!(report.elements_processed, 1);
    assert_eq!(report.elements_skipped, 2);
    assert_eq!(report.diagnostics.count(DiagnosticKind::DegenerateGeometry), 2);
    assert!(sink.index_rows.iter().all(|r| r.element_id == "good"));
    assert!(sink.elements.contains_key("good"));
    assert!(!sink.elements.contains_key("bad"));
}

#[test]
fn partial_regeneration_matches_full_rebuild() {
    let world = BoundingBox3D::new(Point3D::origin(), Point3D::new(16.0, 16.0, 16.0));
    let model = |b_min: f64| {
        let mut model = ModelSource::new();
        model.world_bounds = Some(world);
        model.push("A", box_mesh([1.0; 3], [3.5; 3]));
        model.push("B", box_mesh([b_min; 3], [b_min + 2.5; 3]));
        model
    };
    let processor = ModelProcessor::new(PipelineConfig {
        octree_max_depth: 4,
        compute_obb: false,
        ..PipelineConfig::default()
    });

    let mut sink = MemorySink::new();
    processor
        .process(&mut model(9.0), &mut sink, &IndexSelection::All)
        .unwrap();
    let a_rows: Vec<IndexRow> = sink.index_rows.iter().filter(|r| r.element_id == "A").cloned().collect();

    let report = processor
        .process(&mut model(5.0), &mut sink, &IndexSelection::elements(["B"]))
        .unwrap();
    assert_eq!(report.elements_processed, 1);
    assert!(!report.index_rebuilt);
    assert!(report.cells > 0);

    let mut fresh = MemorySink::new();
    processor
        .process(&mut model(5.0), &mut fresh, &IndexSelection::All)
        .unwrap();

    assert_eq!(sorted(sink.index_rows.clone()), sorted(fresh.index_rows));
    let kept: Vec<IndexRow> = sink.index_rows.iter().filter(|r| r.element_id == "A").cloned().collect();
    assert_eq!(sorted(kept), sorted(a_rows));
}

/// A and B without a source world box, so the world follows the elements.
fn floating_model(b_min: f64) -> ModelSource {
    let mut model = ModelSource::new();
    model.push("A", box_mesh([1.0; 3], [3.5; 3]));
    model.push("B", box_mesh([b_min; 3], [b_min + 2.5; 3]));
    model
}

#[test]
fn moving_an_element_out_of_the_stored_world_rebuilds_the_index() {
    let processor = ModelProcessor::new(PipelineConfig {
        octree_max_depth: 4,
        compute_obb: false,
        ..PipelineConfig::default()
    });

    let mut sink = MemorySink::new();
    processor
        .process(&mut floating_model(9.0), &mut sink, &IndexSelection::All)
        .unwrap();
    let first_frame = sink.frame.unwrap();
    let faces_before = sink.faces.len();

    let report = processor
        .process(&mut floating_model(40.0), &mut sink, &IndexSelection::elements(["B"]))
        .unwrap();
    assert!(report.index_rebuilt);
    assert_eq!(report.elements_processed, 1);
    // A is re-indexed but its records are not written again
    assert_eq!(sink.faces.len() - faces_before, report.face_records);
    assert!(sink.faces[faces_before..].iter().all(|f| f.element_id == "B"));

    let mut fresh = MemorySink::new();
    processor
        .process(&mut floating_model(40.0), &mut fresh, &IndexSelection::All)
        .unwrap();

    assert_ne!(sink.frame, Some(first_frame));
    assert_eq!(sink.frame, fresh.frame);
    assert_eq!(sorted(sink.index_rows.clone()), sorted(fresh.index_rows));
}

#[test]
fn moving_an_element_within_the_stored_world_keeps_the_frame() {
    let processor = ModelProcessor::new(PipelineConfig {
        octree_max_depth: 4,
        compute_obb: false,
        ..PipelineConfig::default()
    });

    let mut sink = MemorySink::new();
    processor
        .process(&mut floating_model(9.0), &mut sink, &IndexSelection::All)
        .unwrap();
    let first_frame = sink.frame;
    let a_rows: Vec<IndexRow> = sink.index_rows.iter().filter(|r| r.element_id == "A").cloned().collect();

    let report = processor
        .process(&mut floating_model(5.0), &mut sink, &IndexSelection::elements(["B"]))
        .unwrap();
    assert!(!report.index_rebuilt);
    assert_eq!(sink.frame, first_frame);
    let kept: Vec<IndexRow> = sink.index_rows.iter().filter(|r| r.element_id == "A").cloned().collect();
    assert_eq!(sorted(kept), sorted(a_rows));
    assert!(sink.index_rows.iter().any(|r| r.element_id == "B"));
}

#[test]
fn changing_the_max_depth_rebuilds_the_index() {
    let world = BoundingBox3D::new(Point3D::origin(), Point3D::new(16.0, 16.0, 16.0));
    let mut model = floating_model(9.0);
    model.world_bounds = Some(world);
    let config = |octree_max_depth| PipelineConfig {
        octree_max_depth,
        compute_obb: false,
        ..PipelineConfig::default()
    };

    let mut sink = MemorySink::new();
    ModelProcessor::new(config(3))
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap();
    let report = ModelProcessor::new(config(5))
        .process(&mut model, &mut sink, &IndexSelection::elements(["B"]))
        .unwrap();
    assert!(report.index_rebuilt);

    let mut fresh = MemorySink::new();
    ModelProcessor::new(config(5))
        .process(&mut model, &mut fresh, &IndexSelection::All)
        .unwrap();
    assert_eq!(sink.frame.map(|f| f.max_depth), Some(5));
    assert_eq!(sorted(sink.index_rows.clone()), sorted(fresh.index_rows));
}

#[test]
fn element_outside_the_world_is_skipped_with_a_diagnostic() {
    let mut model = ModelSource::new();
    model.world_bounds = Some(BoundingBox3D::new(
        Point3D::origin(),
        Point3D::new(10.0, 10.0, 10.0),
    ));
    model.push("inside", box_mesh([1.0; 3], [2.0; 3]));
    model.push("far", box_mesh([20.0; 3], [21.0; 3]));

    let mut sink = MemorySink::new();
    let report = ModelProcessor::new(PipelineConfig::default())
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap();

    assert_eq!(report.elements_processed, 1);
    assert_eq!(report.elements_skipped, 1);
    assert_eq!(report.diagnostics.count(DiagnosticKind::OutsideWorld), 1);
    assert_eq!(
        report.diagnostics.iter().next().and_then(|d| d.element_id.as_deref()),
        Some("far")
    );
    // dropped before any record was written
    assert_eq!(sink.faces_of("far").count(), 0);
    assert!(!sink.elements.contains_key("far"));
    assert!(sink.index_rows.iter().all(|r| r.element_id == "inside"));
}

#[test]
fn fatal_store_error_aborts_with_diagnostics() {
    let mut model = ModelSource::new();
    model.push("good", box_mesh([0.0; 3], [1.0; 3]));
    model.push("empty", RawMesh::new());

    let mut sink = MemorySink::new();
    sink.fail_next_index_write(StoreError::Fatal("disk full".into()));
    let err = ModelProcessor::new(PipelineConfig::default())
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap_err();

    match err {
        Error::Aborted { source, diagnostics } => {
            assert!(matches!(*source, Error::Store(StoreError::Fatal(_))));
            assert_eq!(diagnostics.count(DiagnosticKind::DegenerateGeometry), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn recoverable_face_failure_keeps_going() {
    let mut model = ModelSource::new();
    model.push("a", box_mesh([0.0; 3], [1.0; 3]));
    model.push("b", box_mesh([2.0; 3], [3.0; 3]));

    let mut sink = MemorySink::new();
    sink.fail_next_face_write(StoreError::Recoverable("duplicate key".into()));
    let config = PipelineConfig {
        face_batch_size: 6,
        compute_obb: false,
        ..PipelineConfig::default()
    };
    let report = ModelProcessor::new(config)
        .process(&mut model, &mut sink, &IndexSelection::All)
        .unwrap();

    assert_eq!(report.elements_processed, 2);
    assert_eq!(report.face_records, 6);
    assert_eq!(report.diagnostics.count(DiagnosticKind::StoreRecoverable), 1);
    assert!(sink.faces.iter().all(|f| f.element_id == "b"));
}
