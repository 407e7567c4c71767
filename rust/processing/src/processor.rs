// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-model processing pass.

use std::time::Instant;

use bimdex_geometry::{
    simplify_and_merge_faces, BoundingBox3D, Face3D, OrientedBox, Polyhedron,
    PrincipalComponentAnalysis, Vector3D,
};
use bimdex_spatial::{Octree, OctreeFrame};
use serde::{Deserialize, Serialize};

use crate::config::{IndexSelection, PipelineConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{Error, StoreError};
use crate::records::{BoxRecord, ElementUpdate, FaceCategory, IndexFrame};
use crate::sink::{BatchWriter, RecordSink};
use crate::source::MeshSource;
use crate::topo_faces::face_records;
use crate::Result;

/// Relative growth applied to the union of element boxes when the source
/// has no world box.
const WORLD_MARGIN: f64 = 0.01;

/// Outcome of one model pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Elements indexed and persisted.
    pub elements_processed: usize,
    /// Selected elements dropped for missing or malformed geometry, or
    /// for lying outside the world box.
    pub elements_skipped: usize,
    /// Face records written.
    pub face_records: usize,
    /// Index rows written.
    pub index_rows: usize,
    /// Cells of the octree after ingestion (including seeded ones).
    pub cells: usize,
    /// A partial run found the stored index frame unusable and re-indexed
    /// every element.
    pub index_rebuilt: bool,
    /// Total processing time (ms).
    pub total_time_ms: u64,
    pub diagnostics: Diagnostics,
}

/// Runs the B-rep post-processing pipeline over one federated model.
#[derive(Debug, Clone, Default)]
pub struct ModelProcessor {
    config: PipelineConfig,
}

impl ModelProcessor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes the selected elements of `source` into `sink`.
    ///
    /// Malformed elements and recoverable store failures end up in the
    /// report's diagnostics. A fatal store failure aborts the pass with
    /// [`Error::Aborted`], carrying the diagnostics gathered so far.
    pub fn process<M, S>(
        &self,
        source: &mut M,
        sink: &mut S,
        selection: &IndexSelection,
    ) -> Result<RunReport>
    where
        M: MeshSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let start = Instant::now();
        let mut report = RunReport::default();
        let mut diagnostics = Diagnostics::new();

        let mut writer = BatchWriter::new(
            sink,
            self.config.face_batch_size,
            self.config.index_batch_size,
        );
        let result = self.run(source, &mut writer, selection, &mut report, &mut diagnostics);
        diagnostics.append(&mut writer.take_diagnostics());

        if let Err(err) = result {
            tracing::warn!(error = %err, diagnostics = diagnostics.len(), "Model pass aborted");
            return Err(Error::Aborted {
                source: Box::new(err),
                diagnostics,
            });
        }

        report.face_records = writer.faces_written();
        report.index_rows = writer.rows_written();
        report.total_time_ms = start.elapsed().as_millis() as u64;
        report.diagnostics = diagnostics;

        tracing::info!(
            processed = report.elements_processed,
            skipped = report.elements_skipped,
            face_records = report.face_records,
            index_rows = report.index_rows,
            diagnostics = report.diagnostics.len(),
            total_time_ms = report.total_time_ms,
            "Model pass complete"
        );
        Ok(report)
    }

    fn run<M, S>(
        &self,
        source: &mut M,
        writer: &mut BatchWriter<'_, S>,
        selection: &IndexSelection,
        report: &mut RunReport,
        diagnostics: &mut Diagnostics,
    ) -> Result<()>
    where
        M: MeshSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let all_ids = source.element_ids();
        let selected = all_ids.iter().filter(|id| selection.includes(id)).count();

        let Some(world) = world_bounds(source, &all_ids) else {
            tracing::info!(elements = all_ids.len(), "No element geometry, nothing to index");
            report.elements_skipped = selected;
            return Ok(());
        };
        let mut index_frame = IndexFrame {
            world,
            max_depth: self.config.octree_max_depth,
        };

        // stored rows are only reused in the frame they were written with
        let rebuild_index = if selection.is_full() {
            true
        } else {
            match writer.sink().index_frame()? {
                Some(stored) if self.frame_is_reusable(&stored, source, &all_ids) => {
                    index_frame = stored;
                    false
                }
                stored => {
                    tracing::warn!(
                        ?stored,
                        current = ?index_frame,
                        "Stored index frame does not fit the model, rebuilding the whole index"
                    );
                    true
                }
            }
        };
        let everything = IndexSelection::All;
        let index_scope = if rebuild_index { &everything } else { selection };
        report.index_rebuilt = rebuild_index;

        let frame = OctreeFrame::new(index_frame.world)?;
        let north = source.true_north().unwrap_or_else(Vector3D::y);

        tracing::info!(
            elements = all_ids.len(),
            selected,
            full_rebuild = selection.is_full(),
            index_rebuild = rebuild_index,
            max_depth = index_frame.max_depth,
            geometry = %self.config.index_geometry,
            "Starting model pass"
        );

        let mut octree = if rebuild_index {
            Octree::new(frame, index_frame.max_depth, self.config.index_geometry)?
        } else {
            let existing = writer.sink().existing_index_rows()?;
            Octree::seeded(
                frame,
                index_frame.max_depth,
                self.config.index_geometry,
                existing,
                |id| !selection.includes(id),
            )?
        };

        for id in &all_ids {
            let emit = selection.includes(id);
            if !emit && !rebuild_index {
                continue;
            }
            let kept = self.process_element(source, id, emit, &mut octree, &north, writer, diagnostics)?;
            match (emit, kept) {
                (true, true) => report.elements_processed += 1,
                (true, false) => report.elements_skipped += 1,
                (false, _) => {}
            }
        }

        writer.flush_faces()?;
        report.cells = octree.cell_count();

        // drain
        if self.reset_index(writer, index_scope, rebuild_index.then_some(&index_frame), diagnostics)? {
            for row in octree
                .into_rows()
                .into_iter()
                .filter(|row| index_scope.includes(&row.element_id))
            {
                writer.push_row(row)?;
            }
        }
        writer.finish()
    }

    /// Indexes one element and, when `emit` is set, writes its face records
    /// and element update. Nothing is written for an element that is
    /// dropped. Returns whether the element was kept.
    #[allow(clippy::too_many_arguments)]
    fn process_element<M, S>(
        &self,
        source: &mut M,
        id: &str,
        emit: bool,
        octree: &mut Octree,
        north: &Vector3D,
        writer: &mut BatchWriter<'_, S>,
        diagnostics: &mut Diagnostics,
    ) -> Result<bool>
    where
        M: MeshSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let tol = self.config.tolerance;
        let Some(polyhedron) = self.reconstitute(source, id, diagnostics) else {
            return Ok(false);
        };
        let Some(bbox) = polyhedron.bounding_box() else {
            diagnostics.push(Some(id), DiagnosticKind::DegenerateGeometry, "no faces");
            return Ok(false);
        };
        let pca = if emit {
            match PrincipalComponentAnalysis::from_polyhedron(&polyhedron, &tol) {
                Ok(pca) => Some(pca),
                Err(err) => {
                    diagnostics.push(Some(id), DiagnosticKind::DegenerateGeometry, err.to_string());
                    return Ok(false);
                }
            }
        } else {
            None
        };

        let cells = octree.compute_octree(id, &polyhedron, &tol);
        if cells == 0 {
            diagnostics.push(
                Some(id),
                DiagnosticKind::OutsideWorld,
                "occupies no octree cell of the world box",
            );
            return Ok(false);
        }
        let Some(pca) = pca else {
            tracing::debug!(element = %id, cells, "Re-indexed element");
            return Ok(true);
        };

        let body = self.body_faces(id, &polyhedron, diagnostics);
        for record in face_records(id, &body, FaceCategory::Body, north, &tol, diagnostics) {
            writer.push_face(record)?;
        }

        let mut update = ElementUpdate::new(id, &bbox, &pca.centroid());
        if self.config.compute_obb {
            let obb = pca.oriented_box();
            let projected = pca.projected_box();
            for (category, oriented) in [
                (FaceCategory::Obb, &obb),
                (FaceCategory::ProjectedObb, &projected),
            ] {
                let faces = self.box_faces(oriented);
                for record in face_records(id, &faces, category, north, &tol, diagnostics) {
                    writer.push_face(record)?;
                }
            }
            update.obb = Some(BoxRecord::from_oriented(&obb));
            update.projected_obb = Some(BoxRecord::from_oriented(&projected));
        }
        writer.update_element(&update)?;

        tracing::debug!(
            element = %id,
            faces = polyhedron.face_count(),
            merged_faces = body.len(),
            cells,
            "Processed element"
        );
        Ok(true)
    }

    /// Clears the stored rows of `scope` and, for a rebuilt index, records
    /// its frame. Returns `false` after a recoverable store failure, in which
    /// case no rows may be written.
    fn reset_index<S: RecordSink + ?Sized>(
        &self,
        writer: &mut BatchWriter<'_, S>,
        scope: &IndexSelection,
        frame: Option<&IndexFrame>,
        diagnostics: &mut Diagnostics,
    ) -> Result<bool> {
        let sink = writer.sink();
        let mut outcome = sink.clear_index(scope);
        if let (Ok(()), Some(frame)) = (&outcome, frame) {
            outcome = sink.store_index_frame(frame);
        }
        match outcome {
            Ok(()) => Ok(true),
            Err(StoreError::Recoverable(message)) => {
                diagnostics.push(
                    None,
                    DiagnosticKind::StoreRecoverable,
                    format!("index not reset, rows not written: {}", message),
                );
                Ok(false)
            }
            Err(fatal) => Err(fatal.into()),
        }
    }

    /// A stored frame is reused if the depth is unchanged and it still
    /// covers the model: the source's own world box when it has one, every
    /// element box otherwise.
    fn frame_is_reusable<M: MeshSource + ?Sized>(
        &self,
        stored: &IndexFrame,
        source: &M,
        ids: &[String],
    ) -> bool {
        if stored.max_depth != self.config.octree_max_depth {
            return false;
        }
        let tol = &self.config.tolerance;
        match source.world_bounds() {
            Some(world) => stored.world.contains_box(&world, tol) && world.contains_box(&stored.world, tol),
            None => ids
                .iter()
                .filter_map(|id| source.bounding_box(id))
                .all(|bbox| stored.world.contains_box(&bbox, tol)),
        }
    }

    fn reconstitute<M: MeshSource + ?Sized>(
        &self,
        source: &mut M,
        id: &str,
        diagnostics: &mut Diagnostics,
    ) -> Option<Polyhedron> {
        let Some(mesh) = source.mesh(id) else {
            diagnostics.push(Some(id), DiagnosticKind::DegenerateGeometry, "no mesh");
            return None;
        };
        match Polyhedron::from_raw_mesh(&mesh, &self.config.tolerance) {
            Ok(polyhedron) => Some(polyhedron),
            Err(err) => {
                diagnostics.push(Some(id), DiagnosticKind::DegenerateGeometry, err.to_string());
                None
            }
        }
    }

    fn body_faces(&self, id: &str, polyhedron: &Polyhedron, diagnostics: &mut Diagnostics) -> Vec<Face3D> {
        if !self.config.merge_faces {
            return polyhedron.faces().to_vec();
        }
        let outcome = simplify_and_merge_faces(polyhedron, &self.config.tolerance);
        if outcome.rejected > 0 {
            diagnostics.push(
                Some(id),
                DiagnosticKind::MergeRejected,
                format!("{} merge attempts rejected, {} merges kept", outcome.rejected, outcome.merges),
            );
        }
        outcome.faces
    }

    fn box_faces(&self, oriented: &OrientedBox) -> Vec<Face3D> {
        let solid = oriented.to_polyhedron(&self.config.tolerance);
        if self.config.merge_faces {
            simplify_and_merge_faces(&solid, &self.config.tolerance).faces
        } else {
            solid.into_faces()
        }
    }
}

/// World box from the source, or the union of all element boxes grown by
/// [`WORLD_MARGIN`]. Covers every element, not only the selected ones, so
/// that cell ids stay stable across partial runs.
fn world_bounds<M: MeshSource + ?Sized>(source: &M, ids: &[String]) -> Option<BoundingBox3D> {
    if let Some(world) = source.world_bounds() {
        return Some(world);
    }
    ids.iter()
        .filter_map(|id| source.bounding_box(id))
        .reduce(|a, b| a.union(&b))
        .map(|union| union.scaled(WORLD_MARGIN))
}
