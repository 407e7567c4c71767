// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Octree spatial indexer.
//!
//! One [`Octree`] lives for one federated model pass:
//!
//! - **init**: [`Octree::new`] starts empty for a full rebuild,
//!   [`Octree::seeded`] loads the rows of elements that are not regenerated.
//! - **ingest**: [`Octree::compute_octree`] assigns one element to every cell
//!   its geometry occupies.
//! - **drain**: [`Octree::rows`] / [`Octree::into_rows`] flatten the cell map
//!   into index rows for the store.
//!
//! Cells are classified against the element:
//!
//! - outside: nothing is recorded,
//! - the element fills the cell: the element is assigned to the cell,
//! - partial overlap above the maximum depth: the cell is marked internal and
//!   the 8 children are tested. If all of them are filled the parent is
//!   assigned instead,
//! - partial overlap at the maximum depth: the element is assigned.

use std::fmt;
use std::str::FromStr;

use bimdex_geometry::{BoundingBox3D, Point3D, Polyhedron, Tolerance};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell_id::{CellId, MAX_DEPTH};
use crate::element_table::ElementTable;
use crate::frame::OctreeFrame;
use crate::overlap::triangle_intersects_box;
use crate::{Error, Result};

/// What is tested against octree cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexGeometry {
    /// The element's axis-aligned bounding box.
    #[default]
    #[serde(rename = "bbox")]
    BoundingBox,
    /// The element's faces; cells are classified by face intersection and a
    /// point-in-solid test of the cell centre.
    Polyhedron,
}

impl FromStr for IndexGeometry {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bbox" | "boundingbox" | "bounding_box" => Ok(Self::BoundingBox),
            "polyhedron" | "brep" => Ok(Self::Polyhedron),
            other => Err(format!("unknown index geometry '{}'", other)),
        }
    }
}

impl fmt::Display for IndexGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundingBox => f.write_str("bbox"),
            Self::Polyhedron => f.write_str("polyhedron"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    /// Subdivided at least once (border cell).
    Internal,
}

/// One entry of the cell map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellData {
    pub kind: NodeKind,
    /// Elements assigned to this cell, by [`ElementTable`] index.
    pub elements: Vec<u32>,
}

impl CellData {
    fn leaf() -> Self {
        Self {
            kind: NodeKind::Leaf,
            elements: Vec::new(),
        }
    }
}

/// One (element, cell) assignment as persisted in the spatial index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub element_id: String,
    pub cell_id: CellId,
    /// Lower grid corner (x, y, z).
    pub min: [u32; 3],
    /// Upper grid corner (x, y, z).
    pub max: [u32; 3],
    pub depth: u8,
}

impl IndexRow {
    pub fn new(element_id: impl Into<String>, cell_id: CellId) -> Self {
        let bounds = cell_id.bounds();
        Self {
            element_id: element_id.into(),
            cell_id,
            min: bounds.min,
            max: bounds.max,
            depth: bounds.depth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coverage {
    Outside,
    Partial,
    Full,
}

/// The geometry being inserted, prepared once per element.
enum Probe {
    Box(BoundingBox3D),
    Solid {
        bbox: BoundingBox3D,
        triangles: Vec<([Point3D; 3], BoundingBox3D)>,
        all: Vec<[Point3D; 3]>,
    },
}

impl Probe {
    fn bounding_box(&self) -> &BoundingBox3D {
        match self {
            Probe::Box(bbox) | Probe::Solid { bbox, .. } => bbox,
        }
    }

    fn classify(&self, cell: &BoundingBox3D, tol: &Tolerance) -> Coverage {
        if !self.bounding_box().overlaps_interior(cell, tol) {
            return Coverage::Outside;
        }
        match self {
            Probe::Box(bbox) => {
                if bbox.contains_box(cell, tol) {
                    Coverage::Full
                } else {
                    Coverage::Partial
                }
            }
            Probe::Solid { triangles, all, .. } => {
                // faces lying on the cell boundary do not make it partial
                let margin = tol.tol.min(cell.extent().min() / 4.0);
                let core = cell.inflated(-margin);
                let exact = Tolerance::new(0.0, tol.double_precision, tol.float_precision);
                let crossed = triangles.iter().any(|(tri, tri_box)| {
                    tri_box.overlaps(&core, &exact) && triangle_intersects_box(tri, &core)
                });
                if crossed {
                    Coverage::Partial
                } else if bimdex_geometry::polyhedron::contains_point(all, &cell.center()) {
                    Coverage::Full
                } else {
                    Coverage::Outside
                }
            }
        }
    }
}

/// Cell map of one federated model.
#[derive(Debug, Clone)]
pub struct Octree {
    frame: OctreeFrame,
    max_depth: u8,
    mode: IndexGeometry,
    cells: FxHashMap<CellId, CellData>,
    elements: ElementTable,
}

impl Octree {
    /// Empty octree for a full rebuild.
    pub fn new(frame: OctreeFrame, max_depth: u8, mode: IndexGeometry) -> Result<Self> {
        if max_depth > MAX_DEPTH {
            return Err(Error::DepthOutOfRange(max_depth));
        }
        Ok(Self {
            frame,
            max_depth,
            mode,
            cells: FxHashMap::default(),
            elements: ElementTable::new(),
        })
    }

    /// Octree for a partial regeneration: existing rows whose element passes
    /// `keep` are loaded back, all others are dropped so that their elements
    /// can be ingested again.
    pub fn seeded<I, F>(
        frame: OctreeFrame,
        max_depth: u8,
        mode: IndexGeometry,
        rows: I,
        keep: F,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = IndexRow>,
        F: Fn(&str) -> bool,
    {
        let mut octree = Self::new(frame, max_depth, mode)?;
        let mut loaded = 0usize;
        for row in rows {
            if !keep(&row.element_id) {
                continue;
            }
            let element = octree.elements.intern(&row.element_id);
            octree.assign(row.cell_id, element);
            let mut ancestor = row.cell_id.parent();
            while let Some(cell) = ancestor {
                octree.mark_internal(cell);
                ancestor = cell.parent();
            }
            loaded += 1;
        }
        tracing::debug!(rows = loaded, cells = octree.cells.len(), "Seeded octree");
        Ok(octree)
    }

    pub fn frame(&self) -> &OctreeFrame {
        &self.frame
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    pub fn mode(&self) -> IndexGeometry {
        self.mode
    }

    pub fn elements(&self) -> &ElementTable {
        &self.elements
    }

    pub fn cell(&self, id: CellId) -> Option<&CellData> {
        self.cells.get(&id)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Indexes one element using the configured [`IndexGeometry`]. Returns
    /// the number of cells the element was assigned to.
    pub fn compute_octree(
        &mut self,
        element_id: &str,
        polyhedron: &Polyhedron,
        tol: &Tolerance,
    ) -> usize {
        let Some(bbox) = polyhedron.bounding_box() else {
            return 0;
        };
        let probe = match self.mode {
            IndexGeometry::BoundingBox => Probe::Box(thicken(bbox, tol)),
            IndexGeometry::Polyhedron => {
                let all = polyhedron.triangles();
                let triangles = all
                    .iter()
                    .filter_map(|t| BoundingBox3D::from_points(t.iter()).map(|b| (*t, b)))
                    .collect();
                Probe::Solid {
                    bbox: thicken(bbox, tol),
                    triangles,
                    all,
                }
            }
        };
        self.ingest(element_id, &probe, tol)
    }

    /// Indexes one element by a precomputed bounding box.
    pub fn compute_octree_box(
        &mut self,
        element_id: &str,
        bbox: &BoundingBox3D,
        tol: &Tolerance,
    ) -> usize {
        self.ingest(element_id, &Probe::Box(thicken(*bbox, tol)), tol)
    }

    fn ingest(&mut self, element_id: &str, probe: &Probe, tol: &Tolerance) -> usize {
        let element = self.elements.intern(element_id);
        let mut assigned = 0;
        self.insert(CellId::ROOT, element, probe, tol, &mut assigned);
        tracing::trace!(element = element_id, cells = assigned, "Indexed element");
        assigned
    }

    fn insert(
        &mut self,
        cell: CellId,
        element: u32,
        probe: &Probe,
        tol: &Tolerance,
        assigned: &mut usize,
    ) -> Coverage {
        let cell_box = self.frame.cell_box(cell);
        match probe.classify(&cell_box, tol) {
            Coverage::Outside => Coverage::Outside,
            Coverage::Full => {
                self.assign(cell, element);
                *assigned += 1;
                Coverage::Full
            }
            Coverage::Partial => {
                let children = match cell.children() {
                    Some(children) if cell.depth() < self.max_depth => children,
                    _ => {
                        self.assign(cell, element);
                        *assigned += 1;
                        return Coverage::Partial;
                    }
                };

                let mut full = 0;
                for child in children {
                    if self.insert(child, element, probe, tol, assigned) == Coverage::Full {
                        full += 1;
                    }
                }
                if full == children.len() {
                    for child in children {
                        self.unassign(child, element);
                    }
                    *assigned -= children.len();
                    self.assign(cell, element);
                    *assigned += 1;
                    Coverage::Full
                } else {
                    self.mark_internal(cell);
                    Coverage::Partial
                }
            }
        }
    }

    fn assign(&mut self, cell: CellId, element: u32) {
        let data = self.cells.entry(cell).or_insert_with(CellData::leaf);
        if !data.elements.contains(&element) {
            data.elements.push(element);
        }
    }

    fn unassign(&mut self, cell: CellId, element: u32) {
        if let Some(data) = self.cells.get_mut(&cell) {
            data.elements.retain(|&e| e != element);
            if data.elements.is_empty() && data.kind == NodeKind::Leaf {
                self.cells.remove(&cell);
            }
        }
    }

    fn mark_internal(&mut self, cell: CellId) {
        self.cells.entry(cell).or_insert_with(CellData::leaf).kind = NodeKind::Internal;
    }

    /// Index rows, sorted by cell id then element id.
    pub fn rows(&self) -> Vec<IndexRow> {
        let mut rows: Vec<IndexRow> = self
            .cells
            .iter()
            .flat_map(|(&cell, data)| {
                data.elements
                    .iter()
                    .filter_map(move |&e| self.elements.get(e).map(|id| IndexRow::new(id, cell)))
            })
            .collect();
        rows.sort_by(|a, b| {
            a.cell_id
                .cmp(&b.cell_id)
                .then_with(|| a.element_id.cmp(&b.element_id))
        });
        rows
    }

    /// Drains the octree into index rows.
    pub fn into_rows(self) -> Vec<IndexRow> {
        self.rows()
    }
}

/// Zero-thickness boxes (flat elements) get the tolerance as thickness so
/// that they still overlap cell interiors.
fn thicken(bbox: BoundingBox3D, tol: &Tolerance) -> BoundingBox3D {
    let extent = bbox.extent();
    if extent.iter().any(|&e| e <= 2.0 * tol.tol) {
        bbox.inflated(2.0 * tol.tol)
    } else {
        bbox
    }
}
