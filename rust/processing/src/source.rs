// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element meshes of one federated model.

use bimdex_geometry::{BoundingBox3D, Point3D, RawMesh, Vector3D};
use serde::{Deserialize, Serialize};

/// Read side of the pipeline: whatever extracted the element geometry.
pub trait MeshSource {
    /// Element ids in processing order.
    fn element_ids(&self) -> Vec<String>;

    fn mesh(&mut self, element_id: &str) -> Option<RawMesh>;

    /// Axis-aligned box of one element, if the source knows it without
    /// loading the mesh.
    fn bounding_box(&self, element_id: &str) -> Option<BoundingBox3D>;

    /// World box of the model, if the source stores one.
    fn world_bounds(&self) -> Option<BoundingBox3D> {
        None
    }

    /// Project true north; `None` means +Y.
    fn true_north(&self) -> Option<Vector3D> {
        None
    }
}

/// One element of a [`ModelSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMesh {
    /// Element GUID.
    pub id: String,
    pub mesh: RawMesh,
}

/// A whole model held in memory, as read from JSON by the indexer binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSource {
    #[serde(default)]
    pub true_north: Option<[f64; 3]>,
    #[serde(default)]
    pub world_bounds: Option<BoundingBox3D>,
    pub elements: Vec<ElementMesh>,
}

impl ModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn push(&mut self, id: impl Into<String>, mesh: RawMesh) {
        self.elements.push(ElementMesh { id: id.into(), mesh });
    }

    fn find(&self, element_id: &str) -> Option<&ElementMesh> {
        self.elements.iter().find(|e| e.id == element_id)
    }
}

impl MeshSource for ModelSource {
    fn element_ids(&self) -> Vec<String> {
        self.elements.iter().map(|e| e.id.clone()).collect()
    }

    fn mesh(&mut self, element_id: &str) -> Option<RawMesh> {
        self.find(element_id).map(|e| e.mesh.clone())
    }

    fn bounding_box(&self, element_id: &str) -> Option<BoundingBox3D> {
        let element = self.find(element_id)?;
        let points: Vec<Point3D> = element.mesh.vertices.iter().map(|v| Point3D::from(*v)).collect();
        BoundingBox3D::from_points(points.iter())
    }

    fn world_bounds(&self) -> Option<BoundingBox3D> {
        self.world_bounds
    }

    fn true_north(&self) -> Option<Vector3D> {
        self.true_north.map(Vector3D::from)
    }
}
