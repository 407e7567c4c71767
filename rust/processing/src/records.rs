// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Records handed to the persistent store.

use std::fmt;

use bimdex_geometry::{BoundingBox3D, OrientedBox, Point3D, Vector3D};
use serde::{Deserialize, Serialize};

/// Category tag of a topology face record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaceCategory {
    Body,
    /// A hole of a body face, stored again as a standalone polygon.
    Hole,
    Obb,
    #[serde(rename = "PROJOBB")]
    ProjectedObb,
}

impl FaceCategory {
    /// Added to the face index so that ids never collide across categories
    /// of one element.
    pub fn id_offset(self) -> usize {
        match self {
            FaceCategory::Body | FaceCategory::Hole => 0,
            FaceCategory::Obb => 10_000,
            FaceCategory::ProjectedObb => 10_100,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FaceCategory::Body => "BODY",
            FaceCategory::Hole => "HOLE",
            FaceCategory::Obb => "OBB",
            FaceCategory::ProjectedObb => "PROJOBB",
        }
    }
}

impl fmt::Display for FaceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One polygon of an element's topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub element_id: String,
    pub face_id: String,
    pub category: FaceCategory,
    /// Closed outer ring.
    pub outer: Vec<[f64; 3]>,
    /// Closed hole rings.
    pub holes: Vec<Vec<[f64; 3]>>,
    pub normal: [f64; 3],
    /// Degrees from true north to the normal's horizontal projection,
    /// counter-clockwise positive. `None` for horizontal faces.
    pub angle_from_north: Option<f64>,
    pub centroid: [f64; 3],
}

/// Oriented box as persisted: axes, centroid and corner solid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub axes: [[f64; 3]; 3],
    pub centroid: [f64; 3],
    pub extents: [f64; 3],
    pub corners: [[f64; 3]; 8],
}

impl BoxRecord {
    pub fn from_oriented(obb: &OrientedBox) -> Self {
        Self {
            axes: obb.axes.map(to_array_v),
            centroid: to_array(&obb.centroid),
            extents: to_array_v(obb.extents),
            corners: obb.corners.map(|c| to_array(&c)),
        }
    }
}

/// Per-element scalar update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementUpdate {
    pub element_id: String,
    pub bbox_min: [f64; 3],
    pub bbox_max: [f64; 3],
    /// Vertex centroid.
    pub centroid: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obb: Option<BoxRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_obb: Option<BoxRecord>,
}

impl ElementUpdate {
    pub fn new(element_id: impl Into<String>, bbox: &BoundingBox3D, centroid: &Point3D) -> Self {
        Self {
            element_id: element_id.into(),
            bbox_min: to_array(&bbox.min),
            bbox_max: to_array(&bbox.max),
            centroid: to_array(centroid),
            obb: None,
            projected_obb: None,
        }
    }
}

/// World box and maximum depth that stored cell ids are encoded against.
///
/// Written with every full index rebuild. Rows of a stored index are only
/// meaningful in the frame they were written with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexFrame {
    pub world: BoundingBox3D,
    pub max_depth: u8,
}

pub(crate) fn to_array(p: &Point3D) -> [f64; 3] {
    [p.x, p.y, p.z]
}

pub(crate) fn to_array_v(v: Vector3D) -> [f64; 3] {
    [v.x, v.y, v.z]
}
