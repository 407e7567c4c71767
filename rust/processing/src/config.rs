// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline configuration loaded from environment variables.

use std::str::FromStr;

use bimdex_geometry::Tolerance;
use bimdex_spatial::{IndexGeometry, MAX_DEPTH};
use rustc_hash::FxHashSet;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Tolerance context used for every geometric comparison.
    pub tolerance: Tolerance,
    /// Face records buffered before a bulk write.
    pub face_batch_size: usize,
    /// Index rows buffered before a bulk write.
    pub index_batch_size: usize,
    /// Deepest octree level cells are subdivided to (1..=19).
    pub octree_max_depth: u8,
    /// Geometry tested against octree cells.
    pub index_geometry: IndexGeometry,
    /// Derive oriented and projected bounding boxes.
    pub compute_obb: bool,
    /// Merge coplanar faces before emitting body records.
    pub merge_faces: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            face_batch_size: 500,
            index_batch_size: 1000,
            octree_max_depth: 6,
            index_geometry: IndexGeometry::BoundingBox,
            compute_obb: true,
            merge_faces: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup. Missing or unparsable values
    /// fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let tol = Tolerance::new(
            parse_or(get("BIMDEX_TOLERANCE"), defaults.tolerance.tol),
            parse_or(get("BIMDEX_DOUBLE_PRECISION"), defaults.tolerance.double_precision),
            parse_or(get("BIMDEX_FLOAT_PRECISION"), defaults.tolerance.float_precision),
        );
        let tolerance = if tol.tol.is_finite() && tol.tol > 0.0 {
            tol
        } else {
            Tolerance { tol: defaults.tolerance.tol, ..tol }
        };

        Self {
            tolerance,
            face_batch_size: parse_or(get("BIMDEX_FACE_BATCH_SIZE"), defaults.face_batch_size).max(1),
            index_batch_size: parse_or(get("BIMDEX_INDEX_BATCH_SIZE"), defaults.index_batch_size).max(1),
            octree_max_depth: parse_or(get("BIMDEX_OCTREE_MAX_DEPTH"), defaults.octree_max_depth)
                .clamp(1, MAX_DEPTH),
            index_geometry: parse_or(get("BIMDEX_OCTREE_GEOMETRY"), defaults.index_geometry),
            compute_obb: get("BIMDEX_COMPUTE_OBB")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.compute_obb),
            merge_faces: get("BIMDEX_MERGE_FACES")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.merge_faces),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Which elements a run regenerates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexSelection {
    /// Full rebuild: every element, index table cleared first.
    #[default]
    All,
    /// Partial regeneration of the listed element ids. Index rows of other
    /// elements are kept.
    Elements(FxHashSet<String>),
}

impl IndexSelection {
    pub fn elements<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Elements(ids.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, element_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Elements(ids) => ids.contains(element_id),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::All)
    }
}
