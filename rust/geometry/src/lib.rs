// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BIMDEX Geometry
//!
//! Tolerance-aware B-rep primitives for BIM element bodies: planar faces with
//! holes, polyhedra reconstituted from raw meshes, coplanar face merging and
//! principal-component oriented bounding boxes.
//!
//! Every comparison takes an explicit [`Tolerance`]; there is no global
//! precision state.
//!
//! ```
//! use bimdex_geometry::{Face3D, Point3D, Tolerance, FaceMerger};
//!
//! let tol = Tolerance::default();
//! let square = |x: f64| {
//!     Face3D::from_outer(
//!         vec![
//!             Point3D::new(x, 0.0, 0.0),
//!             Point3D::new(x + 1.0, 0.0, 0.0),
//!             Point3D::new(x + 1.0, 1.0, 0.0),
//!             Point3D::new(x, 1.0, 0.0),
//!         ],
//!         &tol,
//!     )
//! };
//!
//! let mut merger = FaceMerger::new(vec![square(0.0), square(1.0)], &tol);
//! merger.run();
//! let outcome = merger.into_outcome();
//! assert_eq!(outcome.faces.len(), 1);
//! ```

pub mod bbox;
pub mod error;
pub mod face;
pub mod merge;
pub mod mesh;
pub mod pca;
pub mod polyhedron;
pub mod primitives;
pub mod tolerance;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Point3, Vector3};

pub use bbox::BoundingBox3D;
pub use error::{Error, Result};
pub use face::Face3D;
pub use merge::{simplify_and_merge_faces, FaceKey, FaceMerger, MergeOutcome};
pub use mesh::{RawFace, RawMesh};
pub use pca::{OrientedBox, PrincipalComponentAnalysis};
pub use polyhedron::{Polyhedron, BOX_FACE_INDICES};
pub use primitives::{
    axis_alignment, Axis, LineSegment3D, Plane3D, Point3D, PointKey, SegmentKey, Vector3D,
};
pub use tolerance::Tolerance;
