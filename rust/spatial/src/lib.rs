// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BIMDEX Spatial
//!
//! Octree spatial indexing for BIM elements.
//!
//! ## Overview
//!
//! - [`CellId`]: a 64-bit code naming one octree cell (Morton-interleaved
//!   lower corner plus depth), with a sortable 11-character key string
//! - [`OctreeFrame`]: maps grid cells onto the world box of a model
//! - [`Octree`]: assigns elements to the cells their geometry occupies and
//!   drains the result as [`IndexRow`]s
//!
//! ```
//! use bimdex_geometry::{BoundingBox3D, Point3D, Tolerance};
//! use bimdex_spatial::{IndexGeometry, Octree, OctreeFrame};
//!
//! let world = BoundingBox3D::new(Point3D::origin(), Point3D::new(8.0, 8.0, 8.0));
//! let frame = OctreeFrame::new(world).unwrap();
//! let mut octree = Octree::new(frame, 4, IndexGeometry::BoundingBox).unwrap();
//!
//! let wall = BoundingBox3D::new(Point3D::origin(), Point3D::new(4.0, 4.0, 4.0));
//! octree.compute_octree_box("wall", &wall, &Tolerance::default());
//!
//! let rows = octree.into_rows();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].depth, 1);
//! ```

pub mod cell_id;
pub mod element_table;
pub mod error;
pub mod frame;
pub mod octree;
pub mod overlap;

pub use cell_id::{CellBounds, CellId, GRID_SIZE, MAX_DEPTH};
pub use element_table::ElementTable;
pub use error::{Error, Result};
pub use frame::OctreeFrame;
pub use octree::{CellData, IndexGeometry, IndexRow, NodeKind, Octree};
pub use overlap::triangle_intersects_box;
