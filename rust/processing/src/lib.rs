// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! BIMDEX Processing
//!
//! The per-model pass that turns element meshes into store records:
//!
//! 1. reconstitute each element mesh into a [`Polyhedron`](bimdex_geometry::Polyhedron),
//! 2. merge coplanar faces and emit topology face records,
//! 3. derive the bounding box, principal axes and oriented boxes,
//! 4. assign the element to octree cells and drain the index rows.
//!
//! Storage is abstracted behind [`RecordSink`]; [`MemorySink`] keeps
//! everything in memory.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod processor;
pub mod records;
pub mod sink;
pub mod source;
pub mod topo_faces;

pub use config::{IndexSelection, PipelineConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{Error, Result, StoreError};
pub use processor::{ModelProcessor, RunReport};
pub use records::{BoxRecord, ElementUpdate, FaceCategory, FaceRecord, IndexFrame};
pub use sink::{BatchWriter, MemorySink, RecordSink, StoreResult};
pub use source::{ElementMesh, MeshSource, ModelSource};
pub use topo_faces::{angle_from_north, face_records};
