// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw mesh data as handed over by the model reader.

/// A face as index loops into [`RawMesh::vertices`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawFace {
    /// Outer boundary.
    pub outer: Vec<u32>,
    /// Holes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub inner: Vec<Vec<u32>>,
}

impl RawFace {
    pub fn new(outer: Vec<u32>) -> Self {
        Self {
            outer,
            inner: Vec::new(),
        }
    }

    pub fn with_holes(outer: Vec<u32>, inner: Vec<Vec<u32>>) -> Self {
        Self { outer, inner }
    }
}

/// Indexed faceted mesh of one element: a vertex table plus faces as index
/// loops. Triangulated sources produce one 3-index face per triangle.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawMesh {
    /// Vertex positions (x, y, z)
    pub vertices: Vec<[f64; 3]>,
    /// Faces
    pub faces: Vec<RawFace>,
}

impl RawMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from flat triangle buffers (`x, y, z` positions and
    /// `i0, i1, i2` indices). A trailing partial triangle is ignored.
    pub fn from_triangles(positions: &[f64], indices: &[u32]) -> Self {
        let vertices = positions
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let faces = indices
            .chunks_exact(3)
            .map(|t| RawFace::new(t.to_vec()))
            .collect();
        Self { vertices, faces }
    }

    /// Add a vertex, returning its index
    #[inline]
    pub fn add_vertex(&mut self, position: [f64; 3]) -> u32 {
        self.vertices.push(position);
        (self.vertices.len() - 1) as u32
    }

    #[inline]
    pub fn add_face(&mut self, face: RawFace) {
        self.faces.push(face);
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}
