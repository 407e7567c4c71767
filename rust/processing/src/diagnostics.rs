// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Non-fatal problems collected during a model pass.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The element mesh could not be reconstituted, or it has no extent.
    DegenerateGeometry,
    /// Merge attempts rejected for the element.
    MergeRejected,
    /// A face failed validation and was not persisted.
    InvalidFace,
    /// The element occupies no octree cell, so it lies outside the world box.
    OutsideWorld,
    /// A batch write failed with a recoverable store error.
    StoreRecoverable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// `None` for failures not tied to one element (batch writes).
    pub element_id: Option<String>,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Ordered stack of diagnostics, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element_id: Option<&str>, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(element = element_id.unwrap_or("-"), ?kind, "{}", message);
        self.entries.push(Diagnostic {
            element_id: element_id.map(str::to_string),
            kind,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn append(&mut self, other: &mut Diagnostics) {
        self.entries.append(&mut other.entries);
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
