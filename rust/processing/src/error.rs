// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::diagnostics::Diagnostics;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a [`RecordSink`](crate::RecordSink).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Transient failure (constraint violation, lock timeout). The pass goes on.
    #[error("Recoverable store error: {0}")]
    Recoverable(String),

    /// The store is unusable. The pass is aborted.
    #[error("Fatal store error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Recoverable(_))
    }
}

/// Errors that abort a model pass
#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A fatal error, with the diagnostics collected before it happened.
    #[error("Model pass aborted after {} diagnostics: {source}", .diagnostics.len())]
    Aborted {
        #[source]
        source: Box<Error>,
        diagnostics: Diagnostics,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] bimdex_geometry::Error),

    #[error("Spatial index error: {0}")]
    Spatial(#[from] bimdex_spatial::Error),
}
