// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for spatial indexing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding cells or building an octree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid cell id: {0}")]
    InvalidCellId(String),

    #[error("Invalid cell key {key:?}: {reason}")]
    InvalidCellKey { key: String, reason: &'static str },

    #[error("Depth {0} out of range (max {max})", max = crate::cell_id::MAX_DEPTH)]
    DepthOutOfRange(u8),

    #[error("World bounding box is empty or not finite")]
    EmptyWorld,
}
