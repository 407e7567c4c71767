// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 64-bit octree cell identifiers.
//!
//! The world box is divided into a fixed grid of `2^19` units per axis. A cell
//! at depth `d` spans `2^(19 - d)` units on each axis and its lower corner is
//! aligned to that size, so the lower corner and the depth determine it.
//!
//! ```text
//!  63 | 62 ........................................ 6 | 5 ..... 0
//!   0 |  Morton interleave of the lower corner (z y x) |   depth
//! ```
//!
//! Raw values sort in Z-order, with a cell sorting before all of its
//! descendants. [`CellId::to_key_string`] renders the raw value as an
//! 11-character string over an ASCII-ordered alphabet, so string order and
//! numeric order agree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Deepest level of the octree.
pub const MAX_DEPTH: u8 = 19;

/// Grid units per axis.
pub const GRID_SIZE: u32 = 1 << MAX_DEPTH;

const DEPTH_BITS: u32 = 6;
const DEPTH_MASK: u64 = (1 << DEPTH_BITS) - 1;
const KEY_LEN: usize = 11;
const KEY_ALPHABET: &[u8; 64] =
    b"+0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Integer bounds of a cell on the grid. `max` is exclusive of the next cell
/// (`max = min + size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellBounds {
    pub min: [u32; 3],
    pub max: [u32; 3],
    pub depth: u8,
}

impl CellBounds {
    /// Edge length in grid units of a cell at `depth`.
    #[inline]
    pub fn size_at(depth: u8) -> u32 {
        GRID_SIZE >> depth
    }

    /// Bounds of the cell at `depth` whose lower corner is `min`.
    pub fn at(min: [u32; 3], depth: u8) -> Self {
        let size = Self::size_at(depth.min(MAX_DEPTH));
        Self {
            min,
            max: [min[0] + size, min[1] + size, min[2] + size],
            depth,
        }
    }

    pub fn size(&self) -> u32 {
        Self::size_at(self.depth)
    }
}

/// Hierarchical 64-bit octree cell key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    /// The cell covering the whole world.
    pub const ROOT: CellId = CellId(0);

    /// Encodes `bounds`. Fails unless the bounds describe an aligned cell of
    /// the grid.
    pub fn new(bounds: CellBounds) -> Result<Self> {
        let CellBounds { min, max, depth } = bounds;
        if depth > MAX_DEPTH {
            return Err(Error::DepthOutOfRange(depth));
        }
        let size = CellBounds::size_at(depth);
        for axis in 0..3 {
            if min[axis] % size != 0 || min[axis] >= GRID_SIZE {
                return Err(Error::InvalidCellId(format!(
                    "axis {} lower bound {} not aligned to {} at depth {}",
                    axis, min[axis], size, depth
                )));
            }
            if max[axis].checked_sub(min[axis]) != Some(size) {
                return Err(Error::InvalidCellId(format!(
                    "axis {} spans {}..{}, expected size {} at depth {}",
                    axis, min[axis], max[axis], size, depth
                )));
            }
        }
        let morton = interleave(min[0]) | (interleave(min[1]) << 1) | (interleave(min[2]) << 2);
        Ok(Self((morton << DEPTH_BITS) | depth as u64))
    }

    /// Validates a raw value read back from storage.
    pub fn from_raw(raw: u64) -> Result<Self> {
        if raw >> 63 != 0 {
            return Err(Error::InvalidCellId(format!("{:#018x}: bit 63 set", raw)));
        }
        let depth = (raw & DEPTH_MASK) as u8;
        if depth > MAX_DEPTH {
            return Err(Error::DepthOutOfRange(depth));
        }
        let id = Self(raw);
        let size = CellBounds::size_at(depth);
        if id.min_corner().iter().any(|c| c % size != 0) {
            return Err(Error::InvalidCellId(format!(
                "{:#018x}: corner not aligned at depth {}",
                raw, depth
            )));
        }
        Ok(id)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn depth(self) -> u8 {
        (self.0 & DEPTH_MASK) as u8
    }

    fn min_corner(self) -> [u32; 3] {
        let morton = self.0 >> DEPTH_BITS;
        [
            compact(morton),
            compact(morton >> 1),
            compact(morton >> 2),
        ]
    }

    /// Decodes the grid bounds. Exact inverse of [`CellId::new`].
    pub fn bounds(self) -> CellBounds {
        CellBounds::at(self.min_corner(), self.depth())
    }

    pub fn parent(self) -> Option<CellId> {
        let depth = self.depth();
        if depth == 0 {
            return None;
        }
        let size = CellBounds::size_at(depth - 1);
        let min = self.min_corner().map(|c| c - c % size);
        Some(Self::from_aligned(min, depth - 1))
    }

    /// The 8 children, octant `i` taking the upper half of x if `i & 1`, of y
    /// if `i & 2` and of z if `i & 4`. `None` at [`MAX_DEPTH`].
    pub fn children(self) -> Option<[CellId; 8]> {
        let depth = self.depth();
        if depth >= MAX_DEPTH {
            return None;
        }
        let half = CellBounds::size_at(depth + 1);
        let [x, y, z] = self.min_corner();
        Some(std::array::from_fn(|i| {
            let pick = |bit: usize, base: u32| if i & bit != 0 { base + half } else { base };
            Self::from_aligned([pick(1, x), pick(2, y), pick(4, z)], depth + 1)
        }))
    }

    /// True if `self` is `other` or one of its ancestors.
    pub fn contains(self, other: CellId) -> bool {
        let depth = self.depth();
        if other.depth() < depth {
            return false;
        }
        let shift = 3 * (MAX_DEPTH - depth) as u32 + DEPTH_BITS;
        // the corner bits below the cell size must be free in other's key
        (self.0 >> shift) == (other.0 >> shift)
    }

    fn from_aligned(min: [u32; 3], depth: u8) -> Self {
        let morton = interleave(min[0]) | (interleave(min[1]) << 1) | (interleave(min[2]) << 2);
        Self((morton << DEPTH_BITS) | depth as u64)
    }

    /// Opaque 11-character key, ordered like the raw value.
    pub fn to_key_string(self) -> String {
        (0..KEY_LEN)
            .rev()
            .map(|i| KEY_ALPHABET[((self.0 >> (6 * i)) & 0x3f) as usize] as char)
            .collect()
    }

    pub fn from_key_string(key: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidCellKey {
            key: key.to_string(),
            reason,
        };
        if key.len() != KEY_LEN {
            return Err(invalid("expected 11 characters"));
        }
        let mut raw: u64 = 0;
        for (i, byte) in key.bytes().enumerate() {
            let digit = KEY_ALPHABET
                .iter()
                .position(|&c| c == byte)
                .ok_or_else(|| invalid("character outside the key alphabet"))?
                as u64;
            // the leading symbol only carries 4 bits
            if i == 0 && digit >= 16 {
                return Err(invalid("value exceeds 64 bits"));
            }
            raw = (raw << 6) | digit;
        }
        Self::from_raw(raw)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

impl FromStr for CellId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_key_string(s)
    }
}

impl Serialize for CellId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key_string())
    }
}

impl<'de> Deserialize<'de> for CellId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        key.parse().map_err(serde::de::Error::custom)
    }
}

/// Spreads the low 19 bits of `v` to every third bit.
fn interleave(v: u32) -> u64 {
    let mut x = (v as u64) & 0x7_ffff;
    x = (x | (x << 32)) & 0x001f_0000_0000_ffff;
    x = (x | (x << 16)) & 0x001f_0000_ff00_00ff;
    x = (x | (x << 8)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x << 4)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x << 2)) & 0x1249_2492_4924_9249;
    x
}

/// Inverse of [`interleave`].
fn compact(v: u64) -> u32 {
    let mut x = v & 0x1249_2492_4924_9249;
    x = (x | (x >> 2)) & 0x10c3_0c30_c30c_30c3;
    x = (x | (x >> 4)) & 0x100f_00f0_0f00_f00f;
    x = (x | (x >> 8)) & 0x001f_0000_ff00_00ff;
    x = (x | (x >> 16)) & 0x001f_0000_0000_ffff;
    x = (x | (x >> 32)) & 0x7_ffff;
    x as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_bounds(rng: &mut StdRng) -> CellBounds {
        let depth = rng.random_range(0..=MAX_DEPTH);
        let cells = 1u32 << depth;
        let size = CellBounds::size_at(depth);
        let min = [0; 3].map(|_: u32| rng.random_range(0..cells) * size);
        CellBounds::at(min, depth)
    }

    #[test]
    fn interleave_round_trips() {
        for v in [0, 1, 2, 3, 0x5_5555, 0x7_ffff, 12345] {
            assert_eq!(compact(interleave(v)), v);
        }
        assert_eq!(interleave(0b11), 0b1001);
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10_000 {
            let bounds = random_bounds(&mut rng);
            let id = CellId::new(bounds).unwrap();
            assert_eq!(id.bounds(), bounds);
            assert_eq!(id.depth(), bounds.depth);
            assert_eq!(CellId::from_raw(id.raw()).unwrap(), id);
            assert!(id.raw() >> 63 == 0);
        }
    }

    #[test]
    fn grid_extremes_round_trip() {
        let deepest = CellBounds::at([GRID_SIZE - 1; 3], MAX_DEPTH);
        assert_eq!(CellId::new(deepest).unwrap().bounds(), deepest);

        let root = CellBounds::at([0; 3], 0);
        assert_eq!(root.max, [GRID_SIZE; 3]);
        assert_eq!(CellId::new(root).unwrap(), CellId::ROOT);
    }

    #[test]
    fn rejects_unaligned_bounds() {
        let unaligned = CellBounds::at([3, 0, 0], 2);
        assert!(matches!(CellId::new(unaligned), Err(Error::InvalidCellId(_))));

        let stretched = CellBounds {
            min: [0, 0, 0],
            max: [GRID_SIZE, GRID_SIZE / 2, GRID_SIZE],
            depth: 0,
        };
        assert!(CellId::new(stretched).is_err());

        let too_deep = CellBounds::at([0; 3], 20);
        assert_eq!(CellId::new(too_deep), Err(Error::DepthOutOfRange(20)));
        assert!(CellId::from_raw(1 << 63).is_err());
        // depth 1 with a corner bit that only a depth 19 cell can have
        assert!(CellId::from_raw((1 << DEPTH_BITS) | 1).is_err());
    }

    #[test]
    fn parents_sort_before_children() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let id = CellId::new(random_bounds(&mut rng)).unwrap();
            if let Some(children) = id.children() {
                for child in children {
                    assert!(id < child);
                    assert!(id.contains(child));
                    assert_eq!(child.parent(), Some(id));
                    assert_eq!(child.depth(), id.depth() + 1);
                }
            }
            if let Some(parent) = id.parent() {
                assert!(parent.contains(id));
                assert!(!id.contains(parent));
            }
        }
    }

    #[test]
    fn children_tile_their_parent() {
        let id = CellId::new(CellBounds::at([0, GRID_SIZE / 2, 0], 1)).unwrap();
        let children = id.children().unwrap();
        let half = GRID_SIZE / 4;
        assert_eq!(children[0].bounds().min, [0, GRID_SIZE / 2, 0]);
        assert_eq!(children[7].bounds().min, [half, GRID_SIZE / 2 + half, half]);
        assert_eq!(children[7].bounds().max, [GRID_SIZE / 2, GRID_SIZE, GRID_SIZE / 2]);
    }

    #[test]
    fn key_strings_round_trip_and_keep_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ids: Vec<CellId> = (0..500)
            .map(|_| CellId::new(random_bounds(&mut rng)).unwrap())
            .collect();
        ids.sort();
        let keys: Vec<String> = ids.iter().map(|id| id.to_key_string()).collect();
        for (id, key) in ids.iter().zip(&keys) {
            assert_eq!(key.len(), 11);
            assert_eq!(key.parse::<CellId>().unwrap(), *id);
            assert_eq!(id.to_string(), *key);
        }
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(CellId::ROOT.to_key_string(), "+++++++++++");
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(CellId::from_key_string("short").is_err());
        assert!(CellId::from_key_string("+++++++++!+").is_err());
        assert!(CellId::from_key_string("z++++++++++").is_err());
    }

    #[test]
    fn serializes_as_key_string() {
        let id = CellId::new(CellBounds::at([GRID_SIZE / 2, 0, 0], 1)).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_key_string()));
        let back: CellId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
