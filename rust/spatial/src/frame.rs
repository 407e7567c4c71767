// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping between grid cells and world coordinates.

use bimdex_geometry::{BoundingBox3D, Point3D, Vector3D};

use crate::cell_id::{CellBounds, CellId, GRID_SIZE, MAX_DEPTH};
use crate::{Error, Result};

/// The world box of one federated model, subdivided by the octree grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeFrame {
    world: BoundingBox3D,
}

impl OctreeFrame {
    /// Creates a frame over `world`. An axis with zero extent (all elements
    /// in one plane) is widened to the largest extent around its centre.
    pub fn new(world: BoundingBox3D) -> Result<Self> {
        let extent = world.extent();
        let finite = extent.iter().all(|e| e.is_finite())
            && world.min.coords.iter().all(|c| c.is_finite());
        let largest = extent.max();
        if !finite || largest <= 0.0 {
            return Err(Error::EmptyWorld);
        }

        let mut world = world;
        let center = world.center();
        for axis in 0..3 {
            if extent[axis] <= 0.0 {
                world.min[axis] = center[axis] - largest / 2.0;
                world.max[axis] = center[axis] + largest / 2.0;
            }
        }
        Ok(Self { world })
    }

    pub fn world(&self) -> &BoundingBox3D {
        &self.world
    }

    /// World-space size of a cell at `depth`.
    pub fn cell_size(&self, depth: u8) -> Vector3D {
        self.world.extent() / (1u64 << depth.min(MAX_DEPTH)) as f64
    }

    fn grid_to_world(&self, grid: [u32; 3]) -> Point3D {
        let extent = self.world.extent();
        let scale = GRID_SIZE as f64;
        Point3D::new(
            self.world.min.x + extent.x * grid[0] as f64 / scale,
            self.world.min.y + extent.y * grid[1] as f64 / scale,
            self.world.min.z + extent.z * grid[2] as f64 / scale,
        )
    }

    /// Lower corner of `cell` in world coordinates.
    pub fn cell_origin(&self, cell: CellId) -> Point3D {
        self.grid_to_world(cell.bounds().min)
    }

    /// World-space box of `cell`.
    pub fn cell_box(&self, cell: CellId) -> BoundingBox3D {
        let bounds = cell.bounds();
        BoundingBox3D::new(self.grid_to_world(bounds.min), self.grid_to_world(bounds.max))
    }

    /// The cell at `depth` containing `point`, or `None` if the point is
    /// outside the world box. Points on the upper world faces belong to the
    /// last cell.
    pub fn locate(&self, point: &Point3D, depth: u8) -> Option<CellId> {
        let depth = depth.min(MAX_DEPTH);
        let extent = self.world.extent();
        let cells = 1u32 << depth;
        let size = CellBounds::size_at(depth);

        let mut min = [0u32; 3];
        for axis in 0..3 {
            let t = (point[axis] - self.world.min[axis]) / extent[axis];
            if !(0.0..=1.0).contains(&t) {
                return None;
            }
            let index = ((t * cells as f64) as u32).min(cells - 1);
            min[axis] = index * size;
        }
        CellId::new(CellBounds::at(min, depth)).ok()
    }
}
