//! Uniform spatial grid used to answer particle neighborhood queries.
//!
//! The grid partitions a rectangular world into `nx * ny` cells whose edge
//! lengths are at least the interaction cutoff radius, so all interaction
//! partners of a particle live in the particle's own cell or one of its
//! eight Moore neighbors. Cell coordinates wrap modulo the grid dimensions
//! in toroidal worlds and clamp to the grid bounds otherwise.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors emitted by the spatial grid.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Non-negative remainder of `value` modulo `extent`.
///
/// A value already inside `[0, extent)` is returned unchanged.
#[inline]
#[must_use]
pub fn wrap_coord(value: f32, extent: f32) -> f32 {
    if extent <= 0.0 {
        return 0.0;
    }
    let mut v = value % extent;
    if v < 0.0 {
        v += extent;
    }
    v
}

/// Non-negative remainder of `value` modulo `len`.
#[inline]
#[must_use]
pub fn wrap_index(value: i64, len: i64) -> i64 {
    ((value % len) + len) % len
}

/// Shortest signed offset equivalent to `delta` on a wrapped axis of the
/// given extent.
#[inline]
#[must_use]
pub fn min_image(delta: f32, extent: f32) -> f32 {
    if delta > 0.5 * extent {
        delta - extent
    } else if delta < -0.5 * extent {
        delta + extent
    } else {
        delta
    }
}

/// Grid of per-cell particle index lists covering the world rectangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialGrid {
    nx: usize,
    ny: usize,
    cell_width: f32,
    cell_height: f32,
    world_width: f32,
    world_height: f32,
    cells: Vec<Vec<u32>>,
}

impl SpatialGrid {
    /// Create an empty grid for the given world extents, sized so that each
    /// cell edge is at least `cell_target` (the interaction cutoff radius).
    pub fn new(world_width: f32, world_height: f32, cell_target: f32) -> Result<Self, IndexError> {
        if !(world_width > 0.0) || !(world_height > 0.0) {
            return Err(IndexError::InvalidConfig("world extents must be positive"));
        }
        if !(cell_target > 0.0) {
            return Err(IndexError::InvalidConfig("cell size must be positive"));
        }
        let (nx, ny) = Self::dims_for(world_width, world_height, cell_target);
        Ok(Self {
            nx,
            ny,
            cell_width: world_width / nx as f32,
            cell_height: world_height / ny as f32,
            world_width,
            world_height,
            cells: vec![Vec::new(); nx * ny],
        })
    }

    fn dims_for(world_width: f32, world_height: f32, cell_target: f32) -> (usize, usize) {
        let nx = ((world_width / cell_target).floor() as usize).max(1);
        let ny = ((world_height / cell_target).floor() as usize).max(1);
        (nx, ny)
    }

    /// Whether this grid already has the geometry derived from the given
    /// world extents and cell target.
    #[must_use]
    pub fn matches(&self, world_width: f32, world_height: f32, cell_target: f32) -> bool {
        if !(cell_target > 0.0) {
            return false;
        }
        let (nx, ny) = Self::dims_for(world_width, world_height, cell_target);
        self.nx == nx
            && self.ny == ny
            && self.world_width == world_width
            && self.world_height == world_height
    }

    #[must_use]
    pub const fn nx(&self) -> usize {
        self.nx
    }

    #[must_use]
    pub const fn ny(&self) -> usize {
        self.ny
    }

    #[must_use]
    pub const fn cell_width(&self) -> f32 {
        self.cell_width
    }

    #[must_use]
    pub const fn cell_height(&self) -> f32 {
        self.cell_height
    }

    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Particle indices currently bucketed in the cell with the given flat index.
    #[must_use]
    pub fn cell(&self, index: usize) -> &[u32] {
        &self.cells[index]
    }

    /// Grid coordinates of the cell with the given flat index.
    #[must_use]
    pub const fn cell_position(&self, index: usize) -> (usize, usize) {
        (index % self.nx, index / self.nx)
    }

    #[inline]
    const fn flat_index(&self, cx: usize, cy: usize) -> usize {
        self.nx * cy + cx
    }

    /// Cell coordinates owning the given world position. Out-of-range
    /// positions wrap or clamp; a lookup never indexes out of bounds.
    #[must_use]
    pub fn cell_of(&self, x: f32, y: f32, wrap: bool) -> (usize, usize) {
        let cx = (x / self.cell_width).floor() as i64;
        let cy = (y / self.cell_height).floor() as i64;
        if wrap {
            (
                wrap_index(cx, self.nx as i64) as usize,
                wrap_index(cy, self.ny as i64) as usize,
            )
        } else {
            (
                cx.clamp(0, self.nx as i64 - 1) as usize,
                cy.clamp(0, self.ny as i64 - 1) as usize,
            )
        }
    }

    /// Total number of bucketed particle indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    /// Empty every cell without releasing its capacity.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Bucket a single particle index by its position.
    pub fn insert(&mut self, particle: u32, x: f32, y: f32, wrap: bool) {
        let (cx, cy) = self.cell_of(x, y, wrap);
        let index = self.flat_index(cx, cy);
        self.cells[index].push(particle);
    }

    /// Rebuild all buckets from scratch for `count` particles.
    pub fn fill(&mut self, count: u32, wrap: bool, pos: impl Fn(u32) -> (f32, f32)) {
        self.clear();
        for particle in 0..count {
            let (x, y) = pos(particle);
            self.insert(particle, x, y, wrap);
        }
    }

    /// Migrate every particle whose position has crossed a cell boundary
    /// since it was bucketed. O(n); call once per frame before force
    /// evaluation so cell membership matches current positions.
    pub fn recalculate(&mut self, wrap: bool, pos: impl Fn(u32) -> (f32, f32)) {
        for cell_index in 0..self.cells.len() {
            let mut slot = 0;
            while slot < self.cells[cell_index].len() {
                let particle = self.cells[cell_index][slot];
                let (x, y) = pos(particle);
                let (cx, cy) = self.cell_of(x, y, wrap);
                let owner = self.flat_index(cx, cy);
                if owner == cell_index {
                    slot += 1;
                } else {
                    let moved = self.cells[cell_index].swap_remove(slot);
                    self.cells[owner].push(moved);
                }
            }
        }
    }

    /// Flat indices of the cells within the given Chebyshev cell radius of
    /// `(cx, cy)`, wrapping modulo the grid dimensions or clamping to the
    /// grid bounds. The returned list is deduplicated so a candidate cell is
    /// never visited twice even when the search radius spans the whole grid.
    #[must_use]
    pub fn neighbor_cells(
        &self,
        cx: usize,
        cy: usize,
        radius_x: usize,
        radius_y: usize,
        include_center: bool,
        wrap: bool,
    ) -> Vec<usize> {
        let center = self.flat_index(cx, cy);
        let mut out = Vec::with_capacity((2 * radius_x + 1) * (2 * radius_y + 1));

        let min_x = cx as i64 - radius_x as i64;
        let max_x = cx as i64 + radius_x as i64;
        let min_y = cy as i64 - radius_y as i64;
        let max_y = cy as i64 + radius_y as i64;

        if wrap {
            for gx in min_x..=max_x {
                for gy in min_y..=max_y {
                    let index = self.flat_index(
                        wrap_index(gx, self.nx as i64) as usize,
                        wrap_index(gy, self.ny as i64) as usize,
                    );
                    if include_center || index != center {
                        out.push(index);
                    }
                }
            }
        } else {
            let min_x = min_x.clamp(0, self.nx as i64 - 1);
            let max_x = max_x.clamp(0, self.nx as i64 - 1);
            let min_y = min_y.clamp(0, self.ny as i64 - 1);
            let max_y = max_y.clamp(0, self.ny as i64 - 1);
            for gx in min_x..=max_x {
                for gy in min_y..=max_y {
                    let index = self.flat_index(gx as usize, gy as usize);
                    if include_center || index != center {
                        out.push(index);
                    }
                }
            }
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    /// Visit every bucketed particle whose wrap-aware distance from
    /// `(x, y)` is less than `radius`, passing the squared distance. The
    /// query radius may exceed one cell; the cell search range widens
    /// accordingly.
    pub fn for_each_within(
        &self,
        x: f32,
        y: f32,
        radius: f32,
        wrap: bool,
        pos: impl Fn(u32) -> (f32, f32),
        visitor: &mut dyn FnMut(u32, OrderedFloat<f32>),
    ) {
        if !(radius > 0.0) {
            return;
        }
        let (cx, cy) = self.cell_of(x, y, wrap);
        let radius_x = (radius / self.cell_width).ceil() as usize;
        let radius_y = (radius / self.cell_height).ceil() as usize;
        let radius_sq = radius * radius;

        for cell_index in self.neighbor_cells(cx, cy, radius_x, radius_y, true, wrap) {
            for &particle in &self.cells[cell_index] {
                let (px, py) = pos(particle);
                let mut dx = px - x;
                let mut dy = py - y;
                if wrap {
                    dx = min_image(dx, self.world_width);
                    dy = min_image(dy, self.world_height);
                }
                let dist_sq = dx * dx + dy * dy;
                if dist_sq < radius_sq {
                    visitor(particle, OrderedFloat(dist_sq));
                }
            }
        }
    }
}
