//! Multi-resolution tile cache.
//!
//! This module holds one [`TileGrid`] per sample size and implements the
//! memory policy around them.
//!
//! # Eviction
//!
//! There is no LRU. Within the requested tier, decoded tiles outside the
//! viewport are released as soon as a request no longer covers them. Other
//! tiers are kept as low-fidelity placeholders until the requested tier
//! satisfies a request in full, at which point every other tier is dropped.
//! Steady zooming therefore holds roughly one tier's worth of pixels.
//!
//! # Thread Safety
//!
//! None needed: the cache is owned by the provider and only touched on the
//! controlling thread.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::TileError;

use super::grid::{LoadedTile, TileGrid};
use super::rect::Rect;

// =============================================================================
// Request Plan
// =============================================================================

/// Outcome of partitioning one tier's tiles against a viewport.
#[derive(Debug, Default)]
pub struct RequestPlan {
    /// Decoded tiles intersecting the viewport, in grid order
    pub hits: Vec<LoadedTile>,

    /// Tiles newly marked as loading: `(index, rect)` pairs to decode
    pub to_decode: Vec<(usize, Rect)>,

    /// Intersecting tiles already being decoded by an earlier request
    pub already_loading: usize,

    /// Decoded tiles released because they left the viewport
    pub released: usize,
}

impl RequestPlan {
    /// True if every intersecting tile was already decoded.
    pub fn is_full_hit(&self) -> bool {
        self.to_decode.is_empty() && self.already_loading == 0
    }
}

/// What a full-hit eviction removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    /// Grids dropped
    pub tiers: usize,

    /// Decoded buffers released with them
    pub buffers: usize,
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Mapping from sample size to tile grid.
///
/// # Example
///
/// ```
/// use tile_provider::tile::{Rect, TileCache};
///
/// let mut cache = TileCache::new();
/// let grid = cache.get_or_build(2, 4096, 2048, 1024, 768).unwrap();
/// assert_eq!(grid.len(), 4);
///
/// let plan = cache.plan(2, &Rect::new(0, 0, 1024, 768));
/// assert_eq!(plan.to_decode.len(), 1);
/// assert!(!plan.is_full_hit());
/// ```
#[derive(Debug, Default)]
pub struct TileCache {
    grids: BTreeMap<u32, TileGrid>,
    next_generation: u64,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the grid for `sample_size`, building it on first use.
    ///
    /// The viewport size only matters when the grid is built; an existing
    /// grid is returned unchanged whatever the viewport.
    pub fn get_or_build(
        &mut self,
        sample_size: u32,
        width: u32,
        height: u32,
        view_width: u32,
        view_height: u32,
    ) -> Result<&mut TileGrid, TileError> {
        if !self.grids.contains_key(&sample_size) {
            let grid = TileGrid::build(
                sample_size,
                width,
                height,
                view_width,
                view_height,
                self.next_generation,
            )?;
            self.next_generation += 1;
            self.grids.insert(sample_size, grid);
        }
        self.grids
            .get_mut(&sample_size)
            .ok_or(TileError::InvalidSampleSize(sample_size))
    }

    pub fn grid(&self, sample_size: u32) -> Option<&TileGrid> {
        self.grids.get(&sample_size)
    }

    pub(crate) fn grid_mut(&mut self, sample_size: u32) -> Option<&mut TileGrid> {
        self.grids.get_mut(&sample_size)
    }

    /// Partition the tier's tiles against `rect`.
    ///
    /// Decoded tiles outside `rect` are released, decoded tiles inside are
    /// returned as hits, and undecoded tiles inside that are not already in
    /// flight are marked loading and returned for dispatch. Tiles already in
    /// flight are left alone so no tile is ever decoded twice at once.
    pub fn plan(&mut self, sample_size: u32, rect: &Rect) -> RequestPlan {
        let mut plan = RequestPlan::default();
        let Some(grid) = self.grids.get_mut(&sample_size) else {
            return plan;
        };

        for (index, tile) in grid.tiles_mut().iter_mut().enumerate() {
            if !tile.rect().intersects(rect) {
                if tile.release() {
                    trace!(sample_size, "released {} outside viewport", tile.rect());
                    plan.released += 1;
                }
                continue;
            }

            if let Some(hit) = tile.snapshot(sample_size) {
                plan.hits.push(hit);
            } else if tile.is_loading() {
                plan.already_loading += 1;
            } else {
                tile.set_loading(true);
                plan.to_decode.push((index, tile.rect()));
            }
        }

        plan
    }

    /// Drop every grid except `keep`, releasing their buffers.
    pub fn evict_others(&mut self, keep: u32) -> Eviction {
        let mut eviction = Eviction::default();
        self.grids.retain(|&sample_size, grid| {
            if sample_size == keep {
                return true;
            }
            eviction.tiers += 1;
            eviction.buffers += grid.release_all();
            false
        });
        if eviction.tiers > 0 {
            debug!(
                keep,
                tiers = eviction.tiers,
                buffers = eviction.buffers,
                "evicted other tiers"
            );
        }
        eviction
    }

    /// Decoded tiles from tiers coarser than `sample_size` that intersect
    /// `rect`, coarsest tier first.
    pub fn coarser_hits(&self, sample_size: u32, rect: &Rect) -> Vec<LoadedTile> {
        self.grids
            .range(sample_size.saturating_add(1)..)
            .rev()
            .flat_map(|(_, grid)| grid.hits(rect))
            .collect()
    }

    /// Release every buffer and drop every grid. Returns the number of
    /// buffers released.
    pub fn clear(&mut self) -> usize {
        let released = self.grids.values_mut().map(TileGrid::release_all).sum();
        self.grids.clear();
        released
    }

    /// Sample sizes that currently have a grid, finest first.
    pub fn tiers(&self) -> Vec<u32> {
        self.grids.keys().copied().collect()
    }

    /// Number of grids.
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Decoded tiles across all tiers.
    pub fn decoded_count(&self) -> usize {
        self.grids.values().map(TileGrid::decoded_count).sum()
    }

    /// Tiles with a decode in flight across all tiers.
    pub fn loading_count(&self) -> usize {
        self.grids.values().map(TileGrid::loading_count).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================
