//! Tiles and per-tier tile grids.
//!
//! A grid partitions the whole display-space image into tiles for one sample
//! size. The rectangles never change after the grid is built; only the
//! decoded pixels and the in-flight flag of each tile do.

use std::sync::Arc;

use image::RgbaImage;
use tracing::debug;

use crate::error::TileError;

use super::rect::Rect;
use super::sample::is_valid_sample_size;

/// Tiles stay smaller than this multiple of the viewport once downsampled.
pub const VIEWPORT_TILE_FACTOR: f64 = 1.25;

// =============================================================================
// Tile
// =============================================================================

/// Smallest cacheable unit: a rectangle plus its decoded pixels, if any.
#[derive(Debug)]
pub struct Tile {
    rect: Rect,
    pixels: Option<Arc<RgbaImage>>,
    loading: bool,
}

impl Tile {
    fn new(rect: Rect) -> Self {
        Self {
            rect,
            pixels: None,
            loading: false,
        }
    }

    /// Display-space rectangle covered by this tile.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// True once a decode has been stored for this tile.
    pub fn is_available(&self) -> bool {
        self.pixels.is_some()
    }

    /// True while a decode for this tile is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn pixels(&self) -> Option<&Arc<RgbaImage>> {
        self.pixels.as_ref()
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn store(&mut self, pixels: Arc<RgbaImage>) {
        self.pixels = Some(pixels);
    }

    /// Drop the decoded pixels. Returns true if there were any.
    pub(crate) fn release(&mut self) -> bool {
        self.pixels.take().is_some()
    }

    /// Read-only view of the tile, if decoded.
    pub fn snapshot(&self, sample_size: u32) -> Option<LoadedTile> {
        self.pixels.as_ref().map(|pixels| LoadedTile {
            rect: self.rect,
            sample_size,
            pixels: Arc::clone(pixels),
        })
    }
}

/// A decoded tile handed to callers.
///
/// Snapshots share the pixel buffer with the cache and stay valid after the
/// cache releases the tile.
#[derive(Debug, Clone)]
pub struct LoadedTile {
    /// Display-space rectangle
    pub rect: Rect,

    /// Tier the pixels were decoded at
    pub sample_size: u32,

    /// Pixels in source orientation, about `rect / sample_size` in size
    pub pixels: Arc<RgbaImage>,
}

/// Immutable, cheaply cloned sequence of loaded tiles.
pub type TileSet = Arc<[LoadedTile]>;

// =============================================================================
// Tile Grid
// =============================================================================

/// Number of `(columns, rows)` for a tier.
///
/// Starting from a single tile, columns (rows) are added until the
/// downsampled tile width (height) is no more than
/// [`VIEWPORT_TILE_FACTOR`] times the viewport width (height).
pub fn grid_layout(
    sample_size: u32,
    width: u32,
    height: u32,
    view_width: u32,
    view_height: u32,
) -> (u32, u32) {
    (
        divisions(width, sample_size, view_width),
        divisions(height, sample_size, view_height),
    )
}

fn divisions(extent: u32, sample_size: u32, view_extent: u32) -> u32 {
    let limit = view_extent as f64 * VIEWPORT_TILE_FACTOR;
    let mut count = 1u32;
    let mut sub_extent = extent / count / sample_size;
    while sub_extent as f64 > limit {
        count += 1;
        sub_extent = extent / count / sample_size;
    }
    count
}

/// The complete partition of an image into tiles for one sample size.
#[derive(Debug)]
pub struct TileGrid {
    sample_size: u32,
    generation: u64,
    columns: u32,
    rows: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Lay out a grid for `sample_size` over a `width` x `height` image,
    /// sized against a `view_width` x `view_height` viewport.
    ///
    /// Tiles are emitted row by row. The last row and column absorb the
    /// integer-division remainder so every pixel is covered exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample size is not a power of two or either
    /// viewport dimension is zero.
    pub fn build(
        sample_size: u32,
        width: u32,
        height: u32,
        view_width: u32,
        view_height: u32,
        generation: u64,
    ) -> Result<Self, TileError> {
        if !is_valid_sample_size(sample_size) {
            return Err(TileError::InvalidSampleSize(sample_size));
        }
        if view_width == 0 || view_height == 0 {
            return Err(TileError::InvalidViewport {
                width: view_width,
                height: view_height,
            });
        }

        let (columns, rows) = grid_layout(sample_size, width, height, view_width, view_height);
        let tile_width = (width / columns) as i32;
        let tile_height = (height / rows) as i32;

        let mut tiles = Vec::with_capacity((columns * rows) as usize);
        for y in 0..rows as i32 {
            for x in 0..columns as i32 {
                let right = if x == columns as i32 - 1 {
                    width as i32
                } else {
                    (x + 1) * tile_width
                };
                let bottom = if y == rows as i32 - 1 {
                    height as i32
                } else {
                    (y + 1) * tile_height
                };
                tiles.push(Tile::new(Rect::new(
                    x * tile_width,
                    y * tile_height,
                    right,
                    bottom,
                )));
            }
        }

        debug!(
            sample_size,
            columns,
            rows,
            "built tile grid for {}x{} against {}x{} viewport",
            width,
            height,
            view_width,
            view_height
        );

        Ok(Self {
            sample_size,
            generation,
            columns,
            rows,
            tiles,
        })
    }

    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }

    /// Identifies this grid among every grid its provider ever built.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub(crate) fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    pub(crate) fn tile_mut(&mut self, index: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(index)
    }

    /// Number of tiles holding decoded pixels.
    pub fn decoded_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_available()).count()
    }

    /// Number of tiles with a decode in flight.
    pub fn loading_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_loading()).count()
    }

    /// Snapshots of decoded tiles intersecting `rect`, in grid order.
    pub fn hits(&self, rect: &Rect) -> impl Iterator<Item = LoadedTile> + '_ {
        let rect = *rect;
        self.tiles
            .iter()
            .filter(move |t| t.rect.intersects(&rect))
            .filter_map(|t| t.snapshot(self.sample_size))
    }

    /// Release every decoded buffer. Returns how many were released.
    pub(crate) fn release_all(&mut self) -> usize {
        self.tiles
            .iter_mut()
            .map(|t| t.release())
            .filter(|released| *released)
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================
