//! Tile compositing.
//!
//! Turns a [`TileSet`](crate::tile::TileSet) back into one picture of a
//! display region. Tiles arrive in source orientation at their tier's
//! resolution, so each one is rotated upright, scaled to the output and
//! drawn at its display position. Sets are ordered coarsest first, which
//! means drawing in order lets sharper tiles cover their placeholders.

use std::io::Cursor;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::TileError;
use crate::source::Orientation;
use crate::tile::{LoadedTile, Rect};

// =============================================================================
// Compositing
// =============================================================================

/// Output size for `region` drawn at `scale`, never smaller than 1x1.
pub fn canvas_size(region: Rect, scale: f32) -> (u32, u32) {
    let width = (region.width().max(0) as f32 * scale).round() as u32;
    let height = (region.height().max(0) as f32 * scale).round() as u32;
    (width.max(1), height.max(1))
}

/// Rotate decoded source pixels so they display upright.
pub fn upright(pixels: &RgbaImage, orientation: Orientation) -> RgbaImage {
    match orientation {
        Orientation::Normal => pixels.clone(),
        Orientation::Rotate90 => imageops::rotate90(pixels),
        Orientation::Rotate180 => imageops::rotate180(pixels),
        Orientation::Rotate270 => imageops::rotate270(pixels),
    }
}

/// Draw `tiles` in order onto a transparent canvas covering `region`.
///
/// Tiles outside the region are skipped. Pixels with no tile stay
/// transparent.
pub fn compose(tiles: &[LoadedTile], orientation: Orientation, region: Rect, scale: f32) -> RgbaImage {
    let (width, height) = canvas_size(region, scale);
    let mut canvas = RgbaImage::new(width, height);

    let mut drawn = 0usize;
    for tile in tiles.iter().filter(|t| t.rect.intersects(&region)) {
        let target_width = ((tile.rect.width() as f32 * scale).round() as u32).max(1);
        let target_height = ((tile.rect.height() as f32 * scale).round() as u32).max(1);

        let upright = upright(&tile.pixels, orientation);
        let scaled = if upright.dimensions() == (target_width, target_height) {
            upright
        } else {
            imageops::resize(&upright, target_width, target_height, FilterType::Triangle)
        };

        let x = ((tile.rect.left - region.left) as f32 * scale).round() as i64;
        let y = ((tile.rect.top - region.top) as f32 * scale).round() as i64;
        imageops::replace(&mut canvas, &scaled, x, y);
        drawn += 1;
    }

    debug!(drawn, width, height, "composited {}", region);
    canvas
}

/// Encode a composited canvas as PNG.
pub fn encode_png(canvas: &RgbaImage) -> Result<Bytes, TileError> {
    let mut output = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|e| TileError::Encode {
            message: e.to_string(),
        })?;
    Ok(Bytes::from(output))
}

// =============================================================================
// Tests
// =============================================================================
