//! Image source abstraction.
//!
//! The tile provider never decodes pixels itself. It hands source-space
//! rectangles to a [`RegionDecoder`] and receives pixel buffers back.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             TilesProvider               │
//! │   (display space, controlling thread)   │
//! └────────────────────┬────────────────────┘
//!                      │ Orientation::to_source_rect
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          RegionDecoder Trait            │
//! │     (source space, worker threads)      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          ImageRegionDecoder             │
//! │   (image crate + EXIF orientation)      │
//! └─────────────────────────────────────────┘
//! ```

mod image_decoder;
mod metadata;
mod orientation;

use image::RgbaImage;

use crate::error::TileError;
use crate::tile::Rect;

pub use image_decoder::ImageRegionDecoder;
pub use metadata::read_orientation;
pub use orientation::Orientation;

/// Dimensions and orientation read once when a source is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Source width in pixels, before orientation
    pub width: u32,

    /// Source height in pixels, before orientation
    pub height: u32,

    /// Rotation needed to display the source upright
    pub orientation: Orientation,
}

impl ImageMetadata {
    /// Width and height after orientation is applied.
    pub fn display_size(&self) -> (u32, u32) {
        self.orientation.display_size(self.width, self.height)
    }
}

/// Synchronous single-region decode primitive.
///
/// Implementations are called concurrently from worker threads, one call per
/// tile, and must not assume any ordering between calls.
pub trait RegionDecoder: Send + Sync + 'static {
    /// Source dimensions and orientation.
    fn metadata(&self) -> ImageMetadata;

    /// Decode `rect` (source space) downsampled by `sample_size`.
    ///
    /// The result is roughly `rect / sample_size` pixels in each dimension.
    ///
    /// # Errors
    ///
    /// Returns an error if the rectangle is outside the source, the decoder
    /// has been recycled, or the codec cannot produce pixels.
    fn decode_region(&self, rect: Rect, sample_size: u32) -> Result<RgbaImage, TileError>;

    /// Free decoder resources. Later decodes fail.
    fn recycle(&self);

    fn is_recycled(&self) -> bool;
}
