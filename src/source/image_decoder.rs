//! Region decoder backed by the `image` crate.
//!
//! The source is decoded once at open time and regions are cropped and
//! downsampled from that buffer. This keeps the decoder usable for any
//! format `image` understands; sources too large for memory need a decoder
//! that reads regions straight from the file instead.

use std::path::Path;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use crate::error::{SourceError, TileError};
use crate::tile::{is_valid_sample_size, Rect};

use super::metadata::read_orientation;
use super::{ImageMetadata, Orientation, RegionDecoder};

/// [`RegionDecoder`] over an in-memory decoded image.
///
/// # Example
///
/// ```no_run
/// use tile_provider::source::{ImageRegionDecoder, RegionDecoder};
/// use tile_provider::tile::Rect;
///
/// let decoder = ImageRegionDecoder::open("photo.jpg")?;
/// let meta = decoder.metadata();
/// println!("{}x{} {:?}", meta.width, meta.height, meta.orientation);
///
/// // Top-left 512x512 at half resolution
/// let pixels = decoder.decode_region(Rect::new(0, 0, 512, 512), 2)?;
/// assert_eq!(pixels.dimensions(), (256, 256));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ImageRegionDecoder {
    /// Decoded source, `None` once recycled
    image: RwLock<Option<Arc<RgbaImage>>>,

    metadata: ImageMetadata,
}

impl ImageRegionDecoder {
    /// Open an encoded image held in memory.
    ///
    /// Orientation is read from the EXIF block when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not a supported image or decodes to
    /// zero pixels.
    pub fn from_bytes(data: Bytes) -> Result<Self, SourceError> {
        let orientation = read_orientation(&data);
        let decoded = image::load_from_memory(&data).map_err(|e| SourceError::Unsupported {
            reason: e.to_string(),
        })?;
        Self::from_image(decoded.to_rgba8(), orientation)
    }

    /// Open an encoded image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        debug!("opened {} ({} bytes)", path.display(), data.len());
        Self::from_bytes(Bytes::from(data))
    }

    /// Wrap already decoded pixels with an explicit orientation.
    pub fn from_image(image: RgbaImage, orientation: Orientation) -> Result<Self, SourceError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(SourceError::Empty { width, height });
        }

        Ok(Self {
            image: RwLock::new(Some(Arc::new(image))),
            metadata: ImageMetadata {
                width,
                height,
                orientation,
            },
        })
    }

    fn source(&self) -> Option<Arc<RgbaImage>> {
        let guard = self
            .image
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }
}

impl RegionDecoder for ImageRegionDecoder {
    fn metadata(&self) -> ImageMetadata {
        self.metadata
    }

    fn decode_region(&self, rect: Rect, sample_size: u32) -> Result<RgbaImage, TileError> {
        if !is_valid_sample_size(sample_size) {
            return Err(TileError::InvalidSampleSize(sample_size));
        }

        let bounds = Rect::from_size(self.metadata.width as i32, self.metadata.height as i32);
        if rect.is_empty() || !bounds.contains(&rect) {
            return Err(TileError::RegionOutOfBounds {
                rect,
                width: self.metadata.width,
                height: self.metadata.height,
            });
        }

        let source = self.source().ok_or(TileError::Recycled)?;

        let (width, height) = (rect.width() as u32, rect.height() as u32);
        let region = imageops::crop_imm(
            &*source,
            rect.left as u32,
            rect.top as u32,
            width,
            height,
        )
        .to_image();

        if sample_size == 1 {
            return Ok(region);
        }

        let target_width = width.div_ceil(sample_size);
        let target_height = height.div_ceil(sample_size);
        Ok(imageops::resize(
            &region,
            target_width,
            target_height,
            FilterType::Triangle,
        ))
    }

    fn recycle(&self) {
        let mut guard = self
            .image
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }

    fn is_recycled(&self) -> bool {
        self.source().is_none()
    }
}
