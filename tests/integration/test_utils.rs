//! Test utilities for integration tests.
//!
//! This module provides a tracking mock decoder and helpers for building
//! encoded test images.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tile_provider::{ImageMetadata, Orientation, Rect, RegionDecoder, TileError, TileSet};

// =============================================================================
// Mock Region Decoder with Request Tracking
// =============================================================================

/// A mock region decoder that records every decode.
///
/// Clones share their tracking state, so a test can hand one clone to the
/// provider and keep another to inspect. Decoded pixels are filled with the
/// sample size in the red channel so tests can tell tiers apart.
#[derive(Clone)]
pub struct TrackingMockDecoder {
    width: u32,
    height: u32,
    orientation: Orientation,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(Rect, u32)>>>,
    failing: Arc<Mutex<HashSet<Rect>>>,
    panicking: Arc<Mutex<HashSet<Rect>>>,
    recycled: Arc<AtomicBool>,
}

impl TrackingMockDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            orientation: Orientation::Normal,
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            panicking: Arc::new(Mutex::new(HashSet::new())),
            recycled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Source rectangles and sample sizes decoded so far, in arrival order.
    pub fn requests(&self) -> Vec<(Rect, u32)> {
        self.requests.lock().unwrap().clone()
    }

    /// Make decodes of this source rectangle fail.
    pub fn fail_on(&self, rect: Rect) {
        self.failing.lock().unwrap().insert(rect);
    }

    /// Make decodes of this source rectangle panic.
    pub fn panic_on(&self, rect: Rect) {
        self.panicking.lock().unwrap().insert(rect);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
        self.panicking.lock().unwrap().clear();
    }
}

impl RegionDecoder for TrackingMockDecoder {
    fn metadata(&self) -> ImageMetadata {
        ImageMetadata {
            width: self.width,
            height: self.height,
            orientation: self.orientation,
        }
    }

    fn decode_region(&self, rect: Rect, sample_size: u32) -> Result<RgbaImage, TileError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((rect, sample_size));

        if self.recycled.load(Ordering::SeqCst) {
            return Err(TileError::Recycled);
        }
        let panics = self.panicking.lock().unwrap().contains(&rect);
        if panics {
            panic!("mock decoder panicked on {rect}");
        }
        if self.failing.lock().unwrap().contains(&rect) {
            return Err(TileError::Decode {
                rect,
                message: "injected failure".to_string(),
            });
        }
        let bounds = Rect::from_size(self.width as i32, self.height as i32);
        if rect.is_empty() || !bounds.contains(&rect) {
            return Err(TileError::RegionOutOfBounds {
                rect,
                width: self.width,
                height: self.height,
            });
        }

        Ok(RgbaImage::from_pixel(
            (rect.width() as u32).div_ceil(sample_size),
            (rect.height() as u32).div_ceil(sample_size),
            Rgba([sample_size as u8, 0, 0, 255]),
        ))
    }

    fn recycle(&self) {
        self.recycled.store(true, Ordering::SeqCst);
    }

    fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Callback Recording
// =============================================================================

pub type Recorded = Arc<Mutex<Vec<TileSet>>>;

/// A provider callback that keeps every tile set it is handed.
pub fn recording_callback() -> (impl FnMut(TileSet) + Send + 'static, Recorded) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&recorded);
    let callback = move |tiles: TileSet| {
        sink.lock().unwrap().push(tiles);
    };
    (callback, recorded)
}

/// Sample sizes of a tile set, in order.
pub fn tiers_of(tiles: &TileSet) -> Vec<u32> {
    tiles.iter().map(|t| t.sample_size).collect()
}

/// Display rectangles of a tile set, sorted.
pub fn rects_of(tiles: &TileSet) -> Vec<(i32, i32, i32, i32)> {
    let mut rects: Vec<_> = tiles
        .iter()
        .map(|t| (t.rect.left, t.rect.top, t.rect.right, t.rect.bottom))
        .collect();
    rects.sort_unstable();
    rects
}

// =============================================================================
// Encoded Test Images
// =============================================================================

/// An image whose red and green channels encode the pixel position.
pub fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    })
}

/// Encode an RGBA image as PNG.
pub fn encode_png(img: &RgbaImage) -> Bytes {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

/// Encode a solid JPEG carrying an EXIF orientation tag.
///
/// The APP1 segment holds a big-endian TIFF structure with a single IFD
/// entry (tag 0x0112, SHORT) and is spliced in right after the SOI marker.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Bytes {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 100, 50]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode_image(&img)
        .unwrap();

    let mut payload = Vec::new();
    payload.extend_from_slice(b"Exif\0\0");
    // TIFF header: big-endian, magic 42, first IFD at offset 8
    payload.extend_from_slice(&[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
    // One entry
    payload.extend_from_slice(&[0x00, 0x01]);
    payload.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    payload.extend_from_slice(&orientation.to_be_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    // No next IFD
    payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let segment_len = (payload.len() + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    Bytes::from(out)
}
