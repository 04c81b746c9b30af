use thiserror::Error;

use crate::tile::Rect;

/// Errors raised while opening an image source.
///
/// Any of these fails construction of the whole provider; there is no
/// partially usable instance.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The source bytes could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// The codec could not make sense of the source
    #[error("Unsupported image: {reason}")]
    Unsupported { reason: String },

    /// The source decoded to an image with no pixels
    #[error("Image has no pixels: {width}x{height}")]
    Empty { width: u32, height: u32 },
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err.to_string())
    }
}

/// Errors raised by the tile provider and its region decoder.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Opening the source failed
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// The codec produced no usable data for a region
    #[error("Decode error for {rect}: {message}")]
    Decode { rect: Rect, message: String },

    /// Composited output could not be encoded
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// Requested region does not lie inside the source image
    #[error("Region {rect} out of bounds for {width}x{height} source")]
    RegionOutOfBounds { rect: Rect, width: u32, height: u32 },

    /// Sample sizes are powers of two, at least 1
    #[error("Invalid sample size: {0}")]
    InvalidSampleSize(u32),

    /// A grid cannot be laid out against an empty viewport
    #[error("Invalid viewport: {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    /// Called from a thread other than the one owning the tile cache
    #[error("Must be called on the controlling thread")]
    NotControllingThread,

    /// Background-only work attempted on the controlling thread
    #[error("Must be called on a background thread")]
    OnControllingThread,

    /// The provider has been torn down
    #[error("Tile provider has been released")]
    Released,

    /// The decoder has been recycled and can no longer decode
    #[error("Region decoder has been recycled")]
    Recycled,

    /// No tokio runtime to schedule decodes on
    #[error("No tokio runtime available for background decodes")]
    NoRuntime,
}
