//! # Tile Provider
//!
//! Multi-resolution tile scheduling for images too large to decode whole.
//!
//! A viewer describes what it shows (a zoom scale, a viewport size and the
//! visible rectangle of the image) and gets back the decoded tiles covering
//! it. Tiles are decoded region by region at the coarsest resolution that
//! still looks sharp, on background threads, and cached per resolution tier.
//!
//! ## Features
//!
//! - **Resolution tiers**: Power-of-two sample sizes chosen from the display scale
//! - **Background decodes**: Region decodes on the tokio blocking pool, one per tile
//! - **Placeholders**: Coarser tiers stand in while sharper tiles load
//! - **Bounded memory**: Off-screen tiles and superseded tiers are released eagerly
//! - **Orientation**: EXIF rotations handled transparently
//!
//! ## Architecture
//!
//! - [`tile`] - Provider, cache, grids and decode scheduling
//! - [`source`] - Region decoder trait, orientation and the `image` backed decoder
//! - [`render`] - Compositing a tile set into a single image
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tile_provider::{Rect, TilesProvider};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), tile_provider::TileError> {
//!     let mut provider = TilesProvider::open("panorama.jpg", |tiles| {
//!         println!("redraw with {} tiles", tiles.len());
//!     })?;
//!
//!     let visible = Rect::new(0, 0, provider.width() as i32, provider.height() as i32);
//!     provider.request_tiles(0.1, 1280, 720, visible)?;
//!     provider.settle().await?;
//!
//!     provider.recycle()
//! }
//! ```

pub mod config;
pub mod error;
pub mod render;
pub mod source;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, InspectConfig, OutputFormat, RenderConfig, ViewConfig, Viewport};
pub use error::{SourceError, TileError};
pub use render::{canvas_size, compose, encode_png, upright};
pub use source::{read_orientation, ImageMetadata, ImageRegionDecoder, Orientation, RegionDecoder};
pub use tile::{
    calculate_sample_size, grid_layout, is_valid_sample_size, CompletionOutcome, LoadedTile,
    ProviderStats, Rect, TileCache, TileGrid, TileSet, TilesProvider, MAX_SAMPLE_SIZE,
};
