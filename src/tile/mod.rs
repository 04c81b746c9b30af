//! Tile scheduling layer.
//!
//! This module turns "what is on screen" into decoded tiles. It owns the
//! multi-resolution cache, picks the resolution tier for a zoom level, and
//! runs region decodes in the background.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Viewer                  │
//! └────────────────────┬────────────────────┘
//!                      │ request_tiles(scale, viewport, rect)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TilesProvider               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │ DecodeExecutor  │  │
//! │  │  (one grid   │  │ (blocking pool, │  │
//! │  │   per tier)  │  │  mpsc results)  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            RegionDecoder                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TilesProvider`]: Entry point; answers requests and applies completions
//! - [`TileCache`]: Sample size to [`TileGrid`] map with full-hit eviction
//! - [`TileGrid`]: Partition of the display image into [`Tile`]s for one tier
//! - [`calculate_sample_size`]: Scale to tier resolution
//! - [`Rect`]: Integer rectangle in display or source coordinates
//!
//! # Example
//!
//! ```
//! use tile_provider::tile::{calculate_sample_size, grid_layout};
//!
//! // A 4096x2048 image shown at quarter scale in a 1024x768 viewport
//! let sample_size = calculate_sample_size(0.25, 4096, 2048);
//! assert_eq!(sample_size, 2);
//! assert_eq!(grid_layout(sample_size, 4096, 2048, 1024, 768), (2, 2));
//! ```

mod cache;
mod executor;
mod grid;
mod provider;
mod rect;
mod sample;

pub use cache::{Eviction, RequestPlan, TileCache};
pub use executor::{ControllingThread, DecodeCompletion, DecodeJob};
pub use grid::{grid_layout, LoadedTile, Tile, TileGrid, TileSet, VIEWPORT_TILE_FACTOR};
pub use provider::{CompletionOutcome, ProviderStats, TilesCallback, TilesProvider};
pub use rect::Rect;
pub use sample::{calculate_sample_size, is_valid_sample_size, MAX_SAMPLE_SIZE};
