//! Tile provider: the request scheduler.
//!
//! The provider is the entry point for viewers. Each call to
//! [`TilesProvider::request_tiles`] describes what is on screen now; the
//! provider answers with whatever is already decoded and starts background
//! decodes for the rest.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TilesProvider                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                   request_tiles()                       │    │
//! │  │  1. Resolve tier         4. Evict on full hit           │    │
//! │  │  2. Record request       5. Borrow coarser tiers        │    │
//! │  │  3. Plan + dispatch      6. Return snapshot             │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    ▲            │
//! │           ▼                    ▼                    │            │
//! │    ┌───────────┐      ┌────────────────┐   ┌─────────────────┐  │
//! │    │ TileCache │      │ DecodeExecutor │──▶│ drain / settle  │  │
//! │    └───────────┘      └────────────────┘   └─────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Staleness
//!
//! A completion is only stored if the *latest* request still wants it: the
//! tier must match and the latest viewport must intersect the tile. Anything
//! else is dropped on arrival, so a slow decode can never resurrect an
//! evicted tier or show pixels the user has panned away from.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::error::{SourceError, TileError};
use crate::source::{ImageMetadata, ImageRegionDecoder, Orientation, RegionDecoder};

use super::cache::TileCache;
use super::executor::{ControllingThread, DecodeCompletion, DecodeExecutor, DecodeJob, DisplayGeometry};
use super::grid::{LoadedTile, TileSet};
use super::rect::Rect;
use super::sample::calculate_sample_size;

/// Called on the controlling thread each time a decode is accepted.
pub type TilesCallback = Box<dyn FnMut(TileSet) + Send>;

// =============================================================================
// Request State and Reporting
// =============================================================================

/// The most recent request. Completions are judged against this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestState {
    rect: Rect,
    sample_size: u32,
}

/// Running counters for a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Calls to `request_tiles`
    pub requests: u64,

    /// Requests fully satisfied from the cache
    pub full_hits: u64,

    /// Decodes sent to the background pool
    pub dispatched: u64,

    /// Decodes stored and reported to the callback
    pub accepted: u64,

    /// Decodes discarded because the request moved on
    pub stale: u64,

    /// Decodes that failed
    pub failed: u64,

    /// Grids dropped by full-hit eviction
    pub evicted_tiers: u64,

    /// Decoded buffers released for any reason
    pub released_buffers: u64,
}

/// What happened to one completed decode.
#[derive(Debug)]
pub enum CompletionOutcome {
    /// Stored on its tile and reported to the callback
    Accepted { sample_size: u32, rect: Rect },

    /// Discarded because the latest request no longer covers it
    Stale { sample_size: u32, rect: Rect },

    /// The decode failed; the tile stays unavailable
    Failed {
        sample_size: u32,
        rect: Rect,
        error: TileError,
    },
}

impl CompletionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, CompletionOutcome::Accepted { .. })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CompletionOutcome::Stale { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CompletionOutcome::Failed { .. })
    }
}

// =============================================================================
// Tiles Provider
// =============================================================================

/// Region-decoding tile scheduler for one image.
///
/// All methods except the plain accessors must be called on the thread that
/// built the provider. Decodes run on the tokio blocking pool and come back
/// through [`drain_completions`](Self::drain_completions),
/// [`next_completion`](Self::next_completion) or [`settle`](Self::settle).
///
/// # Example
///
/// ```no_run
/// use tile_provider::tile::{Rect, TilesProvider};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut provider = TilesProvider::open("huge.jpg", |tiles| {
///         println!("{} tiles ready", tiles.len());
///     })?;
///
///     // Quarter scale, 1024x768 viewport at the top-left corner
///     let viewport = Rect::new(0, 0, 4096, 3072);
///     let tiles = provider.request_tiles(0.25, 1024, 768, viewport)?;
///     println!("{} tiles immediately", tiles.len());
///
///     // Wait for the background decodes
///     provider.settle().await?;
///     Ok(())
/// }
/// ```
pub struct TilesProvider<D: RegionDecoder> {
    decoder: Arc<D>,
    metadata: ImageMetadata,

    /// Display width, after orientation
    width: u32,

    /// Display height, after orientation
    height: u32,

    cache: TileCache,
    last_request: Option<RequestState>,

    /// Tiles reported for the current request cycle
    hits: Vec<LoadedTile>,

    callback: TilesCallback,
    executor: DecodeExecutor,
    owner: ControllingThread,
    released: bool,
    stats: ProviderStats,
}

impl TilesProvider<ImageRegionDecoder> {
    /// Open an image file with the bundled decoder.
    pub fn open(
        path: impl AsRef<Path>,
        callback: impl FnMut(TileSet) + Send + 'static,
    ) -> Result<Self, TileError> {
        let decoder = ImageRegionDecoder::open(path)?;
        Self::new(decoder, callback)
    }

    /// Open an encoded image held in memory with the bundled decoder.
    pub fn from_bytes(
        data: Bytes,
        callback: impl FnMut(TileSet) + Send + 'static,
    ) -> Result<Self, TileError> {
        let decoder = ImageRegionDecoder::from_bytes(data)?;
        Self::new(decoder, callback)
    }
}

impl<D: RegionDecoder> TilesProvider<D> {
    /// Create a provider on the current tokio runtime.
    ///
    /// The calling thread becomes the controlling thread.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::NoRuntime`] outside a tokio runtime, or a source
    /// error if the decoder reports an empty image.
    pub fn new(decoder: D, callback: impl FnMut(TileSet) + Send + 'static) -> Result<Self, TileError> {
        let handle = Handle::try_current().map_err(|_| TileError::NoRuntime)?;
        Self::with_handle(decoder, handle, callback)
    }

    /// Create a provider that schedules decodes on `handle`.
    pub fn with_handle(
        decoder: D,
        handle: Handle,
        callback: impl FnMut(TileSet) + Send + 'static,
    ) -> Result<Self, TileError> {
        let metadata = decoder.metadata();
        if metadata.width == 0 || metadata.height == 0 {
            return Err(SourceError::Empty {
                width: metadata.width,
                height: metadata.height,
            }
            .into());
        }
        let (width, height) = metadata.display_size();

        info!(
            width,
            height,
            orientation = metadata.orientation.degrees(),
            "tile provider ready"
        );

        Ok(Self {
            decoder: Arc::new(decoder),
            metadata,
            width,
            height,
            cache: TileCache::new(),
            last_request: None,
            hits: Vec::new(),
            callback: Box::new(callback),
            executor: DecodeExecutor::new(handle),
            owner: ControllingThread::current(),
            released: false,
            stats: ProviderStats::default(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Display width (source height when rotated a quarter turn).
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Display height (source width when rotated a quarter turn).
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn orientation(&self) -> Orientation {
        self.metadata.orientation
    }

    /// Source metadata as read at construction.
    pub fn metadata(&self) -> ImageMetadata {
        self.metadata
    }

    /// True once [`recycle`](Self::recycle) has run.
    pub fn is_recycled(&self) -> bool {
        self.released
    }

    /// Tier that `request_tiles` would use for `scale`.
    pub fn sample_size_for(&self, scale: f32) -> u32 {
        calculate_sample_size(scale, self.width, self.height)
    }

    pub fn stats(&self) -> ProviderStats {
        self.stats
    }

    /// Decodes dispatched whose completion has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.executor.pending()
    }

    /// Sample sizes that currently have a grid, finest first.
    pub fn cached_tiers(&self) -> Vec<u32> {
        self.cache.tiers()
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn controlling_thread(&self) -> ControllingThread {
        self.owner
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Ask for the tiles covering `display_rect` at `scale`.
    ///
    /// Returns the tiles available right now: placeholders from coarser
    /// tiers first, then decoded tiles of the requested tier. Missing tiles
    /// of the requested tier are decoded in the background and reported
    /// through the callback as they arrive.
    ///
    /// `view_width` and `view_height` size the grid the first time a tier is
    /// used and are ignored afterwards.
    ///
    /// # Errors
    ///
    /// Fails off the controlling thread, after [`recycle`](Self::recycle),
    /// or when a grid must be built against an empty viewport.
    pub fn request_tiles(
        &mut self,
        scale: f32,
        view_width: u32,
        view_height: u32,
        display_rect: Rect,
    ) -> Result<TileSet, TileError> {
        self.ensure_usable()?;

        let sample_size = self.sample_size_for(scale);
        let generation = self
            .cache
            .get_or_build(sample_size, self.width, self.height, view_width, view_height)?
            .generation();

        self.hits.clear();
        self.last_request = Some(RequestState {
            rect: display_rect,
            sample_size,
        });
        self.stats.requests += 1;

        let plan = self.cache.plan(sample_size, &display_rect);
        self.stats.released_buffers += plan.released as u64;

        let geometry = self.geometry();
        for &(index, rect) in &plan.to_decode {
            let job = DecodeJob {
                sample_size,
                generation,
                index,
                rect,
            };
            trace!(sample_size, "dispatching {}", rect);
            self.executor
                .dispatch(Arc::clone(&self.decoder), self.owner, geometry, job);
            self.stats.dispatched += 1;
        }

        let full_hit = plan.is_full_hit();
        if full_hit {
            self.stats.full_hits += 1;
            let eviction = self.cache.evict_others(sample_size);
            self.stats.evicted_tiers += eviction.tiers as u64;
            self.stats.released_buffers += eviction.buffers as u64;
        } else if sample_size != 1 {
            self.hits = self.cache.coarser_hits(sample_size, &display_rect);
        }
        let placeholders = self.hits.len();
        self.hits.extend(plan.hits);

        debug!(
            sample_size,
            full_hit,
            placeholders,
            dispatched = plan.to_decode.len(),
            loading = plan.already_loading,
            "requested {}",
            display_rect
        );

        Ok(self.snapshot())
    }

    // =========================================================================
    // Completions
    // =========================================================================

    /// Apply every completion that has already arrived, without waiting.
    pub fn drain_completions(&mut self) -> Result<Vec<CompletionOutcome>, TileError> {
        self.ensure_usable()?;
        let mut outcomes = Vec::new();
        while let Some(completion) = self.executor.try_next() {
            outcomes.push(self.apply(completion));
        }
        Ok(outcomes)
    }

    /// Wait for the next completion and apply it.
    ///
    /// Returns `Ok(None)` immediately when nothing is in flight.
    ///
    /// On a multi-threaded runtime the task may resume on another worker.
    /// The completion is then kept for a later call on the controlling
    /// thread and `NotControllingThread` is returned. Drive the provider
    /// from a current-thread runtime or a `LocalSet` to avoid this.
    pub async fn next_completion(&mut self) -> Result<Option<CompletionOutcome>, TileError> {
        self.ensure_usable()?;
        let Some(completion) = self.executor.next().await else {
            return Ok(None);
        };
        self.accept_on_owner(completion).map(Some)
    }

    /// Wait until every dispatched decode has completed and been applied.
    pub async fn settle(&mut self) -> Result<Vec<CompletionOutcome>, TileError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_completion().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Apply `completion` if running on the controlling thread, otherwise
    /// hand it back to the executor untouched.
    fn accept_on_owner(
        &mut self,
        completion: DecodeCompletion,
    ) -> Result<CompletionOutcome, TileError> {
        if let Err(e) = self.owner.check() {
            trace!(
                sample_size = completion.job.sample_size,
                "deferring {} off the controlling thread",
                completion.job.rect
            );
            self.executor.defer(completion);
            return Err(e);
        }
        Ok(self.apply(completion))
    }

    fn apply(&mut self, completion: DecodeCompletion) -> CompletionOutcome {
        let DecodeCompletion { job, result } = completion;
        let sample_size = job.sample_size;

        // The grid may have been evicted, or evicted and rebuilt, since the
        // job was dispatched. Either way the tile it targeted is gone.
        let tile = match self.cache.grid_mut(sample_size) {
            Some(grid) if grid.generation() == job.generation => grid.tile_mut(job.index),
            _ => None,
        };
        let Some(tile) = tile else {
            trace!(sample_size, "dropping decode for discarded grid {}", job.rect);
            self.stats.stale += 1;
            return CompletionOutcome::Stale {
                sample_size,
                rect: job.rect,
            };
        };

        tile.set_loading(false);
        let rect = tile.rect();

        let pixels = match result {
            Ok(pixels) => pixels,
            Err(error) => {
                warn!(sample_size, "decode of {} failed: {}", rect, error);
                self.stats.failed += 1;
                return CompletionOutcome::Failed {
                    sample_size,
                    rect,
                    error,
                };
            }
        };

        let current = self
            .last_request
            .is_some_and(|last| last.sample_size == sample_size && last.rect.intersects(&rect));
        if !current {
            trace!(sample_size, "discarding stale decode {}", rect);
            self.stats.stale += 1;
            return CompletionOutcome::Stale { sample_size, rect };
        }

        let pixels = Arc::new(pixels);
        tile.store(Arc::clone(&pixels));
        self.hits.push(LoadedTile {
            rect,
            sample_size,
            pixels,
        });
        self.stats.accepted += 1;

        let snapshot = self.snapshot();
        (self.callback)(snapshot);
        CompletionOutcome::Accepted { sample_size, rect }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Free the decoder and every decoded buffer.
    ///
    /// Decodes still in flight finish in the background and are dropped.
    /// Every later call except the accessors fails with
    /// [`TileError::Released`].
    pub fn recycle(&mut self) -> Result<(), TileError> {
        self.ensure_usable()?;

        self.decoder.recycle();
        let released = self.cache.clear();
        self.stats.released_buffers += released as u64;
        self.hits.clear();
        self.last_request = None;
        self.released = true;

        info!(
            released,
            in_flight = self.executor.pending(),
            "tile provider recycled"
        );
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn ensure_usable(&self) -> Result<(), TileError> {
        self.owner.check()?;
        if self.released {
            return Err(TileError::Released);
        }
        Ok(())
    }

    fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry {
            orientation: self.metadata.orientation,
            width: self.width,
            height: self.height,
        }
    }

    fn snapshot(&self) -> TileSet {
        TileSet::from(self.hits.as_slice())
    }
}

// =============================================================================
// Tests
// =============================================================================
