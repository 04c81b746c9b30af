//! Background decode dispatch and completion hand-off.
//!
//! Decodes run on tokio's blocking pool. A worker never touches the cache:
//! it captures the tile's rectangle, tier and orientation by value, decodes,
//! and sends the result over an unbounded channel. The controlling thread
//! drains that channel and performs every state change itself, so the cache
//! needs no locks.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use image::RgbaImage;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::error::TileError;
use crate::source::{Orientation, RegionDecoder};

use super::rect::Rect;

// =============================================================================
// Thread Affinity
// =============================================================================

/// The thread that owns the tile cache.
///
/// Captured when the provider is built. Controlling-thread operations call
/// [`ControllingThread::check`] and background work calls
/// [`ControllingThread::check_background`]; both fail instead of silently
/// redirecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllingThread {
    id: ThreadId,
}

impl ControllingThread {
    /// Claim the calling thread as the controlling thread.
    pub fn current() -> Self {
        Self {
            id: thread::current().id(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Fail unless called on the controlling thread.
    pub fn check(&self) -> Result<(), TileError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(TileError::NotControllingThread)
        }
    }

    /// Fail if called on the controlling thread.
    pub fn check_background(&self) -> Result<(), TileError> {
        if self.is_current() {
            Err(TileError::OnControllingThread)
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// Decode Jobs
// =============================================================================

/// Everything a worker needs, captured by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeJob {
    /// Tier the tile belongs to
    pub sample_size: u32,

    /// Generation of the grid holding the tile
    pub generation: u64,

    /// Index of the tile within its grid
    pub index: usize,

    /// Display-space rectangle of the tile
    pub rect: Rect,
}

/// A finished decode on its way back to the controlling thread.
#[derive(Debug)]
pub struct DecodeCompletion {
    pub job: DecodeJob,
    pub result: Result<RgbaImage, TileError>,
}

/// Display geometry the orientation transform needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DisplayGeometry {
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,
}

/// Decode a display-space rectangle through the orientation transform.
///
/// Must run on a background thread.
pub(crate) fn decode_oriented<D: RegionDecoder>(
    decoder: &D,
    owner: ControllingThread,
    geometry: DisplayGeometry,
    rect: Rect,
    sample_size: u32,
) -> Result<RgbaImage, TileError> {
    owner.check_background()?;
    let source_rect = geometry
        .orientation
        .to_source_rect(rect, geometry.width, geometry.height);
    trace!(sample_size, "decoding {} as source {}", rect, source_rect);
    decoder.decode_region(source_rect, sample_size)
}

/// Run [`decode_oriented`], turning a panicking decoder into a failed decode.
///
/// Every dispatched job must produce exactly one completion, otherwise its
/// tile stays loading forever.
pub(crate) fn decode_guarded<D: RegionDecoder>(
    decoder: &D,
    owner: ControllingThread,
    geometry: DisplayGeometry,
    rect: Rect,
    sample_size: u32,
) -> Result<RgbaImage, TileError> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        decode_oriented(decoder, owner, geometry, rect, sample_size)
    }))
    .unwrap_or_else(|payload| {
        Err(TileError::Decode {
            rect,
            message: format!("decoder panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

// =============================================================================
// Decode Executor
// =============================================================================

/// Runs decodes in the background and queues their completions.
pub(crate) struct DecodeExecutor {
    handle: Handle,
    sender: UnboundedSender<DecodeCompletion>,
    receiver: UnboundedReceiver<DecodeCompletion>,

    /// Completions received but handed back unapplied
    deferred: VecDeque<DecodeCompletion>,

    /// Jobs dispatched whose completion has not been applied yet
    pending: usize,
}

impl DecodeExecutor {
    pub fn new(handle: Handle) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            handle,
            sender,
            receiver,
            deferred: VecDeque::new(),
            pending: 0,
        }
    }

    /// Start decoding `job` on the blocking pool.
    ///
    /// Nothing cancels a dispatched job; if it turns out stale it still
    /// completes and is discarded by the receiver.
    pub fn dispatch<D: RegionDecoder>(
        &mut self,
        decoder: Arc<D>,
        owner: ControllingThread,
        geometry: DisplayGeometry,
        job: DecodeJob,
    ) {
        let sender = self.sender.clone();
        self.pending += 1;
        // Results travel over the channel only; the join handle is not kept.
        drop(self.handle.spawn_blocking(move || {
            let result =
                decode_guarded(decoder.as_ref(), owner, geometry, job.rect, job.sample_size);
            if sender.send(DecodeCompletion { job, result }).is_err() {
                trace!(sample_size = job.sample_size, "provider gone, dropping {}", job.rect);
            }
        }));
    }

    /// Hand back a completion taken with [`next`](Self::next) or
    /// [`try_next`](Self::try_next) that could not be applied. It is
    /// returned again, ahead of the channel, by the next call to either.
    pub fn defer(&mut self, completion: DecodeCompletion) {
        self.pending += 1;
        self.deferred.push_back(completion);
    }

    /// Next completion if one has already arrived.
    pub fn try_next(&mut self) -> Option<DecodeCompletion> {
        if let Some(completion) = self.deferred.pop_front() {
            self.pending = self.pending.saturating_sub(1);
            return Some(completion);
        }
        match self.receiver.try_recv() {
            Ok(completion) => {
                self.pending = self.pending.saturating_sub(1);
                Some(completion)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next completion. Returns `None` if nothing is pending.
    pub async fn next(&mut self) -> Option<DecodeCompletion> {
        if self.pending == 0 {
            return None;
        }
        if let Some(completion) = self.deferred.pop_front() {
            self.pending -= 1;
            return Some(completion);
        }
        let completion = self.receiver.recv().await?;
        self.pending = self.pending.saturating_sub(1);
        Some(completion)
    }

    pub fn pending(&self) -> usize {
        self.pending
    }
}

// =============================================================================
// Tests
// =============================================================================
