//! Bounded prefetch queue between frame decoding and analysis.
//!
//! A scoped producer thread reads frames from the source into a bounded
//! channel while the caller analyses them. A full queue blocks the
//! producer; frames are never dropped. Stopping sets a flag and drops the
//! receiving end, which unblocks a producer waiting on a full queue.
//!
//! The source stays mutably borrowed by the producer for the whole run,
//! so it cannot be seeked while frames are in flight.

use crossbeam_channel::{bounded, Receiver, Sender};
use scenecut_core::{FrameBuffer, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::source::FrameSource;

/// Default maximum number of queued frames.
pub const DEFAULT_MAX_QUEUE_FRAMES: usize = 512;

/// Default memory budget for the queue in MiB.
pub const DEFAULT_MAX_QUEUE_MEMORY_MB: usize = 4096;

/// Number of frames to queue: `max_frames`, or fewer if that many frames
/// (at 3 bytes per pixel) would exceed `max_memory_mb`. Never below 1.
pub fn compute_queue_size(frame_size: (u32, u32), max_frames: usize, max_memory_mb: usize) -> usize {
    let frame_bytes = (frame_size.0 as usize * frame_size.1 as usize * 3).max(1);
    let budget = max_memory_mb.saturating_mul(1024 * 1024);
    if max_frames.saturating_mul(frame_bytes) <= budget {
        max_frames.max(1)
    } else {
        (budget / frame_bytes).max(1)
    }
}

/// Configuration for overlapped decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Maximum number of queued frames.
    pub max_frames: usize,
    /// Memory budget for queued frames in MiB.
    pub max_memory_mb: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_QUEUE_FRAMES,
            max_memory_mb: DEFAULT_MAX_QUEUE_MEMORY_MB,
        }
    }
}

impl PrefetchConfig {
    /// Queue capacity for frames of the given size.
    pub fn queue_size(&self, frame_size: (u32, u32)) -> usize {
        compute_queue_size(frame_size, self.max_frames, self.max_memory_mb)
    }
}

/// Shared flag used to abort a running analysis.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Create a handle in the "not cancelled" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a previous cancellation request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Consumer side of the prefetch queue.
pub struct PrefetchQueue {
    rx: Receiver<Result<FrameBuffer>>,
    finished: bool,
}

impl PrefetchQueue {
    /// Next frame in order; `None` once the source is exhausted.
    ///
    /// A read error from the source is returned once, after every frame
    /// decoded before it.
    pub fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        if self.finished {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            Err(_) => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Number of frames currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }
}

/// Run `consume` while a producer thread prefetches frames from `source`.
///
/// When `consume` returns, the producer is stopped and joined and any
/// frames still queued are discarded. The source cursor is then past the
/// last consumed frame by up to the queue capacity.
pub fn with_prefetch<S, F, T>(source: &mut S, capacity: usize, consume: F) -> T
where
    S: FrameSource + ?Sized,
    F: FnOnce(&mut PrefetchQueue) -> T,
{
    let capacity = capacity.max(1);
    let stop = Arc::new(AtomicBool::new(false));

    thread::scope(|scope| {
        let (tx, rx) = bounded(capacity);
        let producer_stop = Arc::clone(&stop);
        let producer = scope.spawn(move || produce(source, &tx, &producer_stop));

        let mut queue = PrefetchQueue {
            rx,
            finished: false,
        };
        let output = consume(&mut queue);

        stop.store(true, Ordering::Release);
        let discarded = queue.queued();
        drop(queue);

        match producer.join() {
            Ok(read) => debug!(read, discarded, capacity, "Prefetch producer stopped"),
            Err(payload) => {
                warn!("Prefetch producer panicked");
                std::panic::resume_unwind(payload);
            }
        }
        output
    })
}

fn produce<S>(source: &mut S, tx: &Sender<Result<FrameBuffer>>, stop: &AtomicBool) -> u64
where
    S: FrameSource + ?Sized,
{
    let mut read = 0;
    while !stop.load(Ordering::Acquire) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).is_err() {
                    break;
                }
                read += 1;
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
    read
}
