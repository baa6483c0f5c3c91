//! Scenecut Media - frame acquisition for scene detection
//!
//! This crate handles:
//! - The frame source interface implemented by decoders
//! - An in-memory synthetic source for tests and demos
//! - Downscale factor selection
//! - The bounded prefetch queue that overlaps decoding with analysis

pub mod downscale;
pub mod prefetch;
pub mod source;

pub use downscale::{compute_downscale_factor, Downscale, DEFAULT_MIN_WIDTH};
pub use prefetch::{compute_queue_size, with_prefetch, CancelHandle, PrefetchConfig, PrefetchQueue};
pub use source::{FrameSource, ReadOutcome, SyntheticSource};
