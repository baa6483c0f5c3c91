//! Scenecut Core - Foundation types for scene detection
//!
//! This crate provides the fundamental types used throughout scenecut:
//! - Frame-accurate time representation (Timecode, FrameRate)
//! - Frame buffers and pixel formats
//! - The shared error type

pub mod error;
pub mod frame;
pub mod time;

pub use error::{Result, ScenecutError};
pub use frame::{FrameBuffer, PixelFormat};
pub use time::{FrameRate, Timecode, FRAME_RATE_EPSILON, MINIMUM_FRAMES_PER_SECOND};
