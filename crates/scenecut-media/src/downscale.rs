//! Downscale factor selection.
//!
//! Detectors sample pixel blocks, so analysing a 4K frame at full size
//! mostly burns time. The selector picks an integer divisor that keeps
//! the effective width at or above a target minimum.

use serde::{Deserialize, Serialize};

/// Default minimum width a frame is downscaled to.
pub const DEFAULT_MIN_WIDTH: u32 = 260;

/// Choose a downscale factor for a frame of the given width.
///
/// Returns 1 when the frame is narrower than `target_min_width`, otherwise
/// `floor(frame_width / target_min_width)`. The effective width
/// `frame_width / factor` is then at least `target_min_width` and below
/// `2 * target_min_width`, and below `1.5 * target_min_width` whenever the
/// factor is 2 or more.
pub fn compute_downscale_factor(frame_width: u32, target_min_width: u32) -> u32 {
    if target_min_width == 0 || frame_width < target_min_width {
        return 1;
    }
    frame_width / target_min_width
}

/// How frames are reduced before they reach the detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Downscale {
    /// Pick a factor from the frame width.
    Auto { min_width: u32 },
    /// Use a fixed factor; `Factor(1)` disables downscaling.
    Factor(u32),
}

impl Default for Downscale {
    fn default() -> Self {
        Self::Auto {
            min_width: DEFAULT_MIN_WIDTH,
        }
    }
}

impl Downscale {
    /// Resolve the factor for a frame of the given width.
    pub fn factor_for(self, frame_width: u32) -> u32 {
        match self {
            Self::Auto { min_width } => compute_downscale_factor(frame_width, min_width),
            Self::Factor(factor) => factor.max(1),
        }
    }
}
