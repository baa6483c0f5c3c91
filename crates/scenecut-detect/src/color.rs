//! Colour-space helpers shared by the HSV based detectors.
//!
//! HSV follows the 8-bit convention used by OpenCV: hue in `0..180`
//! (degrees halved), saturation and value in `0..=255`.

use crate::error::{DetectError, DetectResult};
use scenecut_core::FrameBuffer;

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);
    if max == 0 || delta == 0.0 {
        return [0, 0, max];
    }

    let sat = (255.0 * delta / f32::from(max)).round() as u8;
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let mut hue = if max as f32 == r {
        60.0 * (g - b) / delta
    } else if max as f32 == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    // 360 degrees wraps to 0 after halving and rounding.
    let hue = ((hue / 2.0).round() as u16 % 180) as u8;
    [hue, sat, max]
}

/// A frame split into planar 8-bit hue, saturation and value channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsvImage {
    pub width: u32,
    pub height: u32,
    pub hue: Vec<u8>,
    pub sat: Vec<u8>,
    pub val: Vec<u8>,
}

impl HsvImage {
    /// Convert a frame of any supported pixel format.
    pub fn from_frame(frame: &FrameBuffer) -> Self {
        let count = frame.pixel_count();
        let mut image = Self {
            width: frame.width,
            height: frame.height,
            hue: Vec::with_capacity(count),
            sat: Vec::with_capacity(count),
            val: Vec::with_capacity(count),
        };
        for px in frame.rgb_pixels() {
            let [h, s, v] = rgb_to_hsv(px);
            image.hue.push(h);
            image.sat.push(s);
            image.val.push(v);
        }
        image
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.val.len()
    }

    /// Whether the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }
}

/// Mean absolute per-channel change between two HSV images.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HsvDelta {
    pub hue: f64,
    pub sat: f64,
    pub lum: f64,
}

impl HsvDelta {
    /// Compare two images of the same size.
    pub fn between(prev: &HsvImage, curr: &HsvImage) -> DetectResult<Self> {
        if (prev.width, prev.height) != (curr.width, curr.height) {
            return Err(DetectError::invalid_parameter(format!(
                "frame size changed from {}x{} to {}x{}",
                prev.width, prev.height, curr.width, curr.height
            )));
        }
        if curr.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            hue: mean_abs_diff(&prev.hue, &curr.hue),
            sat: mean_abs_diff(&prev.sat, &curr.sat),
            lum: mean_abs_diff(&prev.val, &curr.val),
        })
    }

    /// Average of the three channel deltas.
    pub fn content_val(&self) -> f64 {
        (self.hue + self.sat + self.lum) / 3.0
    }
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    let total: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    total as f64 / a.len() as f64
}
