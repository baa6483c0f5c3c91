//! Frame buffer types for decoded video frames in CPU memory.
//!
//! Frame sources hand packed 8-bit buffers to the detectors. Rows may be
//! padded; all accessors go through the stride.

use crate::error::{Result, ScenecutError};
use serde::{Deserialize, Serialize};

/// Pixel format enumeration (packed 8-bit formats only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// 8-bit RGB (24 bits per pixel)
    Rgb8,
    /// 8-bit BGR, the usual layout of OpenCV-style decoders
    Bgr8,
    /// 8-bit grayscale
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Gray8 => 1,
        }
    }
}

/// A video frame in CPU memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a zeroed frame buffer with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        // Align stride to 64 bytes for SIMD-friendly row access
        let min_stride = width as usize * format.bytes_per_pixel();
        let stride = (min_stride + 63) & !63;
        Self {
            format,
            width,
            height,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Wrap tightly packed pixel data supplied by a decoder.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let stride = width as usize * format.bytes_per_pixel();
        Self::from_raw_with_stride(width, height, format, stride, data)
    }

    /// Wrap pixel data whose rows are `stride` bytes apart.
    pub fn from_raw_with_stride(
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(ScenecutError::InvalidParameter(format!(
                "stride {stride} is smaller than a {width}px {format:?} row ({row_bytes} bytes)"
            )));
        }
        let needed = if height == 0 {
            0
        } else {
            stride * (height as usize - 1) + row_bytes
        };
        if data.len() < needed {
            return Err(ScenecutError::InvalidParameter(format!(
                "{}x{} {:?} frame needs {} bytes, got {}",
                width,
                height,
                format,
                needed,
                data.len()
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            stride,
            data,
        })
    }

    /// Create a frame filled with a single RGB colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut frame = Self::new(width, height, PixelFormat::Rgb8);
        for y in 0..height {
            for px in frame.row_mut(y).chunks_exact_mut(3) {
                px.copy_from_slice(&rgb);
            }
        }
        frame
    }

    /// Create a mid-grey frame of the given intensity.
    pub fn gray(width: u32, height: u32, level: u8) -> Self {
        Self::solid(width, height, [level, level, level])
    }

    /// Number of pixels in the frame.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Get a row of pixel data (without padding).
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    /// Get a mutable row of pixel data (without padding).
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..end]
    }

    /// RGB triple of the pixel at (x, y).
    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let bpp = self.format.bytes_per_pixel();
        let i = y as usize * self.stride + x as usize * bpp;
        let px = &self.data[i..i + bpp];
        match self.format {
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => [px[0], px[1], px[2]],
            PixelFormat::Bgr8 => [px[2], px[1], px[0]],
            PixelFormat::Gray8 => [px[0], px[0], px[0]],
        }
    }

    /// Rec. 601 luma of the pixel at (x, y).
    #[inline]
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let [r, g, b] = self.rgb_at(x, y);
        ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
    }

    /// Iterate over all pixels as RGB triples in row-major order.
    pub fn rgb_pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| self.rgb_at(x, y)))
    }

    /// Keep every `factor`-th pixel in both axes.
    ///
    /// The output is `ceil(width / factor)` x `ceil(height / factor)` in
    /// the same pixel format. A factor of 0 or 1 returns a copy.
    pub fn downscale(&self, factor: u32) -> Self {
        if factor <= 1 {
            return self.clone();
        }
        let width = self.width.div_ceil(factor);
        let height = self.height.div_ceil(factor);
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
        for y in (0..self.height).step_by(factor as usize) {
            let row = self.row(y);
            for x in (0..self.width as usize).step_by(factor as usize) {
                data.extend_from_slice(&row[x * bpp..(x + 1) * bpp]);
            }
        }
        Self {
            format: self.format,
            width,
            height,
            stride: width as usize * bpp,
            data,
        }
    }
}
