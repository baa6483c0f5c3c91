//! Time representation for frame-accurate scene detection
//!
//! The frame index is the canonical value of a [`Timecode`]. Seconds,
//! milliseconds and clock strings are derived from it, and converting
//! back always goes through `round(seconds * fps)` so repeated
//! conversions never drift by a frame.

use crate::error::{Result, ScenecutError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Add;

/// Smallest frame rate accepted for analysis.
pub const MINIMUM_FRAMES_PER_SECOND: f64 = 1.0 / 1000.0;

/// Two frame rates closer than this are considered identical.
pub const FRAME_RATE_EPSILON: f64 = 1.0 / 100_000.0;

/// Frame rate in frames per second (e.g. 29.97).
///
/// Always finite and greater than [`MINIMUM_FRAMES_PER_SECOND`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FrameRate(f64);

impl FrameRate {
    /// Validate and wrap a frame rate.
    pub fn new(fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= MINIMUM_FRAMES_PER_SECOND {
            return Err(ScenecutError::InvalidFrameRate(fps));
        }
        Ok(Self(fps))
    }

    /// Frames per second as f64.
    #[inline]
    pub fn fps(self) -> f64 {
        self.0
    }

    /// Compare two rates using [`FRAME_RATE_EPSILON`].
    #[inline]
    pub fn approx_eq(self, other: Self) -> bool {
        (self.0 - other.0).abs() < FRAME_RATE_EPSILON
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self(24000.0 / 1001.0);
    pub const FPS_24: Self = Self(24.0);
    pub const FPS_25: Self = Self(25.0);
    pub const FPS_29_97: Self = Self(30000.0 / 1001.0);
    pub const FPS_30: Self = Self(30.0);
    pub const FPS_50: Self = Self(50.0);
    pub const FPS_59_94: Self = Self(60000.0 / 1001.0);
    pub const FPS_60: Self = Self(60.0);
}

impl PartialEq for FrameRate {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(*other)
    }
}

impl TryFrom<f64> for FrameRate {
    type Error = ScenecutError;

    fn try_from(fps: f64) -> Result<Self> {
        Self::new(fps)
    }
}

impl From<FrameRate> for f64 {
    fn from(rate: FrameRate) -> f64 {
        rate.0
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.0;
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u64)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// A frame-accurate point in time: a frame index at a given frame rate.
///
/// Comparisons only order timecodes that share a frame rate (within
/// [`FRAME_RATE_EPSILON`]); with different rates `partial_cmp` returns
/// `None` and [`Timecode::try_cmp`] reports the mismatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timecode {
    frame: u64,
    rate: FrameRate,
}

impl Timecode {
    /// Create a timecode from a frame index.
    #[inline]
    pub fn from_frames(frame: u64, rate: FrameRate) -> Self {
        Self { frame, rate }
    }

    /// Create a timecode from a frame index and a raw fps value.
    pub fn new(frame: u64, fps: f64) -> Result<Self> {
        Ok(Self::from_frames(frame, FrameRate::new(fps)?))
    }

    /// Zero timecode at the given rate.
    #[inline]
    pub fn zero(rate: FrameRate) -> Self {
        Self::from_frames(0, rate)
    }

    /// Create a timecode from a number of seconds, rounding to the
    /// nearest frame.
    pub fn from_seconds(seconds: f64, rate: FrameRate) -> Result<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ScenecutError::InvalidTimecode(format!(
                "seconds must be a non-negative number, got {seconds}"
            )));
        }
        let frames = (seconds * rate.fps()).round();
        if frames >= u64::MAX as f64 {
            return Err(ScenecutError::InvalidTimecode(format!(
                "{seconds} seconds at {rate} is out of range"
            )));
        }
        Ok(Self {
            frame: frames as u64,
            rate,
        })
    }

    /// Parse a clock string of the form `HH:MM:SS[.fff]`.
    pub fn from_clock_str(text: &str, rate: FrameRate) -> Result<Self> {
        let seconds = parse_clock(text.trim())?;
        Self::from_seconds(seconds, rate)
    }

    /// Parse any supported textual time value:
    /// - `"123"`: a frame index,
    /// - `"12.5s"`: a number of seconds,
    /// - `"00:01:02.500"`: a clock string.
    pub fn parse(text: &str, rate: FrameRate) -> Result<Self> {
        let text = text.trim();
        if let Some(secs) = text.strip_suffix('s') {
            return Self::from_seconds(parse_unsigned_decimal(secs, text)?, rate);
        }
        if text.contains(':') {
            return Self::from_clock_str(text, rate);
        }
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(text, "expected a frame number, seconds or HH:MM:SS[.fff]"));
        }
        let frame = text
            .parse::<u64>()
            .map_err(|_| invalid(text, "frame number out of range"))?;
        Ok(Self { frame, rate })
    }

    /// Frame index.
    #[inline]
    pub fn frames(self) -> u64 {
        self.frame
    }

    /// Frame rate of this timecode.
    #[inline]
    pub fn frame_rate(self) -> FrameRate {
        self.rate
    }

    /// Position in seconds.
    #[inline]
    pub fn seconds(self) -> f64 {
        self.frame as f64 / self.rate.fps()
    }

    /// Position in milliseconds.
    #[inline]
    pub fn millis(self) -> f64 {
        self.seconds() * 1000.0
    }

    /// Format as `HH:MM:SS.mmm`, rounding to the nearest millisecond.
    pub fn to_clock_string(self) -> String {
        let total_ms = self.millis().round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms / 60_000) % 60;
        let secs = (total_ms / 1000) % 60;
        let ms = total_ms % 1000;
        format!("{hours:02}:{minutes:02}:{secs:02}.{ms:03}")
    }

    /// Re-express this timecode at another frame rate (via seconds).
    pub fn at_rate(self, rate: FrameRate) -> Self {
        if self.rate.approx_eq(rate) {
            return Self { rate, ..self };
        }
        let frame = (self.seconds() * rate.fps()).round() as u64;
        Self { frame, rate }
    }

    /// Add a signed number of frames.
    pub fn checked_add_frames(self, delta: i64) -> Result<Self> {
        let frame = self.frame.checked_add_signed(delta).ok_or_else(|| {
            ScenecutError::InvalidTimecode(format!(
                "frame {} + {} is out of range",
                self.frame, delta
            ))
        })?;
        Ok(Self { frame, ..self })
    }

    /// Subtract a number of frames.
    pub fn checked_sub_frames(self, frames: u64) -> Result<Self> {
        let frame = self.frame.checked_sub(frames).ok_or_else(|| {
            ScenecutError::InvalidTimecode(format!(
                "frame {} - {} would be negative",
                self.frame, frames
            ))
        })?;
        Ok(Self { frame, ..self })
    }

    /// Add a signed number of seconds, rounded to whole frames.
    pub fn checked_add_seconds(self, seconds: f64) -> Result<Self> {
        if !seconds.is_finite() {
            return Err(ScenecutError::InvalidTimecode(format!(
                "cannot add {seconds} seconds"
            )));
        }
        let delta = (seconds * self.rate.fps()).round();
        if delta.abs() >= i64::MAX as f64 {
            return Err(ScenecutError::InvalidTimecode(format!(
                "cannot add {seconds} seconds"
            )));
        }
        self.checked_add_frames(delta as i64)
    }

    /// Add another timecode with the same frame rate.
    pub fn checked_add(self, other: &Self) -> Result<Self> {
        self.ensure_same_rate(other)?;
        let frame = self.frame.checked_add(other.frame).ok_or_else(|| {
            ScenecutError::InvalidTimecode("timecode addition overflowed".into())
        })?;
        Ok(Self { frame, ..self })
    }

    /// Subtract another timecode with the same frame rate.
    pub fn checked_sub(self, other: &Self) -> Result<Self> {
        self.ensure_same_rate(other)?;
        self.checked_sub_frames(other.frame)
    }

    /// Order two timecodes, failing if their frame rates differ.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        self.ensure_same_rate(other)?;
        Ok(self.frame.cmp(&other.frame))
    }

    fn ensure_same_rate(&self, other: &Self) -> Result<()> {
        if self.rate.approx_eq(other.rate) {
            Ok(())
        } else {
            Err(ScenecutError::InvalidTimecode(format!(
                "frame rates differ: {} vs {}",
                self.rate, other.rate
            )))
        }
    }
}

impl Add<u64> for Timecode {
    type Output = Self;
    fn add(self, frames: u64) -> Self {
        Self {
            frame: self.frame.saturating_add(frames),
            ..self
        }
    }
}

impl PartialEq for Timecode {
    fn eq(&self, other: &Self) -> bool {
        self.rate.approx_eq(other.rate) && self.frame == other.frame
    }
}

impl PartialOrd for Timecode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_clock_string())
    }
}

fn invalid(text: &str, reason: &str) -> ScenecutError {
    ScenecutError::InvalidTimecode(format!("'{text}': {reason}"))
}

/// Parse `digits[.digits]`; signs, exponents and other characters are rejected.
fn parse_unsigned_decimal(number: &str, text: &str) -> Result<f64> {
    let mut dots = 0;
    for b in number.bytes() {
        match b {
            b'0'..=b'9' => {}
            b'.' => dots += 1,
            _ => return Err(invalid(text, "unexpected character")),
        }
    }
    if number.is_empty() || dots > 1 || number == "." {
        return Err(invalid(text, "malformed number"));
    }
    number
        .parse::<f64>()
        .map_err(|_| invalid(text, "malformed number"))
}

fn parse_clock(text: &str) -> Result<f64> {
    let parts: Vec<&str> = text.split(':').collect();
    let [hours, minutes, seconds] = parts[..] else {
        return Err(invalid(text, "expected HH:MM:SS[.fff]"));
    };
    let whole = |part: &str, what: &str| -> Result<u64> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(text, &format!("malformed {what}")));
        }
        part.parse::<u64>()
            .map_err(|_| invalid(text, &format!("{what} out of range")))
    };
    let hours = whole(hours, "hours")?;
    let minutes = whole(minutes, "minutes")?;
    if minutes >= 60 {
        return Err(invalid(text, "minutes must be below 60"));
    }
    let seconds = parse_unsigned_decimal(seconds, text)?;
    if seconds >= 60.0 {
        return Err(invalid(text, "seconds must be below 60"));
    }
    let whole_seconds = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60))
        .ok_or_else(|| invalid(text, "hours out of range"))?;
    Ok(whole_seconds as f64 + seconds)
}
