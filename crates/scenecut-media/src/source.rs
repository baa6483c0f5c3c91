//! Frame source interface.
//!
//! Decoding lives outside scenecut: a decoder only has to implement
//! [`FrameSource`] to be analysed. [`SyntheticSource`] generates frames
//! in memory and stands in for a decoder in tests and demos.

use scenecut_core::{FrameBuffer, FrameRate, Result, ScenecutError, Timecode};
use tracing::debug;

/// Result of a single [`FrameSource::read`] call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The frame was decoded.
    Decoded(FrameBuffer),
    /// The frame exists but was not decoded (`decode == false`).
    Advanced,
    /// No more frames.
    EndOfStream,
}

/// A source of decoded frames in presentation order.
pub trait FrameSource: Send {
    /// Frame rate reported by the stream. May be zero or negative for
    /// broken inputs; use [`FrameSource::base_timecode`] to validate.
    fn frame_rate(&self) -> f64;

    /// Size of each frame in pixels as (width, height).
    fn frame_size(&self) -> (u32, u32);

    /// Total duration, or `None` for open-ended streams (e.g. cameras).
    fn duration(&self) -> Option<Timecode>;

    /// Index of the frame the next `read` will return.
    fn frame_number(&self) -> u64;

    /// Whether [`FrameSource::seek`] is supported.
    fn is_seekable(&self) -> bool;

    /// Read the next frame, or re-read the last one when `advance` is false.
    fn read(&mut self, decode: bool, advance: bool) -> Result<ReadOutcome>;

    /// Move the read cursor so the next `read` returns `target`.
    fn seek(&mut self, target: Timecode) -> Result<()>;

    /// Rewind to the first frame.
    fn reset(&mut self) -> Result<()>;

    /// Zero timecode at the validated stream frame rate.
    fn base_timecode(&self) -> Result<Timecode> {
        Ok(Timecode::zero(FrameRate::new(self.frame_rate())?))
    }

    /// Current read cursor as a timecode.
    fn position(&self) -> Result<Timecode> {
        Ok(self.base_timecode()? + self.frame_number())
    }

    /// Decode and advance; `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        match self.read(true, true)? {
            ReadOutcome::Decoded(frame) => Ok(Some(frame)),
            ReadOutcome::EndOfStream => Ok(None),
            ReadOutcome::Advanced => Err(ScenecutError::Decoder(
                "source advanced without returning a decoded frame".into(),
            )),
        }
    }
}

type FrameGenerator = Box<dyn FnMut(u64) -> FrameBuffer + Send>;

/// A frame source that synthesises frames on demand.
pub struct SyntheticSource {
    fps: f64,
    size: (u32, u32),
    frame_count: Option<u64>,
    cursor: u64,
    seekable: bool,
    generator: FrameGenerator,
}

impl SyntheticSource {
    /// Create a source whose frame `i` is `generator(i)`.
    ///
    /// `frame_count == None` makes an endless stream.
    pub fn new<G>(fps: f64, size: (u32, u32), frame_count: Option<u64>, generator: G) -> Self
    where
        G: FnMut(u64) -> FrameBuffer + Send + 'static,
    {
        Self {
            fps,
            size,
            frame_count,
            cursor: 0,
            seekable: true,
            generator: Box::new(generator),
        }
    }

    /// Create a source that replays the given frames.
    pub fn from_frames(fps: f64, frames: Vec<FrameBuffer>) -> Self {
        let size = frames.first().map_or((0, 0), |f| (f.width, f.height));
        let count = frames.len() as u64;
        Self::new(fps, size, Some(count), move |index| frames[index as usize].clone())
    }

    /// Disable seeking, like a live capture device.
    pub fn non_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    fn exists(&self, index: u64) -> bool {
        self.frame_count.map_or(true, |count| index < count)
    }
}

impl FrameSource for SyntheticSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> (u32, u32) {
        self.size
    }

    fn duration(&self) -> Option<Timecode> {
        let rate = FrameRate::new(self.fps).ok()?;
        self.frame_count.map(|count| Timecode::from_frames(count, rate))
    }

    fn frame_number(&self) -> u64 {
        self.cursor
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn read(&mut self, decode: bool, advance: bool) -> Result<ReadOutcome> {
        let index = if advance {
            self.cursor
        } else {
            self.cursor.saturating_sub(1)
        };
        if !self.exists(index) {
            return Ok(ReadOutcome::EndOfStream);
        }
        if advance {
            self.cursor += 1;
        }
        if decode {
            Ok(ReadOutcome::Decoded((self.generator)(index)))
        } else {
            Ok(ReadOutcome::Advanced)
        }
    }

    fn seek(&mut self, target: Timecode) -> Result<()> {
        if !self.seekable {
            return Err(ScenecutError::Seek("source is not seekable".into()));
        }
        let rate = FrameRate::new(self.fps)?;
        let mut frame = target.at_rate(rate).frames();
        if let Some(count) = self.frame_count {
            frame = frame.min(count);
        }
        debug!(frame, "Seeking synthetic source");
        self.cursor = frame;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}
