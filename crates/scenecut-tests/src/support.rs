//! Shared fixtures for the integration tests.

use scenecut_core::{FrameBuffer, Result, ScenecutError, Timecode};
use scenecut_detect::{Scene, SceneManager, SceneManagerConfig};
use scenecut_detect::DetectorConfig;
use scenecut_media::{FrameSource, ReadOutcome, SyntheticSource};
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Grey 50 before `cut`, grey 200 from `cut` on.
pub fn hard_cut_source(cut: u64, count: u64) -> SyntheticSource {
    SyntheticSource::new(25.0, (64, 36), Some(count), move |f| {
        FrameBuffer::gray(64, 36, if f < cut { 50 } else { 200 })
    })
}

/// Grey 120 with black frames over `black`.
pub fn fade_source(black: std::ops::Range<u64>, count: u64) -> SyntheticSource {
    SyntheticSource::new(25.0, (64, 36), Some(count), move |f| {
        FrameBuffer::gray(64, 36, if black.contains(&f) { 0 } else { 120 })
    })
}

pub fn manager_with(detectors: Vec<DetectorConfig>) -> SceneManager {
    init_tracing();
    SceneManager::new(SceneManagerConfig {
        detectors,
        ..Default::default()
    })
    .unwrap()
}

pub fn scene_frames(scenes: &[Scene]) -> Vec<(u64, u64)> {
    scenes
        .iter()
        .map(|s| (s.start.frames(), s.end.frames()))
        .collect()
}

pub fn cut_frames(manager: &SceneManager) -> Vec<u64> {
    manager.cut_events().map(|event| event.frame).collect()
}

/// Wraps a source and fails the read of one frame, like a broken packet.
pub struct FailingSource {
    pub inner: SyntheticSource,
    pub fail_at: u64,
}

impl FrameSource for FailingSource {
    fn frame_rate(&self) -> f64 {
        self.inner.frame_rate()
    }

    fn frame_size(&self) -> (u32, u32) {
        self.inner.frame_size()
    }

    fn duration(&self) -> Option<Timecode> {
        self.inner.duration()
    }

    fn frame_number(&self) -> u64 {
        self.inner.frame_number()
    }

    fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    fn read(&mut self, decode: bool, advance: bool) -> Result<ReadOutcome> {
        if advance && self.inner.frame_number() == self.fail_at {
            return Err(ScenecutError::Decoder(format!(
                "corrupt packet at frame {}",
                self.fail_at
            )));
        }
        self.inner.read(decode, advance)
    }

    fn seek(&mut self, target: Timecode) -> Result<()> {
        self.inner.seek(target)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }
}
