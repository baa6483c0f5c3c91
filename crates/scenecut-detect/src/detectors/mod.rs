//! Scene detection algorithms.
//!
//! Each detector consumes frames in order, keeps whatever history it needs,
//! and reports cut events. Per-frame metrics go through a [`MetricScope`]
//! so a later run can reuse them instead of touching pixels again.

mod adaptive;
mod content;
mod dissolve;
mod edge;
mod threshold;

pub use adaptive::{AdaptiveContentConfig, AdaptiveContentDetector};
pub use content::{ContentConfig, ContentDetector};
pub use dissolve::{DissolveConfig, DissolveDetector};
pub use edge::{EdgeConfig, EdgeDetector};
pub use threshold::{ThresholdConfig, ThresholdDetector};

use crate::error::DetectResult;
use crate::fade::CutEvents;
use crate::metric_cache::MetricScope;
use scenecut_core::FrameBuffer;
use serde::{Deserialize, Serialize};

/// A streaming scene detection algorithm.
pub trait SceneDetector: Send {
    /// Short name used in owner labels and logs.
    fn name(&self) -> &str;

    /// Metrics this detector writes to the cache.
    fn metric_keys(&self) -> &[String];

    /// Process frame `frame_num`. Frames arrive in ascending order.
    fn process_frame(
        &mut self,
        frame_num: u64,
        frame: &FrameBuffer,
        metrics: &mut MetricScope<'_>,
    ) -> DetectResult<CutEvents>;

    /// Called once after the last frame; `end_frame` is one past it.
    fn post_process(&mut self, _end_frame: u64, _metrics: &mut MetricScope<'_>) -> DetectResult<CutEvents> {
        Ok(CutEvents::new())
    }

    /// Forget all per-stream state.
    fn reset(&mut self);
}

/// Configuration for one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    Threshold(ThresholdConfig),
    Content(ContentConfig),
    AdaptiveContent(AdaptiveContentConfig),
    Edge(EdgeConfig),
    Dissolve(DissolveConfig),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::Content(ContentConfig::default())
    }
}

impl DetectorConfig {
    /// Validate the configuration and build the detector.
    pub fn build(&self) -> DetectResult<Box<dyn SceneDetector>> {
        Ok(match self {
            Self::Threshold(config) => Box::new(ThresholdDetector::new(config.clone())?),
            Self::Content(config) => Box::new(ContentDetector::new(config.clone())?),
            Self::AdaptiveContent(config) => {
                Box::new(AdaptiveContentDetector::new(config.clone())?)
            }
            Self::Edge(config) => Box::new(EdgeDetector::new(config.clone())?),
            Self::Dissolve(config) => Box::new(DissolveDetector::new(config.clone())?),
        })
    }
}

/// Suppresses cuts closer than `min_scene_len` frames to the previous one.
#[derive(Debug, Clone)]
pub(crate) struct CutSpacing {
    min_scene_len: u64,
    last_cut: Option<u64>,
}

impl CutSpacing {
    pub(crate) fn new(min_scene_len: u64) -> Self {
        Self {
            min_scene_len,
            last_cut: None,
        }
    }

    /// Accept `frame` as a cut if it is far enough from the previous one.
    pub(crate) fn admit(&mut self, frame: u64) -> bool {
        let allowed = match self.last_cut {
            Some(last) => frame >= last && frame - last >= self.min_scene_len,
            None => true,
        };
        if allowed {
            self.last_cut = Some(frame);
        }
        allowed
    }

    pub(crate) fn reset(&mut self) {
        self.last_cut = None;
    }
}
