//! Hard cut detection from HSV content change between adjacent frames.
//!
//! Slow fades change the picture by a little on every frame and stay below
//! the threshold, so this detector only finds abrupt cuts.

use super::{CutSpacing, SceneDetector};
use crate::color::{HsvDelta, HsvImage};
use crate::error::{DetectError, DetectResult};
use crate::fade::{CutEvent, CutEvents, CutKind};
use crate::metric_cache::MetricScope;
use scenecut_core::FrameBuffer;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CONTENT_VAL: &str = "content_val";
const DELTA_HUE: &str = "delta_hue";
const DELTA_SAT: &str = "delta_sat";
const DELTA_LUM: &str = "delta_lum";

/// Configuration for [`ContentDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Mean HSV change that triggers a cut (default: 30.0).
    pub threshold: f64,
    /// Minimum frames between two cuts (default: 15).
    pub min_scene_len: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            min_scene_len: 15,
        }
    }
}

/// Detects hard cuts from the average change in hue, saturation and value.
pub struct ContentDetector {
    config: ContentConfig,
    keys: Vec<String>,
    spacing: CutSpacing,
    last_hsv: Option<HsvImage>,
}

impl ContentDetector {
    pub fn new(config: ContentConfig) -> DetectResult<Self> {
        if config.threshold.is_nan() || config.threshold <= 0.0 {
            return Err(DetectError::invalid_parameter(format!(
                "content threshold must be positive, got {}",
                config.threshold
            )));
        }
        Ok(Self {
            spacing: CutSpacing::new(config.min_scene_len),
            keys: [CONTENT_VAL, DELTA_HUE, DELTA_SAT, DELTA_LUM]
                .map(String::from)
                .to_vec(),
            config,
            last_hsv: None,
        })
    }

    /// Content change at `frame_num`, from the cache when possible.
    fn content_val(
        &mut self,
        frame_num: u64,
        frame: &FrameBuffer,
        metrics: &mut MetricScope<'_>,
    ) -> DetectResult<Option<f64>> {
        if let Some(value) = metrics.get(frame_num, CONTENT_VAL) {
            if metrics.has_all(frame_num, &self.keys) {
                // The next frame only needs this one's HSV if it is not cached too.
                self.last_hsv = if metrics.has_all(frame_num + 1, &self.keys) {
                    None
                } else {
                    Some(HsvImage::from_frame(frame))
                };
                return Ok(Some(value));
            }
        }

        let curr = HsvImage::from_frame(frame);
        let value = match self.last_hsv.take() {
            Some(prev) => {
                let delta = HsvDelta::between(&prev, &curr)?;
                let value = delta.content_val();
                metrics.put(frame_num, CONTENT_VAL, value)?;
                metrics.put(frame_num, DELTA_HUE, delta.hue)?;
                metrics.put(frame_num, DELTA_SAT, delta.sat)?;
                metrics.put(frame_num, DELTA_LUM, delta.lum)?;
                Some(value)
            }
            None => None,
        };
        self.last_hsv = Some(curr);
        Ok(value)
    }
}

impl SceneDetector for ContentDetector {
    fn name(&self) -> &str {
        "content"
    }

    fn metric_keys(&self) -> &[String] {
        &self.keys
    }

    fn process_frame(
        &mut self,
        frame_num: u64,
        frame: &FrameBuffer,
        metrics: &mut MetricScope<'_>,
    ) -> DetectResult<CutEvents> {
        let mut events = CutEvents::new();
        let Some(value) = self.content_val(frame_num, frame, metrics)? else {
            return Ok(events);
        };
        if value >= self.config.threshold && self.spacing.admit(frame_num) {
            debug!(frame = frame_num, content_val = value, "Content cut");
            events.push(CutEvent::new(frame_num, CutKind::HardCut));
        }
        Ok(events)
    }

    fn reset(&mut self) {
        self.spacing.reset();
        self.last_hsv = None;
    }
}
