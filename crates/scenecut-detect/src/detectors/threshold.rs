//! Fade-to-black detection on frame intensity.

use super::{CutSpacing, SceneDetector};
use crate::error::{DetectError, DetectResult};
use crate::fade::{CutEvent, CutEvents, CutKind, FadeBias, FadeTracker};
use crate::metric_cache::MetricScope;
use scenecut_core::FrameBuffer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for [`ThresholdDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Channel value at or below which a pixel counts as dark (default: 12).
    pub threshold: u8,
    /// Fraction of dark channel values that makes a frame black (default: 0.95).
    pub min_percent: f64,
    /// Intensity jump between two lit frames reported as a hard cut (default: 96).
    pub hard_cut_delta: f64,
    /// Minimum frames between two cuts (default: 15).
    pub min_scene_len: u64,
    /// Report a cut where the video fades out for good (default: false).
    pub add_final_scene: bool,
    /// Cut placement inside a fade (default: mid).
    pub fade_bias: FadeBias,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            threshold: 12,
            min_percent: 0.95,
            hard_cut_delta: 96.0,
            min_scene_len: 15,
            add_final_scene: false,
            fade_bias: FadeBias::Mid,
        }
    }
}

/// Detects fades through black and large jumps in average intensity.
pub struct ThresholdDetector {
    config: ThresholdConfig,
    keys: Vec<String>,
    fades: FadeTracker,
    spacing: CutSpacing,
    /// Average intensity of the previous frame, if it was not black.
    last_lit: Option<f64>,
}

impl ThresholdDetector {
    pub fn new(config: ThresholdConfig) -> DetectResult<Self> {
        if !(0.0..=1.0).contains(&config.min_percent) {
            return Err(DetectError::invalid_parameter(format!(
                "min_percent must be within [0, 1], got {}",
                config.min_percent
            )));
        }
        if config.hard_cut_delta.is_nan() || config.hard_cut_delta <= 0.0 {
            return Err(DetectError::invalid_parameter(format!(
                "hard_cut_delta must be positive, got {}",
                config.hard_cut_delta
            )));
        }
        let keys = vec![
            "avg_intensity".to_string(),
            format!("dark_fraction_{}", config.threshold),
        ];
        Ok(Self {
            fades: FadeTracker::new(config.fade_bias),
            spacing: CutSpacing::new(config.min_scene_len),
            keys,
            config,
            last_lit: None,
        })
    }

    fn measure(&self, frame: &FrameBuffer) -> (f64, f64) {
        let mut sum = 0u64;
        let mut dark = 0u64;
        let mut count = 0u64;
        for px in frame.rgb_pixels() {
            for value in px {
                sum += u64::from(value);
                if value <= self.config.threshold {
                    dark += 1;
                }
            }
            count += 3;
        }
        if count == 0 {
            return (0.0, 1.0);
        }
        (sum as f64 / count as f64, dark as f64 / count as f64)
    }
}

impl SceneDetector for ThresholdDetector {
    fn name(&self) -> &str {
        "threshold"
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
        let cached = (
            metrics.get(frame_num, &self.keys[0]),
            metrics.get(frame_num, &self.keys[1]),
        );
        let (avg, dark) = match cached {
            (Some(avg), Some(dark)) => (avg, dark),
            _ => {
                let (avg, dark) = self.measure(frame);
                metrics.put(frame_num, &self.keys[0], avg)?;
                metrics.put(frame_num, &self.keys[1], dark)?;
                (avg, dark)
            }
        };

        let black = dark >= self.config.min_percent;
        let mut events = CutEvents::new();
        if let Some(cut) = self.fades.update(frame_num, black) {
            if self.spacing.admit(cut) {
                debug!(frame = cut, "Fade through black");
                events.push(CutEvent::new(cut, CutKind::FadeIn));
            }
        } else if let (false, Some(prev)) = (black, self.last_lit) {
            if (avg - prev).abs() >= self.config.hard_cut_delta && self.spacing.admit(frame_num) {
                debug!(frame = frame_num, from = prev, to = avg, "Intensity cut");
                events.push(CutEvent::new(frame_num, CutKind::HardCut));
            }
        }
        self.last_lit = (!black).then_some(avg);
        Ok(events)
    }

    fn post_process(&mut self, end_frame: u64, _metrics: &mut MetricScope<'_>) -> DetectResult<CutEvents> {
        let mut events = CutEvents::new();
        if self.config.add_final_scene {
            if let Some(start) = self.fades.pending_fade() {
                if self.spacing.admit(start) {
                    debug!(frame = start, end_frame, "Video ends faded out");
                    events.push(CutEvent::new(start, CutKind::FadeOut));
                }
            }
        }
        Ok(events)
    }

    fn reset(&mut self) {
        self.fades.reset();
        self.spacing.reset();
        self.last_lit = None;
    }
}
