//! Hard cut detection against a rolling average of content change.
//!
//! A frame is a cut when its HSV change stands out from the frames around
//! it. Camera moves and lighting changes keep the change high over several
//! frames in a row, so they do not stand out. The ratio needs frames on
//! both sides, which means cuts are only decided in `post_process`.

use super::{CutSpacing, SceneDetector};
use crate::color::{HsvDelta, HsvImage};
use crate::error::{DetectError, DetectResult};
use crate::fade::{CutEvent, CutEvents, CutKind};
use crate::metric_cache::MetricScope;
use scenecut_core::FrameBuffer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for [`AdaptiveContentDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveContentConfig {
    /// Ratio of a frame's content change to the mean of its neighbours
    /// that triggers a cut (default: 3.0).
    pub adaptive_threshold: f64,
    /// Content change a cut needs regardless of the ratio (default: 5.0).
    pub min_delta_hsv: f64,
    /// Neighbours on each side of a frame (default: 2).
    pub window_width: u64,
    /// Minimum frames between two cuts (default: 15).
    pub min_scene_len: u64,
}

impl Default for AdaptiveContentConfig {
    fn default() -> Self {
        Self {
            adaptive_threshold: 3.0,
            min_delta_hsv: 5.0,
            window_width: 2,
            min_scene_len: 15,
        }
    }
}

/// Detects hard cuts as short peaks in the HSV content change.
pub struct AdaptiveContentDetector {
    config: AdaptiveContentConfig,
    keys: Vec<String>,
    spacing: CutSpacing,
    last_hsv: Option<HsvImage>,
    first_frame: Option<u64>,
}

impl AdaptiveContentDetector {
    pub fn new(config: AdaptiveContentConfig) -> DetectResult<Self> {
        if !config.adaptive_threshold.is_finite() || config.adaptive_threshold <= 0.0 {
            return Err(DetectError::invalid_parameter(format!(
                "adaptive_threshold must be positive, got {}",
                config.adaptive_threshold
            )));
        }
        if config.min_delta_hsv.is_nan() || config.min_delta_hsv < 0.0 {
            return Err(DetectError::invalid_parameter(format!(
                "min_delta_hsv must not be negative, got {}",
                config.min_delta_hsv
            )));
        }
        if config.window_width == 0 {
            return Err(DetectError::invalid_parameter("window_width must be at least 1"));
        }
        Ok(Self {
            spacing: CutSpacing::new(config.min_scene_len),
            keys: vec![
                "adaptive_content_val".to_string(),
                format!("con_val_ratio_{}", config.window_width),
            ],
            config,
            last_hsv: None,
            first_frame: None,
        })
    }
}

impl SceneDetector for AdaptiveContentDetector {
    fn name(&self) -> &str {
        "adaptive_content"
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
        self.first_frame.get_or_insert(frame_num);
        let content_key = &self.keys[0];

        if metrics.has(frame_num, content_key) {
            self.last_hsv = if metrics.has(frame_num + 1, content_key) {
                None
            } else {
                Some(HsvImage::from_frame(frame))
            };
            return Ok(CutEvents::new());
        }

        let curr = HsvImage::from_frame(frame);
        if let Some(prev) = self.last_hsv.take() {
            let value = HsvDelta::between(&prev, &curr)?.content_val();
            metrics.put(frame_num, content_key, value)?;
        }
        self.last_hsv = Some(curr);
        Ok(CutEvents::new())
    }

    fn post_process(&mut self, end_frame: u64, metrics: &mut MetricScope<'_>) -> DetectResult<CutEvents> {
        let mut events = CutEvents::new();
        self.last_hsv = None;
        let Some(start) = self.first_frame.take() else {
            return Ok(events);
        };

        let width = self.config.window_width;
        let (content_key, ratio_key) = (&self.keys[0], &self.keys[1]);
        let values: Vec<f64> = (start..end_frame)
            .map(|f| metrics.get(f, content_key).unwrap_or(0.0))
            .collect();
        let value_at = |f: u64| values[(f - start) as usize];

        // The first frame of a run has no content value, so the window starts one frame later.
        let first = start.saturating_add(width + 1);
        let last = end_frame.saturating_sub(width);
        for frame in first..last {
            let value = value_at(frame);
            let neighbours = (frame - width..=frame + width)
                .filter(|&f| f != frame)
                .map(value_at)
                .sum::<f64>()
                / (2 * width) as f64;

            let ratio = if neighbours > 0.0 {
                let ratio = value / neighbours;
                metrics.put(frame, ratio_key, ratio)?;
                ratio
            } else if value > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };

            if ratio >= self.config.adaptive_threshold
                && value >= self.config.min_delta_hsv
                && self.spacing.admit(frame)
            {
                debug!(frame, content_val = value, ratio, "Adaptive content cut");
                events.push(CutEvent::new(frame, CutKind::HardCut));
            }
        }
        Ok(events)
    }

    fn reset(&mut self) {
        self.spacing.reset();
        self.last_hsv = None;
        self.first_frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{ContentConfig, ContentDetector};
    use crate::metric_cache::MetricCache;

    fn run(
        detector: &mut dyn SceneDetector,
        cache: &mut MetricCache,
        level: impl Fn(u64) -> u8,
        frames: u64,
    ) -> Vec<u64> {
        let owner = format!("{}#0", detector.name());
        cache.register(&owner, detector.metric_keys()).unwrap();
        let mut scope = cache.scope(&owner);
        let mut cuts = Vec::new();
        for f in 0..frames {
            let events = detector
                .process_frame(f, &FrameBuffer::gray(16, 16, level(f)), &mut scope)
                .unwrap();
            cuts.extend(events.iter().map(|e| e.frame));
        }
        let events = detector.post_process(frames, &mut scope).unwrap();
        cuts.extend(events.iter().map(|e| e.frame));
        cuts
    }

    fn adaptive(config: AdaptiveContentConfig) -> AdaptiveContentDetector {
        AdaptiveContentDetector::new(config).unwrap()
    }

    #[test]
    fn test_detects_isolated_peak() {
        let mut detector = adaptive(AdaptiveContentConfig::default());
        let mut cache = MetricCache::new();
        let cuts = run(&mut detector, &mut cache, |f| if f < 40 { 50 } else { 200 }, 100);
        assert_eq!(cuts, vec![40]);
        assert_eq!(cache.get(40, "adaptive_content_val"), Some(50.0));
        // Quiet neighbours of the cut get a zero ratio; the cut itself has no finite one.
        assert_eq!(cache.get(41, "con_val_ratio_2"), Some(0.0));
        assert!(!cache.has(40, "con_val_ratio_2"));
    }

    #[test]
    fn test_sustained_change_is_not_a_cut() {
        // Twenty levels of brightness per frame over 30..40, like a camera pan.
        let ramp = |f: u64| match f {
            0..=29 => 20,
            30..=39 => (20 + (f - 29) * 20) as u8,
            _ => 220,
        };
        let mut detector = adaptive(AdaptiveContentConfig::default());
        assert!(run(&mut detector, &mut MetricCache::new(), ramp, 80).is_empty());

        let mut plain = ContentDetector::new(ContentConfig {
            threshold: 5.0,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(run(&mut plain, &mut MetricCache::new(), ramp, 80), vec![30]);
    }

    #[test]
    fn test_min_scene_len_suppresses_close_cuts() {
        let flash = |f: u64| if (40..48).contains(&f) { 200 } else { 50 };
        let mut detector = adaptive(AdaptiveContentConfig::default());
        assert_eq!(run(&mut detector, &mut MetricCache::new(), flash, 100), vec![40]);

        let mut detector = adaptive(AdaptiveContentConfig {
            min_scene_len: 5,
            ..Default::default()
        });
        assert_eq!(run(&mut detector, &mut MetricCache::new(), flash, 100), vec![40, 48]);
    }

    #[test]
    fn test_small_peak_needs_min_delta() {
        // A change of 6 levels is a content value of 2.
        let mut detector = adaptive(AdaptiveContentConfig::default());
        let level = |f: u64| if f < 40 { 50 } else { 56 };
        assert!(run(&mut detector, &mut MetricCache::new(), level, 100).is_empty());

        let mut detector = adaptive(AdaptiveContentConfig {
            min_delta_hsv: 1.0,
            ..Default::default()
        });
        assert_eq!(run(&mut detector, &mut MetricCache::new(), level, 100), vec![40]);
    }

    #[test]
    fn test_cached_replay() {
        let mut cache = MetricCache::new();
        let mut first = adaptive(AdaptiveContentConfig::default());
        let fresh = run(&mut first, &mut cache, |f| if f < 40 { 50 } else { 200 }, 100);

        let mut second = adaptive(AdaptiveContentConfig::default());
        assert_eq!(run(&mut second, &mut cache, |_| 0, 100), fresh);
    }

    #[test]
    fn test_ratio_metric_follows_window() {
        let detector = adaptive(AdaptiveContentConfig {
            window_width: 3,
            ..Default::default()
        });
        assert_eq!(
            detector.metric_keys(),
            ["adaptive_content_val", "con_val_ratio_3"]
        );
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad = [
            AdaptiveContentConfig {
                window_width: 0,
                ..Default::default()
            },
            AdaptiveContentConfig {
                adaptive_threshold: 0.0,
                ..Default::default()
            },
            AdaptiveContentConfig {
                min_delta_hsv: f64::NAN,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(AdaptiveContentDetector::new(config).is_err());
        }
    }
}
