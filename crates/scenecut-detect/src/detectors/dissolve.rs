//! Gradual dissolve detection over a sliding window of HSV deltas.
//!
//! During a dissolve every frame differs a little from the previous one:
//! too little for the content detector, but persistently. A frame is
//! "active" when its delta lies in `[min_delta, max_delta)`; a dissolve is
//! a stretch where most frames of the window are active. One cut is
//! reported per dissolve, placed by the fade bias.

use super::{CutSpacing, SceneDetector};
use crate::color::{HsvDelta, HsvImage};
use crate::error::{DetectError, DetectResult};
use crate::fade::{CutEvent, CutEvents, CutKind, FadeBias};
use crate::metric_cache::MetricScope;
use scenecut_core::FrameBuffer;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

const DISSOLVE_DELTA: &str = "dissolve_delta";

/// Configuration for [`DissolveDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DissolveConfig {
    /// Number of frame deltas in the sliding window (default: 8).
    pub window: usize,
    /// Smallest delta that counts as activity (default: 1.5).
    pub min_delta: f64,
    /// Deltas at or above this are hard cuts, not dissolve steps (default: 30.0).
    pub max_delta: f64,
    /// Share of active frames in the window that opens a dissolve (default: 0.75).
    pub min_active_fraction: f64,
    /// Cut placement inside the dissolve (default: mid).
    pub fade_bias: FadeBias,
    /// Minimum frames between two cuts (default: 15).
    pub min_scene_len: u64,
}

impl Default for DissolveConfig {
    fn default() -> Self {
        Self {
            window: 8,
            min_delta: 1.5,
            max_delta: 30.0,
            min_active_fraction: 0.75,
            fade_bias: FadeBias::Mid,
            min_scene_len: 15,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenDissolve {
    start: u64,
    last_active: u64,
}

/// Detects dissolves between shots.
pub struct DissolveDetector {
    config: DissolveConfig,
    keys: Vec<String>,
    spacing: CutSpacing,
    last_hsv: Option<HsvImage>,
    /// (frame, active) for the most recent deltas.
    window: VecDeque<(u64, bool)>,
    open: Option<OpenDissolve>,
}

impl DissolveDetector {
    pub fn new(config: DissolveConfig) -> DetectResult<Self> {
        if config.window < 2 {
            return Err(DetectError::invalid_parameter(format!(
                "dissolve window must hold at least 2 frames, got {}",
                config.window
            )));
        }
        if !(config.min_delta >= 0.0 && config.min_delta < config.max_delta) {
            return Err(DetectError::invalid_parameter(format!(
                "need 0 <= min_delta < max_delta, got {} and {}",
                config.min_delta, config.max_delta
            )));
        }
        if !(config.min_active_fraction > 0.0 && config.min_active_fraction <= 1.0) {
            return Err(DetectError::invalid_parameter(format!(
                "min_active_fraction must be within (0, 1], got {}",
                config.min_active_fraction
            )));
        }
        Ok(Self {
            spacing: CutSpacing::new(config.min_scene_len),
            window: VecDeque::with_capacity(config.window + 1),
            keys: vec![DISSOLVE_DELTA.to_string()],
            config,
            last_hsv: None,
            open: None,
        })
    }

    fn delta(
        &mut self,
        frame_num: u64,
        frame: &FrameBuffer,
        metrics: &mut MetricScope<'_>,
    ) -> DetectResult<Option<f64>> {
        if let Some(delta) = metrics.get(frame_num, DISSOLVE_DELTA) {
            self.last_hsv = if metrics.has(frame_num + 1, DISSOLVE_DELTA) {
                None
            } else {
                Some(HsvImage::from_frame(frame))
            };
            return Ok(Some(delta));
        }
        let curr = HsvImage::from_frame(frame);
        let delta = match self.last_hsv.take() {
            Some(prev) => {
                let delta = HsvDelta::between(&prev, &curr)?.content_val();
                metrics.put(frame_num, DISSOLVE_DELTA, delta)?;
                Some(delta)
            }
            None => None,
        };
        self.last_hsv = Some(curr);
        Ok(delta)
    }

    fn observe(&mut self, frame_num: u64, delta: f64) -> Option<CutEvent> {
        let active = delta >= self.config.min_delta && delta < self.config.max_delta;
        self.window.push_back((frame_num, active));
        if self.window.len() > self.config.window {
            self.window.pop_front();
        }
        if let (Some(open), true) = (self.open.as_mut(), active) {
            open.last_active = frame_num;
        }
        if self.window.len() < self.config.window {
            return None;
        }

        let active_count = self.window.iter().filter(|(_, a)| *a).count();
        let fraction = active_count as f64 / self.config.window as f64;
        match self.open {
            None if fraction >= self.config.min_active_fraction => {
                let mut active_frames = self.window.iter().filter(|(_, a)| *a).map(|(f, _)| *f);
                let start = active_frames.next()?;
                let last_active = active_frames.last().unwrap_or(start);
                debug!(start, frame = frame_num, "Dissolve started");
                self.open = Some(OpenDissolve { start, last_active });
                None
            }
            Some(open) if fraction < self.config.min_active_fraction => {
                self.open = None;
                self.window.clear();
                self.close(open)
            }
            _ => None,
        }
    }

    fn close(&mut self, open: OpenDissolve) -> Option<CutEvent> {
        let end = open.last_active + 1;
        let cut = self.config.fade_bias.place(open.start, end);
        if self.spacing.admit(cut) {
            debug!(start = open.start, end, cut, "Dissolve detected");
            Some(CutEvent::new(cut, CutKind::Dissolve))
        } else {
            None
        }
    }
}

impl SceneDetector for DissolveDetector {
    fn name(&self) -> &str {
        "dissolve"
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
        if let Some(delta) = self.delta(frame_num, frame, metrics)? {
            events.extend(self.observe(frame_num, delta));
        }
        Ok(events)
    }

    fn post_process(&mut self, _end_frame: u64, _metrics: &mut MetricScope<'_>) -> DetectResult<CutEvents> {
        let mut events = CutEvents::new();
        if let Some(open) = self.open.take() {
            events.extend(self.close(open));
        }
        self.window.clear();
        Ok(events)
    }

    fn reset(&mut self) {
        self.spacing.reset();
        self.last_hsv = None;
        self.window.clear();
        self.open = None;
    }
}
