//! Edge change ratio detection.
//!
//! Each frame is reduced to a binary Sobel edge map. A cut shows up as many
//! edges appearing far from any previous edge (or vanishing far from any new
//! one). A frame with almost no edges counts as faded, which lets the same
//! detector find fades through black or white.

use super::{CutSpacing, SceneDetector};
use crate::error::{DetectError, DetectResult};
use crate::fade::{CutEvent, CutEvents, CutKind, FadeBias, FadeTracker};
use crate::metric_cache::MetricScope;
use scenecut_core::FrameBuffer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for [`EdgeDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Sobel magnitude (L1, divided by 8) that marks an edge pixel (default: 32).
    pub edge_threshold: u8,
    /// Edge change ratio that triggers a cut (default: 0.5).
    pub cut_threshold: f64,
    /// Distance in pixels within which edges are considered unchanged (default: 2).
    pub dilate: u32,
    /// Edge density below which a frame counts as faded (default: 0.002).
    pub fade_density: f64,
    /// Cut placement inside a fade (default: mid).
    pub fade_bias: FadeBias,
    /// Minimum frames between two cuts (default: 15).
    pub min_scene_len: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            edge_threshold: 32,
            cut_threshold: 0.5,
            dilate: 2,
            fade_density: 0.002,
            fade_bias: FadeBias::Mid,
            min_scene_len: 15,
        }
    }
}

/// Binary edge map of one frame.
#[derive(Debug, Clone)]
struct EdgeMap {
    width: usize,
    height: usize,
    edges: Vec<bool>,
    count: usize,
}

impl EdgeMap {
    fn detect(frame: &FrameBuffer, threshold: u8) -> Self {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let luma: Vec<i32> = (0..frame.height)
            .flat_map(|y| (0..frame.width).map(move |x| i32::from(frame.luma_at(x, y))))
            .collect();
        let at = |x: usize, y: usize| luma[y * width + x];

        let mut edges = vec![false; width * height];
        let mut count = 0;
        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
                let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                    - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
                if (gx.abs() + gy.abs()) / 8 >= i32::from(threshold) {
                    edges[y * width + x] = true;
                    count += 1;
                }
            }
        }
        Self {
            width,
            height,
            edges,
            count,
        }
    }

    fn density(&self) -> f64 {
        if self.edges.is_empty() {
            0.0
        } else {
            self.count as f64 / self.edges.len() as f64
        }
    }

    /// Square dilation with the given radius, done as two 1-D passes.
    fn dilated(&self, radius: usize) -> Vec<bool> {
        let (w, h) = (self.width, self.height);
        let mut horizontal = vec![false; w * h];
        for y in 0..h {
            let row = &self.edges[y * w..(y + 1) * w];
            for x in 0..w {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius + 1).min(w);
                horizontal[y * w + x] = row[lo..hi].iter().any(|&e| e);
            }
        }
        let mut out = vec![false; w * h];
        for x in 0..w {
            for y in 0..h {
                let lo = y.saturating_sub(radius);
                let hi = (y + radius + 1).min(h);
                out[y * w + x] = (lo..hi).any(|yy| horizontal[yy * w + x]);
            }
        }
        out
    }

    /// Edge change ratio against the previous frame's map.
    fn change_ratio(&self, prev: &EdgeMap, radius: usize) -> DetectResult<f64> {
        if (self.width, self.height) != (prev.width, prev.height) {
            return Err(DetectError::invalid_parameter(format!(
                "frame size changed from {}x{} to {}x{}",
                prev.width, prev.height, self.width, self.height
            )));
        }
        let entering = fraction_outside(&self.edges, self.count, &prev.dilated(radius));
        let exiting = fraction_outside(&prev.edges, prev.count, &self.dilated(radius));
        Ok(entering.max(exiting))
    }
}

fn fraction_outside(edges: &[bool], count: usize, mask: &[bool]) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let outside = edges
        .iter()
        .zip(mask)
        .filter(|&(&edge, &covered)| edge && !covered)
        .count();
    outside as f64 / count as f64
}

/// Detects cuts and fades from structural (edge) change.
pub struct EdgeDetector {
    config: EdgeConfig,
    keys: Vec<String>,
    fades: FadeTracker,
    spacing: CutSpacing,
    prev_edges: Option<EdgeMap>,
    prev_faded: Option<bool>,
}

impl EdgeDetector {
    pub fn new(config: EdgeConfig) -> DetectResult<Self> {
        if !(0.0..=1.0).contains(&config.cut_threshold) || config.cut_threshold == 0.0 {
            return Err(DetectError::invalid_parameter(format!(
                "cut_threshold must be within (0, 1], got {}",
                config.cut_threshold
            )));
        }
        if !(0.0..1.0).contains(&config.fade_density) {
            return Err(DetectError::invalid_parameter(format!(
                "fade_density must be within [0, 1), got {}",
                config.fade_density
            )));
        }
        Ok(Self {
            fades: FadeTracker::new(config.fade_bias),
            spacing: CutSpacing::new(config.min_scene_len),
            // Both values depend on the edge threshold, and the ratio on the dilation too.
            keys: vec![
                format!("edge_density_{}", config.edge_threshold),
                format!("edge_change_ratio_{}_{}", config.edge_threshold, config.dilate),
            ],
            config,
            prev_edges: None,
            prev_faded: None,
        })
    }
}

impl SceneDetector for EdgeDetector {
    fn name(&self) -> &str {
        "edge"
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
        let threshold = self.config.edge_threshold;
        let radius = self.config.dilate as usize;
        let (density_key, ratio_key) = (&self.keys[0], &self.keys[1]);

        let mut current = None;
        let density = match metrics.get(frame_num, density_key) {
            Some(density) => density,
            None => {
                let map = EdgeMap::detect(frame, threshold);
                let density = map.density();
                metrics.put(frame_num, density_key, density)?;
                current = Some(map);
                density
            }
        };

        let ratio = match metrics.get(frame_num, ratio_key) {
            Some(ratio) => Some(ratio),
            None => match self.prev_edges.take() {
                Some(prev) => {
                    let map = current.get_or_insert_with(|| EdgeMap::detect(frame, threshold));
                    let ratio = map.change_ratio(&prev, radius)?;
                    metrics.put(frame_num, ratio_key, ratio)?;
                    Some(ratio)
                }
                None => None,
            },
        };

        self.prev_edges = if metrics.has_all(frame_num + 1, &self.keys) {
            None
        } else {
            Some(current.unwrap_or_else(|| EdgeMap::detect(frame, threshold)))
        };

        let faded = density < self.config.fade_density;
        let mut events = CutEvents::new();
        if let Some(cut) = self.fades.update(frame_num, faded) {
            if self.spacing.admit(cut) {
                debug!(frame = cut, "Fade detected from edge density");
                events.push(CutEvent::new(cut, CutKind::FadeIn));
            }
        } else if let (false, Some(false), Some(ratio)) = (faded, self.prev_faded, ratio) {
            if ratio >= self.config.cut_threshold && self.spacing.admit(frame_num) {
                debug!(frame = frame_num, ratio, "Edge change cut");
                events.push(CutEvent::new(frame_num, CutKind::HardCut));
            }
        }
        self.prev_faded = Some(faded);
        Ok(events)
    }

    fn reset(&mut self) {
        self.fades.reset();
        self.spacing.reset();
        self.prev_edges = None;
        self.prev_faded = None;
    }
}
