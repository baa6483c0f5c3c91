//! Scene manager: streams frames through the registered detectors and
//! turns the collected cuts into a scene list.
//!
//! A manager moves through `Idle -> Streaming -> Finalized`. Detection
//! results can only be queried once finalized; [`SceneManager::clear`]
//! returns to `Idle` for another run. Frames can be read inline or by a
//! prefetch thread feeding a bounded queue.

use crate::detectors::{DetectorConfig, SceneDetector};
use crate::error::{DetectError, DetectResult};
use crate::fade::{CutEvent, CutEvents};
use crate::metric_cache::MetricCache;
use scenecut_core::{FrameBuffer, FrameRate, Timecode};
use scenecut_media::{with_prefetch, CancelHandle, Downscale, FrameSource, PrefetchConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A position in the video, either a frame index or a timecode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePosition {
    Frame(u64),
    Time(Timecode),
}

impl FramePosition {
    /// Frame index at the given stream rate.
    pub fn resolve(self, rate: FrameRate) -> u64 {
        match self {
            Self::Frame(frame) => frame,
            Self::Time(timecode) => timecode.at_rate(rate).frames(),
        }
    }
}

impl From<u64> for FramePosition {
    fn from(frame: u64) -> Self {
        Self::Frame(frame)
    }
}

impl From<Timecode> for FramePosition {
    fn from(timecode: Timecode) -> Self {
        Self::Time(timecode)
    }
}

/// Lifecycle state of a [`SceneManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerState {
    /// Ready to accept detectors and start a run.
    Idle,
    /// Frames are being processed.
    Streaming,
    /// A run completed; results can be queried.
    Finalized,
}

/// Configuration for a [`SceneManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneManagerConfig {
    /// Frame reduction before detection (default: auto, 260 px minimum width).
    pub downscale: Downscale,
    /// Read frames on a prefetch thread; `None` reads inline.
    pub prefetch: Option<PrefetchConfig>,
    /// Detectors registered at construction, in order.
    pub detectors: Vec<DetectorConfig>,
}

impl Default for SceneManagerConfig {
    fn default() -> Self {
        Self {
            downscale: Downscale::default(),
            prefetch: None,
            detectors: vec![DetectorConfig::default()],
        }
    }
}

/// A contiguous span of frames between two cuts, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub start: Timecode,
    pub end: Timecode,
}

impl Scene {
    /// Length of the scene in frames.
    pub fn frame_count(&self) -> u64 {
        self.end.frames() - self.start.frames()
    }
}

/// Summary of a detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub frames_processed: u64,
    pub cuts_found: usize,
    pub downscale_factor: u32,
}

struct RegisteredDetector {
    label: String,
    detector: Box<dyn SceneDetector>,
}

/// Range covered by the last completed run.
#[derive(Debug, Clone, Copy)]
struct Processed {
    start: Timecode,
    frames: u64,
}

impl Processed {
    fn end_frame(&self) -> u64 {
        self.start.frames() + self.frames
    }
}

/// Drives detectors over a frame source and collects their cuts.
pub struct SceneManager {
    config: SceneManagerConfig,
    detectors: Vec<RegisteredDetector>,
    cache: MetricCache,
    cache_path: Option<PathBuf>,
    /// Cut frame to (registration index, event) of the detector that reported it.
    cuts: BTreeMap<u64, (usize, CutEvent)>,
    processed: Option<Processed>,
    state: ManagerState,
    cancel: CancelHandle,
}

impl SceneManager {
    /// Create a manager and register the configured detectors.
    pub fn new(config: SceneManagerConfig) -> DetectResult<Self> {
        let mut manager = Self {
            detectors: Vec::with_capacity(config.detectors.len()),
            config,
            cache: MetricCache::new(),
            cache_path: None,
            cuts: BTreeMap::new(),
            processed: None,
            state: ManagerState::Idle,
            cancel: CancelHandle::new(),
        };
        for detector in manager.config.detectors.clone() {
            manager.add_detector_config(&detector)?;
        }
        Ok(manager)
    }

    /// Persist metrics to `path`, loading it first if it already exists.
    ///
    /// A corrupt file fails with [`DetectError::CacheCorrupt`]; the caller
    /// can delete it and attach again to start from scratch.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> DetectResult<Self> {
        let path = path.into();
        if path.exists() {
            self.cache.load(&path, None)?;
        }
        self.cache_path = Some(path);
        Ok(self)
    }

    /// Register a detector. Only allowed while idle.
    pub fn add_detector(&mut self, detector: Box<dyn SceneDetector>) -> DetectResult<()> {
        self.require_idle("add a detector")?;
        let index = self.detectors.len();
        let label = format!("{}#{}", detector.name(), index);
        match self.cache.register(&label, detector.metric_keys()) {
            Ok(()) => {}
            Err(DetectError::MetricCollision { metric, owner }) => {
                return Err(DetectError::DetectorCollision {
                    detector: label,
                    metric,
                    owner,
                });
            }
            Err(e) => return Err(e),
        }
        debug!(detector = %label, metrics = ?detector.metric_keys(), "Added detector");
        self.detectors.push(RegisteredDetector { label, detector });
        Ok(())
    }

    /// Build and register a detector from its configuration.
    pub fn add_detector_config(&mut self, config: &DetectorConfig) -> DetectResult<()> {
        self.add_detector(config.build()?)
    }

    /// Remove every detector, releasing their metrics. Cached values stay.
    pub fn clear_detectors(&mut self) {
        for entry in self.detectors.drain(..) {
            self.cache.release(&entry.label);
        }
    }

    /// Drop results and detector state and return to idle.
    pub fn clear(&mut self) {
        self.cuts.clear();
        self.processed = None;
        for entry in &mut self.detectors {
            entry.detector.reset();
        }
        self.state = ManagerState::Idle;
    }

    /// Handle that stops a running detection at the next frame.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn metric_cache(&self) -> &MetricCache {
        &self.cache
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Run every detector over `source` from `start` up to `end` (exclusive)
    /// or the end of the stream.
    ///
    /// The source is seeked to `start` if it is not already there. On
    /// failure the partial results are dropped and the manager is idle
    /// again. A cancelled run finalizes with the frames seen so far.
    pub fn detect_scenes<S>(
        &mut self,
        source: &mut S,
        start: impl Into<FramePosition>,
        end: Option<FramePosition>,
    ) -> DetectResult<DetectionStats>
    where
        S: FrameSource + ?Sized,
    {
        self.require_idle("start detection")?;
        let rate = FrameRate::new(source.frame_rate())?;
        if let Some(found) = self.cache.loaded_frame_rate() {
            if !found.approx_eq(rate) {
                return Err(DetectError::CacheFrameRateMismatch {
                    expected: rate.fps(),
                    found: found.fps(),
                });
            }
        }

        let start = start.into().resolve(rate);
        let end = end.map(|end| end.resolve(rate));
        if let Some(end) = end {
            if end <= start {
                return Err(DetectError::invalid_parameter(format!(
                    "end frame {end} must be after start frame {start}"
                )));
            }
        }
        if source.frame_number() != start {
            source.seek(Timecode::from_frames(start, rate))?;
        }

        let frame_size = source.frame_size();
        let factor = self.config.downscale.factor_for(frame_size.0);
        if self.detectors.is_empty() {
            warn!("Detecting scenes without any detector");
        }
        info!(
            start,
            end = ?end,
            fps = rate.fps(),
            width = frame_size.0,
            height = frame_size.1,
            factor,
            prefetch = self.config.prefetch.is_some(),
            "Starting scene detection"
        );

        self.state = ManagerState::Streaming;
        let result = match self.config.prefetch {
            Some(prefetch) => {
                let capacity = prefetch.queue_size(frame_size);
                with_prefetch(source, capacity, |queue| {
                    self.stream(|| queue.next_frame(), start, end, factor)
                })
            }
            None => self.stream(|| source.next_frame(), start, end, factor),
        };
        self.cancel.reset();

        let frames = match result {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "Scene detection failed");
                self.clear();
                return Err(e);
            }
        };
        self.processed = Some(Processed {
            start: Timecode::from_frames(start, rate),
            frames,
        });
        self.state = ManagerState::Finalized;

        let stats = DetectionStats {
            frames_processed: frames,
            cuts_found: self.cuts.len(),
            downscale_factor: factor,
        };
        info!(
            frames = stats.frames_processed,
            cuts = stats.cuts_found,
            "Scene detection finished"
        );
        self.save_cache()?;
        Ok(stats)
    }

    /// Feed frames to the detectors until the source ends, `end` is
    /// reached or the run is cancelled. Returns the number of frames.
    fn stream<N>(&mut self, mut next: N, start: u64, end: Option<u64>, factor: u32) -> DetectResult<u64>
    where
        N: FnMut() -> scenecut_core::Result<Option<FrameBuffer>>,
    {
        let mut frames = 0;
        loop {
            let frame_num = start + frames;
            if end.is_some_and(|end| frame_num >= end) {
                break;
            }
            if self.cancel.is_cancelled() {
                info!(frame = frame_num, "Scene detection cancelled");
                break;
            }
            let Some(frame) = next()? else {
                break;
            };
            let frame = if factor > 1 { frame.downscale(factor) } else { frame };

            for (index, entry) in self.detectors.iter_mut().enumerate() {
                let mut scope = self.cache.scope(&entry.label);
                let events = entry.detector.process_frame(frame_num, &frame, &mut scope)?;
                record_cuts(&mut self.cuts, index, events, start..frame_num + 1);
            }
            frames += 1;
        }

        let end_frame = start + frames;
        for (index, entry) in self.detectors.iter_mut().enumerate() {
            let mut scope = self.cache.scope(&entry.label);
            let events = entry.detector.post_process(end_frame, &mut scope)?;
            record_cuts(&mut self.cuts, index, events, start..end_frame);
        }
        Ok(frames)
    }

    /// Write the metric cache to the attached path if it changed.
    ///
    /// Returns whether a file was written.
    pub fn save_cache(&mut self) -> DetectResult<bool> {
        let Some(path) = self.cache_path.as_deref() else {
            return Ok(false);
        };
        if !self.cache.is_save_required() {
            return Ok(false);
        }
        let rate = self
            .processed
            .map(|p| p.start.frame_rate())
            .or_else(|| self.cache.loaded_frame_rate())
            .ok_or_else(|| DetectError::NotReady("frame rate unknown before the first run".into()))?;
        self.cache.save(path, rate)?;
        Ok(true)
    }

    /// Path the metric cache is persisted to, if any.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Cut events of the last run in frame order.
    pub fn cut_events(&self) -> impl Iterator<Item = CutEvent> + '_ {
        self.cuts.values().map(|&(_, event)| event)
    }

    /// Cut positions of the last run, ascending.
    pub fn cut_list(&self) -> DetectResult<Vec<Timecode>> {
        let processed = self.finalized()?;
        let rate = processed.start.frame_rate();
        Ok(self
            .cuts
            .keys()
            .map(|&frame| Timecode::from_frames(frame, rate))
            .collect())
    }

    /// Split the processed range at the detected cuts.
    ///
    /// With `drop_short`, a scene shorter than `min_scene_len` frames is
    /// merged into the next one; a short final scene is merged into the one
    /// before it. The scenes always cover the processed range exactly.
    pub fn get_scene_list(&self, min_scene_len: u64, drop_short: bool) -> DetectResult<Vec<Scene>> {
        let processed = self.finalized()?;
        if processed.frames == 0 {
            return Ok(Vec::new());
        }
        let rate = processed.start.frame_rate();
        let start = processed.start.frames();
        let end = processed.end_frame();

        let mut boundaries = vec![start];
        for &cut in self.cuts.keys().filter(|&&cut| cut > start && cut < end) {
            let last = boundaries[boundaries.len() - 1];
            if drop_short && cut - last < min_scene_len {
                debug!(cut, "Dropping boundary of short scene");
                continue;
            }
            boundaries.push(cut);
        }
        if drop_short && boundaries.len() > 1 {
            let last = boundaries[boundaries.len() - 1];
            if end - last < min_scene_len {
                boundaries.pop();
            }
        }
        boundaries.push(end);

        Ok(boundaries
            .windows(2)
            .map(|pair| Scene {
                start: Timecode::from_frames(pair[0], rate),
                end: Timecode::from_frames(pair[1], rate),
            })
            .collect())
    }

    fn finalized(&self) -> DetectResult<Processed> {
        match (self.state, self.processed) {
            (ManagerState::Finalized, Some(processed)) => Ok(processed),
            (state, _) => Err(DetectError::NotReady(format!(
                "scene detection has not finished (state: {state:?})"
            ))),
        }
    }

    fn require_idle(&self, action: &str) -> DetectResult<()> {
        if self.state == ManagerState::Idle {
            Ok(())
        } else {
            Err(DetectError::InvalidState(format!(
                "cannot {action} while {:?}",
                self.state
            )))
        }
    }
}

/// Add events to the cut map. On a shared frame the detector registered
/// first keeps the entry. Events outside the frames seen so far are dropped.
fn record_cuts(
    cuts: &mut BTreeMap<u64, (usize, CutEvent)>,
    index: usize,
    events: CutEvents,
    seen: Range<u64>,
) {
    for event in events {
        if !seen.contains(&event.frame) {
            debug!(frame = event.frame, detector = index, "Cut outside processed range dropped");
            continue;
        }
        match cuts.get(&event.frame) {
            Some(&(owner, _)) if owner <= index => {}
            _ => {
                debug!(frame = event.frame, kind = ?event.kind, detector = index, "Cut recorded");
                cuts.insert(event.frame, (index, event));
            }
        }
    }
}
