//! Scenecut Detect - scene boundary detection
//!
//! This crate provides:
//! - Streaming detectors for hard cuts, fades and dissolves, plus an
//!   adaptive content detector that decides cuts after the stream ends
//! - The per-frame metric cache with CSV persistence
//! - Fade bias placement shared by the fade-aware detectors
//! - The scene manager that drives detectors and builds the scene list

pub mod color;
pub mod detectors;
pub mod error;
pub mod fade;
pub mod metric_cache;
pub mod scene_manager;

pub use detectors::{
    AdaptiveContentConfig, AdaptiveContentDetector, ContentConfig, ContentDetector,
    DetectorConfig, DissolveConfig, DissolveDetector, EdgeConfig, EdgeDetector, SceneDetector,
    ThresholdConfig, ThresholdDetector,
};
pub use error::{DetectError, DetectResult};
pub use fade::{CutEvent, CutEvents, CutKind, FadeBias, FadeTracker};
pub use metric_cache::{MetricCache, MetricScope};
pub use scene_manager::{
    DetectionStats, FramePosition, ManagerState, Scene, SceneManager, SceneManagerConfig,
};
