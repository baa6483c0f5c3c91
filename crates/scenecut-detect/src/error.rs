//! Error types for detection, the metric cache and the scene manager.

use scenecut_core::ScenecutError;
use thiserror::Error;

/// Errors that can occur while detecting scenes.
#[derive(Debug, Error)]
pub enum DetectError {
    /// A metric is already owned by another detector.
    #[error("Metric {metric} is already registered by {owner}")]
    MetricCollision { metric: String, owner: String },

    /// A detector could not be added because one of its metrics is taken.
    #[error("Detector {detector} collides with {owner} on metric {metric}")]
    DetectorCollision {
        detector: String,
        metric: String,
        owner: String,
    },

    /// Read or write of a metric the caller does not own.
    #[error("Metric not registered: {0}")]
    MetricNotRegistered(String),

    /// A stored metric value would be replaced by a different one.
    #[error("Metric {metric} at frame {frame} already holds {existing}, refusing {value}")]
    MetricOverwrite {
        frame: u64,
        metric: String,
        existing: f64,
        value: f64,
    },

    /// The persisted metric cache failed validation.
    #[error("Corrupt metric cache (line {line}): {reason}")]
    CacheCorrupt { line: usize, reason: String },

    /// The persisted metric cache was written for a different frame rate.
    #[error("Metric cache frame rate {found} fps does not match {expected} fps")]
    CacheFrameRateMismatch { expected: f64, found: f64 },

    /// Results requested before detection finished.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Operation not allowed in the current scene manager state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Time, frame or frame source error.
    #[error(transparent)]
    Core(#[from] ScenecutError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DetectError {
    pub(crate) fn corrupt(line: usize, reason: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::Core(ScenecutError::InvalidParameter(message.into()))
    }
}

/// Result type alias for detection operations.
pub type DetectResult<T> = std::result::Result<T, DetectError>;
