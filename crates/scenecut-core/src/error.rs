//! Error types for scenecut.

use thiserror::Error;

/// Main error type for time, frame and frame-source operations.
#[derive(Error, Debug)]
pub enum ScenecutError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid timecode: {0}")]
    InvalidTimecode(String),

    #[error("Invalid frame rate: {0} fps")]
    InvalidFrameRate(f64),

    #[error("Seek error: {0}")]
    Seek(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias for scenecut operations.
pub type Result<T> = std::result::Result<T, ScenecutError>;
