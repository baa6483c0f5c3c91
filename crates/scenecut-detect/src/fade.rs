//! Cut events and fade placement.

use crate::error::DetectError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Kind of scene transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutKind {
    /// Abrupt change between two frames.
    HardCut,
    /// The picture came back from black.
    FadeIn,
    /// The picture went to black and stayed there.
    FadeOut,
    /// Gradual blend between two shots.
    Dissolve,
}

/// A scene boundary reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutEvent {
    /// First frame of the new scene.
    pub frame: u64,
    /// Advisory transition kind.
    pub kind: CutKind,
}

impl CutEvent {
    pub fn new(frame: u64, kind: CutKind) -> Self {
        Self { frame, kind }
    }
}

/// Cut events produced for one frame. Almost always zero or one.
pub type CutEvents = SmallVec<[CutEvent; 2]>;

/// Where to place the cut inside a gradual transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeBias {
    /// First frame of the transition.
    In,
    /// Midpoint, rounded up.
    #[default]
    Mid,
    /// Frame where the transition ends.
    Out,
}

impl FadeBias {
    /// Cut frame for a transition spanning `[start, end]`.
    pub fn place(self, start: u64, end: u64) -> u64 {
        let (start, end) = (start.min(end), start.max(end));
        match self {
            Self::In => start,
            Self::Mid => start + (end - start + 1) / 2,
            Self::Out => end,
        }
    }
}

impl FromStr for FadeBias {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(Self::In),
            "mid" => Ok(Self::Mid),
            "out" => Ok(Self::Out),
            other => Err(DetectError::invalid_parameter(format!(
                "unknown fade bias {other:?} (expected in, mid or out)"
            ))),
        }
    }
}

impl fmt::Display for FadeBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "in",
            Self::Mid => "mid",
            Self::Out => "out",
        })
    }
}

/// Tracks fades through black from a per-frame "faded" signal.
///
/// A fade spans from the first faded frame to the first frame that is no
/// longer faded. Black at the very start of the stream is not a fade; the
/// picture coming up from it opens the first scene.
#[derive(Debug, Clone)]
pub struct FadeTracker {
    bias: FadeBias,
    seen_picture: bool,
    fade_start: Option<u64>,
}

impl FadeTracker {
    pub fn new(bias: FadeBias) -> Self {
        Self {
            bias,
            seen_picture: false,
            fade_start: None,
        }
    }

    /// Feed the next frame. Returns the cut frame when a fade completes.
    pub fn update(&mut self, frame: u64, faded: bool) -> Option<u64> {
        if faded {
            if self.seen_picture && self.fade_start.is_none() {
                self.fade_start = Some(frame);
            }
            return None;
        }
        self.seen_picture = true;
        self.fade_start
            .take()
            .map(|start| self.bias.place(start, frame))
    }

    /// Start of a fade that has not finished yet.
    pub fn pending_fade(&self) -> Option<u64> {
        self.fade_start
    }

    pub fn reset(&mut self) {
        self.seen_picture = false;
        self.fade_start = None;
    }
}
