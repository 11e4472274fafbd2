//! Pipeline stage and renderer side identifiers
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where in the SDK's audio path an adapter is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// After microphone capture, before encode
    CapturePost,
    /// After decode, before playback
    RenderPre,
}

impl ProcessingStage {
    /// Both stages, capture first
    pub const ALL: [Self; 2] = [Self::CapturePost, Self::RenderPre];

    /// Stable name used in logs and configuration keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapturePost => "capture_post",
            Self::RenderPre => "render_pre",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which renderer set a renderer is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererSide {
    /// Locally captured audio (fed from the capture-post stage)
    Local,
    /// Decoded remote audio (fed from the render-pre stage)
    Remote,
}

impl RendererSide {
    /// The processing stage whose frames this side observes
    pub fn stage(&self) -> ProcessingStage {
        match self {
            Self::Local => ProcessingStage::CapturePost,
            Self::Remote => ProcessingStage::RenderPre,
        }
    }
}

impl fmt::Display for RendererSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}
