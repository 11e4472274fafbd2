//! Audio and pipeline types

mod audio;
mod stage;

pub use audio::{AudioBuffer, AudioFormat, SampleLayout, SampleRate};
pub use stage::{ProcessingStage, RendererSide};
