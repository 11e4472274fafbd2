//! Audio Bridge Analysis
//!
//! Built-in renderers that watch a stage's audio and report levels to the
//! application layer as [`BridgeEvent`](audiobridge_core::BridgeEvent)s:
//! - [`VolumeRenderer`]: average RMS volume
//! - [`MultibandVolumeRenderer`]: smoothed magnitudes per frequency band
//! - [`AudioSinkRenderer`]: every frame as base64 16-bit PCM
//!
//! All of them only emit once they carry a tag. The level renderers report
//! every `interval_ms` (counted in 10 ms frames).

#![forbid(unsafe_code)]

mod level;
mod multiband;
mod sink;
mod volume;

pub use level::{calculate_peak, calculate_rms, FrameSkipper};
pub use multiband::MultibandVolumeRenderer;
pub use sink::AudioSinkRenderer;
pub use volume::VolumeRenderer;
