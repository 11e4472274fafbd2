//! Listener traits for the audio bridge

use crate::error::Result;
use crate::types::{AudioBuffer, AudioFormat, SampleRate};

/// External audio processor mounted on a processing stage
///
/// Processors are shared between the control thread that registers them and
/// the real-time audio thread that runs them, so every method takes `&self`;
/// implementations keep their mutable state behind interior mutability.
///
/// Lifecycle for one registration:
/// 1. `initialize` once the stage is streaming (or right away if it already is)
/// 2. `process` once per frame while registered
/// 3. `release` when removed or when the stream stops, exactly once per
///    `initialize`
///
/// # Real-Time Constraints
/// `process` runs on the audio thread:
/// - No blocking operations
/// - No I/O
/// - Avoid allocations
pub trait AudioProcessor: Send + Sync {
    /// Prepare for a stream with the given format
    fn initialize(&self, format: AudioFormat);

    /// Process one frame in place
    ///
    /// The buffer that comes out is handed to the next processor in the
    /// chain. Returning an error is logged and does not stop the chain.
    fn process(&self, buffer: &mut AudioBuffer) -> Result<()>;

    /// Tear down whatever `initialize` set up
    fn release(&self);

    /// Name used in logs
    fn name(&self) -> &str {
        "processor"
    }
}

/// Read-only observer of audio samples
pub trait AudioRenderer: Send + Sync {
    /// Observe one frame
    ///
    /// Must not block; called on the audio thread.
    fn render(&self, buffer: &AudioBuffer);

    /// Name used in logs
    fn name(&self) -> &str {
        "renderer"
    }
}

/// The callback contract the SDK's audio-processing module drives
///
/// One delegate is mounted per stage. The SDK invokes these on its audio
/// thread and owns the buffer for the duration of the call.
pub trait ProcessingDelegate: Send + Sync {
    /// Stream started with the given format
    fn on_stream_start(&self, format: AudioFormat);

    /// One frame of audio; may be modified in place
    fn on_frame(&self, buffer: &mut AudioBuffer);

    /// Stream stopped
    fn on_stream_stop(&self);

    /// Sample rate changed mid-stream
    ///
    /// Default implementation ignores the change.
    fn on_stream_reset(&self, sample_rate: SampleRate) {
        let _ = sample_rate;
    }
}
