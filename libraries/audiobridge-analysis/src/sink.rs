//! Audio Sink Renderer
//!
//! Forwards every frame to the application as interleaved 16-bit PCM,
//! base64-encoded, so it can be recorded or streamed outside the SDK.

use audiobridge_core::{AudioBuffer, AudioRenderer, BridgeEvent, EventSink};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

pub struct AudioSinkRenderer {
    tag: RwLock<Option<String>>,
    sink: Arc<dyn EventSink>,
}

impl AudioSinkRenderer {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            tag: RwLock::new(None),
            sink,
        }
    }

    /// Set the tag events are reported under; `None` silences the renderer
    pub fn set_tag(&self, tag: Option<String>) {
        *self.tag.write().unwrap_or_else(PoisonError::into_inner) = tag;
    }

    pub fn tag(&self) -> Option<String> {
        self.tag.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Interleaved little-endian i16 PCM of `buffer`, samples clamped to [-1, 1]
    pub fn encode_pcm16(buffer: &AudioBuffer) -> Vec<u8> {
        let mut channels: Vec<_> = (0..buffer.channels()).map(|c| buffer.channel(c)).collect();
        let mut bytes = Vec::with_capacity(buffer.len() * 2);
        for _ in 0..buffer.frames() {
            for channel in &mut channels {
                let sample = channel.next().unwrap_or(0.0);
                bytes.extend_from_slice(&to_i16(sample).to_le_bytes());
            }
        }
        bytes
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

impl AudioRenderer for AudioSinkRenderer {
    fn render(&self, buffer: &AudioBuffer) {
        let Some(id) = self.tag() else {
            trace!("Audio sink has no tag, not forwarding");
            return;
        };
        let data = STANDARD.encode(Self::encode_pcm16(buffer));
        self.sink.emit(BridgeEvent::AudioData { id, data });
    }

    fn name(&self) -> &str {
        "AudioSink"
    }
}

impl fmt::Debug for AudioSinkRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSinkRenderer")
            .field("tag", &self.tag())
            .finish_non_exhaustive()
    }
}
