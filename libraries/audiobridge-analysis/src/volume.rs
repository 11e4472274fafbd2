//! Volume Renderer
//!
//! Reports the average RMS level across channels every `interval_ms`.

use crate::level::{calculate_rms, FrameSkipper};
use audiobridge_core::config::VolumeSettings;
use audiobridge_core::{AudioBuffer, AudioRenderer, BridgeEvent, EventSink};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::trace;

pub struct VolumeRenderer {
    skipper: Mutex<FrameSkipper>,
    tag: RwLock<Option<String>>,
    sink: Arc<dyn EventSink>,
}

impl VolumeRenderer {
    pub fn new(interval_ms: f64, sink: Arc<dyn EventSink>) -> Self {
        Self {
            skipper: Mutex::new(FrameSkipper::from_interval_ms(interval_ms)),
            tag: RwLock::new(None),
            sink,
        }
    }

    pub fn from_settings(settings: &VolumeSettings, sink: Arc<dyn EventSink>) -> Self {
        Self::new(settings.interval_ms, sink)
    }

    /// Set the tag events are reported under; `None` silences the renderer
    pub fn set_tag(&self, tag: Option<String>) {
        *self.tag.write().unwrap_or_else(PoisonError::into_inner) = tag;
    }

    pub fn tag(&self) -> Option<String> {
        self.tag.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Average of the per-channel RMS levels of `buffer`
    pub fn measure(buffer: &AudioBuffer) -> f32 {
        let channels = buffer.channels();
        if channels == 0 || buffer.is_empty() {
            return 0.0;
        }
        let total: f32 = (0..channels).map(|c| calculate_rms(buffer.channel(c))).sum();
        total / channels as f32
    }
}

impl AudioRenderer for VolumeRenderer {
    fn render(&self, buffer: &AudioBuffer) {
        let due = self
            .skipper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tick();
        if !due {
            return;
        }

        let Some(id) = self.tag() else {
            trace!("Volume renderer has no tag, not reporting");
            return;
        };
        let volume = Self::measure(buffer);
        self.sink.emit(BridgeEvent::VolumeProcessed { id, volume });
    }

    fn name(&self) -> &str {
        "Volume"
    }
}

impl fmt::Debug for VolumeRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeRenderer")
            .field("tag", &self.tag())
            .finish_non_exhaustive()
    }
}
