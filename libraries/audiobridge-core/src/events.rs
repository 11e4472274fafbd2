//! Bridge Events
//!
//! Events fired from inside the frame-processing path toward the application
//! layer. Emission must never block the audio thread: sinks drop events they
//! cannot deliver right away.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Event name for RMS volume updates
pub const EVENT_VOLUME_PROCESSED: &str = "LK_VOLUME_PROCESSED";

/// Event name for per-band magnitude updates
pub const EVENT_MULTIBAND_PROCESSED: &str = "LK_MULTIBAND_PROCESSED";

/// Event name for raw PCM frames forwarded by an audio sink
pub const EVENT_AUDIO_DATA: &str = "LK_AUDIO_DATA";

/// Events emitted by the built-in renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeEvent {
    /// Average RMS volume of the last analysed frame, in [0, 1]
    VolumeProcessed {
        /// Tag of the renderer that produced it
        id: String,
        /// Average of the per-channel RMS levels
        volume: f32,
    },

    /// Normalized magnitude per frequency band, each in [0, 1]
    MultibandProcessed {
        /// Tag of the renderer that produced it
        id: String,
        /// One entry per band, lowest frequency first
        magnitudes: Vec<f32>,
    },

    /// One frame as interleaved 16-bit little-endian PCM
    AudioData {
        /// Tag of the renderer that produced it
        id: String,
        /// Base64 (standard alphabet, padded) of the PCM bytes
        data: String,
    },
}

impl BridgeEvent {
    /// Application-level event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::VolumeProcessed { .. } => EVENT_VOLUME_PROCESSED,
            Self::MultibandProcessed { .. } => EVENT_MULTIBAND_PROCESSED,
            Self::AudioData { .. } => EVENT_AUDIO_DATA,
        }
    }

    /// Tag of the renderer that produced the event
    pub fn id(&self) -> &str {
        match self {
            Self::VolumeProcessed { id, .. }
            | Self::MultibandProcessed { id, .. }
            | Self::AudioData { id, .. } => id,
        }
    }

    /// JSON body as delivered to the application layer
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Destination for bridge events
///
/// `emit` is called on the audio thread and must return immediately.
pub trait EventSink: Send + Sync {
    /// Deliver `event`, or drop it if it cannot be delivered right away
    fn emit(&self, event: BridgeEvent);
}

/// Event sink backed by a bounded crossbeam channel
///
/// Full or disconnected channels drop the event and bump a counter.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: Sender<BridgeEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelEventSink {
    /// Number of events dropped because the receiver could not keep up
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: BridgeEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(event = event.name(), "Event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(event = event.name(), "Event receiver gone, dropping event");
            }
        }
    }
}

/// Create a bounded event channel
pub fn event_channel(capacity: usize) -> (ChannelEventSink, Receiver<BridgeEvent>) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (
        ChannelEventSink {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        receiver,
    )
}
