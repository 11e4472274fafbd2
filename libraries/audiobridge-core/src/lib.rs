//! Audio Bridge Core
//!
//! Platform-agnostic types, traits, configuration and events shared by the
//! audio bridge crates.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Audio Types**: `AudioBuffer`, `AudioFormat`, `SampleRate`, `ProcessingStage`
//! - **Listener Traits**: `AudioProcessor`, `AudioRenderer`, `ProcessingDelegate`
//! - **Error Handling**: Unified `BridgeError` and `Result` types
//! - **Configuration**: `BridgeConfig`, loaded from file and environment
//! - **Events**: `BridgeEvent` and the non-blocking `EventSink`
//!
//! # Example
//!
//! ```rust
//! use audiobridge_core::{AudioBuffer, AudioFormat, SampleRate};
//!
//! let format = AudioFormat::new(SampleRate::FULLBAND, 2);
//! let buffer = AudioBuffer::silent(format.sample_rate.frames_per_10ms(), format);
//!
//! assert_eq!(buffer.frames(), 480);
//! assert_eq!(buffer.len(), 960);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use events::{event_channel, BridgeEvent, ChannelEventSink, EventSink};
pub use traits::{AudioProcessor, AudioRenderer, ProcessingDelegate};
pub use types::{AudioBuffer, AudioFormat, ProcessingStage, RendererSide, SampleLayout, SampleRate};
