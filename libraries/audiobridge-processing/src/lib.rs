//! Audio Bridge Processing
//!
//! Fan-out between the SDK's per-stage audio-processing callback slots and
//! any number of application listeners.
//!
//! This crate provides:
//! - `ProcessorRegistry`: ordered, copy-on-write processor list per stage
//! - `AudioFrameAdapter`: the delegate filling one SDK slot; pairs
//!   `initialize`/`release` across start, stop, add and remove
//! - `RendererFanout`: read-only delivery of frames to renderers
//! - `AudioProcessingModule`: the handle the SDK's audio engine drives
//! - `AudioPipelineManager`: owner of both stages and the registration surface
//! - `RendererTags`: string tags for renderers held by the application layer
//!
//! # Example
//!
//! ```rust
//! use audiobridge_core::{AudioBuffer, AudioFormat, ProcessingStage, SampleRate};
//! use audiobridge_processing::{AudioPipelineManager, ClipProcessor, GainProcessor};
//! use std::sync::Arc;
//!
//! let manager = AudioPipelineManager::new();
//! manager.add_capture_post_processor(Arc::new(GainProcessor::new(2.0)));
//! manager.add_capture_post_processor(Arc::new(ClipProcessor::new()));
//!
//! let format = AudioFormat::new(SampleRate::FULLBAND, 2);
//! let module = manager.module();
//! module.stream_started(ProcessingStage::CapturePost, format);
//!
//! let mut frame = AudioBuffer::filled(480, format, 0.9);
//! module.process_frame(ProcessingStage::CapturePost, &mut frame);
//! assert!(frame.samples().iter().all(|&s| s == 1.0));
//!
//! module.stream_stopped(ProcessingStage::CapturePost);
//! ```

#![forbid(unsafe_code)]

mod adapter;
mod fanout;
mod guard;
mod manager;
mod module;
mod processors;
mod registry;
mod tags;

pub use adapter::{AdapterStats, AudioFrameAdapter};
pub use fanout::RendererFanout;
pub use manager::AudioPipelineManager;
pub use module::AudioProcessingModule;
pub use processors::{ClipProcessor, GainProcessor};
pub use registry::{ProcessorRegistry, Registration, Snapshot};
pub use tags::RendererTags;
