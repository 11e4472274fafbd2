//! Built-in renderers mounted on a live pipeline
//!
//! Volume, multiband and audio sink renderers are attached through renderer tags, fed by
//! the processing module, and report through a bounded event channel.

use audiobridge_analysis::{
    calculate_rms, AudioSinkRenderer, MultibandVolumeRenderer, VolumeRenderer,
};
use audiobridge_core::config::{MultibandSettings, VolumeSettings};
use audiobridge_core::{
    event_channel, AudioBuffer, AudioFormat, AudioRenderer, BridgeEvent, ProcessingStage,
    RendererSide, SampleRate,
};
use audiobridge_processing::{AudioPipelineManager, ClipProcessor, GainProcessor, RendererTags};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use proptest::prelude::*;
use std::f32::consts::PI;
use std::sync::Arc;

fn sine_frame(hz: f32, amplitude: f32, format: AudioFormat) -> AudioBuffer {
    let frames = format.sample_rate.frames_per_10ms();
    let channels = usize::from(format.channels);
    let samples = (0..frames)
        .flat_map(|i| {
            let s = amplitude * (2.0 * PI * hz * i as f32 / format.sample_rate.as_hz() as f32).sin();
            std::iter::repeat(s).take(channels)
        })
        .collect();
    AudioBuffer::new(samples, format)
}

#[test]
fn volume_events_follow_capture_post_audio() {
    let manager = AudioPipelineManager::new();
    let tags = RendererTags::new();
    let (sink, events) = event_channel(64);

    let volume = Arc::new(VolumeRenderer::from_settings(&VolumeSettings::default(), Arc::new(sink)));
    let tag = tags.register(volume.clone());
    volume.set_tag(Some(tag.clone()));
    assert!(tags.attach(&manager, &tag, RendererSide::Local).unwrap());

    // The renderer sees audio after the gain stage
    manager.add_capture_post_processor(Arc::new(GainProcessor::new(0.5)));
    let format = AudioFormat::new(SampleRate::FULLBAND, 2);
    let module = manager.module();
    module.stream_started(ProcessingStage::CapturePost, format);

    for _ in 0..9 {
        let mut frame = AudioBuffer::filled(480, format, 0.8);
        module.process_frame(ProcessingStage::CapturePost, &mut frame);
    }

    let received: Vec<BridgeEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 3, "30 ms interval means one event per three frames");
    for event in &received {
        assert_eq!(event.id(), tag);
        let BridgeEvent::VolumeProcessed { volume, .. } = event else {
            panic!("unexpected event {event:?}");
        };
        assert!((volume - 0.4).abs() < 1e-5);
    }

    assert!(tags.detach(&manager, &tag, RendererSide::Local).unwrap());
    let mut frame = AudioBuffer::filled(480, format, 0.8);
    for _ in 0..3 {
        module.process_frame(ProcessingStage::CapturePost, &mut frame);
    }
    assert!(events.is_empty());
}

#[test]
fn multiband_events_on_remote_side() {
    let manager = AudioPipelineManager::new();
    let (sink, events) = event_channel(64);
    let settings = MultibandSettings {
        interval_ms: 10.0,
        ..MultibandSettings::default()
    };
    let multiband = Arc::new(MultibandVolumeRenderer::new(&settings, Arc::new(sink)));
    multiband.set_tag(Some("speaker".to_string()));
    manager.add_remote_audio_renderer(multiband.clone());

    let format = AudioFormat::new(SampleRate::FULLBAND, 2);
    let mut frame = sine_frame(6000.0, 0.9, format);
    manager
        .module()
        .process_frame(ProcessingStage::RenderPre, &mut frame);

    let event = events.try_recv().unwrap();
    let json = event.to_json().unwrap();
    assert!(json.starts_with(r#"{"id":"speaker","magnitudes":["#));

    let BridgeEvent::MultibandProcessed { magnitudes, .. } = event else {
        panic!("expected multiband event");
    };
    assert_eq!(magnitudes.len(), multiband.bands());
    // 6000 Hz sits in the fourth band (5200-6600 Hz)
    let loudest = magnitudes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i);
    assert_eq!(loudest, Some(3));
}

#[test]
fn audio_sink_forwards_processed_pcm_per_frame() {
    let manager = AudioPipelineManager::new();
    let tags = RendererTags::new();
    let (sink, events) = event_channel(16);

    let recorder = Arc::new(AudioSinkRenderer::new(Arc::new(sink)));
    let tag = tags.register(recorder.clone());
    recorder.set_tag(Some(tag.clone()));
    assert!(tags.attach(&manager, &tag, RendererSide::Local).unwrap());

    manager.add_capture_post_processor(Arc::new(GainProcessor::new(4.0)));
    manager.add_capture_post_processor(Arc::new(ClipProcessor::new()));
    let format = AudioFormat::new(SampleRate::FULLBAND, 2);
    let module = manager.module();
    module.stream_started(ProcessingStage::CapturePost, format);

    for _ in 0..4 {
        let mut frame = AudioBuffer::filled(480, format, 0.5);
        module.process_frame(ProcessingStage::CapturePost, &mut frame);
    }

    let received: Vec<BridgeEvent> = events.try_iter().collect();
    assert_eq!(received.len(), 4, "one event per frame");
    for event in &received {
        assert_eq!(event.name(), "LK_AUDIO_DATA");
        assert_eq!(event.id(), tag);
        let BridgeEvent::AudioData { data, .. } = event else {
            panic!("unexpected event {event:?}");
        };
        let pcm = STANDARD.decode(data).unwrap();
        assert_eq!(pcm.len(), 480 * 2 * 2);
        // Clipped to full scale by the capture chain
        assert!(pcm.chunks_exact(2).all(|s| i16::from_le_bytes([s[0], s[1]]) == i16::MAX));
    }

    recorder.set_tag(None);
    let mut frame = AudioBuffer::filled(480, format, 0.5);
    module.process_frame(ProcessingStage::CapturePost, &mut frame);
    assert!(events.is_empty());
}

#[test]
fn full_event_channel_never_blocks_the_audio_path() {
    let manager = AudioPipelineManager::new();
    let (sink, events) = event_channel(1);
    let sink = Arc::new(sink);
    let volume = Arc::new(VolumeRenderer::new(10.0, sink.clone()));
    volume.set_tag(Some("busy".to_string()));
    manager.add_local_audio_renderer(volume);

    let format = AudioFormat::voice();
    let mut frame = AudioBuffer::filled(480, format, 0.2);
    for _ in 0..10 {
        manager
            .module()
            .process_frame(ProcessingStage::CapturePost, &mut frame);
    }

    assert_eq!(events.len(), 1);
    assert_eq!(sink.dropped(), 9);
}

proptest! {
    /// Property: reported volume stays within [0, 1] for in-range audio
    #[test]
    fn volume_is_bounded(samples in prop::collection::vec(-1.0f32..=1.0, 2..2000)) {
        let format = AudioFormat::new(SampleRate::FULLBAND, 2);
        let buffer = AudioBuffer::new(samples, format);
        let volume = VolumeRenderer::measure(&buffer);
        prop_assert!((0.0..=1.0).contains(&volume));
        prop_assert!(volume.is_finite());
    }

    /// Property: a mono frame's volume equals its RMS
    #[test]
    fn mono_volume_is_rms(samples in prop::collection::vec(-1.0f32..=1.0, 1..1000)) {
        let buffer = AudioBuffer::new(samples.clone(), AudioFormat::voice());
        let expected = calculate_rms(samples);
        prop_assert!((VolumeRenderer::measure(&buffer) - expected).abs() < 1e-6);
    }

    /// Property: band magnitudes are always normalized
    #[test]
    fn multiband_magnitudes_are_normalized(
        hz in 100.0f32..20_000.0,
        amplitude in 0.0f32..=1.0,
        frames in 1usize..5,
    ) {
        let (sink, events) = event_channel(16);
        let settings = MultibandSettings { interval_ms: 10.0, ..MultibandSettings::default() };
        let renderer = MultibandVolumeRenderer::new(&settings, Arc::new(sink));
        renderer.set_tag(Some("p".to_string()));

        let frame = sine_frame(hz, amplitude, AudioFormat::voice());
        for _ in 0..frames {
            renderer.render(&frame);
        }

        for event in events.try_iter() {
            if let BridgeEvent::MultibandProcessed { magnitudes, .. } = event {
                prop_assert!(magnitudes.iter().all(|m| (0.0..=1.0).contains(m)));
            }
        }
    }
}
