//! Audio Processing Module
//!
//! What the SDK's audio engine actually talks to: one delegate slot per
//! stage, plus a per-stage bypass switch. Bypassed stages skip their delegate
//! entirely, renderers included.

use audiobridge_core::config::ProcessingSettings;
use audiobridge_core::{AudioBuffer, AudioFormat, ProcessingDelegate, ProcessingStage, SampleRate};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct AudioProcessingModule {
    capture_post: Arc<dyn ProcessingDelegate>,
    render_pre: Arc<dyn ProcessingDelegate>,
    bypass_capture_post: AtomicBool,
    bypass_render_pre: AtomicBool,
}

impl AudioProcessingModule {
    /// Mount one delegate per stage
    pub fn new(
        capture_post: Arc<dyn ProcessingDelegate>,
        render_pre: Arc<dyn ProcessingDelegate>,
    ) -> Self {
        Self::with_settings(capture_post, render_pre, &ProcessingSettings::default())
    }

    /// Mount delegates with bypass flags taken from configuration
    pub fn with_settings(
        capture_post: Arc<dyn ProcessingDelegate>,
        render_pre: Arc<dyn ProcessingDelegate>,
        settings: &ProcessingSettings,
    ) -> Self {
        Self {
            capture_post,
            render_pre,
            bypass_capture_post: AtomicBool::new(settings.bypass_capture_post),
            bypass_render_pre: AtomicBool::new(settings.bypass_render_pre),
        }
    }

    pub fn capture_post_delegate(&self) -> &Arc<dyn ProcessingDelegate> {
        &self.capture_post
    }

    pub fn render_pre_delegate(&self) -> &Arc<dyn ProcessingDelegate> {
        &self.render_pre
    }

    fn delegate(&self, stage: ProcessingStage) -> &Arc<dyn ProcessingDelegate> {
        match stage {
            ProcessingStage::CapturePost => &self.capture_post,
            ProcessingStage::RenderPre => &self.render_pre,
        }
    }

    fn bypass_flag(&self, stage: ProcessingStage) -> &AtomicBool {
        match stage {
            ProcessingStage::CapturePost => &self.bypass_capture_post,
            ProcessingStage::RenderPre => &self.bypass_render_pre,
        }
    }

    /// Enable or disable the bypass for one stage
    ///
    /// Lifecycle events still reach the delegate while bypassed so pairing
    /// stays intact when the bypass is lifted mid-stream.
    pub fn set_bypass(&self, stage: ProcessingStage, bypass: bool) {
        let previous = self.bypass_flag(stage).swap(bypass, Ordering::AcqRel);
        if previous != bypass {
            info!(stage = %stage, bypass, "Stage bypass changed");
        }
    }

    pub fn is_bypassed(&self, stage: ProcessingStage) -> bool {
        self.bypass_flag(stage).load(Ordering::Acquire)
    }

    pub fn stream_started(&self, stage: ProcessingStage, format: AudioFormat) {
        debug!(stage = %stage, ?format, "Stream start");
        self.delegate(stage).on_stream_start(format);
    }

    /// Run one frame through the stage's delegate unless the stage is bypassed
    pub fn process_frame(&self, stage: ProcessingStage, buffer: &mut AudioBuffer) {
        if self.is_bypassed(stage) {
            return;
        }
        self.delegate(stage).on_frame(buffer);
    }

    pub fn stream_stopped(&self, stage: ProcessingStage) {
        debug!(stage = %stage, "Stream stop");
        self.delegate(stage).on_stream_stop();
    }

    pub fn sample_rate_changed(&self, stage: ProcessingStage, sample_rate: SampleRate) {
        debug!(stage = %stage, hz = sample_rate.as_hz(), "Stream sample rate change");
        self.delegate(stage).on_stream_reset(sample_rate);
    }
}

impl fmt::Debug for AudioProcessingModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioProcessingModule")
            .field("bypass_capture_post", &self.is_bypassed(ProcessingStage::CapturePost))
            .field("bypass_render_pre", &self.is_bypassed(ProcessingStage::RenderPre))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl ProcessingDelegate for Recorder {
        fn on_stream_start(&self, _format: AudioFormat) {
            self.0.lock().unwrap().push("start");
        }

        fn on_frame(&self, buffer: &mut AudioBuffer) {
            buffer.samples_mut().fill(1.0);
            self.0.lock().unwrap().push("frame");
        }

        fn on_stream_stop(&self) {
            self.0.lock().unwrap().push("stop");
        }
    }

    fn module() -> (Arc<Recorder>, Arc<Recorder>, AudioProcessingModule) {
        let capture = Arc::new(Recorder::default());
        let render = Arc::new(Recorder::default());
        let module = AudioProcessingModule::new(capture.clone(), render.clone());
        (capture, render, module)
    }

    #[test]
    fn routes_events_by_stage() {
        let (capture, render, module) = module();
        let format = AudioFormat::new(SampleRate::FULLBAND, 1);
        let mut frame = AudioBuffer::silent(4, format);

        module.stream_started(ProcessingStage::RenderPre, format);
        module.process_frame(ProcessingStage::RenderPre, &mut frame);
        module.stream_stopped(ProcessingStage::RenderPre);

        assert!(capture.0.lock().unwrap().is_empty());
        assert_eq!(*render.0.lock().unwrap(), vec!["start", "frame", "stop"]);
    }

    #[test]
    fn bypass_skips_frames_but_not_lifecycle() {
        let (capture, _, module) = module();
        let format = AudioFormat::new(SampleRate::FULLBAND, 1);
        let mut frame = AudioBuffer::silent(4, format);

        module.set_bypass(ProcessingStage::CapturePost, true);
        assert!(module.is_bypassed(ProcessingStage::CapturePost));
        assert!(!module.is_bypassed(ProcessingStage::RenderPre));

        module.stream_started(ProcessingStage::CapturePost, format);
        module.process_frame(ProcessingStage::CapturePost, &mut frame);
        module.stream_stopped(ProcessingStage::CapturePost);

        assert_eq!(frame.samples(), &[0.0; 4]);
        assert_eq!(*capture.0.lock().unwrap(), vec!["start", "stop"]);
    }

    #[test]
    fn bypass_defaults_come_from_settings() {
        let settings = ProcessingSettings {
            bypass_capture_post: false,
            bypass_render_pre: true,
        };
        let module = AudioProcessingModule::with_settings(
            Arc::new(Recorder::default()),
            Arc::new(Recorder::default()),
            &settings,
        );
        assert!(module.is_bypassed(ProcessingStage::RenderPre));
        assert!(!module.is_bypassed(ProcessingStage::CapturePost));
    }
}
