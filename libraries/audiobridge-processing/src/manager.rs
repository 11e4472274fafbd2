//! Audio Pipeline Manager
//!
//! Owns the two stage adapters, the processing module the SDK drives, and
//! the surface the application uses to register processors and renderers.
//!
//! Construct one explicitly and pass it around, or use [`AudioPipelineManager::shared`]
//! for a lazily created process-wide instance.

use crate::adapter::AudioFrameAdapter;
use crate::fanout::RendererFanout;
use crate::module::AudioProcessingModule;
use audiobridge_core::{
    AudioProcessor, AudioRenderer, BridgeConfig, BridgeError, ProcessingStage, RendererSide, Result,
};
use std::sync::{Arc, OnceLock};
use tracing::info;

static SHARED: OnceLock<AudioPipelineManager> = OnceLock::new();

#[derive(Debug)]
pub struct AudioPipelineManager {
    capture_post: Arc<AudioFrameAdapter>,
    render_pre: Arc<AudioFrameAdapter>,
    module: AudioProcessingModule,
}

impl AudioPipelineManager {
    /// Create a manager with default configuration
    pub fn new() -> Self {
        Self::with_config(&BridgeConfig::default())
    }

    /// Create a manager, taking the per-stage bypass flags from `config`
    pub fn with_config(config: &BridgeConfig) -> Self {
        let capture_post = Arc::new(AudioFrameAdapter::new(ProcessingStage::CapturePost));
        let render_pre = Arc::new(AudioFrameAdapter::new(ProcessingStage::RenderPre));
        let module = AudioProcessingModule::with_settings(
            capture_post.clone(),
            render_pre.clone(),
            &config.processing,
        );

        Self {
            capture_post,
            render_pre,
            module,
        }
    }

    /// Process-wide instance, created with default configuration on first use
    ///
    /// Concurrent first calls race safely: exactly one instance is built and
    /// every caller gets it.
    pub fn shared() -> &'static Self {
        SHARED.get_or_init(|| {
            info!("Creating shared audio pipeline manager");
            Self::new()
        })
    }

    /// Install a configured process-wide instance
    ///
    /// # Errors
    /// `BridgeError::AlreadyInitialized` if the shared instance already exists,
    /// whether from an earlier `init_shared` or a call to [`Self::shared`].
    pub fn init_shared(config: &BridgeConfig) -> Result<&'static Self> {
        let mut installed = false;
        let manager = SHARED.get_or_init(|| {
            installed = true;
            Self::with_config(config)
        });

        if installed {
            info!("Installed shared audio pipeline manager");
            Ok(manager)
        } else {
            Err(BridgeError::AlreadyInitialized)
        }
    }

    pub fn add_capture_post_processor(&self, processor: Arc<dyn AudioProcessor>) {
        self.capture_post.add_processing(processor);
    }

    pub fn remove_capture_post_processor(&self, processor: &Arc<dyn AudioProcessor>) {
        self.capture_post.remove_processing(processor);
    }

    pub fn add_render_pre_processor(&self, processor: Arc<dyn AudioProcessor>) {
        self.render_pre.add_processing(processor);
    }

    pub fn remove_render_pre_processor(&self, processor: &Arc<dyn AudioProcessor>) {
        self.render_pre.remove_processing(processor);
    }

    /// Observe local (captured, post-processing) audio
    pub fn add_local_audio_renderer(&self, renderer: Arc<dyn AudioRenderer>) -> bool {
        self.capture_post.add_audio_renderer(renderer)
    }

    pub fn remove_local_audio_renderer(&self, renderer: &Arc<dyn AudioRenderer>) -> bool {
        self.capture_post.remove_audio_renderer(renderer)
    }

    /// Observe remote (decoded, pre-playback) audio
    pub fn add_remote_audio_renderer(&self, renderer: Arc<dyn AudioRenderer>) -> bool {
        self.render_pre.add_audio_renderer(renderer)
    }

    pub fn remove_remote_audio_renderer(&self, renderer: &Arc<dyn AudioRenderer>) -> bool {
        self.render_pre.remove_audio_renderer(renderer)
    }

    /// Add a renderer on the given side
    pub fn add_audio_renderer(&self, side: RendererSide, renderer: Arc<dyn AudioRenderer>) -> bool {
        match side {
            RendererSide::Local => self.add_local_audio_renderer(renderer),
            RendererSide::Remote => self.add_remote_audio_renderer(renderer),
        }
    }

    /// Remove a renderer from the given side
    pub fn remove_audio_renderer(&self, side: RendererSide, renderer: &Arc<dyn AudioRenderer>) -> bool {
        match side {
            RendererSide::Local => self.remove_local_audio_renderer(renderer),
            RendererSide::Remote => self.remove_remote_audio_renderer(renderer),
        }
    }

    /// Unregister every processor on both stages
    ///
    /// Processors that were initialized get exactly one `release`.
    pub fn clear_processors(&self) {
        self.capture_post.clear_processing();
        self.render_pre.clear_processing();
    }

    /// Unregister every processor and every renderer
    pub fn clear_all(&self) {
        self.clear_processors();
        let renderers = self.local_renderers().clear() + self.remote_renderers().clear();
        info!(renderers, "Cleared audio pipeline");
    }

    pub fn capture_post_adapter(&self) -> &Arc<AudioFrameAdapter> {
        &self.capture_post
    }

    pub fn render_pre_adapter(&self) -> &Arc<AudioFrameAdapter> {
        &self.render_pre
    }

    /// Adapter for a stage
    pub fn adapter(&self, stage: ProcessingStage) -> &Arc<AudioFrameAdapter> {
        match stage {
            ProcessingStage::CapturePost => &self.capture_post,
            ProcessingStage::RenderPre => &self.render_pre,
        }
    }

    /// The module handed to the SDK's audio engine
    pub fn module(&self) -> &AudioProcessingModule {
        &self.module
    }

    pub fn local_renderers(&self) -> &Arc<RendererFanout> {
        self.capture_post.renderers()
    }

    pub fn remote_renderers(&self) -> &Arc<RendererFanout> {
        self.render_pre.renderers()
    }
}

impl Default for AudioPipelineManager {
    fn default() -> Self {
        Self::new()
    }
}
