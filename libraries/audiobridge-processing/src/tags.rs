//! Renderer Tags
//!
//! The application layer cannot hold renderer handles directly, so it refers
//! to them by string tag. Tags are random UUIDs handed out at registration.

use crate::guard::{read, write};
use crate::manager::AudioPipelineManager;
use crate::registry::same_listener;
use audiobridge_core::{AudioRenderer, BridgeError, RendererSide, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct RendererTags {
    renderers: RwLock<HashMap<String, Arc<dyn AudioRenderer>>>,
}

impl RendererTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a renderer and return its new tag
    pub fn register(&self, renderer: Arc<dyn AudioRenderer>) -> String {
        let tag = Uuid::new_v4().to_string();
        debug!(tag = %tag, renderer = renderer.name(), "Renderer tagged");
        write(&self.renderers).insert(tag.clone(), renderer);
        tag
    }

    /// Forget a tag, returning the renderer it pointed to
    pub fn unregister_tag(&self, tag: &str) -> Option<Arc<dyn AudioRenderer>> {
        write(&self.renderers).remove(tag)
    }

    /// Forget every tag bound to `renderer`; returns how many were removed
    pub fn unregister(&self, renderer: &Arc<dyn AudioRenderer>) -> usize {
        let mut renderers = write(&self.renderers);
        let before = renderers.len();
        renderers.retain(|_, r| !same_listener(r, renderer));
        before - renderers.len()
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn AudioRenderer>> {
        read(&self.renderers).get(tag).cloned()
    }

    fn lookup(&self, tag: &str) -> Result<Arc<dyn AudioRenderer>> {
        self.get(tag)
            .ok_or_else(|| BridgeError::UnknownRenderer(tag.to_string()))
    }

    /// Start feeding `side` audio to the tagged renderer
    ///
    /// Returns `false` if it was already attached there.
    pub fn attach(&self, manager: &AudioPipelineManager, tag: &str, side: RendererSide) -> Result<bool> {
        let renderer = self.lookup(tag)?;
        Ok(manager.add_audio_renderer(side, renderer))
    }

    /// Stop feeding `side` audio to the tagged renderer
    ///
    /// Returns `false` if it was not attached there.
    pub fn detach(&self, manager: &AudioPipelineManager, tag: &str, side: RendererSide) -> Result<bool> {
        let renderer = self.lookup(tag)?;
        Ok(manager.remove_audio_renderer(side, &renderer))
    }

    pub fn len(&self) -> usize {
        read(&self.renderers).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.renderers).is_empty()
    }
}

impl std::fmt::Debug for RendererTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let renderers = read(&self.renderers);
        let mut tags: Vec<_> = renderers.keys().collect();
        tags.sort();
        f.debug_struct("RendererTags").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobridge_core::AudioBuffer;

    struct Quiet;

    impl AudioRenderer for Quiet {
        fn render(&self, _buffer: &AudioBuffer) {}
    }

    #[test]
    fn tags_are_unique_per_registration() {
        let tags = RendererTags::new();
        let renderer: Arc<dyn AudioRenderer> = Arc::new(Quiet);

        let first = tags.register(renderer.clone());
        let second = tags.register(renderer.clone());
        assert_ne!(first, second);
        assert_eq!(tags.len(), 2);

        assert_eq!(tags.unregister(&renderer), 2);
        assert!(tags.is_empty());
    }

    #[test]
    fn attach_and_detach_follow_the_side() {
        let manager = AudioPipelineManager::new();
        let tags = RendererTags::new();
        let renderer: Arc<dyn AudioRenderer> = Arc::new(Quiet);
        let tag = tags.register(renderer.clone());

        assert!(tags.attach(&manager, &tag, RendererSide::Local).unwrap());
        assert!(!tags.attach(&manager, &tag, RendererSide::Local).unwrap());
        assert!(manager.local_renderers().contains(&renderer));
        assert!(manager.remote_renderers().is_empty());

        assert!(tags.detach(&manager, &tag, RendererSide::Local).unwrap());
        assert!(manager.local_renderers().is_empty());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let manager = AudioPipelineManager::new();
        let tags = RendererTags::new();

        let result = tags.attach(&manager, "missing", RendererSide::Remote);
        assert!(matches!(result, Err(BridgeError::UnknownRenderer(tag)) if tag == "missing"));
        assert!(tags.unregister_tag("missing").is_none());
    }
}
