//! Renderer Fan-out
//!
//! Delivers each frame, read-only, to every registered renderer. Same
//! copy-on-write list as the processor registry, minus the lifecycle.

use crate::guard::{isolate, read, write};
use crate::registry::same_listener;
use audiobridge_core::{AudioBuffer, AudioRenderer, RendererSide};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Set of renderers observing one side of the pipeline
pub struct RendererFanout {
    side: RendererSide,
    renderers: RwLock<Arc<[Arc<dyn AudioRenderer>]>>,
    failures: AtomicU64,
}

impl RendererFanout {
    pub fn new(side: RendererSide) -> Self {
        Self {
            side,
            renderers: RwLock::new(Arc::from(Vec::new())),
            failures: AtomicU64::new(0),
        }
    }

    pub fn side(&self) -> RendererSide {
        self.side
    }

    /// Add a renderer; returns `false` if it was already present
    pub fn add(&self, renderer: Arc<dyn AudioRenderer>) -> bool {
        let mut renderers = write(&self.renderers);
        if renderers.iter().any(|r| same_listener(r, &renderer)) {
            return false;
        }

        debug!(side = %self.side, renderer = renderer.name(), "Renderer added");
        let mut next: Vec<_> = renderers.iter().cloned().collect();
        next.push(renderer);
        *renderers = next.into();
        true
    }

    /// Remove a renderer by identity; returns `false` if it was absent
    pub fn remove(&self, renderer: &Arc<dyn AudioRenderer>) -> bool {
        let mut renderers = write(&self.renderers);
        let Some(index) = renderers.iter().position(|r| same_listener(r, renderer)) else {
            return false;
        };

        let mut next: Vec<_> = renderers.iter().cloned().collect();
        let removed = next.remove(index);
        *renderers = next.into();
        debug!(side = %self.side, renderer = removed.name(), "Renderer removed");
        true
    }

    /// Remove every renderer; returns how many were removed
    pub fn clear(&self) -> usize {
        let mut renderers = write(&self.renderers);
        let count = renderers.len();
        *renderers = Arc::from(Vec::new());
        if count > 0 {
            debug!(side = %self.side, count, "Renderers cleared");
        }
        count
    }

    /// Hand `buffer` to every renderer
    ///
    /// A renderer that panics is logged and counted; the others still get the
    /// frame. Delivery order carries no meaning.
    pub fn dispatch(&self, buffer: &AudioBuffer) {
        let snapshot = Arc::clone(&read(&self.renderers));
        for renderer in snapshot.iter() {
            if let Err(panic) = isolate(|| renderer.render(buffer)) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    side = %self.side,
                    renderer = renderer.name(),
                    "Renderer panicked: {}",
                    panic
                );
            }
        }
    }

    pub fn contains(&self, renderer: &Arc<dyn AudioRenderer>) -> bool {
        read(&self.renderers).iter().any(|r| same_listener(r, renderer))
    }

    pub fn len(&self) -> usize {
        read(&self.renderers).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.renderers).is_empty()
    }

    /// Renderer panics caught so far
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RendererFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererFanout")
            .field("side", &self.side)
            .field("len", &self.len())
            .field("failures", &self.failure_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobridge_core::{AudioFormat, SampleRate};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRenderer {
        frames: Mutex<Vec<Vec<f32>>>,
    }

    impl AudioRenderer for RecordingRenderer {
        fn render(&self, buffer: &AudioBuffer) {
            self.frames.lock().unwrap().push(buffer.samples().to_vec());
        }
    }

    struct PanickingRenderer;

    impl AudioRenderer for PanickingRenderer {
        fn render(&self, _buffer: &AudioBuffer) {
            panic!("renderer broke");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn frame(value: f32) -> AudioBuffer {
        AudioBuffer::filled(4, AudioFormat::new(SampleRate::FULLBAND, 2), value)
    }

    #[test]
    fn add_and_remove_have_set_semantics() {
        let fanout = RendererFanout::new(RendererSide::Local);
        let renderer: Arc<dyn AudioRenderer> = Arc::new(RecordingRenderer::default());

        assert!(fanout.add(renderer.clone()));
        assert!(!fanout.add(renderer.clone()));
        assert_eq!(fanout.len(), 1);

        assert!(fanout.remove(&renderer));
        assert!(!fanout.remove(&renderer));
        assert!(fanout.is_empty());
    }

    #[test]
    fn dispatch_reaches_everyone_despite_panics() {
        let fanout = RendererFanout::new(RendererSide::Remote);
        let first = Arc::new(RecordingRenderer::default());
        let second = Arc::new(RecordingRenderer::default());

        fanout.add(first.clone());
        fanout.add(Arc::new(PanickingRenderer));
        fanout.add(second.clone());

        fanout.dispatch(&frame(0.25));

        assert_eq!(first.frames.lock().unwrap().len(), 1);
        assert_eq!(second.frames.lock().unwrap()[0], vec![0.25; 8]);
        assert_eq!(fanout.failure_count(), 1);
    }

    #[test]
    fn removed_renderer_is_not_invoked() {
        let fanout = RendererFanout::new(RendererSide::Local);
        let recorder = Arc::new(RecordingRenderer::default());
        let handle: Arc<dyn AudioRenderer> = recorder.clone();

        fanout.add(handle.clone());
        fanout.dispatch(&frame(0.5));
        fanout.remove(&handle);
        fanout.dispatch(&frame(0.7));

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], vec![0.5; 8]);
    }

    #[test]
    fn clear_reports_count() {
        let fanout = RendererFanout::new(RendererSide::Local);
        fanout.add(Arc::new(RecordingRenderer::default()));
        fanout.add(Arc::new(RecordingRenderer::default()));
        assert_eq!(fanout.clear(), 2);
        assert_eq!(fanout.clear(), 0);
    }
}
