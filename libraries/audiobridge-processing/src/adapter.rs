//! Audio Frame Adapter
//!
//! Fills the SDK's single processing-delegate slot for one stage and fans each
//! frame out to a dynamic set of processors (sequential, in place) and
//! renderers (read-only).
//!
//! # Locking
//!
//! - `control` serializes start, stop, reset, add, remove and clear. It is
//!   never touched by the audio thread except through `try_lock`.
//! - Each registration has its own lifecycle lock. The audio thread only
//!   `try_lock`s it and skips the processor for this frame if a control thread
//!   is mid-transition.
//! - Add/remove/clear issued from inside one of this adapter's callbacks are
//!   queued and applied once the callback has returned. A removal marks the
//!   registration first, so later frames skip it even while a control thread
//!   keeps the queue from draining; only the `release` waits.

use crate::fanout::RendererFanout;
use crate::guard::{lock, read, write, CallbackScope};
use crate::registry::{ProcessOutcome, ProcessorRegistry, Registration, SkipReason};
use audiobridge_core::{
    AudioBuffer, AudioFormat, AudioProcessor, AudioRenderer, ProcessingDelegate, ProcessingStage,
    RendererSide, SampleRate,
};
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};
use tracing::{debug, info, trace, warn};

static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(1);

/// Registry work issued from a callback, applied once the control lock is free
enum PendingOp {
    Add(Arc<dyn AudioProcessor>),
    /// Removal of a processor that was not registered yet when requested
    Remove(Arc<dyn AudioProcessor>),
    /// Registration already marked for removal; only its release is owed
    Retire(Arc<Registration>),
}

/// State guarded by the control mutex
#[derive(Debug, Default)]
struct ControlState {
    /// `Some` while ACTIVE
    format: Option<AudioFormat>,
}

/// Counters describing what the adapter has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// Frames run through the processor chain
    pub frames_processed: u64,
    /// Frames that arrived while IDLE and passed through untouched
    pub idle_frames: u64,
    /// Frames whose format did not match the active stream format
    pub format_mismatches: u64,
    /// Processor calls that returned an error or panicked
    pub processor_failures: u64,
    /// Processor calls skipped because a control thread was busy with that processor
    pub busy_skips: u64,
}

#[derive(Default)]
struct StatsCounters {
    frames_processed: AtomicU64,
    idle_frames: AtomicU64,
    format_mismatches: AtomicU64,
    processor_failures: AtomicU64,
    busy_skips: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AdapterStats {
        AdapterStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            idle_frames: self.idle_frames.load(Ordering::Relaxed),
            format_mismatches: self.format_mismatches.load(Ordering::Relaxed),
            processor_failures: self.processor_failures.load(Ordering::Relaxed),
            busy_skips: self.busy_skips.load(Ordering::Relaxed),
        }
    }
}

/// Processing delegate for one stage
///
/// # Example
///
/// ```rust
/// use audiobridge_core::{AudioBuffer, AudioFormat, ProcessingDelegate, ProcessingStage, SampleRate};
/// use audiobridge_processing::AudioFrameAdapter;
///
/// let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
/// let format = AudioFormat::new(SampleRate::FULLBAND, 2);
///
/// adapter.on_stream_start(format);
/// let mut frame = AudioBuffer::filled(480, format, 0.5);
/// adapter.on_frame(&mut frame);
/// adapter.on_stream_stop();
///
/// assert_eq!(frame.samples()[0], 0.5);
/// assert!(!adapter.is_active());
/// ```
pub struct AudioFrameAdapter {
    id: u64,
    stage: ProcessingStage,
    registry: ProcessorRegistry,
    renderers: Arc<RendererFanout>,
    control: Mutex<ControlState>,
    active: AtomicBool,
    published_format: RwLock<Option<AudioFormat>>,
    pending_tx: Sender<PendingOp>,
    pending_rx: Receiver<PendingOp>,
    stats: StatsCounters,
}

impl AudioFrameAdapter {
    /// Create an IDLE adapter with no listeners
    ///
    /// The renderer fan-out side follows the stage: capture-post feeds the
    /// local renderers, render-pre feeds the remote ones.
    pub fn new(stage: ProcessingStage) -> Self {
        let side = match stage {
            ProcessingStage::CapturePost => RendererSide::Local,
            ProcessingStage::RenderPre => RendererSide::Remote,
        };
        let (pending_tx, pending_rx) = crossbeam_channel::unbounded();

        Self {
            id: NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed),
            stage,
            registry: ProcessorRegistry::new(stage),
            renderers: Arc::new(RendererFanout::new(side)),
            control: Mutex::new(ControlState::default()),
            active: AtomicBool::new(false),
            published_format: RwLock::new(None),
            pending_tx,
            pending_rx,
            stats: StatsCounters::default(),
        }
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Register a processor
    ///
    /// While ACTIVE the processor is initialized right away. Adding a
    /// processor that is already registered does nothing, except that it
    /// withdraws a removal still waiting to be applied.
    pub fn add_processing(&self, processor: Arc<dyn AudioProcessor>) {
        if CallbackScope::is_active(self.id) {
            trace!(stage = %self.stage, "Deferring processor add issued from a callback");
            self.defer(PendingOp::Add(processor));
            return;
        }
        let mut control = lock(&self.control);
        let _scope = CallbackScope::enter(self.id);
        self.add_now(&control, processor);
        self.drain(&mut control);
    }

    /// Unregister a processor
    ///
    /// While ACTIVE the processor is released right away. Removing an unknown
    /// processor does nothing. From inside a callback the processor stops
    /// seeing frames once the current frame is done.
    pub fn remove_processing(&self, processor: &Arc<dyn AudioProcessor>) {
        if CallbackScope::is_active(self.id) {
            match self.registry.find(processor) {
                Some(registration) => self.request_removal(registration),
                None => self.defer(PendingOp::Remove(Arc::clone(processor))),
            }
            return;
        }
        let mut control = lock(&self.control);
        let _scope = CallbackScope::enter(self.id);
        self.remove_now(processor);
        self.drain(&mut control);
    }

    /// Unregister every processor, releasing the initialized ones once
    pub fn clear_processing(&self) {
        if CallbackScope::is_active(self.id) {
            // Queued adds and removals are superseded; owed releases are kept
            let queued: Vec<_> = self.pending_rx.try_iter().collect();
            for op in queued {
                if let PendingOp::Retire(registration) = op {
                    self.defer(PendingOp::Retire(registration));
                }
            }
            for registration in self.registry.snapshot().iter() {
                self.request_removal(Arc::clone(registration));
            }
            return;
        }
        let mut control = lock(&self.control);
        let _scope = CallbackScope::enter(self.id);
        self.clear_now();
        self.drain(&mut control);
    }

    /// Add a renderer to this stage's fan-out; `false` if already present
    pub fn add_audio_renderer(&self, renderer: Arc<dyn AudioRenderer>) -> bool {
        self.renderers.add(renderer)
    }

    /// Remove a renderer from this stage's fan-out; `false` if absent
    pub fn remove_audio_renderer(&self, renderer: &Arc<dyn AudioRenderer>) -> bool {
        self.renderers.remove(renderer)
    }

    /// The fan-out receiving this stage's post-processing frames
    pub fn renderers(&self) -> &Arc<RendererFanout> {
        &self.renderers
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Format of the running stream, `None` while IDLE
    pub fn active_format(&self) -> Option<AudioFormat> {
        *read(&self.published_format)
    }

    pub fn processor_count(&self) -> usize {
        self.registry.len()
    }

    pub fn contains_processor(&self, processor: &Arc<dyn AudioProcessor>) -> bool {
        self.registry.contains(processor)
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    fn defer(&self, op: PendingOp) {
        // The receiver lives as long as `self`, so the send cannot fail
        let _ = self.pending_tx.send(op);
    }

    fn request_removal(&self, registration: Arc<Registration>) {
        if registration.request_removal() {
            trace!(
                stage = %self.stage,
                processor = registration.processor().name(),
                "Removal requested from a callback, release deferred"
            );
            self.defer(PendingOp::Retire(registration));
        }
    }

    /// Apply queued operations; the caller holds the control lock and a scope
    fn drain(&self, control: &mut ControlState) {
        while let Ok(op) = self.pending_rx.try_recv() {
            match op {
                PendingOp::Add(processor) => self.add_now(control, processor),
                PendingOp::Remove(processor) => self.remove_now(&processor),
                PendingOp::Retire(registration) => {
                    // A direct add in the meantime withdrew the removal
                    if registration.is_removal_requested() {
                        self.registry.remove_registration(&registration);
                        registration.retire();
                    }
                }
            }
        }
    }

    fn add_now(&self, control: &ControlState, processor: Arc<dyn AudioProcessor>) {
        let registration = match self.registry.add(Arc::clone(&processor)) {
            Some(registration) => registration,
            None => match self.registry.find(&processor) {
                Some(existing) if existing.cancel_removal() => {
                    debug!(
                        stage = %self.stage,
                        processor = processor.name(),
                        "Pending removal withdrawn by a new add"
                    );
                    existing
                }
                _ => return,
            },
        };
        if let Some(format) = control.format {
            registration.activate(format);
        }
    }

    fn remove_now(&self, processor: &Arc<dyn AudioProcessor>) {
        if let Some(registration) = self.registry.remove(processor) {
            registration.retire();
        }
    }

    fn clear_now(&self) {
        let released = self
            .registry
            .clear()
            .iter()
            .filter(|registration| registration.retire())
            .count();
        if released > 0 {
            debug!(stage = %self.stage, released, "Released cleared processors");
        }
    }

    fn set_format(&self, control: &mut ControlState, format: Option<AudioFormat>) {
        control.format = format;
        *write(&self.published_format) = format;
        self.active.store(format.is_some(), Ordering::Release);
    }

    /// Lock control for a stream event, unless called from our own callback
    fn stream_control(&self, event: &str) -> Option<MutexGuard<'_, ControlState>> {
        if CallbackScope::is_active(self.id) {
            warn!(stage = %self.stage, event, "Stream event issued from a listener callback, ignoring");
            return None;
        }
        Some(lock(&self.control))
    }

    fn try_drain_after_frame(&self) {
        if self.pending_rx.is_empty() {
            return;
        }
        let mut control = match self.control.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // The control thread drains before it unlocks, or the next frame will
            Err(TryLockError::WouldBlock) => return,
        };
        self.drain(&mut control);
    }

    fn run_processors(&self, buffer: &mut AudioBuffer) {
        let snapshot = self.registry.snapshot();
        let mut mismatched = false;

        for registration in snapshot.iter() {
            match registration.try_process(buffer) {
                ProcessOutcome::Processed | ProcessOutcome::Skipped(SkipReason::Inactive) => {}
                ProcessOutcome::Failed(message) => {
                    StatsCounters::bump(&self.stats.processor_failures);
                    warn!(
                        stage = %self.stage,
                        processor = registration.processor().name(),
                        "Processor failed: {}",
                        message
                    );
                }
                ProcessOutcome::Skipped(SkipReason::Busy) => {
                    StatsCounters::bump(&self.stats.busy_skips);
                    trace!(
                        stage = %self.stage,
                        processor = registration.processor().name(),
                        "Processor busy, skipped for this frame"
                    );
                }
                ProcessOutcome::Skipped(SkipReason::FormatMismatch) => mismatched = true,
            }
        }

        if mismatched {
            StatsCounters::bump(&self.stats.format_mismatches);
            debug!(
                stage = %self.stage,
                sample_rate = buffer.format().sample_rate.as_hz(),
                channels = buffer.format().channels,
                "Frame format differs from the active stream, not processed"
            );
        }
        StatsCounters::bump(&self.stats.frames_processed);
    }
}

impl ProcessingDelegate for AudioFrameAdapter {
    fn on_stream_start(&self, format: AudioFormat) {
        if !format.is_valid() {
            warn!(stage = %self.stage, ?format, "Ignoring stream start with invalid format");
            return;
        }
        let Some(mut control) = self.stream_control("start") else {
            return;
        };
        let _scope = CallbackScope::enter(self.id);

        if let Some(previous) = control.format {
            warn!(stage = %self.stage, ?previous, "Stream started while active, restarting");
            for registration in self.registry.snapshot().iter() {
                registration.deactivate();
            }
        }

        self.set_format(&mut control, Some(format));
        let snapshot = self.registry.snapshot();
        for registration in snapshot.iter() {
            registration.activate(format);
        }
        self.drain(&mut control);

        info!(
            stage = %self.stage,
            sample_rate = format.sample_rate.as_hz(),
            channels = format.channels,
            processors = snapshot.len(),
            "Stream started"
        );
    }

    fn on_frame(&self, buffer: &mut AudioBuffer) {
        let _scope = CallbackScope::enter(self.id);

        if self.is_active() {
            self.run_processors(buffer);
        } else {
            StatsCounters::bump(&self.stats.idle_frames);
            trace!(stage = %self.stage, "Frame received while idle, passing through");
        }

        self.renderers.dispatch(buffer);
        self.try_drain_after_frame();
    }

    fn on_stream_stop(&self) {
        let Some(mut control) = self.stream_control("stop") else {
            return;
        };
        let _scope = CallbackScope::enter(self.id);

        if control.format.is_none() {
            debug!(stage = %self.stage, "Stream stop while idle, nothing to release");
            self.drain(&mut control);
            return;
        }

        self.set_format(&mut control, None);
        let released = self
            .registry
            .snapshot()
            .iter()
            .filter(|registration| registration.deactivate())
            .count();
        self.drain(&mut control);

        info!(stage = %self.stage, released, "Stream stopped");
    }

    fn on_stream_reset(&self, sample_rate: SampleRate) {
        let Some(mut control) = self.stream_control("reset") else {
            return;
        };
        let _scope = CallbackScope::enter(self.id);

        let Some(current) = control.format else {
            debug!(stage = %self.stage, "Sample rate change while idle, ignoring");
            return;
        };
        if current.sample_rate == sample_rate {
            return;
        }

        let next = current.with_sample_rate(sample_rate);
        if !next.is_valid() {
            warn!(stage = %self.stage, hz = sample_rate.as_hz(), "Ignoring invalid sample rate");
            return;
        }

        for registration in self.registry.snapshot().iter() {
            registration.deactivate();
        }
        self.set_format(&mut control, Some(next));
        for registration in self.registry.snapshot().iter() {
            registration.activate(next);
        }
        self.drain(&mut control);

        info!(
            stage = %self.stage,
            from = current.sample_rate.as_hz(),
            to = sample_rate.as_hz(),
            "Stream sample rate changed"
        );
    }
}

impl fmt::Debug for AudioFrameAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioFrameAdapter")
            .field("stage", &self.stage)
            .field("active_format", &self.active_format())
            .field("processors", &self.registry.len())
            .field("renderers", &self.renderers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobridge_core::Result;
    use std::sync::Weak;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }
    }

    impl AudioProcessor for Recorder {
        fn initialize(&self, format: AudioFormat) {
            self.events
                .lock()
                .unwrap()
                .push(format!("init {} {}", format.sample_rate.as_hz(), format.channels));
        }

        fn process(&self, buffer: &mut AudioBuffer) -> Result<()> {
            for sample in buffer.samples_mut() {
                *sample += 1.0;
            }
            self.events.lock().unwrap().push("process".to_string());
            Ok(())
        }

        fn release(&self) {
            self.events.lock().unwrap().push("release".to_string());
        }
    }

    /// Removes itself from the adapter during its first `process`
    struct SelfRemoving {
        adapter: Weak<AudioFrameAdapter>,
        me: Mutex<Option<Weak<SelfRemoving>>>,
        recorder: Recorder,
    }

    impl AudioProcessor for SelfRemoving {
        fn initialize(&self, format: AudioFormat) {
            self.recorder.initialize(format);
        }

        fn process(&self, buffer: &mut AudioBuffer) -> Result<()> {
            self.recorder.process(buffer)?;
            let me = self.me.lock().unwrap().take().and_then(|w| w.upgrade());
            if let (Some(adapter), Some(me)) = (self.adapter.upgrade(), me) {
                let handle: Arc<dyn AudioProcessor> = me;
                adapter.remove_processing(&handle);
                assert!(
                    adapter.contains_processor(&handle),
                    "removal must wait for the frame to finish"
                );
            }
            Ok(())
        }

        fn release(&self) {
            self.recorder.release();
        }
    }

    fn format() -> AudioFormat {
        AudioFormat::new(SampleRate::FULLBAND, 2)
    }

    fn recorder() -> (Arc<Recorder>, Arc<dyn AudioProcessor>) {
        let recorder = Arc::new(Recorder::default());
        let handle: Arc<dyn AudioProcessor> = recorder.clone();
        (recorder, handle)
    }

    #[test]
    fn start_initializes_and_stop_releases() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);
        assert!(recorder.events().is_empty(), "no lifecycle calls while idle");

        adapter.on_stream_start(format());
        assert!(adapter.is_active());
        assert_eq!(adapter.active_format(), Some(format()));

        adapter.on_stream_stop();
        assert!(!adapter.is_active());
        assert_eq!(recorder.events(), vec!["init 48000 2", "release"]);
    }

    #[test]
    fn add_while_active_initializes_immediately() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::RenderPre);
        adapter.on_stream_start(format());

        let (recorder, handle) = recorder();
        adapter.add_processing(handle.clone());
        assert_eq!(recorder.events(), vec!["init 48000 2"]);

        adapter.remove_processing(&handle);
        assert_eq!(recorder.events(), vec!["init 48000 2", "release"]);

        adapter.on_stream_stop();
        assert_eq!(recorder.count("release"), 1, "stop must not release again");
    }

    #[test]
    fn duplicate_add_initializes_once() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        adapter.on_stream_start(format());
        let (recorder, handle) = recorder();

        adapter.add_processing(handle.clone());
        adapter.add_processing(handle);
        assert_eq!(adapter.processor_count(), 1);
        assert_eq!(recorder.count("init"), 1);
    }

    #[test]
    fn frames_flow_through_processors_in_order() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (first, a) = recorder();
        let (second, b) = recorder();
        adapter.add_processing(a);
        adapter.add_processing(b);
        adapter.on_stream_start(format());

        let mut frame = AudioBuffer::filled(4, format(), 0.0);
        adapter.on_frame(&mut frame);

        assert_eq!(frame.samples(), &[2.0; 8]);
        assert_eq!(first.count("process"), 1);
        assert_eq!(second.count("process"), 1);
        assert_eq!(adapter.stats().frames_processed, 1);
    }

    #[test]
    fn idle_frames_pass_through_unchanged() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);

        let mut frame = AudioBuffer::filled(4, format(), 0.3);
        adapter.on_frame(&mut frame);

        assert_eq!(frame.samples(), &[0.3; 8]);
        assert_eq!(recorder.count("process"), 0);
        assert_eq!(adapter.stats().idle_frames, 1);
    }

    #[test]
    fn mismatched_frame_is_not_processed() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);
        adapter.on_stream_start(format());

        let mut mono = AudioBuffer::filled(4, AudioFormat::new(SampleRate::FULLBAND, 1), 0.0);
        adapter.on_frame(&mut mono);

        assert_eq!(mono.samples(), &[0.0; 4]);
        assert_eq!(recorder.count("process"), 0);
        assert_eq!(adapter.stats().format_mismatches, 1);
    }

    #[test]
    fn stop_while_idle_is_noop() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);

        adapter.on_stream_stop();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn restart_while_active_pairs_lifecycle() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);

        adapter.on_stream_start(format());
        adapter.on_stream_start(AudioFormat::new(SampleRate::WIDEBAND, 1));
        adapter.on_stream_stop();

        assert_eq!(
            recorder.events(),
            vec!["init 48000 2", "release", "init 16000 1", "release"]
        );
    }

    #[test]
    fn sample_rate_reset_reinitializes() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::RenderPre);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);
        adapter.on_stream_start(format());

        adapter.on_stream_reset(SampleRate::CD_QUALITY);
        adapter.on_stream_reset(SampleRate::CD_QUALITY);

        assert_eq!(
            adapter.active_format(),
            Some(AudioFormat::new(SampleRate::CD_QUALITY, 2))
        );
        assert_eq!(recorder.events(), vec!["init 48000 2", "release", "init 44100 2"]);
    }

    #[test]
    fn reset_while_idle_is_ignored() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::RenderPre);
        adapter.on_stream_reset(SampleRate::CD_QUALITY);
        assert_eq!(adapter.active_format(), None);
    }

    #[test]
    fn clear_releases_initialized_processors_once() {
        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let (recorder, handle) = recorder();
        adapter.add_processing(handle);
        adapter.on_stream_start(format());

        adapter.clear_processing();
        adapter.on_stream_stop();

        assert_eq!(adapter.processor_count(), 0);
        assert_eq!(recorder.events(), vec!["init 48000 2", "release"]);
    }

    #[test]
    fn self_removal_during_process_releases_once() {
        let adapter = Arc::new(AudioFrameAdapter::new(ProcessingStage::CapturePost));
        let remover = Arc::new(SelfRemoving {
            adapter: Arc::downgrade(&adapter),
            me: Mutex::new(None),
            recorder: Recorder::default(),
        });
        *remover.me.lock().unwrap() = Some(Arc::downgrade(&remover));
        let (tail, tail_handle) = recorder();

        adapter.add_processing(remover.clone());
        adapter.add_processing(tail_handle);
        adapter.on_stream_start(format());

        let mut frame = AudioBuffer::filled(4, format(), 0.0);
        adapter.on_frame(&mut frame);

        // Both processors ran on the in-flight frame
        assert_eq!(frame.samples(), &[2.0; 8]);
        assert_eq!(tail.count("process"), 1);
        assert_eq!(adapter.processor_count(), 1);

        adapter.on_stream_stop();
        assert_eq!(
            remover.recorder.events(),
            vec!["init 48000 2", "process", "release"]
        );
    }

    #[test]
    fn requested_removal_skips_frames_while_control_is_held() {
        let adapter = Arc::new(AudioFrameAdapter::new(ProcessingStage::CapturePost));
        let remover = Arc::new(SelfRemoving {
            adapter: Arc::downgrade(&adapter),
            me: Mutex::new(None),
            recorder: Recorder::default(),
        });
        *remover.me.lock().unwrap() = Some(Arc::downgrade(&remover));
        let handle: Arc<dyn AudioProcessor> = remover.clone();
        adapter.add_processing(handle.clone());
        adapter.on_stream_start(format());

        {
            let _held = adapter.control.lock().unwrap();
            for _ in 0..3 {
                let mut frame = AudioBuffer::filled(4, format(), 0.0);
                adapter.on_frame(&mut frame);
            }
            assert!(adapter.contains_processor(&handle), "release still owed");
        }
        assert_eq!(remover.recorder.count("process"), 1);

        // Adding it back before the queue drains keeps it registered
        adapter.add_processing(handle.clone());
        assert!(adapter.contains_processor(&handle));

        let mut frame = AudioBuffer::filled(4, format(), 0.0);
        adapter.on_frame(&mut frame);
        assert_eq!(frame.samples(), &[1.0; 8]);
        assert!(adapter.contains_processor(&handle));

        adapter.on_stream_stop();
        assert_eq!(
            remover.recorder.events(),
            vec!["init 48000 2", "process", "process", "release"]
        );
    }

    #[test]
    fn renderers_see_processed_frames_even_when_idle() {
        #[derive(Default)]
        struct Last(Mutex<Vec<f32>>);

        impl AudioRenderer for Last {
            fn render(&self, buffer: &AudioBuffer) {
                *self.0.lock().unwrap() = buffer.samples().to_vec();
            }
        }

        let adapter = AudioFrameAdapter::new(ProcessingStage::CapturePost);
        let renderer = Arc::new(Last::default());
        assert!(adapter.add_audio_renderer(renderer.clone()));
        assert_eq!(adapter.renderers().side(), RendererSide::Local);

        let mut frame = AudioBuffer::filled(2, format(), 0.1);
        adapter.on_frame(&mut frame);
        assert_eq!(*renderer.0.lock().unwrap(), vec![0.1; 4]);

        let (_, handle) = recorder();
        adapter.add_processing(handle);
        adapter.on_stream_start(format());
        adapter.on_frame(&mut frame);
        assert_eq!(*renderer.0.lock().unwrap(), vec![1.1; 4]);
    }
}
