//! Processor Registry
//!
//! Ordered set of processors mounted on one stage. The list is copy-on-write:
//! mutations build a new list and swap it in, while the audio thread clones
//! the current `Arc` and iterates that snapshot without holding any lock.
//!
//! Each entry is a [`Registration`] that tracks where its processor is in the
//! initialize/release lifecycle. Registry membership alone never triggers
//! lifecycle calls; the adapter drives those.

use crate::guard::{isolate, lock, read, write};
use audiobridge_core::{AudioBuffer, AudioFormat, AudioProcessor, ProcessingStage};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use tracing::{debug, warn};

/// Immutable view of the registry used for one dispatch pass
pub type Snapshot = Arc<[Arc<Registration>]>;

/// Identity comparison for shared listener handles
pub(crate) fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Registered, waiting for a stream
    Pending,
    /// `initialize` was called with this format; `release` is owed
    Initialized(AudioFormat),
    /// Removed from the registry; terminal
    Retired,
}

/// Result of offering a frame to one registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProcessOutcome {
    Processed,
    Failed(String),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// A control thread is initializing or releasing this processor right now
    Busy,
    /// Not initialized yet, already released, or removal requested
    Inactive,
    /// The frame does not match the format the processor was initialized with
    FormatMismatch,
}

/// One processor's membership in a registry
pub struct Registration {
    processor: Arc<dyn AudioProcessor>,
    stage: ProcessingStage,
    lifecycle: Mutex<Lifecycle>,
    /// Set by a removal issued from a callback; frames skip the processor from then on
    removal_requested: AtomicBool,
}

impl Registration {
    fn new(processor: Arc<dyn AudioProcessor>, stage: ProcessingStage) -> Self {
        Self {
            processor,
            stage,
            lifecycle: Mutex::new(Lifecycle::Pending),
            removal_requested: AtomicBool::new(false),
        }
    }

    /// The registered processor
    pub fn processor(&self) -> &Arc<dyn AudioProcessor> {
        &self.processor
    }

    /// Whether `initialize` has been called without a matching `release`
    pub fn is_initialized(&self) -> bool {
        matches!(*lock(&self.lifecycle), Lifecycle::Initialized(_))
    }

    /// Whether this registration has been removed
    pub fn is_retired(&self) -> bool {
        *lock(&self.lifecycle) == Lifecycle::Retired
    }

    /// Whether a removal is waiting to be applied by the control side
    pub fn is_removal_requested(&self) -> bool {
        self.removal_requested.load(Ordering::Acquire)
    }

    /// Mark for removal; returns `false` if already marked
    pub(crate) fn request_removal(&self) -> bool {
        !self.removal_requested.swap(true, Ordering::AcqRel)
    }

    /// Withdraw a pending removal; returns whether one was pending
    pub(crate) fn cancel_removal(&self) -> bool {
        self.removal_requested.swap(false, Ordering::AcqRel)
    }

    /// Pending -> Initialized; returns whether `initialize` was called
    ///
    /// Registrations marked for removal stay pending.
    pub(crate) fn activate(&self, format: AudioFormat) -> bool {
        let mut state = lock(&self.lifecycle);
        if *state != Lifecycle::Pending || self.is_removal_requested() {
            return false;
        }

        if let Err(panic) = isolate(|| self.processor.initialize(format)) {
            warn!(
                stage = %self.stage,
                processor = self.processor.name(),
                "Processor panicked during initialize: {}",
                panic
            );
        }
        // A release is owed even if initialize panicked half-way
        *state = Lifecycle::Initialized(format);
        true
    }

    /// Initialized -> Pending (stream stopped); returns whether `release` was called
    pub(crate) fn deactivate(&self) -> bool {
        let mut state = lock(&self.lifecycle);
        if !matches!(*state, Lifecycle::Initialized(_)) {
            return false;
        }
        self.release_locked();
        *state = Lifecycle::Pending;
        true
    }

    /// Any -> Retired; releases first if initialized. Returns whether `release` was called.
    pub(crate) fn retire(&self) -> bool {
        let mut state = lock(&self.lifecycle);
        let released = match *state {
            Lifecycle::Initialized(_) => {
                self.release_locked();
                true
            }
            Lifecycle::Pending | Lifecycle::Retired => false,
        };
        *state = Lifecycle::Retired;
        released
    }

    fn release_locked(&self) {
        if let Err(panic) = isolate(|| self.processor.release()) {
            warn!(
                stage = %self.stage,
                processor = self.processor.name(),
                "Processor panicked during release: {}",
                panic
            );
        }
    }

    /// Run the processor on `buffer` without ever blocking
    pub(crate) fn try_process(&self, buffer: &mut AudioBuffer) -> ProcessOutcome {
        if self.is_removal_requested() {
            return ProcessOutcome::Skipped(SkipReason::Inactive);
        }
        let state = match self.lifecycle.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return ProcessOutcome::Skipped(SkipReason::Busy),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let Lifecycle::Initialized(format) = *state else {
            return ProcessOutcome::Skipped(SkipReason::Inactive);
        };
        if buffer.format() != format {
            return ProcessOutcome::Skipped(SkipReason::FormatMismatch);
        }

        // The lifecycle lock stays held so release cannot run concurrently
        match isolate(|| self.processor.process(buffer)) {
            Ok(Ok(())) => ProcessOutcome::Processed,
            Ok(Err(err)) => ProcessOutcome::Failed(err.to_string()),
            Err(panic) => ProcessOutcome::Failed(format!("panicked: {panic}")),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Registration");
        debug
            .field("processor", &self.processor.name())
            .field("stage", &self.stage)
            .field("removal_requested", &self.is_removal_requested());
        match self.lifecycle.try_lock() {
            Ok(state) => debug.field("lifecycle", &*state),
            Err(_) => debug.field("lifecycle", &"<busy>"),
        };
        debug.finish()
    }
}

/// Ordered, duplicate-free processor list for one stage
pub struct ProcessorRegistry {
    stage: ProcessingStage,
    entries: RwLock<Snapshot>,
}

impl ProcessorRegistry {
    /// Create an empty registry
    pub fn new(stage: ProcessingStage) -> Self {
        Self {
            stage,
            entries: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Stage this registry belongs to
    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    /// Append a processor
    ///
    /// Returns the new registration, or `None` if the processor is already
    /// registered (duplicate adds are no-ops).
    pub fn add(&self, processor: Arc<dyn AudioProcessor>) -> Option<Arc<Registration>> {
        let mut entries = write(&self.entries);
        if entries.iter().any(|entry| same_listener(&entry.processor, &processor)) {
            debug!(
                stage = %self.stage,
                processor = processor.name(),
                "Processor already registered, ignoring"
            );
            return None;
        }

        let registration = Arc::new(Registration::new(processor, self.stage));
        let mut next: Vec<_> = entries.iter().cloned().collect();
        next.push(Arc::clone(&registration));
        *entries = next.into();

        debug!(
            stage = %self.stage,
            processor = registration.processor.name(),
            count = entries.len(),
            "Processor registered"
        );
        Some(registration)
    }

    /// Remove a processor by identity
    ///
    /// Returns the removed registration, or `None` if it was not registered.
    pub fn remove(&self, processor: &Arc<dyn AudioProcessor>) -> Option<Arc<Registration>> {
        let mut entries = write(&self.entries);
        let index = entries
            .iter()
            .position(|entry| same_listener(&entry.processor, processor))?;

        let mut next: Vec<_> = entries.iter().cloned().collect();
        let removed = next.remove(index);
        *entries = next.into();

        debug!(
            stage = %self.stage,
            processor = removed.processor.name(),
            count = entries.len(),
            "Processor unregistered"
        );
        Some(removed)
    }

    /// Drop one specific registration; `false` if it is no longer listed
    ///
    /// Unlike [`remove`](Self::remove) this matches the registration itself,
    /// so a newer registration of the same processor is left alone.
    pub fn remove_registration(&self, registration: &Arc<Registration>) -> bool {
        let mut entries = write(&self.entries);
        let Some(index) = entries.iter().position(|entry| Arc::ptr_eq(entry, registration)) else {
            return false;
        };

        let mut next: Vec<_> = entries.iter().cloned().collect();
        next.remove(index);
        *entries = next.into();
        debug!(
            stage = %self.stage,
            processor = registration.processor.name(),
            count = entries.len(),
            "Processor unregistered"
        );
        true
    }

    /// Registration of `processor`, if registered
    pub fn find(&self, processor: &Arc<dyn AudioProcessor>) -> Option<Arc<Registration>> {
        read(&self.entries)
            .iter()
            .find(|entry| same_listener(&entry.processor, processor))
            .cloned()
    }

    /// Current entries in registration order
    ///
    /// Later mutations do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&read(&self.entries))
    }

    /// Visit every registered processor in registration order
    ///
    /// Iterates a snapshot, so the visitor may add or remove processors.
    pub fn for_each(&self, mut visitor: impl FnMut(&Arc<dyn AudioProcessor>)) {
        let snapshot = self.snapshot();
        for entry in snapshot.iter() {
            visitor(&entry.processor);
        }
    }

    /// Remove every processor without calling `release`
    ///
    /// Returns the removed registrations in registration order so the caller
    /// can settle their lifecycle.
    pub fn clear(&self) -> Vec<Arc<Registration>> {
        let mut entries = write(&self.entries);
        let removed: Vec<_> = entries.iter().cloned().collect();
        *entries = Arc::from(Vec::new());

        if !removed.is_empty() {
            debug!(stage = %self.stage, count = removed.len(), "Processor registry cleared");
        }
        removed
    }

    /// Whether `processor` is registered
    pub fn contains(&self, processor: &Arc<dyn AudioProcessor>) -> bool {
        read(&self.entries)
            .iter()
            .any(|entry| same_listener(&entry.processor, processor))
    }

    /// Number of registered processors
    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    /// Check if no processor is registered
    pub fn is_empty(&self) -> bool {
        read(&self.entries).is_empty()
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("stage", &self.stage)
            .field("len", &self.len())
            .finish()
    }
}
