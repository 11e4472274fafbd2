//! Listener call isolation
//!
//! Every call into application code goes through [`isolate`], so a panicking
//! listener cannot unwind into the SDK's audio thread or poison the locks the
//! adapter holds around it.
//!
//! [`CallbackScope`] marks the adapters whose listener callbacks are currently
//! running on this thread. Control operations issued from inside such a
//! callback are queued instead of taking the adapter's locks again.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Run `f`, converting a panic into `Err` with the panic message
pub(crate) fn isolate<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// Listener code never runs while these locks are held outside `isolate`,
// so a poisoned lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// RAII marker for "listener callbacks of adapter `id` are running here"
#[must_use = "the scope ends when the guard is dropped"]
pub(crate) struct CallbackScope {
    id: u64,
}

impl CallbackScope {
    pub(crate) fn enter(id: u64) -> Self {
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(id));
        Self { id }
    }

    /// Whether the current thread is inside a callback of adapter `id`
    pub(crate) fn is_active(id: u64) -> bool {
        ACTIVE_SCOPES.with(|scopes| scopes.borrow().contains(&id))
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            if let Some(pos) = scopes.iter().rposition(|&id| id == self.id) {
                scopes.remove(pos);
            }
        });
    }
}
