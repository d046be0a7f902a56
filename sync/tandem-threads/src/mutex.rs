//!
//! Mutex
//!
//! A plain mutual exclusion lock with an explicit lock/unlock interface,
//! which is what the emulated reader/writer lock and the condition
//! variables are built from. Unlocking is not tied to the locking thread:
//! the emulated rwlock takes its writer mutex on one reader's thread and
//! releases it on another's.
//!
//! Usage:
//! ```rust,ignore
//! let m = Mutex::new();
//! {
//!     let _guard = m.guard();
//!     // critical section
//! }
//! ```
//!

use std::fmt;
use std::mem;

use tandem_core::{SyncError, SyncResult};

use crate::cooperative;

pub struct Mutex {
    inner: parking_lot::Mutex<()>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            inner: parking_lot::Mutex::new(()),
        }
    }

    /// Block until the mutex is acquired.
    ///
    /// On a cooperative task, contention hands the kernel thread back to
    /// the scheduler for the duration of the wait.
    pub fn lock(&self) {
        if self.try_lock().is_ok() {
            return;
        }
        cooperative::block_on(|| mem::forget(self.inner.lock()));
    }

    pub fn try_lock(&self) -> SyncResult<()> {
        match self.inner.try_lock() {
            Some(guard) => {
                mem::forget(guard);
                Ok(())
            }
            None => Err(SyncError::Busy),
        }
    }

    /// Release the mutex.
    ///
    /// # Safety
    ///
    /// The mutex must be locked, and the caller must be the logical owner
    /// of that acquisition.
    pub unsafe fn unlock(&self) {
        unsafe { self.inner.force_unlock() };
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard { mutex: self }
    }

    pub fn try_guard(&self) -> SyncResult<MutexGuard<'_>> {
        self.try_lock()?;
        Ok(MutexGuard { mutex: self })
    }

    pub(crate) fn native(&self) -> &parking_lot::Mutex<()> {
        &self.inner
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Holds a `Mutex` until dropped.
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl<'a> MutexGuard<'a> {
    pub fn mutex(&self) -> &'a Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.mutex.unlock() };
    }
}

impl fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").finish_non_exhaustive()
    }
}
