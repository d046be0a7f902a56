//!
//! Counting Semaphore
//!
//! A plain counting semaphore: `post` adds one unit, `wait` takes one,
//! blocking while the count is zero. The barrier uses two of these as
//! turnstiles, and the cooperative scheduler uses one per task as its
//! run permit.
//!

use std::fmt;

use parking_lot::{Condvar, Mutex};
use tandem_core::{SyncError, SyncResult, fatal};

use crate::cooperative;

/// Largest count a semaphore may hold.
pub const SEM_VALUE_MAX: u32 = i32::MAX as u32;

pub struct Semaphore {
    count: Mutex<u32>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: u32) -> SyncResult<Self> {
        if initial > SEM_VALUE_MAX {
            return Err(SyncError::InvalidArgument(format!(
                "semaphore value {} exceeds maximum {}",
                initial, SEM_VALUE_MAX
            )));
        }
        Ok(Self::with_count(initial))
    }

    pub(crate) const fn with_count(initial: u32) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    pub fn post(&self) {
        let mut count = self.count.lock();
        if *count == SEM_VALUE_MAX {
            drop(count);
            fatal("semaphore post", "count would exceed SEM_VALUE_MAX");
        }
        *count += 1;
        self.cond.notify_one();
    }

    pub fn wait(&self) {
        if self.try_wait().is_ok() {
            return;
        }
        cooperative::block_on(|| {
            let mut count = self.count.lock();
            while *count == 0 {
                self.cond.wait(&mut count);
            }
            *count -= 1;
        });
    }

    pub fn try_wait(&self) -> SyncResult<()> {
        let mut count = self.count.lock();
        if *count == 0 {
            return Err(SyncError::Busy);
        }
        *count -= 1;
        Ok(())
    }

    pub fn value(&self) -> u32 {
        *self.count.lock()
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("value", &self.value())
            .finish()
    }
}
