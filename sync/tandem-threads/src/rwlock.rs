//!
//! Reader/Writer Lock
//!
//! Many concurrent readers or one writer, never both. `RwLock` picks one of
//! two strategies from the cached capability probe and keeps it for its
//! whole life:
//!
//! - `NativeRwLock` delegates to the platform's fast reader/writer lock.
//! - `FallbackRwLock` emulates one with two mutexes and a reader count.
//!
//! ## Fallback Algorithm
//!
//! The first reader in takes `write_mutex` on behalf of all readers and the
//! last reader out releases it; writers take `write_mutex` directly. So
//! `write_mutex` is held exactly when readers are present or a writer is,
//! and `reader_count` only changes under `read_mutex`.
//!
//! The emulation prefers readers: while readers keep overlapping, the count
//! never drops to zero and a waiting writer can starve. Non-blocking
//! acquires report `Busy` on any contention, including when the caller
//! itself holds the writer role, since ownership is not tracked.
//!
//! Usage:
//! ```rust,ignore
//! let lock = RwLock::new();
//! {
//!     let _r = lock.read_guard();
//! }
//! lock.write_lock();
//! unsafe { lock.write_unlock() };
//! ```
//!

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::lock_api::RawRwLock as _;
use tandem_core::{SyncError, SyncResult, fatal};

use crate::capability::{self, Strategy};
use crate::cooperative;
use crate::mutex::Mutex;

/// Operations both reader/writer strategies provide.
pub trait RwLockStrategy: Send + Sync {
    fn read_lock(&self);

    fn try_read_lock(&self) -> SyncResult<()>;

    /// # Safety
    ///
    /// The caller must hold a read acquisition.
    unsafe fn read_unlock(&self);

    fn write_lock(&self);

    fn try_write_lock(&self) -> SyncResult<()>;

    /// # Safety
    ///
    /// The caller must hold the write acquisition.
    unsafe fn write_unlock(&self);
}

pub struct NativeRwLock {
    raw: parking_lot::RawRwLock,
}

impl NativeRwLock {
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawRwLock::INIT,
        }
    }
}

impl Default for NativeRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLockStrategy for NativeRwLock {
    fn read_lock(&self) {
        if !self.raw.try_lock_shared() {
            cooperative::block_on(|| self.raw.lock_shared());
        }
    }

    fn try_read_lock(&self) -> SyncResult<()> {
        if self.raw.try_lock_shared() {
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    unsafe fn read_unlock(&self) {
        unsafe { self.raw.unlock_shared() };
    }

    fn write_lock(&self) {
        if !self.raw.try_lock_exclusive() {
            cooperative::block_on(|| self.raw.lock_exclusive());
        }
    }

    fn try_write_lock(&self) -> SyncResult<()> {
        if self.raw.try_lock_exclusive() {
            Ok(())
        } else {
            Err(SyncError::Busy)
        }
    }

    unsafe fn write_unlock(&self) {
        unsafe { self.raw.unlock_exclusive() };
    }
}

pub struct FallbackRwLock {
    read_mutex: Mutex,
    write_mutex: Mutex,
    reader_count: AtomicUsize,
}

impl FallbackRwLock {
    pub const fn new() -> Self {
        Self {
            read_mutex: Mutex::new(),
            write_mutex: Mutex::new(),
            reader_count: AtomicUsize::new(0),
        }
    }

    pub fn reader_count(&self) -> usize {
        self.reader_count.load(Ordering::Relaxed)
    }

    /// Whether `write_mutex` is held, by readers collectively or a writer.
    pub fn is_write_held(&self) -> bool {
        self.write_mutex.is_locked()
    }
}

impl Default for FallbackRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLockStrategy for FallbackRwLock {
    fn read_lock(&self) {
        self.read_mutex.lock();

        let readers = self.reader_count.load(Ordering::Relaxed) + 1;
        self.reader_count.store(readers, Ordering::Relaxed);
        if readers == 1 {
            self.write_mutex.lock();
        }

        unsafe { self.read_mutex.unlock() };
    }

    fn try_read_lock(&self) -> SyncResult<()> {
        self.read_mutex.try_lock()?;

        let readers = self.reader_count.load(Ordering::Relaxed);
        let result = if readers == 0 {
            self.write_mutex.try_lock()
        } else {
            Ok(())
        };
        if result.is_ok() {
            self.reader_count.store(readers + 1, Ordering::Relaxed);
        }

        unsafe { self.read_mutex.unlock() };
        result
    }

    unsafe fn read_unlock(&self) {
        self.read_mutex.lock();

        let readers = self.reader_count.load(Ordering::Relaxed);
        if readers == 0 {
            fatal("rwlock read unlock", "no reader holds the lock");
        }
        self.reader_count.store(readers - 1, Ordering::Relaxed);
        if readers == 1 {
            unsafe { self.write_mutex.unlock() };
        }

        unsafe { self.read_mutex.unlock() };
    }

    fn write_lock(&self) {
        self.write_mutex.lock();
    }

    fn try_write_lock(&self) -> SyncResult<()> {
        self.write_mutex.try_lock()
    }

    unsafe fn write_unlock(&self) {
        unsafe { self.write_mutex.unlock() };
    }
}

/// Reader/writer lock routed to the strategy chosen at construction.
pub enum RwLock {
    Native(NativeRwLock),
    Fallback(FallbackRwLock),
}

impl RwLock {
    /// Create a lock using the strategy the capability probe selected.
    pub fn new() -> Self {
        Self::with_strategy(capability::capabilities().rwlock_strategy())
    }

    pub fn with_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Native => RwLock::Native(NativeRwLock::new()),
            Strategy::Fallback => RwLock::Fallback(FallbackRwLock::new()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            RwLock::Native(_) => Strategy::Native,
            RwLock::Fallback(_) => Strategy::Fallback,
        }
    }

    fn imp(&self) -> &dyn RwLockStrategy {
        match self {
            RwLock::Native(lock) => lock,
            RwLock::Fallback(lock) => lock,
        }
    }

    pub fn read_lock(&self) {
        self.imp().read_lock();
    }

    pub fn try_read_lock(&self) -> SyncResult<()> {
        self.imp().try_read_lock()
    }

    /// # Safety
    ///
    /// The caller must hold a read acquisition.
    pub unsafe fn read_unlock(&self) {
        unsafe { self.imp().read_unlock() };
    }

    pub fn write_lock(&self) {
        self.imp().write_lock();
    }

    pub fn try_write_lock(&self) -> SyncResult<()> {
        self.imp().try_write_lock()
    }

    /// # Safety
    ///
    /// The caller must hold the write acquisition.
    pub unsafe fn write_unlock(&self) {
        unsafe { self.imp().write_unlock() };
    }

    pub fn read_guard(&self) -> RwLockReadGuard<'_> {
        self.read_lock();
        RwLockReadGuard { lock: self }
    }

    pub fn write_guard(&self) -> RwLockWriteGuard<'_> {
        self.write_lock();
        RwLockWriteGuard { lock: self }
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RwLock");
        s.field("strategy", &self.strategy());
        if let RwLock::Fallback(lock) = self {
            s.field("readers", &lock.reader_count());
        }
        s.finish()
    }
}

pub struct RwLockReadGuard<'a> {
    lock: &'a RwLock,
}

impl Drop for RwLockReadGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.lock.read_unlock() };
    }
}

pub struct RwLockWriteGuard<'a> {
    lock: &'a RwLock,
}

impl Drop for RwLockWriteGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.lock.write_unlock() };
    }
}
