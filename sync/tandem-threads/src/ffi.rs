//!
//! C ABI
//!
//! Exported entry points for the consuming runtime. Objects are boxed on
//! creation and released with the matching `*_destroy`. Every operation
//! returns `0` on success or a negative error code (see
//! `SyncError::code`); a null handle yields `CODE_EINVAL`.
//!
//! Constructors that cannot fail return the handle directly. Those that
//! validate their arguments write it through an out-pointer and return a
//! status.
//!

use std::ptr;
use std::time::Duration;

use tandem_core::{CODE_EINVAL, SyncResult};

use crate::barrier::Barrier;
use crate::condvar::CondVar;
use crate::mutex::Mutex;
use crate::rwlock::RwLock;
use crate::semaphore::Semaphore;

fn status(result: SyncResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

unsafe fn destroy<T>(handle: *mut T) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

unsafe fn store<T>(out: *mut *mut T, result: SyncResult<T>) -> i32 {
    if out.is_null() {
        return CODE_EINVAL;
    }
    match result {
        Ok(value) => {
            unsafe { *out = Box::into_raw(Box::new(value)) };
            0
        }
        Err(err) => {
            unsafe { *out = ptr::null_mut() };
            err.code()
        }
    }
}

macro_rules! with_handle {
    ($handle:expr, |$name:ident| $body:expr) => {
        match unsafe { $handle.as_ref() } {
            Some($name) => $body,
            None => CODE_EINVAL,
        }
    };
}

// ========================================
// Mutex
// ========================================

#[unsafe(no_mangle)]
pub extern "C" fn tandem_mutex_new() -> *mut Mutex {
    Box::into_raw(Box::new(Mutex::new()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_mutex_destroy(m: *mut Mutex) {
    unsafe { destroy(m) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_mutex_lock(m: *mut Mutex) -> i32 {
    with_handle!(m, |mutex| {
        mutex.lock();
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_mutex_trylock(m: *mut Mutex) -> i32 {
    with_handle!(m, |mutex| status(mutex.try_lock()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_mutex_unlock(m: *mut Mutex) -> i32 {
    with_handle!(m, |mutex| {
        unsafe { mutex.unlock() };
        0
    })
}

// ========================================
// Reader/writer lock
// ========================================

#[unsafe(no_mangle)]
pub extern "C" fn tandem_rwlock_new() -> *mut RwLock {
    Box::into_raw(Box::new(RwLock::new()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_destroy(l: *mut RwLock) {
    unsafe { destroy(l) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_rdlock(l: *mut RwLock) -> i32 {
    with_handle!(l, |lock| {
        lock.read_lock();
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_tryrdlock(l: *mut RwLock) -> i32 {
    with_handle!(l, |lock| status(lock.try_read_lock()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_rdunlock(l: *mut RwLock) -> i32 {
    with_handle!(l, |lock| {
        unsafe { lock.read_unlock() };
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_wrlock(l: *mut RwLock) -> i32 {
    with_handle!(l, |lock| {
        lock.write_lock();
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_trywrlock(l: *mut RwLock) -> i32 {
    with_handle!(l, |lock| status(lock.try_write_lock()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_rwlock_wrunlock(l: *mut RwLock) -> i32 {
    with_handle!(l, |lock| {
        unsafe { lock.write_unlock() };
        0
    })
}

// ========================================
// Condition variable
// ========================================

#[unsafe(no_mangle)]
pub extern "C" fn tandem_cond_new() -> *mut CondVar {
    Box::into_raw(Box::new(CondVar::new()))
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_cond_destroy(c: *mut CondVar) {
    unsafe { destroy(c) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_cond_signal(c: *mut CondVar) -> i32 {
    with_handle!(c, |cond| {
        cond.signal();
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_cond_broadcast(c: *mut CondVar) -> i32 {
    with_handle!(c, |cond| {
        cond.broadcast();
        0
    })
}

/// Wait on `c`, releasing `m` meanwhile. `m` must be locked by the caller.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_cond_wait(c: *mut CondVar, m: *mut Mutex) -> i32 {
    with_handle!(c, |cond| with_handle!(m, |mutex| status(unsafe {
        cond.wait_raw(mutex, None)
    })))
}

/// Like `tandem_cond_wait`, giving up after `timeout_ns` nanoseconds.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_cond_timedwait(
    c: *mut CondVar,
    m: *mut Mutex,
    timeout_ns: u64,
) -> i32 {
    let timeout = Duration::from_nanos(timeout_ns);
    with_handle!(c, |cond| with_handle!(m, |mutex| status(unsafe {
        cond.wait_raw(mutex, Some(timeout))
    })))
}

// ========================================
// Semaphore
// ========================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_sem_new(value: u32, out: *mut *mut Semaphore) -> i32 {
    unsafe { store(out, Semaphore::new(value)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_sem_destroy(s: *mut Semaphore) {
    unsafe { destroy(s) };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_sem_post(s: *mut Semaphore) -> i32 {
    with_handle!(s, |sem| {
        sem.post();
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_sem_wait(s: *mut Semaphore) -> i32 {
    with_handle!(s, |sem| {
        sem.wait();
        0
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_sem_trywait(s: *mut Semaphore) -> i32 {
    with_handle!(s, |sem| status(sem.try_wait()))
}

// ========================================
// Barrier
// ========================================

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_barrier_new(count: u32, out: *mut *mut Barrier) -> i32 {
    unsafe { store(out, Barrier::new(count)) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_barrier_destroy(b: *mut Barrier) {
    unsafe { destroy(b) };
}

/// Returns `1` for the round's serial participant, `0` for the others.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tandem_barrier_wait(b: *mut Barrier) -> i32 {
    with_handle!(b, |barrier| barrier.wait().is_serial() as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{CODE_EBUSY, CODE_ETIMEDOUT};

    #[test]
    fn test_null_handles() {
        unsafe {
            assert_eq!(tandem_mutex_lock(ptr::null_mut()), CODE_EINVAL);
            assert_eq!(tandem_rwlock_wrlock(ptr::null_mut()), CODE_EINVAL);
            assert_eq!(tandem_cond_signal(ptr::null_mut()), CODE_EINVAL);
            assert_eq!(tandem_sem_post(ptr::null_mut()), CODE_EINVAL);
            assert_eq!(tandem_barrier_wait(ptr::null_mut()), CODE_EINVAL);
            assert_eq!(tandem_sem_new(0, ptr::null_mut()), CODE_EINVAL);
            tandem_mutex_destroy(ptr::null_mut());
        }
    }

    #[test]
    fn test_mutex_and_rwlock_codes() {
        unsafe {
            let m = tandem_mutex_new();
            assert_eq!(tandem_mutex_lock(m), 0);
            assert_eq!(tandem_mutex_trylock(m), CODE_EBUSY);
            assert_eq!(tandem_mutex_unlock(m), 0);
            tandem_mutex_destroy(m);

            let l = tandem_rwlock_new();
            assert_eq!(tandem_rwlock_rdlock(l), 0);
            assert_eq!(tandem_rwlock_tryrdlock(l), 0);
            assert_eq!(tandem_rwlock_trywrlock(l), CODE_EBUSY);
            assert_eq!(tandem_rwlock_rdunlock(l), 0);
            assert_eq!(tandem_rwlock_rdunlock(l), 0);
            assert_eq!(tandem_rwlock_wrlock(l), 0);
            assert_eq!(tandem_rwlock_tryrdlock(l), CODE_EBUSY);
            assert_eq!(tandem_rwlock_wrunlock(l), 0);
            tandem_rwlock_destroy(l);
        }
    }

    #[test]
    fn test_cond_timedwait_times_out() {
        unsafe {
            let m = tandem_mutex_new();
            let c = tandem_cond_new();

            assert_eq!(tandem_mutex_lock(m), 0);
            assert_eq!(tandem_cond_timedwait(c, m, 10_000_000), CODE_ETIMEDOUT);
            assert_eq!(tandem_mutex_trylock(m), CODE_EBUSY);
            assert_eq!(tandem_mutex_unlock(m), 0);

            tandem_cond_destroy(c);
            tandem_mutex_destroy(m);
        }
    }

    #[test]
    fn test_semaphore_and_barrier() {
        unsafe {
            let mut s = ptr::null_mut();
            assert_eq!(tandem_sem_new(1, &mut s), 0);
            assert_eq!(tandem_sem_trywait(s), 0);
            assert_eq!(tandem_sem_trywait(s), CODE_EBUSY);
            assert_eq!(tandem_sem_post(s), 0);
            assert_eq!(tandem_sem_wait(s), 0);
            tandem_sem_destroy(s);

            let mut b = ptr::null_mut();
            assert_eq!(tandem_barrier_new(0, &mut b), CODE_EINVAL);
            assert!(b.is_null());
            assert_eq!(tandem_barrier_new(1, &mut b), 0);
            assert_eq!(tandem_barrier_wait(b), 1);
            tandem_barrier_destroy(b);
        }
    }
}
