//!
//! Condition Variable
//!
//! Lets a thread sleep until another thread announces that a predicate
//! guarded by a `Mutex` may have changed. The mutex is released for the
//! duration of the wait and is always held again on return, including when
//! a timed wait expires.
//!
//! Like the reader/writer lock, the facade picks a strategy once from the
//! capability probe:
//!
//! - `NativeCondVar` delegates to the platform condition variable.
//! - `FallbackCondVar` emulates one with a pair of events and a waiter
//!   count. `signal` sets an auto-reset event that releases a single
//!   waiter; `broadcast` sets a manual-reset event that releases every
//!   current waiter and stays set until the last of them departs and
//!   resets it. A thread that starts waiting after that reset cannot pick
//!   up a stale broadcast.
//!
//! Signalling with no waiters is a no-op on both strategies.
//!

use std::fmt;
use std::mem;
use std::time::Duration;

use tandem_core::{SyncError, SyncResult};

use crate::capability::{self, Strategy};
use crate::cooperative;
use crate::event::{EventSet, ResetMode, WaitStatus};
use crate::mutex::{Mutex, MutexGuard};

const SIGNAL: usize = 0;
const BROADCAST: usize = 1;

/// Operations both condition-variable strategies provide.
pub trait CondVarStrategy: Send + Sync {
    fn signal(&self);

    fn broadcast(&self);

    /// Release `mutex`, wait for a wake or `timeout`, then reacquire it.
    ///
    /// # Safety
    ///
    /// The caller must hold `mutex`.
    unsafe fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<()>;
}

pub struct NativeCondVar {
    cond: parking_lot::Condvar,
}

impl NativeCondVar {
    pub const fn new() -> Self {
        Self {
            cond: parking_lot::Condvar::new(),
        }
    }
}

impl Default for NativeCondVar {
    fn default() -> Self {
        Self::new()
    }
}

impl CondVarStrategy for NativeCondVar {
    fn signal(&self) {
        self.cond.notify_one();
    }

    fn broadcast(&self) {
        self.cond.notify_all();
    }

    unsafe fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<()> {
        cooperative::block_on(|| unsafe { self.wait_blocking(mutex, timeout) })
    }
}

impl NativeCondVar {
    unsafe fn wait_blocking(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<()> {
        // Borrow the held lock as a guard for the duration of the wait, then
        // leave it locked for the caller.
        let mut guard = unsafe { mutex.native().make_guard_unchecked() };
        let timed_out = match timeout {
            None => {
                self.cond.wait(&mut guard);
                false
            }
            Some(timeout) => self.cond.wait_for(&mut guard, timeout).timed_out(),
        };
        mem::forget(guard);

        if timed_out {
            Err(SyncError::Timeout)
        } else {
            Ok(())
        }
    }
}

pub struct FallbackCondVar {
    events: EventSet<2>,
    waiters_count: parking_lot::Mutex<usize>,
}

impl FallbackCondVar {
    pub const fn new() -> Self {
        Self {
            events: EventSet::new([ResetMode::Auto, ResetMode::Manual]),
            waiters_count: parking_lot::Mutex::new(0),
        }
    }

    /// Threads currently inside `wait`.
    pub fn waiters(&self) -> usize {
        *self.waiters_count.lock()
    }

    fn has_waiters(&self) -> bool {
        *self.waiters_count.lock() > 0
    }
}

impl Default for FallbackCondVar {
    fn default() -> Self {
        Self::new()
    }
}

impl CondVarStrategy for FallbackCondVar {
    fn signal(&self) {
        if self.has_waiters() {
            self.events.set(SIGNAL);
        }
    }

    fn broadcast(&self) {
        if self.has_waiters() {
            self.events.set(BROADCAST);
        }
    }

    unsafe fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<()> {
        cooperative::block_on(|| unsafe { self.wait_blocking(mutex, timeout) })
    }
}

impl FallbackCondVar {
    unsafe fn wait_blocking(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<()> {
        *self.waiters_count.lock() += 1;

        unsafe { mutex.unlock() };

        let status = self.events.wait_any(timeout);

        let last_waiter = {
            let mut waiters = self.waiters_count.lock();
            *waiters -= 1;
            status == WaitStatus::Object(BROADCAST) && *waiters == 0
        };

        if last_waiter {
            self.events.reset(BROADCAST);
        }

        mutex.lock();

        match status {
            WaitStatus::Object(_) => Ok(()),
            WaitStatus::Timeout => Err(SyncError::Timeout),
        }
    }
}

/// Condition variable routed to the strategy chosen at construction.
pub enum CondVar {
    Native(NativeCondVar),
    Fallback(FallbackCondVar),
}

impl CondVar {
    pub fn new() -> Self {
        Self::with_strategy(capability::capabilities().condvar_strategy())
    }

    pub fn with_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Native => CondVar::Native(NativeCondVar::new()),
            Strategy::Fallback => CondVar::Fallback(FallbackCondVar::new()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            CondVar::Native(_) => Strategy::Native,
            CondVar::Fallback(_) => Strategy::Fallback,
        }
    }

    fn imp(&self) -> &dyn CondVarStrategy {
        match self {
            CondVar::Native(cond) => cond,
            CondVar::Fallback(cond) => cond,
        }
    }

    pub fn signal(&self) {
        self.imp().signal();
    }

    pub fn broadcast(&self) {
        self.imp().broadcast();
    }

    pub fn wait(&self, guard: &mut MutexGuard<'_>) {
        // An untimed wait only returns once woken.
        let _ = unsafe { self.wait_raw(guard.mutex(), None) };
    }

    /// Wait for at most `timeout`. The mutex is held again on return
    /// whether or not the wait timed out.
    pub fn wait_timeout(&self, guard: &mut MutexGuard<'_>, timeout: Duration) -> SyncResult<()> {
        unsafe { self.wait_raw(guard.mutex(), Some(timeout)) }
    }

    /// Wait against a mutex locked through the raw interface.
    ///
    /// # Safety
    ///
    /// The caller must hold `mutex`.
    pub unsafe fn wait_raw(&self, mutex: &Mutex, timeout: Option<Duration>) -> SyncResult<()> {
        unsafe { self.imp().wait(mutex, timeout) }
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CondVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CondVar");
        s.field("strategy", &self.strategy());
        if let CondVar::Fallback(cond) = self {
            s.field("waiters", &cond.waiters());
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    const STRATEGIES: [Strategy; 2] = [Strategy::Native, Strategy::Fallback];

    struct Shared {
        mutex: Mutex,
        cond: CondVar,
        ready: AtomicBool,
    }

    fn wait_for_waiters(cond: &FallbackCondVar, n: usize) {
        while cond.waiters() < n {
            thread::yield_now();
        }
    }

    #[test]
    fn test_timed_wait_expires_holding_mutex() {
        for strategy in STRATEGIES {
            let mutex = Mutex::new();
            let cond = CondVar::with_strategy(strategy);

            let mut guard = mutex.guard();
            let start = Instant::now();
            let result = cond.wait_timeout(&mut guard, Duration::from_millis(50));

            assert!(matches!(result, Err(SyncError::Timeout)));
            assert!(start.elapsed() >= Duration::from_millis(45));
            assert!(mutex.is_locked());
        }
    }

    #[test]
    fn test_signal_without_waiters_is_dropped() {
        let cond = FallbackCondVar::new();
        cond.signal();
        cond.broadcast();

        let mutex = Mutex::new();
        mutex.lock();
        let result = unsafe { cond.wait(&mutex, Some(Duration::from_millis(20))) };
        assert!(matches!(result, Err(SyncError::Timeout)));
        assert!(mutex.is_locked());
        unsafe { mutex.unlock() };
    }

    #[test]
    fn test_wait_woken_by_signal() {
        for strategy in STRATEGIES {
            let shared = Arc::new(Shared {
                mutex: Mutex::new(),
                cond: CondVar::with_strategy(strategy),
                ready: AtomicBool::new(false),
            });

            let waiter = {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let mut guard = shared.mutex.guard();
                    while !shared.ready.load(Ordering::SeqCst) {
                        shared.cond.wait(&mut guard);
                    }
                    assert!(shared.mutex.is_locked());
                })
            };

            thread::sleep(Duration::from_millis(20));
            {
                let _guard = shared.mutex.guard();
                shared.ready.store(true, Ordering::SeqCst);
                shared.cond.signal();
            }

            waiter.join().unwrap();
        }
    }

    #[test]
    fn test_signal_wakes_at_most_one() {
        let mutex = Arc::new(Mutex::new());
        let cond = Arc::new(FallbackCondVar::new());
        let woken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let cond = Arc::clone(&cond);
                let woken = Arc::clone(&woken);
                thread::spawn(move || {
                    mutex.lock();
                    let result = unsafe { cond.wait(&mutex, Some(Duration::from_millis(500))) };
                    if result.is_ok() {
                        woken.fetch_add(1, Ordering::SeqCst);
                    }
                    unsafe { mutex.unlock() };
                })
            })
            .collect();

        wait_for_waiters(&cond, 3);
        cond.signal();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(woken.load(Ordering::SeqCst), 1);
        assert_eq!(cond.waiters(), 0);
    }

    #[test]
    fn test_broadcast_wakes_all_current_waiters() {
        let mutex = Arc::new(Mutex::new());
        let cond = Arc::new(FallbackCondVar::new());
        let woken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let cond = Arc::clone(&cond);
                let woken = Arc::clone(&woken);
                thread::spawn(move || {
                    mutex.lock();
                    let result = unsafe { cond.wait(&mutex, Some(Duration::from_secs(5))) };
                    if result.is_ok() {
                        woken.fetch_add(1, Ordering::SeqCst);
                    }
                    unsafe { mutex.unlock() };
                })
            })
            .collect();

        wait_for_waiters(&cond, 4);
        mutex.lock();
        cond.broadcast();
        unsafe { mutex.unlock() };

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);

        // The last departing waiter reset the broadcast, so a late arrival
        // sleeps until its own deadline.
        assert!(!cond.events.is_set(BROADCAST));
        mutex.lock();
        let late = unsafe { cond.wait(&mutex, Some(Duration::from_millis(30))) };
        assert!(matches!(late, Err(SyncError::Timeout)));
        unsafe { mutex.unlock() };
    }

    #[test]
    fn test_broadcast_through_facade() {
        for strategy in STRATEGIES {
            let shared = Arc::new(Shared {
                mutex: Mutex::new(),
                cond: CondVar::with_strategy(strategy),
                ready: AtomicBool::new(false),
            });
            let passed = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..5)
                .map(|_| {
                    let shared = Arc::clone(&shared);
                    let passed = Arc::clone(&passed);
                    thread::spawn(move || {
                        let mut guard = shared.mutex.guard();
                        while !shared.ready.load(Ordering::SeqCst) {
                            shared.cond.wait(&mut guard);
                        }
                        passed.fetch_add(1, Ordering::SeqCst);
                    })
                })
                .collect();

            thread::sleep(Duration::from_millis(20));
            {
                let _guard = shared.mutex.guard();
                shared.ready.store(true, Ordering::SeqCst);
                shared.cond.broadcast();
            }

            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(passed.load(Ordering::SeqCst), 5);
        }
    }

    #[test]
    fn test_strategy_wait_inside_cooperative_task_releases_scheduler() {
        use crate::cooperative::{CooperativeScheduler, current_task};

        let strategies: [Arc<dyn CondVarStrategy>; 2] =
            [Arc::new(NativeCondVar::new()), Arc::new(FallbackCondVar::new())];

        for cond in strategies {
            let mutex = Arc::new(Mutex::new());
            let ready = Arc::new(AtomicBool::new(false));

            let scheduler = {
                let mutex = Arc::clone(&mutex);
                let ready = Arc::clone(&ready);
                CooperativeScheduler::start(
                    move || {
                        mutex.lock();
                        if current_task().map(|t| t.index()) == Some(0) {
                            while !ready.load(Ordering::SeqCst) {
                                unsafe { cond.wait(&mutex, None) }.unwrap();
                            }
                        } else {
                            ready.store(true, Ordering::SeqCst);
                            cond.signal();
                        }
                        unsafe { mutex.unlock() };
                    },
                    2,
                )
                .unwrap()
            };

            scheduler.join().unwrap();
            assert!(ready.load(Ordering::SeqCst));
        }
    }
}
