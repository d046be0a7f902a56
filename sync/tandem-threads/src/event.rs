//!
//! Events
//!
//! Boolean wake-up flags in the style of platform event objects. An
//! auto-reset event is consumed by the single waiter it releases; a
//! manual-reset event stays set, releasing every waiter, until someone
//! resets it explicitly.
//!
//! `EventSet<N>` keeps N events behind one lock so a thread can block on
//! "any of these" and learn which one fired. The fallback condition
//! variable waits on its signal/broadcast pair this way; `Event` is the
//! single-flag form used by the once guard and the scheduler's completion
//! queue.
//!

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cooperative;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Cleared by the waiter it wakes.
    Auto,
    /// Stays set until `reset`.
    Manual,
}

/// Outcome of waiting on an event set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The event at this index was set. Lower indices win ties.
    Object(usize),
    Timeout,
}

pub struct EventSet<const N: usize> {
    modes: [ResetMode; N],
    flags: Mutex<[bool; N]>,
    cond: Condvar,
}

impl<const N: usize> EventSet<N> {
    pub const fn new(modes: [ResetMode; N]) -> Self {
        Self {
            modes,
            flags: Mutex::new([false; N]),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self, index: usize) {
        let mut flags = self.flags.lock();
        flags[index] = true;
        self.cond.notify_all();
    }

    pub fn reset(&self, index: usize) {
        self.flags.lock()[index] = false;
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.flags.lock()[index]
    }

    /// Block until any event is set, or until `timeout` elapses.
    ///
    /// `None` waits forever. A timeout too large to represent as a deadline
    /// is treated the same way. On a cooperative task the scheduler is
    /// released while blocked.
    pub fn wait_any(&self, timeout: Option<Duration>) -> WaitStatus {
        if let Some(index) = self.take_first(&mut self.flags.lock()) {
            return WaitStatus::Object(index);
        }
        cooperative::block_on(|| self.wait_any_blocking(timeout))
    }

    fn wait_any_blocking(&self, timeout: Option<Duration>) -> WaitStatus {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut flags = self.flags.lock();

        loop {
            if let Some(index) = self.take_first(&mut flags) {
                return WaitStatus::Object(index);
            }

            match deadline {
                None => self.cond.wait(&mut flags),
                Some(deadline) => {
                    if self.cond.wait_until(&mut flags, deadline).timed_out() {
                        return self
                            .take_first(&mut flags)
                            .map_or(WaitStatus::Timeout, WaitStatus::Object);
                    }
                }
            }
        }
    }

    fn take_first(&self, flags: &mut [bool; N]) -> Option<usize> {
        let index = flags.iter().position(|&set| set)?;
        if self.modes[index] == ResetMode::Auto {
            flags[index] = false;
        }
        Some(index)
    }
}

/// A single event.
pub struct Event {
    inner: EventSet<1>,
}

impl Event {
    pub const fn new(mode: ResetMode) -> Self {
        Self {
            inner: EventSet::new([mode]),
        }
    }

    pub const fn auto_reset() -> Self {
        Self::new(ResetMode::Auto)
    }

    pub const fn manual_reset() -> Self {
        Self::new(ResetMode::Manual)
    }

    pub fn set(&self) {
        self.inner.set(0);
    }

    pub fn reset(&self) {
        self.inner.reset(0);
    }

    pub fn is_set(&self) -> bool {
        self.inner.is_set(0)
    }

    pub fn wait(&self) {
        self.inner.wait_any(None);
    }

    /// Returns `false` if the timeout elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_any(Some(timeout)) != WaitStatus::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_auto_reset_is_consumed() {
        let event = Event::auto_reset();
        event.set();
        assert!(event.is_set());

        assert!(event.wait_timeout(Duration::from_millis(10)));
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_manual_reset_stays_set() {
        let event = Event::manual_reset();
        event.set();

        assert!(event.wait_timeout(Duration::from_millis(10)));
        assert!(event.wait_timeout(Duration::from_millis(10)));

        event.reset();
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_any_prefers_lowest_index() {
        let set = EventSet::new([ResetMode::Auto, ResetMode::Manual]);
        set.set(1);
        set.set(0);

        assert_eq!(set.wait_any(None), WaitStatus::Object(0));
        assert_eq!(set.wait_any(None), WaitStatus::Object(1));
        assert!(set.is_set(1));
        assert!(!set.is_set(0));
    }

    #[test]
    fn test_wait_any_times_out() {
        let set: EventSet<2> = EventSet::new([ResetMode::Auto, ResetMode::Manual]);
        let start = Instant::now();

        assert_eq!(set.wait_any(Some(Duration::from_millis(30))), WaitStatus::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_auto_reset_wakes_one_waiter() {
        let event = Arc::new(Event::auto_reset());
        let woken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let event = Arc::clone(&event);
                let woken = Arc::clone(&woken);
                thread::spawn(move || {
                    if event.wait_timeout(Duration::from_millis(200)) {
                        woken.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        event.set();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_reset_wakes_all_waiters() {
        let event = Arc::new(Event::manual_reset());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let event = Arc::clone(&event);
                thread::spawn(move || event.wait_timeout(Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        event.set();

        for h in handles {
            assert!(h.join().unwrap());
        }
    }

    #[test]
    fn test_wait_inside_cooperative_task_releases_scheduler() {
        use crate::cooperative::{CooperativeScheduler, current_task};

        let event = Arc::new(Event::manual_reset());
        let woken = Arc::new(AtomicUsize::new(0));

        let scheduler = {
            let event = Arc::clone(&event);
            let woken = Arc::clone(&woken);
            CooperativeScheduler::start(
                move || {
                    if current_task().map(|t| t.index()) == Some(2) {
                        event.set();
                    } else {
                        event.wait();
                        woken.fetch_add(1, Ordering::SeqCst);
                    }
                },
                3,
            )
            .unwrap()
        };

        scheduler.join().unwrap();
        assert_eq!(woken.load(Ordering::SeqCst), 2);
    }
}
