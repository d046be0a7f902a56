//!
//! One-Time Initialization
//!
//! `OnceGuard` runs an initializer exactly once no matter how many threads
//! race on it, and every caller returns only after that initializer has
//! finished.
//!
//! ## Algorithm
//!
//! - Fast path: a `ran` flag, read with acquire ordering, short-circuits
//!   every call after completion without touching any lock.
//! - Slow path: each caller allocates a fresh manual-reset completion event
//!   and tries to install it into the shared slot with compare-and-swap.
//!   The winner runs the initializer, sets the event, then sets `ran`.
//!   Losers free their own event and block on the installed one.
//!
//! The guard is never reset. If the initializer panics, the guard is
//! poisoned: waiters are released and every later call panics instead of
//! blocking forever or running the initializer a second time.
//!
//! `OnceValue<T>` layers a lazily written value on top of the guard.
//!

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnceState {
    Unstarted,
    Running,
    Done,
    Poisoned,
}

struct Completion {
    done: Event,
    poisoned: AtomicBool,
}

impl Completion {
    fn new() -> Self {
        Self {
            done: Event::manual_reset(),
            poisoned: AtomicBool::new(false),
        }
    }
}

pub struct OnceGuard {
    ran: AtomicBool,
    completion: AtomicPtr<Completion>,
}

/// Marks the guard poisoned if the initializer unwinds.
struct PoisonOnUnwind<'a> {
    completion: &'a Completion,
    armed: bool,
}

impl Drop for PoisonOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.completion.poisoned.store(true, Ordering::Release);
            self.completion.done.set();
        }
    }
}

impl OnceGuard {
    pub const fn new() -> Self {
        Self {
            ran: AtomicBool::new(false),
            completion: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Run `init` unless some call on this guard already has.
    ///
    /// # Panics
    ///
    /// Panics if the initializer panicked on an earlier (or racing) call.
    pub fn run_once<F>(&self, init: F)
    where
        F: FnOnce(),
    {
        if self.ran.load(Ordering::Acquire) {
            return;
        }
        self.run_once_slow(init);
    }

    #[cold]
    fn run_once_slow<F>(&self, init: F)
    where
        F: FnOnce(),
    {
        let created = Box::into_raw(Box::new(Completion::new()));

        match self.completion.compare_exchange(
            ptr::null_mut(),
            created,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                // Won the race. `created` now lives as long as the guard.
                let completion = unsafe { &*created };
                let mut poison = PoisonOnUnwind {
                    completion,
                    armed: true,
                };

                init();

                poison.armed = false;
                completion.done.set();
                self.ran.store(true, Ordering::Release);
            }
            Err(existing) => {
                drop(unsafe { Box::from_raw(created) });

                let completion = unsafe { &*existing };
                completion.done.wait();

                if completion.poisoned.load(Ordering::Acquire) {
                    panic!("OnceGuard initializer panicked");
                }
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    pub fn state(&self) -> OnceState {
        if self.ran.load(Ordering::Acquire) {
            return OnceState::Done;
        }

        let completion = self.completion.load(Ordering::Acquire);
        if completion.is_null() {
            return OnceState::Unstarted;
        }

        if unsafe { &*completion }.poisoned.load(Ordering::Acquire) {
            OnceState::Poisoned
        } else {
            OnceState::Running
        }
    }
}

impl Default for OnceGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OnceGuard {
    fn drop(&mut self) {
        let completion = *self.completion.get_mut();
        if !completion.is_null() {
            drop(unsafe { Box::from_raw(completion) });
        }
    }
}

impl fmt::Debug for OnceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceGuard")
            .field("state", &self.state())
            .finish()
    }
}

/// A value written once, on first use, under a `OnceGuard`.
pub struct OnceValue<T> {
    guard: OnceGuard,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send + Sync> Sync for OnceValue<T> {}
unsafe impl<T: Send> Send for OnceValue<T> {}

impl<T> OnceValue<T> {
    pub const fn new() -> Self {
        Self {
            guard: OnceGuard::new(),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    pub fn get(&self) -> Option<&T> {
        if self.guard.is_completed() {
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    pub fn get_or_init<F>(&self, init: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.guard.run_once(|| {
            let value = init();
            unsafe { (*self.value.get()).write(value) };
        });
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    /// Store `value` if the cell is still empty, otherwise hand it back.
    pub fn set(&self, value: T) -> Result<(), T> {
        let mut slot = Some(value);
        self.guard.run_once(|| {
            if let Some(value) = slot.take() {
                unsafe { (*self.value.get()).write(value) };
            }
        });
        match slot {
            None => Ok(()),
            Some(value) => Err(value),
        }
    }
}

impl<T> Default for OnceValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OnceValue<T> {
    fn drop(&mut self) {
        if self.guard.is_completed() {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OnceValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => f.debug_struct("OnceValue").field("value", v).finish(),
            None => f.debug_struct("OnceValue").field("value", &"<empty>").finish(),
        }
    }
}
