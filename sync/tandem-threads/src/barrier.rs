//!
//! Cyclic Barrier
//!
//! Holds `parties` threads at a rendezvous until all of them have arrived,
//! then releases them together. The barrier re-arms itself, so the same
//! participants can meet for any number of rounds.
//!
//! ## Two-Turnstile Algorithm
//!
//! A mutex-guarded count tracks arrivals. The last arrival closes
//! `turnstile_b` and opens `turnstile_a`; every participant passes through
//! `turnstile_a` and re-opens it behind itself. On the way out the count
//! falls again, and the last to leave closes `turnstile_a` and opens
//! `turnstile_b`. Everyone then passes `turnstile_b`, which is what lets
//! the next round start: a fast thread re-entering `wait` cannot overtake
//! a slow one still leaving the previous round.
//!
//! The last thread to leave a round is its serial participant.
//!

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tandem_core::{SyncError, SyncResult};

use crate::mutex::Mutex;
use crate::semaphore::Semaphore;

pub struct Barrier {
    parties: u32,
    mutex: Mutex,
    /// Only touched while `mutex` is held.
    count: AtomicU32,
    turnstile_a: Semaphore,
    turnstile_b: Semaphore,
}

/// What `Barrier::wait` tells each participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_serial: bool,
}

impl BarrierWaitResult {
    /// True for exactly one participant per round.
    pub fn is_serial(&self) -> bool {
        self.is_serial
    }
}

impl Barrier {
    pub fn new(parties: u32) -> SyncResult<Self> {
        if parties == 0 {
            return Err(SyncError::InvalidArgument(
                "barrier needs at least one party".to_string(),
            ));
        }
        Ok(Self {
            parties,
            mutex: Mutex::new(),
            count: AtomicU32::new(0),
            turnstile_a: Semaphore::with_count(0),
            turnstile_b: Semaphore::with_count(1),
        })
    }

    pub fn parties(&self) -> u32 {
        self.parties
    }

    pub fn wait(&self) -> BarrierWaitResult {
        {
            let _guard = self.mutex.guard();
            let arrived = self.count.load(Ordering::Relaxed) + 1;
            self.count.store(arrived, Ordering::Relaxed);
            if arrived == self.parties {
                self.turnstile_b.wait();
                self.turnstile_a.post();
            }
        }

        self.turnstile_a.wait();
        self.turnstile_a.post();

        let is_serial = {
            let _guard = self.mutex.guard();
            let remaining = self.count.load(Ordering::Relaxed) - 1;
            self.count.store(remaining, Ordering::Relaxed);
            if remaining == 0 {
                self.turnstile_a.wait();
                self.turnstile_b.post();
            }
            remaining == 0
        };

        self.turnstile_b.wait();
        self.turnstile_b.post();

        BarrierWaitResult { is_serial }
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Barrier")
            .field("parties", &self.parties)
            .field("count", &self.count.load(Ordering::Relaxed))
            .finish()
    }
}
