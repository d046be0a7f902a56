//!
//! Thread Lifecycle
//!
//! Kernel threads started through this layer. Each one records its
//! `ThreadId` in a process-wide TLS key before running its entry point, so
//! `Thread::current()` can answer from inside any of them.
//!
//! `Thread::spawn_worker` is the configurable entry used by the consuming
//! runtime: with `scheduler.cooperative` off it is a plain `spawn`; with it
//! on, the entry runs on a cooperative scheduler's fan-out of logical
//! workers and the returned handle joins the scheduler thread.
//!

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self as std_thread, JoinHandle};

use tandem_core::{SyncError, SyncResult};
use tracing::debug;

use crate::cooperative::{self, CooperativeScheduler};
use crate::once::OnceValue;
use crate::runtime;
use crate::tls::TlsKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

static CURRENT_KEY: OnceValue<TlsKey> = OnceValue::new();

/// The key threads record their identity under. Creation is retried on
/// later calls if the key table was full.
fn current_key() -> SyncResult<TlsKey> {
    if let Some(key) = CURRENT_KEY.get() {
        return Ok(*key);
    }

    let key = TlsKey::create()?;
    match CURRENT_KEY.set(key) {
        Ok(()) => Ok(key),
        Err(key) => {
            // Another thread installed one first.
            key.delete();
            CURRENT_KEY.get().copied().ok_or(SyncError::OutOfMemory)
        }
    }
}

pub struct Thread {
    id: ThreadId,
    handle: JoinHandle<()>,
}

impl Thread {
    /// Start a kernel thread running `entry`.
    pub fn spawn<F>(entry: F) -> SyncResult<Thread>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        let key = current_key()?;

        let handle = std_thread::Builder::new()
            .name(format!("tandem-{}", id))
            .spawn(move || {
                key.set(id);
                entry();
            })
            .map_err(SyncError::from_io)?;

        debug!(thread = %id, "thread started");
        Ok(Thread { id, handle })
    }

    /// Start a worker, cooperatively scheduled if the runtime says so.
    pub fn spawn_worker<F>(entry: F) -> SyncResult<Thread>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let scheduler = &runtime::config().scheduler;
        if scheduler.cooperative {
            CooperativeScheduler::start(entry, scheduler.tasks_per_scheduler)
        } else {
            Thread::spawn(entry)
        }
    }

    /// The calling thread's identity, if this layer started it.
    pub fn current() -> Option<ThreadId> {
        current_key().ok()?.get::<ThreadId>()
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Wait for the thread to exit. On a cooperative task the scheduler is
    /// handed to the other tasks for the duration of the wait.
    pub fn join(self) -> SyncResult<()> {
        let Thread { id, handle } = self;
        cooperative::block_on(|| handle.join()).map_err(|_| SyncError::ThreadPanicked)?;
        debug!(thread = %id, "thread joined");
        Ok(())
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Thread {}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_spawn_and_join() {
        let ran = Arc::new(AtomicBool::new(false));
        let thread = {
            let ran = Arc::clone(&ran);
            Thread::spawn(move || ran.store(true, Ordering::SeqCst)).unwrap()
        };
        thread.join().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_join_reports_panic() {
        let thread = Thread::spawn(|| panic!("worker failed")).unwrap();
        assert!(matches!(thread.join(), Err(SyncError::ThreadPanicked)));
    }

    #[test]
    fn test_current_identity() {
        assert_eq!(Thread::current(), None);

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let thread = {
            let seen = Arc::clone(&seen);
            Thread::spawn(move || *seen.lock() = Thread::current()).unwrap()
        };
        let id = thread.id();
        thread.join().unwrap();

        assert_eq!(*seen.lock(), Some(id));
    }

    #[test]
    fn test_equality_is_identity() {
        let a = Thread::spawn(|| {}).unwrap();
        let b = Thread::spawn(|| {}).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a);
        assert!(a.id() < b.id());
        a.join().unwrap();
        b.join().unwrap();
    }

    #[test]
    fn test_join_inside_cooperative_task_releases_scheduler() {
        use crate::semaphore::Semaphore;

        // Task 0 joins a helper that only finishes once task 1 has run.
        let gate = Arc::new(Semaphore::new(0).unwrap());
        let joined = Arc::new(AtomicBool::new(false));

        let scheduler = {
            let gate = Arc::clone(&gate);
            let joined = Arc::clone(&joined);
            CooperativeScheduler::start(
                move || {
                    if cooperative::current_task().map(|t| t.index()) == Some(0) {
                        let helper = {
                            let gate = Arc::clone(&gate);
                            Thread::spawn(move || gate.wait()).unwrap()
                        };
                        helper.join().unwrap();
                        joined.store(true, Ordering::SeqCst);
                    } else {
                        gate.post();
                    }
                },
                2,
            )
            .unwrap()
        };

        scheduler.join().unwrap();
        assert!(joined.load(Ordering::SeqCst));
    }
}
