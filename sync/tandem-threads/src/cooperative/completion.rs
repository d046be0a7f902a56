//!
//! Completion Queue
//!
//! Tasks that finished a blocking wait, and tasks that have just started,
//! announce themselves here. Any thread may push; only the owning
//! scheduler drains. An auto-reset event wakes the scheduler when it is
//! idle.
//!

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_deque::{Injector, Steal};

use super::ring::ReadyRing;
use super::task::TaskId;
use crate::event::Event;

/// Why the scheduler's wait on the queue returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Entries are waiting to be drained.
    Ready,
    /// Woken with nothing to drain.
    Spurious,
    /// The queue was closed.
    Closed,
    /// The wait's deadline passed.
    TimedOut,
}

pub struct CompletionQueue {
    entries: Injector<TaskId>,
    wake: Event,
    closed: AtomicBool,
}

impl CompletionQueue {
    pub fn new() -> Self {
        Self {
            entries: Injector::new(),
            wake: Event::auto_reset(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn push(&self, task: TaskId) {
        self.entries.push(task);
        self.wake.set();
    }

    /// Mark the queue abandoned and wake the scheduler.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.set();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Move every queued task into `ring`, in arrival order.
    ///
    /// Returns the tasks the ring had no room for.
    pub fn drain_into(&self, ring: &mut ReadyRing) -> Result<usize, TaskId> {
        let mut moved = 0;
        loop {
            match self.entries.steal() {
                Steal::Success(task) => {
                    ring.push(task)?;
                    moved += 1;
                }
                Steal::Empty => return Ok(moved),
                Steal::Retry => continue,
            }
        }
    }

    /// Block until something is queued, the queue closes, or `timeout`
    /// elapses. `None` waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> WakeReason {
        if self.is_closed() {
            return WakeReason::Closed;
        }
        if !self.entries.is_empty() {
            return WakeReason::Ready;
        }

        let fired = match timeout {
            None => {
                self.wake.wait();
                true
            }
            Some(timeout) => self.wake.wait_timeout(timeout),
        };

        if self.is_closed() {
            WakeReason::Closed
        } else if !self.entries.is_empty() {
            WakeReason::Ready
        } else if fired {
            WakeReason::Spurious
        } else {
            WakeReason::TimedOut
        }
    }
}

impl Default for CompletionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_preserves_order() {
        let queue = CompletionQueue::new();
        let mut ring = ReadyRing::with_capacity(4);

        for i in 0..3 {
            queue.push(TaskId::new(i));
        }
        assert_eq!(queue.wait(None), WakeReason::Ready);
        assert_eq!(queue.drain_into(&mut ring), Ok(3));

        for i in 0..3 {
            assert_eq!(ring.pop(), Some(TaskId::new(i)));
        }
        assert_eq!(queue.drain_into(&mut ring), Ok(0));
    }

    #[test]
    fn test_drain_reports_overflow() {
        let queue = CompletionQueue::new();
        let mut ring = ReadyRing::with_capacity(1);
        queue.push(TaskId::new(0));
        queue.push(TaskId::new(1));
        assert_eq!(queue.drain_into(&mut ring), Err(TaskId::new(1)));
    }

    #[test]
    fn test_wait_outcomes() {
        let queue = CompletionQueue::new();
        assert_eq!(
            queue.wait(Some(Duration::from_millis(10))),
            WakeReason::TimedOut
        );

        // A wake left over from an already-drained push.
        queue.push(TaskId::new(0));
        let mut ring = ReadyRing::with_capacity(1);
        queue.drain_into(&mut ring).unwrap();
        assert_eq!(queue.wait(None), WakeReason::Spurious);

        queue.close();
        assert_eq!(queue.wait(None), WakeReason::Closed);
    }

    #[test]
    fn test_push_from_other_thread_wakes() {
        let queue = Arc::new(CompletionQueue::new());
        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(TaskId::new(5));
            })
        };

        assert_eq!(queue.wait(None), WakeReason::Ready);
        pusher.join().unwrap();
    }
}
