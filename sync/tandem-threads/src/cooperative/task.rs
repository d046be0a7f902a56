//!
//! Task Identity and Hand-off
//!
//! State a scheduler shares with its tasks: the completion queue tasks
//! re-enter through, one run permit per task, and the hand-off slot a
//! running task reports back on when it gives up the scheduler.
//!

use std::fmt;

use parking_lot::{Condvar, Mutex};
use tandem_core::fatal;

use super::completion::CompletionQueue;
use crate::semaphore::Semaphore;

/// A logical worker, numbered within its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Why a running task handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskReturn {
    /// Entered a blocking wait; it re-enters through the completion queue.
    Blocked,
    /// Still runnable; goes to the back of the ready ring.
    Yielded,
    Exited,
}

/// One-slot mailbox from the running task to its scheduler.
pub(crate) struct Handoff {
    slot: Mutex<Option<(TaskId, TaskReturn)>>,
    cond: Condvar,
}

impl Handoff {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn report(&self, task: TaskId, why: TaskReturn) {
        let mut slot = self.slot.lock();
        if let Some((pending, _)) = *slot {
            drop(slot);
            fatal(
                "cooperative hand-off",
                &format!("{} reported while {} was still pending", task, pending),
            );
        }
        *slot = Some((task, why));
        self.cond.notify_one();
    }

    pub fn wait(&self) -> (TaskId, TaskReturn) {
        let mut slot = self.slot.lock();
        loop {
            if let Some(report) = slot.take() {
                return report;
            }
            self.cond.wait(&mut slot);
        }
    }
}

pub(crate) struct Shared {
    pub completion: CompletionQueue,
    pub handoff: Handoff,
    pub permits: Vec<Semaphore>,
}

impl Shared {
    pub fn new(tasks: usize) -> Self {
        Self {
            completion: CompletionQueue::new(),
            handoff: Handoff::new(),
            permits: (0..tasks).map(|_| Semaphore::with_count(0)).collect(),
        }
    }

    pub fn permit(&self, task: TaskId) -> &Semaphore {
        &self.permits[task.index()]
    }
}
