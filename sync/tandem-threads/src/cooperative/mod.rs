//!
//! Cooperative Task Multiplexing
//!
//! An optional execution mode in which one scheduler runs a fixed fan-out
//! of logical tasks and lets exactly one of them make progress at a time.
//! A task keeps the scheduler until it blocks, yields, or exits; nothing
//! preempts it.
//!
//! Each task is backed by its own kernel thread, parked on a run permit
//! while it is not scheduled. The scheduler thread owns a ready ring and a
//! completion queue and loops:
//!
//! - pop a ready task and post its permit, then wait for the task to hand
//!   control back,
//! - when the ring is empty, sleep on the completion queue and drain
//!   whatever became ready into the ring.
//!
//! Every blocking primitive in this crate is cooperative-aware: on a task
//! it goes through `block_on`, which hands the scheduler to another task
//! for the duration of the wait, then re-enters through the completion
//! queue. Off a task, `block_on` just runs the wait.
//!

mod completion;
mod ring;
mod scheduler;
mod task;
mod trampoline;

use std::cell::{Cell, OnceCell};
use std::rc::Rc;
use std::sync::Arc;

use tandem_core::fatal;

pub use completion::{CompletionQueue, WakeReason};
pub use ring::ReadyRing;
pub use scheduler::{CooperativeScheduler, Disposition, classify};
pub use task::{TaskId, TaskReturn};
pub use trampoline::{ActivationPayload, SchedulerProc, SchedulerReason, SchedulerTarget, Trampoline};

use task::Shared;

/// Ties a task's kernel thread to its scheduler.
struct Binding {
    shared: Arc<Shared>,
    task: TaskId,
    /// True while this task holds the scheduler.
    running: Cell<bool>,
}

thread_local! {
    static BINDING: OnceCell<Rc<Binding>> = const { OnceCell::new() };
}

impl Binding {
    fn install(shared: Arc<Shared>, task: TaskId) -> Rc<Binding> {
        let binding = Rc::new(Binding {
            shared,
            task,
            running: Cell::new(false),
        });
        let installed = BINDING.try_with(|cell| cell.set(Rc::clone(&binding)).is_ok());
        if !matches!(installed, Ok(true)) {
            fatal("cooperative task", "thread is already bound to a scheduler");
        }
        binding
    }

    /// Hand the scheduler back.
    fn leave(&self, why: TaskReturn) {
        self.running.set(false);
        self.shared.handoff.report(self.task, why);
    }

    /// Park until the scheduler runs this task.
    fn enter(&self) {
        self.shared.permit(self.task).wait();
        self.running.set(true);
    }

    /// Queue for the scheduler's attention, then park until run.
    fn rejoin(&self) {
        self.shared.completion.push(self.task);
        self.enter();
    }
}

/// The calling task's binding, if it is a task that currently holds its
/// scheduler.
fn running_binding() -> Option<Rc<Binding>> {
    BINDING
        .try_with(|cell| cell.get().filter(|b| b.running.get()).cloned())
        .ok()
        .flatten()
}

struct Rejoin<'a>(&'a Binding);

impl Drop for Rejoin<'_> {
    fn drop(&mut self) {
        self.0.rejoin();
    }
}

/// Run a blocking operation.
///
/// On a running cooperative task the scheduler is released first, so other
/// tasks proceed while `f` blocks, and the task is queued to run again once
/// `f` returns (or unwinds). Anywhere else this is just `f()`.
pub fn block_on<R>(f: impl FnOnce() -> R) -> R {
    let Some(binding) = running_binding() else {
        return f();
    };

    binding.leave(TaskReturn::Blocked);
    let _rejoin = Rejoin(&binding);
    f()
}

/// Let the scheduler run other ready tasks before continuing.
pub fn yield_now() {
    match running_binding() {
        Some(binding) => {
            binding.leave(TaskReturn::Yielded);
            binding.enter();
        }
        None => std::thread::yield_now(),
    }
}

/// The cooperative task the caller is running as, if any.
pub fn current_task() -> Option<TaskId> {
    BINDING
        .try_with(|cell| cell.get().map(|b| b.task))
        .ok()
        .flatten()
}
