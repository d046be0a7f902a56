//!
//! Cooperative Scheduler
//!
//! `CooperativeScheduler::start` spawns the task threads, then a scheduler
//! thread that owns the dispatch state. Task threads first announce
//! themselves on the completion queue, so the scheduler discovers them
//! the same way it discovers tasks whose blocking wait has finished.
//!
//! The scheduler thread drives a `SchedulerProc`. Each time control comes
//! back to the scheduler (at startup and whenever the running task blocks,
//! yields, or exits) the proc is invoked with the reason and the task's
//! index. It settles that task, picks the next one and posts its permit.
//! Once every task has exited it marks the scheduler finished and the
//! thread joins the task threads and returns.
//!
//! Waiting on the completion queue can end in ways that carry no work;
//! `classify` decides what each of them means for the loop.
//!

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use tandem_core::{MAX_TASKS_PER_SCHEDULER, SyncError, SyncResult, fatal};
use tracing::{debug, error, trace, warn};

use super::completion::WakeReason;
use super::ring::ReadyRing;
use super::task::{Shared, TaskId, TaskReturn};
use super::trampoline::{ActivationPayload, SchedulerReason, Trampoline};
use super::Binding;
use crate::thread::Thread;

type Entry = Arc<dyn Fn() + Send + Sync>;

/// What the dispatch loop does after a wait on the completion queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Move the queued tasks into the ready ring.
    Drain,
    /// Nothing arrived; wait again.
    Rewait,
    /// No task is left; stop dispatching.
    Exit,
    /// The scheduler state can no longer be trusted.
    Fatal(String),
}

/// Map a completion-queue wake to the loop's next step.
///
/// A closed queue is only an orderly end when no task is still alive: live
/// tasks could never be scheduled again. A timeout is never expected, since
/// the loop waits without a deadline.
pub fn classify(wake: WakeReason, live: usize) -> Disposition {
    match wake {
        WakeReason::Ready => Disposition::Drain,
        WakeReason::Spurious => Disposition::Rewait,
        WakeReason::Closed if live == 0 => Disposition::Exit,
        WakeReason::Closed => Disposition::Fatal(format!(
            "completion queue abandoned with {} live task(s)",
            live
        )),
        WakeReason::TimedOut => {
            Disposition::Fatal("unbounded completion wait timed out".to_string())
        }
    }
}

impl From<TaskReturn> for SchedulerReason {
    fn from(why: TaskReturn) -> Self {
        match why {
            TaskReturn::Blocked => SchedulerReason::TaskBlocked,
            TaskReturn::Yielded => SchedulerReason::TaskYielded,
            TaskReturn::Exited => SchedulerReason::TaskExited,
        }
    }
}

struct SchedulerContext {
    shared: Arc<Shared>,
    ring: ReadyRing,
    live: usize,
    /// Set once nothing is left to run.
    finished: Rc<Cell<bool>>,
}

impl SchedulerContext {
    fn enqueue(&mut self, task: TaskId) {
        if let Err(task) = self.ring.push(task) {
            fatal(
                "cooperative scheduler",
                &format!("ready ring overflow queueing {}", task),
            );
        }
    }

    fn drain(&mut self) {
        match self.shared.completion.drain_into(&mut self.ring) {
            Ok(0) => {}
            Ok(moved) => trace!(moved, "drained completion queue"),
            Err(task) => fatal(
                "cooperative scheduler",
                &format!("ready ring overflow draining {}", task),
            ),
        }
    }

    /// The next task to run, or `None` once there is nothing left.
    fn next_task(&mut self) -> Option<TaskId> {
        loop {
            // Drained on every pass so yielding tasks cannot starve the
            // ones whose waits completed.
            self.drain();
            if let Some(task) = self.ring.pop() {
                return Some(task);
            }
            if self.live == 0 {
                return None;
            }

            let wake = self.shared.completion.wait(None);
            match classify(wake, self.live) {
                Disposition::Drain | Disposition::Rewait => continue,
                Disposition::Exit => return None,
                Disposition::Fatal(reason) => fatal("cooperative scheduler", &reason),
            }
        }
    }
}

fn dispatch(reason: SchedulerReason, payload: ActivationPayload, ctx: &mut SchedulerContext) {
    let task = TaskId::new(payload.0);
    match reason {
        SchedulerReason::Startup => debug!(tasks = ctx.live, "cooperative scheduler started"),
        SchedulerReason::TaskBlocked => trace!(%task, "task blocked"),
        SchedulerReason::TaskYielded => {
            trace!(%task, "task yielded");
            ctx.enqueue(task);
        }
        SchedulerReason::TaskExited => {
            ctx.live -= 1;
            trace!(%task, live = ctx.live, "task exited");
        }
    }

    match ctx.next_task() {
        Some(next) => {
            trace!(task = %next, "running task");
            ctx.shared.permit(next).post();
        }
        None => ctx.finished.set(true),
    }
}

/// Runs a worker entry point on a fan-out of cooperatively scheduled tasks.
pub struct CooperativeScheduler;

impl CooperativeScheduler {
    /// Start `tasks` logical workers, each running `entry`, under a new
    /// scheduler thread. The returned handle joins the scheduler, which
    /// exits once every task has. It reports `ThreadPanicked` if any task
    /// panicked.
    pub fn start<F>(entry: F, tasks: usize) -> SyncResult<Thread>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if tasks == 0 || tasks > MAX_TASKS_PER_SCHEDULER {
            return Err(SyncError::InvalidArgument(format!(
                "tasks per scheduler must be between 1 and {}, got {}",
                MAX_TASKS_PER_SCHEDULER, tasks
            )));
        }

        let entry: Entry = Arc::new(entry);
        let shared = Arc::new(Shared::new(tasks));
        let mut workers = Vec::with_capacity(tasks);

        for index in 0..tasks {
            let task = TaskId::new(index);
            let spawned = {
                let shared = Arc::clone(&shared);
                let entry = Arc::clone(&entry);
                Thread::spawn(move || run_task(shared, task, entry))
            };
            match spawned {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    abandon(&shared, workers.len(), &err);
                    return Err(err);
                }
            }
        }

        let spawned = workers.len();
        let scheduler = {
            let shared = Arc::clone(&shared);
            Thread::spawn(move || run_scheduler(shared, workers))
        };
        scheduler.inspect_err(|err| abandon(&shared, spawned, err))
    }
}

/// Release task threads that will never be scheduled.
fn abandon(shared: &Shared, spawned: usize, err: &SyncError) {
    warn!(%err, spawned, "cooperative scheduler startup failed");
    shared.completion.close();
    for permit in &shared.permits[..spawned] {
        permit.post();
    }
}

struct ExitReport<'a>(&'a Binding);

impl Drop for ExitReport<'_> {
    fn drop(&mut self) {
        if !self.0.running.get() {
            fatal("cooperative task", "exited without holding its scheduler");
        }
        self.0.leave(TaskReturn::Exited);
    }
}

fn run_task(shared: Arc<Shared>, task: TaskId, entry: Entry) {
    let binding = Binding::install(shared, task);
    binding.rejoin();

    if binding.shared.completion.is_closed() {
        return;
    }

    let _exit = ExitReport(&binding);
    trace!(%task, "task body starting");
    entry();
}

fn run_scheduler(shared: Arc<Shared>, workers: Vec<Thread>) {
    let finished = Rc::new(Cell::new(false));
    let context = SchedulerContext {
        shared: Arc::clone(&shared),
        ring: ReadyRing::with_capacity(workers.len()),
        live: workers.len(),
        finished: Rc::clone(&finished),
    };
    let mut callback = Trampoline::bind(dispatch, context).into_proc();

    let mut reason = SchedulerReason::Startup;
    let mut payload = ActivationPayload::default();
    loop {
        callback(reason, payload);
        if finished.get() {
            break;
        }
        let (task, why) = shared.handoff.wait();
        reason = why.into();
        payload = ActivationPayload(task.index());
    }
    drop(callback);

    let mut panicked = 0;
    for worker in workers {
        if worker.join().is_err() {
            panicked += 1;
        }
    }
    debug!(panicked, "cooperative scheduler finished");

    if panicked > 0 {
        error!(panicked, "cooperative tasks panicked");
        std::panic::resume_unwind(Box::new(format!("{} cooperative task(s) panicked", panicked)));
    }
}
