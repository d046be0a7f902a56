//!
//! Scheduler Callback Binding
//!
//! The scheduler is driven through a two-argument notification callback,
//! `(reason, payload)`, but its handler also needs the scheduler's own
//! context. `Trampoline::bind` pairs a three-argument handler with that
//! context and `into_proc` turns the pair into the two-argument callback
//! as a boxed closure.
//!

/// Why the scheduler callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerReason {
    Startup,
    TaskBlocked,
    TaskYielded,
    TaskExited,
}

/// Value accompanying a notification: the index of the task that returned
/// control, or zero at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationPayload(pub usize);

pub type SchedulerProc = Box<dyn FnMut(SchedulerReason, ActivationPayload)>;

pub type SchedulerTarget<C> = fn(SchedulerReason, ActivationPayload, &mut C);

pub struct Trampoline<C> {
    target: SchedulerTarget<C>,
    context: C,
}

impl<C: 'static> Trampoline<C> {
    pub fn bind(target: SchedulerTarget<C>, context: C) -> Self {
        Self { target, context }
    }

    pub fn into_proc(self) -> SchedulerProc {
        let Trampoline {
            target,
            mut context,
        } = self;
        Box::new(move |reason, payload| target(reason, payload, &mut context))
    }
}
