//!
//! tandem-threads - Portable Synchronization Primitives
//!
//! The synchronization layer beneath the event runtime. Every primitive
//! behaves the same whichever optional OS fast paths are present.
//!
//! ## Strategy Dispatch
//!
//! `RwLock` and `CondVar` each come in two implementations: a native one
//! that delegates to the platform and a fallback emulation built from
//! mutexes and events. A one-time capability probe picks between them and
//! the answer is cached for the life of the process:
//! - `RwLock` - many readers or one writer (fallback: two mutexes and a reader count)
//! - `CondVar` - wait/signal/broadcast around a `Mutex` (fallback: signal and broadcast events)
//!
//! ## Other Primitives
//!
//! - `Mutex` - lock/try_lock/unlock, plus RAII guards
//! - `Semaphore` - counting semaphore
//! - `Barrier` - reusable two-turnstile rendezvous with one serial participant per round
//! - `OnceGuard` / `OnceValue` - run an initializer exactly once
//! - `TlsKey` - per-thread value slots
//! - `Thread` - spawn/join/equality and the calling thread's identity
//!
//! ## Cooperative Mode
//!
//! With `scheduler.cooperative` set, `Thread::spawn_worker` runs its entry
//! on a fan-out of tasks that share one scheduler and hand it over only
//! when they block, yield, or exit. See `cooperative`.
//!
//! ## Runtime State
//!
//! Configuration and the capability probe are process-wide and initialized
//! once. Call `runtime::init` before first use to install a configuration;
//! otherwise it is read from `TANDEM_*` environment variables.
//!

pub mod barrier;
pub mod capability;
pub mod condvar;
pub mod cooperative;
pub mod event;
pub mod ffi;
pub mod mutex;
pub mod once;
pub mod runtime;
pub mod rwlock;
pub mod semaphore;
pub mod thread;
pub mod tls;

pub use barrier::*;
pub use capability::*;
pub use condvar::*;
pub use cooperative::CooperativeScheduler;
pub use event::*;
pub use mutex::*;
pub use once::*;
pub use rwlock::*;
pub use semaphore::*;
pub use thread::*;
pub use tls::*;
