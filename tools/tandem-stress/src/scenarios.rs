///
/// Stress scenarios
///
/// Each scenario runs real threads against one primitive and checks the
/// property it is supposed to hold, returning a short report.
///

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tandem_core::SyncResult;
use tandem_threads::{Barrier, CondVar, Mutex, RwLock, Thread, cooperative, runtime};
use tracing::{debug, info};

pub struct Report {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    pub elapsed: Duration,
}

fn join_all(threads: Vec<Thread>) -> SyncResult<()> {
    for thread in threads {
        thread.join()?;
    }
    Ok(())
}

/// Readers hold the lock while a single writer increments a counter.
pub fn rwlock(readers: usize, iterations: u64) -> SyncResult<Report> {
    let start = Instant::now();
    let lock = Arc::new(RwLock::new());
    let counter = Arc::new(AtomicU64::new(0));
    let writing = Arc::new(AtomicBool::new(false));
    let violations = Arc::new(AtomicUsize::new(0));
    debug!(strategy = ?lock.strategy(), readers, iterations, "rwlock scenario");

    let mut threads = Vec::with_capacity(readers + 1);
    for _ in 0..readers {
        let lock = Arc::clone(&lock);
        let writing = Arc::clone(&writing);
        let violations = Arc::clone(&violations);
        threads.push(Thread::spawn(move || {
            for _ in 0..iterations {
                let _read = lock.read_guard();
                if writing.load(Ordering::SeqCst) {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_micros(10));
            }
        })?);
    }

    {
        let lock = Arc::clone(&lock);
        let counter = Arc::clone(&counter);
        let writing = Arc::clone(&writing);
        threads.push(Thread::spawn(move || {
            for _ in 0..iterations {
                let _write = lock.write_guard();
                writing.store(true, Ordering::SeqCst);
                counter.fetch_add(1, Ordering::SeqCst);
                writing.store(false, Ordering::SeqCst);
            }
        })?);
    }

    join_all(threads)?;

    let total = counter.load(Ordering::SeqCst);
    let violations = violations.load(Ordering::SeqCst);
    Ok(Report {
        name: "rwlock",
        passed: total == iterations && violations == 0,
        detail: format!(
            "{:?} strategy: counter {}/{}, {} reader/writer overlaps",
            lock.strategy(),
            total,
            iterations,
            violations
        ),
        elapsed: start.elapsed(),
    })
}

/// Parties meet at a barrier for several rounds; one serial return each.
pub fn barrier(parties: u32, rounds: usize) -> SyncResult<Report> {
    let start = Instant::now();
    let barrier = Arc::new(Barrier::new(parties)?);
    let returns = Arc::new(AtomicUsize::new(0));
    let serials = Arc::new(AtomicUsize::new(0));

    let threads = (0..parties)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let returns = Arc::clone(&returns);
            let serials = Arc::clone(&serials);
            Thread::spawn(move || {
                for _ in 0..rounds {
                    if barrier.wait().is_serial() {
                        serials.fetch_add(1, Ordering::SeqCst);
                    }
                    returns.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    join_all(threads)?;

    let returns = returns.load(Ordering::SeqCst);
    let serials = serials.load(Ordering::SeqCst);
    Ok(Report {
        name: "barrier",
        passed: returns == parties as usize * rounds && serials == rounds,
        detail: format!("{} returns, {} serial over {} rounds", returns, serials, rounds),
        elapsed: start.elapsed(),
    })
}

/// Waiters block on a condition until one broadcast releases them all.
pub fn broadcast(waiters: usize) -> SyncResult<Report> {
    let start = Instant::now();
    let mutex = Arc::new(Mutex::new());
    let cond = Arc::new(CondVar::new());
    let ready = Arc::new(AtomicBool::new(false));
    let released = Arc::new(AtomicUsize::new(0));

    let threads = (0..waiters)
        .map(|_| {
            let mutex = Arc::clone(&mutex);
            let cond = Arc::clone(&cond);
            let ready = Arc::clone(&ready);
            let released = Arc::clone(&released);
            Thread::spawn(move || {
                let mut guard = mutex.guard();
                while !ready.load(Ordering::SeqCst) {
                    cond.wait(&mut guard);
                }
                released.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    std::thread::sleep(Duration::from_millis(20));
    {
        let _guard = mutex.guard();
        ready.store(true, Ordering::SeqCst);
        cond.broadcast();
    }

    join_all(threads)?;

    let released = released.load(Ordering::SeqCst);
    Ok(Report {
        name: "broadcast",
        passed: released == waiters,
        detail: format!("{:?} strategy: {}/{} waiters released", cond.strategy(), released, waiters),
        elapsed: start.elapsed(),
    })
}

/// Workers started through `spawn_worker`, yielding and contending a mutex.
pub fn workers(count: usize, yields: usize) -> SyncResult<Report> {
    let start = Instant::now();
    let scheduler = &runtime::config().scheduler;
    let per_worker = if scheduler.cooperative {
        scheduler.tasks_per_scheduler
    } else {
        1
    };

    let lock = Arc::new(Mutex::new());
    let done = Arc::new(AtomicUsize::new(0));

    let threads = (0..count)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let done = Arc::clone(&done);
            Thread::spawn_worker(move || {
                for _ in 0..yields {
                    let _guard = lock.guard();
                    cooperative::yield_now();
                }
                done.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    join_all(threads)?;

    let done = done.load(Ordering::SeqCst);
    let expected = count * per_worker;
    info!(done, expected, cooperative = scheduler.cooperative, "workers finished");
    Ok(Report {
        name: "workers",
        passed: done == expected,
        detail: format!(
            "{}/{} entry runs ({} mode)",
            done,
            expected,
            if scheduler.cooperative { "cooperative" } else { "threaded" }
        ),
        elapsed: start.elapsed(),
    })
}
