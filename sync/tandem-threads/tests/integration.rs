///
/// # Integration Tests for tandem-threads
///
/// End-to-end scenarios through the public API: readers and a writer
/// sharing a lock on both strategies, repeated barrier rounds, a
/// producer/consumer hand-off over a condition variable, and workers
/// multiplexed on the cooperative scheduler.
///

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tandem_core::SyncError;
use tandem_threads::cooperative::{self, CooperativeScheduler};
use tandem_threads::{Barrier, CondVar, Mutex, OnceValue, RwLock, Semaphore, Strategy, Thread};

fn readers_and_writer(strategy: Strategy) {
    let lock = Arc::new(RwLock::with_strategy(strategy));
    let counter = Arc::new(AtomicU64::new(0));
    let writing = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut threads = Vec::new();
    for _ in 0..4 {
        let lock = Arc::clone(&lock);
        let writing = Arc::clone(&writing);
        let overlaps = Arc::clone(&overlaps);
        threads.push(
            Thread::spawn(move || {
                for _ in 0..1000 {
                    lock.read_lock();
                    if writing.load(Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_micros(1));
                    unsafe { lock.read_unlock() };
                }
            })
            .unwrap(),
        );
    }

    {
        let lock = Arc::clone(&lock);
        let counter = Arc::clone(&counter);
        let writing = Arc::clone(&writing);
        threads.push(
            Thread::spawn(move || {
                for _ in 0..1000 {
                    lock.write_lock();
                    writing.store(true, Ordering::SeqCst);
                    counter.fetch_add(1, Ordering::SeqCst);
                    writing.store(false, Ordering::SeqCst);
                    unsafe { lock.write_unlock() };
                }
            })
            .unwrap(),
        );
    }

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1000);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_readers_and_writer_native() {
    readers_and_writer(Strategy::Native);
}

#[test]
fn test_readers_and_writer_fallback() {
    readers_and_writer(Strategy::Fallback);
}

#[test]
fn test_barrier_three_threads_five_rounds() {
    let barrier = Arc::new(Barrier::new(3).unwrap());
    let serial_rounds = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let returns = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..3)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let serial_rounds = Arc::clone(&serial_rounds);
            let returns = Arc::clone(&returns);
            Thread::spawn(move || {
                for round in 0..5 {
                    if barrier.wait().is_serial() {
                        serial_rounds.lock().push(round);
                    }
                    returns.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap()
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(returns.load(Ordering::SeqCst), 15);
    let mut serial_rounds = serial_rounds.lock().clone();
    serial_rounds.sort();
    assert_eq!(serial_rounds, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_producer_consumer_over_condvar() {
    for strategy in [Strategy::Native, Strategy::Fallback] {
        struct Queue {
            mutex: Mutex,
            not_empty: CondVar,
            items: parking_lot::Mutex<VecDeque<u32>>,
        }

        let queue = Arc::new(Queue {
            mutex: Mutex::new(),
            not_empty: CondVar::with_strategy(strategy),
            items: parking_lot::Mutex::new(VecDeque::new()),
        });

        let consumer = {
            let queue = Arc::clone(&queue);
            Thread::spawn(move || {
                let mut received = Vec::new();
                let mut guard = queue.mutex.guard();
                while received.len() < 100 {
                    let next = queue.items.lock().pop_front();
                    match next {
                        Some(item) => received.push(item),
                        None => queue.not_empty.wait(&mut guard),
                    }
                }
                assert_eq!(received, (0..100).collect::<Vec<_>>());
            })
            .unwrap()
        };

        let producer = {
            let queue = Arc::clone(&queue);
            Thread::spawn(move || {
                for item in 0..100 {
                    let _guard = queue.mutex.guard();
                    queue.items.lock().push_back(item);
                    queue.not_empty.signal();
                }
            })
            .unwrap()
        };

        producer.join().unwrap();
        consumer.join().unwrap();
        assert!(queue.items.lock().is_empty());
    }
}

#[test]
fn test_once_value_shared_across_threads() {
    static VALUE: OnceValue<u64> = OnceValue::new();
    let inits = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let inits = Arc::clone(&inits);
            Thread::spawn(move || {
                let value = VALUE.get_or_init(|| {
                    inits.fetch_add(1, Ordering::SeqCst);
                    42
                });
                assert_eq!(*value, 42);
            })
            .unwrap()
        })
        .collect();

    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(inits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cooperative_workers_share_primitives() {
    let lock = Arc::new(RwLock::with_strategy(Strategy::Fallback));
    let barrier = Arc::new(Barrier::new(8).unwrap());
    let counter = Arc::new(AtomicU64::new(0));
    let serials = Arc::new(AtomicUsize::new(0));

    let scheduler = {
        let lock = Arc::clone(&lock);
        let barrier = Arc::clone(&barrier);
        let counter = Arc::clone(&counter);
        let serials = Arc::clone(&serials);
        CooperativeScheduler::start(
            move || {
                assert!(cooperative::current_task().is_some());
                for i in 0..10 {
                    if i % 3 == 0 {
                        let _write = lock.write_guard();
                        counter.fetch_add(1, Ordering::SeqCst);
                        cooperative::yield_now();
                    } else {
                        let _read = lock.read_guard();
                        cooperative::yield_now();
                    }
                }
                // Every task must reach the barrier; the scheduler keeps
                // running the others while the early arrivals wait.
                if barrier.wait().is_serial() {
                    serials.fetch_add(1, Ordering::SeqCst);
                }
            },
            8,
        )
        .unwrap()
    };

    scheduler.join().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 8 * 4);
    assert_eq!(serials.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cooperative_semaphore_ping_pong() {
    let ping = Arc::new(Semaphore::new(0).unwrap());
    let pong = Arc::new(Semaphore::new(0).unwrap());
    let volleys = Arc::new(AtomicUsize::new(0));

    let scheduler = {
        let ping = Arc::clone(&ping);
        let pong = Arc::clone(&pong);
        let volleys = Arc::clone(&volleys);
        CooperativeScheduler::start(
            move || {
                let first = cooperative::current_task().map(|t| t.index()) == Some(0);
                for _ in 0..50 {
                    if first {
                        ping.post();
                        pong.wait();
                        volleys.fetch_add(1, Ordering::SeqCst);
                    } else {
                        ping.wait();
                        pong.post();
                    }
                }
            },
            2,
        )
        .unwrap()
    };

    scheduler.join().unwrap();
    assert_eq!(volleys.load(Ordering::SeqCst), 50);
}

#[test]
fn test_cooperative_rejects_zero_tasks() {
    assert!(matches!(
        CooperativeScheduler::start(|| {}, 0),
        Err(SyncError::InvalidArgument(_))
    ));
}
