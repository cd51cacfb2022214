//! TDD-Light tests for the thread pool as seen by the dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use conn_dispatch::pool::{
    TaskExecutor, TaskPriority, ThreadPool, ThreadPoolConfig, ThreadPoolError,
};

#[test]
fn capacity_bounds_concurrent_tasks() {
    let pool = ThreadPool::new(ThreadPoolConfig::with_capacity(2));
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Arc::new(parking_lot::Mutex::new(release_rx));

    for _ in 0..2 {
        let rx = release_rx.clone();
        pool.try_schedule(
            Box::new(move || {
                let _ = rx.lock().recv_timeout(Duration::from_secs(2));
            }),
            TaskPriority::Normal,
        )
        .unwrap();
    }

    let refused = pool.try_schedule(Box::new(|| {}), TaskPriority::Low);
    assert!(matches!(
        refused,
        Err(ThreadPoolError::NoThreadAvailable { capacity: 2 })
    ));

    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();
    pool.join();
    assert_eq!(pool.stats().tasks_executed, 2);
}

#[test]
fn join_waits_for_running_tasks() {
    let pool = ThreadPool::new(ThreadPoolConfig::with_capacity(4));
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let counter = counter.clone();
        pool.try_schedule(
            Box::new(move || {
                std::thread::sleep(Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            TaskPriority::Normal,
        )
        .unwrap();
    }

    pool.join();
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(pool.alive_threads(), 0);
}

#[test]
fn shutdown_pool_refuses_work() {
    let pool = ThreadPool::new(ThreadPoolConfig::with_capacity(1));
    pool.signal_shutdown();

    assert!(pool.is_shutdown());
    let result = pool.try_schedule(Box::new(|| {}), TaskPriority::Critical);
    assert!(matches!(result, Err(ThreadPoolError::PoolShutdown)));
}

#[test]
fn usable_as_trait_object() {
    let executor: Arc<dyn TaskExecutor> = Arc::new(ThreadPool::new(ThreadPoolConfig::with_capacity(3)));
    assert_eq!(executor.capacity(), 3);

    let (tx, rx) = mpsc::channel();
    executor
        .try_schedule(Box::new(move || tx.send(7).unwrap()), TaskPriority::High)
        .unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
}
