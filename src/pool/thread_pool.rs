//! Bounded, elastic OS thread pool.
//!
//! Threads are started on demand up to `capacity` and retire after sitting
//! idle for `idle_timeout_ms`. A task is either handed straight to an idle
//! thread, started on a fresh thread, or refused. Nothing is buffered beyond
//! what idle threads have already been promised, so `try_schedule` never
//! blocks and never queues unbounded work.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::{Task, TaskExecutor, TaskPriority, ThreadPoolError};

/// Configuration for the thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Maximum number of threads (0 = auto-detect).
    pub capacity: usize,
    /// Idle time before a thread exits (milliseconds).
    pub idle_timeout_ms: u64,
    /// Thread stack size in bytes (0 = default).
    pub stack_size: usize,
    /// Thread name prefix.
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 0, // Auto-detect
            idle_timeout_ms: 60_000,
            stack_size: 0,
            thread_name_prefix: "dispatch-worker".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Create config with a fixed capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn effective_capacity(&self) -> usize {
        if self.capacity == 0 {
            num_cpus::get().max(1)
        } else {
            self.capacity
        }
    }
}

/// Statistics for thread pool performance.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ThreadPoolStats {
    pub tasks_scheduled: u64,
    pub tasks_executed: u64,
    pub high_priority_tasks: u64,
    pub tasks_rejected: u64,
    pub task_panics: u64,
    pub threads_spawned: u64,
    pub avg_exec_time_us: u64,
    pub threads_alive: usize,
    pub threads_busy: usize,
    pub threads_idle: usize,
}

struct PoolState {
    /// Tasks promised to idle threads, never longer than `idle`.
    handoff: VecDeque<Task>,
    alive: usize,
    busy: usize,
    idle: usize,
    shutdown: bool,
    stats: ThreadPoolStats,
}

struct Shared {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    idle_timeout: Duration,
}

/// Thread pool with on-demand threads and a hard capacity.
pub struct ThreadPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    config: ThreadPoolConfig,
    capacity: usize,
    next_id: AtomicUsize,
}

impl ThreadPool {
    /// Create a new thread pool. No threads are started until work arrives.
    pub fn new(config: ThreadPoolConfig) -> Self {
        let capacity = config.effective_capacity();
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                handoff: VecDeque::with_capacity(capacity),
                alive: 0,
                busy: 0,
                idle: 0,
                shutdown: false,
                stats: ThreadPoolStats::default(),
            }),
            work_ready: Condvar::new(),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms.max(1)),
        });

        Self {
            shared,
            handles: Mutex::new(Vec::with_capacity(capacity)),
            config,
            capacity,
            next_id: AtomicUsize::new(0),
        }
    }

    fn spawn_thread(&self, first: Task) -> Result<(), ThreadPoolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.config.thread_name_prefix, id);
        let mut builder = thread::Builder::new().name(name);
        if self.config.stack_size > 0 {
            builder = builder.stack_size(self.config.stack_size);
        }

        let shared = Arc::clone(&self.shared);
        let handle = builder
            .spawn(move || Self::thread_loop(&shared, first))
            .map_err(|e| ThreadPoolError::ThreadSpawnFailed(e.to_string()))?;

        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Pooled thread main loop.
    fn thread_loop(shared: &Shared, first: Task) {
        let mut state = shared.state.lock();
        state.busy += 1;
        Self::run_task(&mut state, first);

        loop {
            if let Some(task) = state.handoff.pop_front() {
                state.busy += 1;
                Self::run_task(&mut state, task);
                continue;
            }
            if state.shutdown {
                break;
            }

            state.idle += 1;
            let timed_out = shared
                .work_ready
                .wait_for(&mut state, shared.idle_timeout)
                .timed_out();
            state.idle -= 1;

            if timed_out && state.handoff.is_empty() {
                break;
            }
        }

        state.alive -= 1;
        debug!(alive = state.alive, "pool thread exiting");
    }

    /// Run one task with the lock released. Expects `busy` already raised.
    fn run_task(state: &mut MutexGuard<'_, PoolState>, task: Task) {
        let start = Instant::now();
        let outcome = MutexGuard::unlocked(state, || panic::catch_unwind(AssertUnwindSafe(task)));
        let exec_us = start.elapsed().as_micros() as u64;

        state.busy -= 1;
        let stats = &mut state.stats;
        stats.tasks_executed += 1;
        if outcome.is_err() {
            stats.task_panics += 1;
            warn!("pooled task panicked");
        }
        // Rolling average of execution time
        if stats.avg_exec_time_us == 0 {
            stats.avg_exec_time_us = exec_us;
        } else {
            stats.avg_exec_time_us = (stats.avg_exec_time_us * 9 + exec_us) / 10;
        }
    }

    /// Get current statistics.
    pub fn stats(&self) -> ThreadPoolStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.threads_alive = state.alive;
        stats.threads_busy = state.busy;
        stats.threads_idle = state.idle;
        stats
    }

    /// Number of threads currently alive.
    pub fn alive_threads(&self) -> usize {
        self.shared.state.lock().alive
    }

    /// Check if pool is shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Signal shutdown (does not wait for threads).
    ///
    /// Tasks already running finish; idle threads exit immediately.
    pub fn signal_shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        self.shared.work_ready.notify_all();
    }

    /// Signal shutdown and wait for every thread to finish.
    pub fn join(&self) {
        self.signal_shutdown();
        self.join_threads();
    }

    fn join_threads(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            // The last owner may be one of our own threads.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

impl TaskExecutor for ThreadPool {
    fn try_schedule(&self, task: Task, priority: TaskPriority) -> Result<(), ThreadPoolError> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(ThreadPoolError::PoolShutdown);
        }

        if state.idle > state.handoff.len() {
            state.handoff.push_back(task);
            Self::count_scheduled(&mut state.stats, priority);
            self.shared.work_ready.notify_one();
            return Ok(());
        }

        if state.alive >= self.capacity {
            state.stats.tasks_rejected += 1;
            return Err(ThreadPoolError::NoThreadAvailable { capacity: self.capacity });
        }

        state.alive += 1;
        drop(state);

        if let Err(e) = self.spawn_thread(task) {
            let mut state = self.shared.state.lock();
            state.alive -= 1;
            state.stats.tasks_rejected += 1;
            return Err(e);
        }

        let mut state = self.shared.state.lock();
        state.stats.threads_spawned += 1;
        Self::count_scheduled(&mut state.stats, priority);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl ThreadPool {
    fn count_scheduled(stats: &mut ThreadPoolStats, priority: TaskPriority) {
        stats.tasks_scheduled += 1;
        if priority >= TaskPriority::High {
            stats.high_priority_tasks += 1;
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.signal_shutdown();
        self.join_threads();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn small_pool(capacity: usize) -> ThreadPool {
        ThreadPool::new(ThreadPoolConfig {
            capacity,
            idle_timeout_ms: 50,
            ..Default::default()
        })
    }

    #[test]
    fn test_thread_pool_basic() {
        let pool = small_pool(2);
        assert_eq!(pool.capacity(), 2);

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let (tx, rx) = mpsc::channel();

        pool.try_schedule(
            Box::new(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }),
            TaskPriority::Normal,
        )
        .unwrap();

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_capacity_uses_cpu_count() {
        let pool = ThreadPool::new(ThreadPoolConfig::default());
        assert_eq!(pool.capacity(), num_cpus::get().max(1));
        assert_eq!(pool.alive_threads(), 0);
    }

    #[test]
    fn test_refuses_when_all_threads_busy() {
        let pool = small_pool(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        pool.try_schedule(
            Box::new(move || {
                let _ = release_rx.recv_timeout(Duration::from_secs(2));
            }),
            TaskPriority::Normal,
        )
        .unwrap();

        let err = pool.try_schedule(Box::new(|| {}), TaskPriority::Normal);
        assert!(matches!(err, Err(ThreadPoolError::NoThreadAvailable { capacity: 1 })));
        assert_eq!(pool.stats().tasks_rejected, 1);

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_idle_thread_is_reused() {
        let pool = ThreadPool::new(ThreadPoolConfig {
            capacity: 1,
            idle_timeout_ms: 2_000,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel();

        let tx1 = tx.clone();
        pool.try_schedule(Box::new(move || tx1.send(1).unwrap()), TaskPriority::Normal)
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 1);

        // Wait until the thread parks itself as idle.
        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.stats().threads_idle == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        pool.try_schedule(Box::new(move || tx.send(2).unwrap()), TaskPriority::High)
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);

        let stats = pool.stats();
        assert_eq!(stats.threads_spawned, 1);
        assert_eq!(stats.high_priority_tasks, 1);
    }

    #[test]
    fn test_idle_threads_retire() {
        let pool = small_pool(2);
        pool.try_schedule(Box::new(|| {}), TaskPriority::Normal).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.alive_threads() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.alive_threads(), 0);
    }

    #[test]
    fn test_panicking_task_does_not_leak_thread() {
        let pool = small_pool(1);
        pool.try_schedule(Box::new(|| panic!("boom")), TaskPriority::Normal)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.stats().task_panics == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pool.stats().task_panics, 1);

        pool.join();
        assert_eq!(pool.alive_threads(), 0);
    }

    #[test]
    fn test_schedule_after_shutdown_fails() {
        let pool = small_pool(2);
        pool.signal_shutdown();
        assert!(pool.is_shutdown());
        let err = pool.try_schedule(Box::new(|| {}), TaskPriority::Normal);
        assert!(matches!(err, Err(ThreadPoolError::PoolShutdown)));
    }
}
