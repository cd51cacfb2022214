//! Admission, worker scheduling and the worker loop.
//!
//! One short-held lock guards every counter. The queue has its own lock and
//! is always taken *after* the counter lock, never the other way around.
//! Neither lock is held while a worker blocks for work or runs a handler.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::handler::{panic_message, ConnectionHandlerFactory, HandlerError};
use super::lifetime::SharedLifetime;
use super::params::DispatcherParams;
use super::queue::BoundedWorkQueue;
use super::stats::{DispatcherSnapshot, DispatcherStats};
use crate::pool::TaskExecutor;
use crate::telemetry::{self, ConnectionSpan, SpanExt};

struct DispatcherCore<C> {
    params: DispatcherParams,
    queue: BoundedWorkQueue<C>,
    stats: Mutex<DispatcherStats>,
    /// Signalled whenever a worker retires.
    retired: Condvar,
    factory: Box<dyn ConnectionHandlerFactory<C>>,
    executor: Arc<dyn TaskExecutor>,
}

impl<C> Drop for DispatcherCore<C> {
    fn drop(&mut self) {
        debug!("dispatcher core released");
    }
}

/// Admits, queues or refuses connections and drives an elastic set of
/// workers that run one handler per connection.
///
/// Cloning the dispatcher takes another reference to the same core. The core
/// lives until the last clone is dropped *and* every worker has exited.
pub struct ConnectionDispatcher<C> {
    core: SharedLifetime<DispatcherCore<C>>,
}

impl<C> Clone for ConnectionDispatcher<C> {
    fn clone(&self) -> Self {
        Self { core: self.core.retain() }
    }
}

impl<C: Send + 'static> ConnectionDispatcher<C> {
    /// Build a dispatcher. `max_threads == 0` inherits the executor capacity.
    pub fn new<F>(factory: F, executor: Arc<dyn TaskExecutor>, params: DispatcherParams) -> Self
    where
        F: ConnectionHandlerFactory<C> + 'static,
    {
        let params = params.resolve(executor.capacity());
        debug!(
            max_threads = params.max_threads,
            max_queued = params.max_queued,
            idle_timeout_ms = params.thread_idle_timeout.as_millis() as u64,
            priority = %params.thread_priority,
            "dispatcher created"
        );

        Self {
            core: SharedLifetime::new(DispatcherCore {
                queue: BoundedWorkQueue::new(params.max_queued),
                params,
                stats: Mutex::new(DispatcherStats::default()),
                retired: Condvar::new(),
                factory: Box::new(factory),
                executor,
            }),
        }
    }

    /// Queue `connection` for a worker, starting one if nobody is free.
    ///
    /// Never blocks and never reports failure to the caller: a refused
    /// connection is dropped and counted in
    /// [`refused_connections`](Self::refused_connections).
    pub fn submit(&self, connection: C) {
        let core = &*self.core;
        let mut stats = core.stats.lock();

        if stats.stopped {
            stats.refuse();
            debug!("connection refused: dispatcher stopped");
            return;
        }

        if let Err(_rejected) = core.queue.try_enqueue(connection) {
            stats.refuse();
            debug!(
                refused = stats.refused_connections,
                max_queued = core.params.max_queued,
                "connection refused: queue full"
            );
            return;
        }
        telemetry::record_queue_depth(core.queue.len());

        if core.queue.has_idle_consumer() || stats.current_threads >= core.params.max_threads {
            return;
        }

        let worker = self.core.retain();
        let task = Box::new(move || run_worker(worker));
        match core.executor.try_schedule(task, core.params.thread_priority) {
            Ok(()) => {
                stats.thread_started();
                debug!(current_threads = stats.current_threads, "worker scheduled");
            }
            Err(e) => {
                // Already queued; an existing or future worker picks it up.
                debug!(error = %e, "could not schedule worker");
            }
        }
    }

    /// Stop admitting, discard everything still queued and wake idle workers.
    ///
    /// Handlers already running finish normally. Idempotent.
    pub fn stop(&self) {
        let first = {
            let mut stats = self.core.stats.lock();
            !std::mem::replace(&mut stats.stopped, true)
        };
        let discarded = self.core.queue.clear_and_wake_all();
        if first {
            info!(discarded, "dispatcher stopped");
        }
    }

    /// Wait until every worker has retired. Returns false on timeout.
    ///
    /// Must not be called from a handler: the calling worker counts itself.
    pub fn await_workers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stats = self.core.stats.lock();
        while stats.current_threads > 0 {
            match deadline {
                Some(deadline) => {
                    if self.core.retired.wait_until(&mut stats, deadline).timed_out() {
                        return stats.current_threads == 0;
                    }
                }
                None => self.core.retired.wait(&mut stats),
            }
        }
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.core.stats.lock().stopped
    }

    pub fn current_threads(&self) -> usize {
        self.core.stats.lock().current_threads
    }

    pub fn total_connections(&self) -> u64 {
        self.core.stats.lock().total_connections
    }

    pub fn current_connections(&self) -> usize {
        self.core.stats.lock().current_connections
    }

    pub fn max_concurrent_connections(&self) -> usize {
        self.core.stats.lock().max_concurrent_connections
    }

    pub fn queued_connections(&self) -> usize {
        self.core.queue.len()
    }

    pub fn refused_connections(&self) -> u64 {
        self.core.stats.lock().refused_connections
    }

    /// All counters read under a single lock acquisition.
    pub fn snapshot(&self) -> DispatcherSnapshot {
        let core = &*self.core;
        let stats = core.stats.lock();
        DispatcherSnapshot {
            current_threads: stats.current_threads,
            max_threads: core.params.max_threads,
            total_connections: stats.total_connections,
            current_connections: stats.current_connections,
            max_concurrent_connections: stats.max_concurrent_connections,
            queued_connections: core.queue.len(),
            max_queued: core.params.max_queued,
            refused_connections: stats.refused_connections,
            stopped: stats.stopped,
        }
    }

    /// Effective parameters, with `max_threads` resolved.
    pub fn params(&self) -> &DispatcherParams {
        &self.core.params
    }

    /// Live references to the core: dispatcher handles plus running workers.
    pub fn holders(&self) -> usize {
        self.core.holders()
    }
}

/// Body of every pooled worker. Owns one reference to the core until it exits.
fn run_worker<C: Send + 'static>(core: SharedLifetime<DispatcherCore<C>>) {
    let idle_timeout = core.params.thread_idle_timeout;
    let idle_floor = core.params.idle_floor();
    let unwind = RetireOnUnwind { core: &*core };

    loop {
        match core.queue.dequeue_timeout(idle_timeout) {
            Some(connection) => {
                core.serve(connection);
                let mut stats = core.stats.lock();
                if stats.stopped {
                    core.retire(&mut stats);
                    break;
                }
            }
            None => {
                let mut stats = core.stats.lock();
                if stats.stopped
                    || (stats.current_threads > idle_floor && core.queue.is_empty())
                {
                    core.retire(&mut stats);
                    break;
                }
            }
        }
    }

    drop(unwind);
    core.release();
}

/// Gives the worker slot back if the loop unwinds, so `submit` can start a
/// replacement for any work still queued.
struct RetireOnUnwind<'a, C> {
    core: &'a DispatcherCore<C>,
}

impl<C> Drop for RetireOnUnwind<'_, C> {
    fn drop(&mut self) {
        if thread::panicking() {
            let mut stats = self.core.stats.lock();
            warn!("worker loop unwound");
            self.core.retire(&mut stats);
        }
    }
}

impl<C> DispatcherCore<C> {
    fn retire(&self, stats: &mut DispatcherStats) {
        stats.thread_retired();
        debug!(current_threads = stats.current_threads, "worker retired");
        self.retired.notify_all();
    }

    /// Create and run one handler. Failures stay with this connection.
    fn serve(&self, connection: C) {
        let created = panic::catch_unwind(AssertUnwindSafe(|| {
            self.factory.create_handler(connection)
        }))
        .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));

        let handler = match created {
            Ok(handler) => handler,
            Err(e) => {
                warn!(error = %e, "could not create connection handler");
                telemetry::record_handler_failure("create");
                return;
            }
        };

        let active = ActiveConnection::begin(&self.stats);
        let span = ConnectionSpan::new(active.id);
        let _enter = span.enter();
        let started = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.run()))
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));

        span.record("duration_ms", started.elapsed().as_millis() as u64);
        span.record_result(&result);
        if let Err(e) = &result {
            warn!(error = %e, "connection handler failed");
            telemetry::record_handler_failure("run");
        }
    }
}

/// Counts one connection as active until dropped.
struct ActiveConnection<'a> {
    stats: &'a Mutex<DispatcherStats>,
    id: u64,
}

impl<'a> ActiveConnection<'a> {
    fn begin(stats: &'a Mutex<DispatcherStats>) -> Self {
        let mut guard = stats.lock();
        guard.begin_connection();
        let id = guard.total_connections;
        drop(guard);
        Self { stats, id }
    }
}

impl Drop for ActiveConnection<'_> {
    fn drop(&mut self) {
        self.stats.lock().end_connection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::handler::{ConnectionHandler, FnHandler, FnHandlerFactory};
    use crate::pool::{Task, TaskPriority, ThreadPoolError};

    /// Executor that never has a thread to spare.
    struct NoThreads;

    impl TaskExecutor for NoThreads {
        fn try_schedule(&self, _task: Task, _priority: TaskPriority) -> Result<(), ThreadPoolError> {
            Err(ThreadPoolError::NoThreadAvailable { capacity: 0 })
        }

        fn capacity(&self) -> usize {
            4
        }
    }

    fn noop_factory() -> impl ConnectionHandlerFactory<u32> {
        FnHandlerFactory::new(|_n: u32| -> Result<Box<dyn ConnectionHandler>, HandlerError> {
            Ok(FnHandler::boxed(|| Ok(())))
        })
    }

    fn stalled(max_queued: usize) -> ConnectionDispatcher<u32> {
        ConnectionDispatcher::new(
            noop_factory(),
            Arc::new(NoThreads),
            DispatcherParams::new(2, max_queued, Duration::from_millis(10)),
        )
    }

    #[test]
    fn test_max_threads_zero_uses_executor_capacity() {
        let dispatcher = ConnectionDispatcher::new(
            noop_factory(),
            Arc::new(NoThreads),
            DispatcherParams::new(0, 1, Duration::from_millis(10)),
        );
        assert_eq!(dispatcher.params().max_threads, 4);
    }

    #[test]
    fn test_scheduling_failure_keeps_connection_queued() {
        let dispatcher = stalled(4);
        dispatcher.submit(1);
        dispatcher.submit(2);
        assert_eq!(dispatcher.queued_connections(), 2);
        assert_eq!(dispatcher.current_threads(), 0);
        assert_eq!(dispatcher.refused_connections(), 0);
        // Failed schedules must not leak core references.
        assert_eq!(dispatcher.holders(), 1);
    }

    #[test]
    fn test_overflow_is_refused() {
        let dispatcher = stalled(3);
        for n in 0..4 {
            dispatcher.submit(n);
        }
        assert_eq!(dispatcher.queued_connections(), 3);
        assert_eq!(dispatcher.refused_connections(), 1);
    }

    #[test]
    fn test_stop_clears_queue_and_refuses_later_submissions() {
        let dispatcher = stalled(4);
        dispatcher.submit(1);
        dispatcher.submit(2);

        dispatcher.stop();
        assert!(dispatcher.is_stopped());
        assert_eq!(dispatcher.queued_connections(), 0);

        dispatcher.submit(3);
        assert_eq!(dispatcher.queued_connections(), 0);
        assert_eq!(dispatcher.refused_connections(), 1);

        let before = dispatcher.snapshot();
        dispatcher.stop();
        assert_eq!(dispatcher.snapshot(), before);
    }

    #[test]
    fn test_await_workers_without_workers() {
        let dispatcher = stalled(1);
        assert!(dispatcher.await_workers(Duration::from_millis(1)));
        assert!(dispatcher.await_workers(Duration::MAX));
    }

    #[test]
    fn test_unwinding_worker_gives_back_its_slot() {
        let dispatcher = stalled(1);
        dispatcher.core.stats.lock().thread_started();
        assert_eq!(dispatcher.current_threads(), 1);

        let core = &*dispatcher.core;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _unwind = RetireOnUnwind { core };
            panic!("worker died");
        }));

        assert!(result.is_err());
        assert_eq!(dispatcher.current_threads(), 0);
        assert!(dispatcher.await_workers(Duration::MAX));
    }
}
