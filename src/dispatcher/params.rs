//! Dispatcher tuning parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::TaskPriority;

/// Parameters fixed for the lifetime of a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherParams {
    /// Upper bound on concurrently running workers (0 = executor capacity).
    pub max_threads: usize,
    /// Queue capacity; submissions beyond it are refused.
    pub max_queued: usize,
    /// How long an idle worker waits for work before considering retirement.
    #[serde(with = "duration_ms")]
    pub thread_idle_timeout: Duration,
    /// Hint passed through to the executor for every worker.
    pub thread_priority: TaskPriority,
    /// Keep one worker alive while idle instead of scaling to zero.
    pub retain_idle_worker: bool,
}

impl Default for DispatcherParams {
    fn default() -> Self {
        Self {
            max_threads: 0,
            max_queued: 64,
            thread_idle_timeout: Duration::from_secs(10),
            thread_priority: TaskPriority::Normal,
            retain_idle_worker: true,
        }
    }
}

impl DispatcherParams {
    pub fn new(max_threads: usize, max_queued: usize, thread_idle_timeout: Duration) -> Self {
        Self {
            max_threads,
            max_queued,
            thread_idle_timeout,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.thread_priority = priority;
        self
    }

    pub fn with_retain_idle_worker(mut self, retain: bool) -> Self {
        self.retain_idle_worker = retain;
        self
    }

    /// Replace `max_threads == 0` with the executor's capacity (at least 1).
    pub(crate) fn resolve(mut self, executor_capacity: usize) -> Self {
        if self.max_threads == 0 {
            self.max_threads = executor_capacity.max(1);
        }
        self
    }

    /// Number of workers allowed to stay parked with nothing to do.
    pub(crate) fn idle_floor(&self) -> usize {
        usize::from(self.retain_idle_worker)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
