//! Dispatcher counters.
//!
//! Mutated only while the dispatcher lock is held; there is no concurrency
//! story here beyond that lock.

use serde::{Deserialize, Serialize};

use crate::telemetry;

/// Counters guarded by the dispatcher lock.
#[derive(Debug, Default)]
pub(crate) struct DispatcherStats {
    pub current_threads: usize,
    pub total_connections: u64,
    pub current_connections: usize,
    pub max_concurrent_connections: usize,
    pub refused_connections: u64,
    pub stopped: bool,
}

impl DispatcherStats {
    pub fn begin_connection(&mut self) {
        self.total_connections += 1;
        self.current_connections += 1;
        if self.current_connections > self.max_concurrent_connections {
            self.max_concurrent_connections = self.current_connections;
        }
        telemetry::record_connection_begin(self.current_connections);
    }

    pub fn end_connection(&mut self) {
        self.current_connections = self.current_connections.saturating_sub(1);
        telemetry::record_connection_end(self.current_connections);
    }

    pub fn refuse(&mut self) {
        self.refused_connections += 1;
        telemetry::record_refused();
    }

    pub fn thread_started(&mut self) {
        self.current_threads += 1;
        telemetry::record_worker_threads(self.current_threads);
    }

    pub fn thread_retired(&mut self) {
        self.current_threads = self.current_threads.saturating_sub(1);
        telemetry::record_worker_threads(self.current_threads);
    }
}

/// Point-in-time view of every dispatcher counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSnapshot {
    pub current_threads: usize,
    pub max_threads: usize,
    pub total_connections: u64,
    pub current_connections: usize,
    pub max_concurrent_connections: usize,
    pub queued_connections: usize,
    pub max_queued: usize,
    pub refused_connections: u64,
    pub stopped: bool,
}

impl DispatcherSnapshot {
    /// Every worker slot is taken and work is still waiting.
    pub fn is_saturated(&self) -> bool {
        self.current_threads >= self.max_threads && self.queued_connections > 0
    }
}
