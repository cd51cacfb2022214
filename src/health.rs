//! Health checks derived from dispatcher counters.
//!
//! Operators see dispatcher health only through its counters: a growing
//! refusal count means sustained overload, and every worker busy with work
//! still queued means saturation.

use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatcherSnapshot;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_connections: bool,
    pub saturated: bool,
    /// Refusals since the previous report.
    pub refused_since_last: u64,
    pub dispatcher: DispatcherSnapshot,
    pub uptime_secs: u64,
}

/// Aggregates health information from dispatcher snapshots.
pub struct HealthChecker {
    start_time: Instant,
    last_refused: Mutex<u64>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            last_refused: Mutex::new(0),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: accepting traffic with queue room left.
    pub fn is_ready(&self, snapshot: &DispatcherSnapshot) -> bool {
        !snapshot.stopped && snapshot.queued_connections < snapshot.max_queued
    }

    /// Generate full health report.
    pub fn report(&self, snapshot: &DispatcherSnapshot) -> HealthReport {
        let refused_since_last = {
            let mut last = self.last_refused.lock();
            let delta = snapshot.refused_connections.saturating_sub(*last);
            *last = snapshot.refused_connections;
            delta
        };
        let saturated = snapshot.is_saturated();

        let state = if snapshot.stopped {
            HealthState::Unhealthy
        } else if saturated || refused_since_last > 0 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            state,
            ready: self.is_ready(snapshot),
            accepting_connections: !snapshot.stopped,
            saturated,
            refused_since_last,
            dispatcher: *snapshot,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}
