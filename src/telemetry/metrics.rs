//! Dispatcher events mirrored into the `metrics` facade.
//!
//! Without an installed recorder every call here is a no-op.

use ::metrics::{counter, gauge};

pub fn record_connection_begin(active: usize) {
    counter!("conn_dispatch_connections_total").increment(1);
    gauge!("conn_dispatch_active_connections").set(active as f64);
}

pub fn record_connection_end(active: usize) {
    gauge!("conn_dispatch_active_connections").set(active as f64);
}

pub fn record_refused() {
    counter!("conn_dispatch_refused_total").increment(1);
}

pub fn record_worker_threads(threads: usize) {
    gauge!("conn_dispatch_worker_threads").set(threads as f64);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("conn_dispatch_queue_depth").set(depth as f64);
}

/// `stage` is `"create"` or `"run"`.
pub fn record_handler_failure(stage: &'static str) {
    counter!("conn_dispatch_handler_failures_total", "stage" => stage).increment(1);
}
