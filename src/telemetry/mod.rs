//! Telemetry for the dispatcher.
//!
//! Structured logging through `tracing`, one span per served connection, and
//! counters/gauges mirrored into the `metrics` facade.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_connection_begin, record_connection_end, record_handler_failure, record_queue_depth,
    record_refused, record_worker_threads,
};
pub use spans::{ConnectionSpan, SpanExt};
