//! Span utilities and extension traits for connection tracing.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the span wrapping one handler invocation.
pub struct ConnectionSpan;

impl ConnectionSpan {
    /// Fields:
    /// - `connection_id`: sequence number assigned when the connection became active
    /// - `status`, `error.message`: filled in by `SpanExt::record_result`
    /// - `duration_ms`: filled in after the handler returns
    pub fn new(connection_id: u64) -> Span {
        info_span!(
            "connection",
            connection_id,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        )
    }
}
