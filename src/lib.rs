//! conn-dispatch
//!
//! Connection dispatcher with bounded admission and an elastic worker pool.
//! Accepted connections wait in a fixed-capacity FIFO queue; a dynamically
//! sized set of workers, borrowed from a shared thread pool, drains it. Each
//! connection is served exactly once by a handler built from a pluggable
//! factory, or refused outright when the queue is full.
//!
//! # Layout
//!
//! - [`dispatcher`]: the queue, worker lifecycle and counters
//! - [`pool`]: the thread pool the dispatcher borrows workers from
//! - [`server`]: TCP acceptor feeding a dispatcher, plus an echo handler
//! - [`health`]: liveness and readiness derived from dispatcher counters
//! - [`config`], [`telemetry`], [`cli`]: process plumbing for the binary

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod health;
pub mod pool;
pub mod server;
pub mod telemetry;

pub use dispatcher::{
    ConnectionDispatcher, ConnectionHandler, ConnectionHandlerFactory, DispatcherParams,
    DispatcherSnapshot, HandlerError,
};
pub use pool::{TaskExecutor, TaskPriority, ThreadPool, ThreadPoolConfig};
