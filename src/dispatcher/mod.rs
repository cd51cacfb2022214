//! Connection dispatching for the server.
//!
//! Accepted connections are admitted into a bounded queue (or refused), and
//! an elastic set of pooled workers drains the queue, running one handler per
//! connection.

mod dispatch;
mod handler;
mod lifetime;
mod params;
mod queue;
mod stats;

pub use dispatch::ConnectionDispatcher;
pub use handler::{
    ConnectionHandler, ConnectionHandlerFactory, FnHandler, FnHandlerFactory, HandlerError,
};
pub use lifetime::SharedLifetime;
pub use params::DispatcherParams;
pub use queue::BoundedWorkQueue;
pub use stats::DispatcherSnapshot;
