//! Per-connection handling strategy.
//!
//! The dispatcher does not know what a handler does with its connection. It
//! asks the factory for one, runs it to completion on a worker thread, and
//! moves on.

use thiserror::Error;

/// Errors raised while creating or running a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler creation failed: {0}")]
    Create(String),

    #[error("Connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// Handles exactly one connection, synchronously, on the calling thread.
pub trait ConnectionHandler: Send {
    fn run(self: Box<Self>) -> Result<(), HandlerError>;
}

/// Produces a handler for each dequeued connection.
pub trait ConnectionHandlerFactory<C>: Send + Sync {
    fn create_handler(&self, connection: C) -> Result<Box<dyn ConnectionHandler>, HandlerError>;
}

/// Handler built from a closure.
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
{
    pub fn boxed(f: F) -> Box<dyn ConnectionHandler> {
        Box::new(Self(f))
    }
}

impl<F> ConnectionHandler for FnHandler<F>
where
    F: FnOnce() -> Result<(), HandlerError> + Send,
{
    fn run(self: Box<Self>) -> Result<(), HandlerError> {
        (self.0)()
    }
}

/// Factory built from a closure mapping a connection to a handler.
pub struct FnHandlerFactory<F>(F);

impl<F> FnHandlerFactory<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<C, F> ConnectionHandlerFactory<C> for FnHandlerFactory<F>
where
    F: Fn(C) -> Result<Box<dyn ConnectionHandler>, HandlerError> + Send + Sync,
{
    fn create_handler(&self, connection: C) -> Result<Box<dyn ConnectionHandler>, HandlerError> {
        (self.0)(connection)
    }
}

/// Render a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
