//! TCP front end: accept connections and hand them to the dispatcher.

mod echo;

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatcher::{ConnectionDispatcher, ConnectionHandlerFactory, DispatcherParams};
use crate::pool::TaskExecutor;

pub use echo::{EchoHandler, EchoHandlerFactory};

/// How often the acceptor re-checks the stop flag while no client connects.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// An accepted connection waiting for a worker.
#[derive(Debug)]
pub struct PendingConnection {
    pub peer: SocketAddr,
    pub stream: TcpStream,
    pub accepted_at: Instant,
}

/// Errors from setting up or running the acceptor.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error("Listener I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Server already started")]
    AlreadyStarted,
}

/// Listening socket plus the dispatcher it feeds.
pub struct TcpServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    dispatcher: ConnectionDispatcher<PendingConnection>,
    stopping: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl TcpServer {
    /// Bind `addr` and build a dispatcher around `factory`.
    pub fn bind<A, F>(
        addr: A,
        factory: F,
        executor: Arc<dyn TaskExecutor>,
        params: DispatcherParams,
    ) -> Result<Self, ServerError>
    where
        A: ToSocketAddrs,
        F: ConnectionHandlerFactory<PendingConnection> + 'static,
    {
        let listener = TcpListener::bind(addr).map_err(ServerError::Bind)?;
        let dispatcher = ConnectionDispatcher::new(factory, executor, params);
        Self::with_listener(listener, dispatcher)
    }

    /// Serve an already bound listener through an existing dispatcher.
    pub fn with_listener(
        listener: TcpListener,
        dispatcher: ConnectionDispatcher<PendingConnection>,
    ) -> Result<Self, ServerError> {
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener: Some(listener),
            local_addr,
            dispatcher,
            stopping: Arc::new(AtomicBool::new(false)),
            acceptor: None,
        })
    }

    /// Start the acceptor thread.
    pub fn start(&mut self) -> Result<(), ServerError> {
        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;
        let dispatcher = self.dispatcher.clone();
        let stopping = Arc::clone(&self.stopping);

        let handle = thread::Builder::new()
            .name("dispatch-acceptor".to_string())
            .spawn(move || accept_loop(&listener, &dispatcher, &stopping))?;
        self.acceptor = Some(handle);

        info!(addr = %self.local_addr, "server listening");
        Ok(())
    }

    /// Stop accepting, then stop the dispatcher. Running handlers finish.
    pub fn stop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
        self.dispatcher.stop();
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &ConnectionDispatcher<PendingConnection> {
        &self.dispatcher
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: &TcpListener,
    dispatcher: &ConnectionDispatcher<PendingConnection>,
    stopping: &AtomicBool,
) {
    while !stopping.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                // Accepted sockets may inherit non-blocking mode.
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!(%peer, error = %e, "dropping connection");
                    continue;
                }
                debug!(%peer, "connection accepted");
                dispatcher.submit(PendingConnection {
                    peer,
                    stream,
                    accepted_at: Instant::now(),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("acceptor exiting");
}
