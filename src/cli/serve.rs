//! `serve` subcommand: run the echo server until Ctrl-C.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{self, ConfigError};
use crate::health::HealthChecker;
use crate::pool::ThreadPool;
use crate::server::{EchoHandlerFactory, ServerError, TcpServer};
use crate::telemetry::{self, LogError};

/// How long idle echo connections are kept open.
const ECHO_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// How long shutdown waits for running handlers.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logging(#[from] LogError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("Signal handling failed: {0}")]
    Signal(#[source] std::io::Error),
}

pub async fn run_serve(config_file: Option<&Path>) -> Result<(), ServeError> {
    let cfg = match config_file {
        Some(path) => config::load_file(path)?,
        None => config::load(),
    };
    telemetry::init_logging(&cfg.logging)?;

    let pool = Arc::new(ThreadPool::new(cfg.pool.clone()));
    let mut server = TcpServer::bind(
        cfg.bind,
        EchoHandlerFactory::with_read_timeout(ECHO_READ_TIMEOUT),
        pool.clone(),
        cfg.dispatcher.clone(),
    )?;
    server.start()?;

    let params = server.dispatcher().params();
    info!(
        addr = %server.local_addr(),
        max_threads = params.max_threads,
        max_queued = params.max_queued,
        pool_capacity = cfg.pool.capacity,
        "conn-dispatch started"
    );

    tokio::signal::ctrl_c().await.map_err(ServeError::Signal)?;
    info!("shutdown requested");

    server.stop();
    let checker = HealthChecker::new();
    if !server.dispatcher().await_workers(DRAIN_TIMEOUT) {
        warn!(
            remaining = server.dispatcher().current_threads(),
            "workers still running after drain timeout"
        );
    }
    let report = checker.report(&server.dispatcher().snapshot());
    info!(
        total = report.dispatcher.total_connections,
        refused = report.dispatcher.refused_connections,
        peak = report.dispatcher.max_concurrent_connections,
        "conn-dispatch stopped"
    );

    drop(server);
    pool.join();
    Ok(())
}
