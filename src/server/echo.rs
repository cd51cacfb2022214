//! Echo handler: writes back whatever the peer sends until it hangs up.

use std::io::{self, Read, Write};
use std::time::Duration;

use tracing::debug;

use super::PendingConnection;
use crate::dispatcher::{ConnectionHandler, ConnectionHandlerFactory, HandlerError};

const BUF_SIZE: usize = 4096;

pub struct EchoHandler {
    connection: PendingConnection,
}

impl ConnectionHandler for EchoHandler {
    fn run(self: Box<Self>) -> Result<(), HandlerError> {
        let PendingConnection { peer, mut stream, accepted_at } = self.connection;
        debug!(%peer, waited_ms = accepted_at.elapsed().as_millis() as u64, "echo started");

        let mut buf = [0u8; BUF_SIZE];
        let mut echoed = 0usize;
        loop {
            let n = match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Read timeout: the peer went quiet, close the connection.
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    break
                }
                Err(e) => return Err(e.into()),
            };
            stream.write_all(&buf[..n])?;
            echoed += n;
        }

        debug!(%peer, echoed, "echo finished");
        Ok(())
    }
}

/// Builds an [`EchoHandler`] per connection.
#[derive(Debug, Clone, Default)]
pub struct EchoHandlerFactory {
    read_timeout: Option<Duration>,
}

impl EchoHandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close connections that stay silent for longer than `timeout`.
    pub fn with_read_timeout(timeout: Duration) -> Self {
        Self { read_timeout: Some(timeout) }
    }
}

impl ConnectionHandlerFactory<PendingConnection> for EchoHandlerFactory {
    fn create_handler(
        &self,
        connection: PendingConnection,
    ) -> Result<Box<dyn ConnectionHandler>, HandlerError> {
        connection
            .stream
            .set_read_timeout(self.read_timeout)
            .map_err(|e| HandlerError::Create(e.to_string()))?;
        Ok(Box::new(EchoHandler { connection }))
    }
}
