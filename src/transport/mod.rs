//! Command/response transports for bench instruments.
//!
//! A [`Transport`] owns exactly one connection to one instrument. Every operation takes
//! `&mut self`, so a query's read can never interleave with another caller's write: the
//! borrow checker enforces the one-outstanding-query rule that SCPI instruments require.
//!
//! Two concrete transports exist:
//!
//! - [`SocketTransport`]: raw TCP stream (port 5025), newline framed.
//! - [`BusTransport`]: message-based instrument bus session (VISA), framing handled by the bus.
//!
//! [`MockTransport`] scripts responses for controller tests.

pub mod block;
pub mod bus;
pub mod mock;
pub mod socket;
pub mod visa;

use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use bus::{BusBackend, BusSession, BusTransport, DISPLAY_CAPTURE_QUERY};
pub use mock::{CommandLog, MockLink, MockTransport, Reply};
pub use socket::SocketTransport;

/// Identification query understood by every IEEE 488.2 instrument.
pub const IDENTIFY_QUERY: &str = "*IDN?";

/// A single exclusively-owned command channel to one instrument.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection. A no-op when already connected.
    async fn connect(&mut self) -> BenchResult<()>;

    /// Send a command that produces no response.
    async fn write(&mut self, command: &str) -> BenchResult<()>;

    /// Read one pending text response.
    async fn read_line(&mut self) -> BenchResult<String>;

    /// Send a command and read exactly one text response to it.
    async fn query(&mut self, command: &str) -> BenchResult<String> {
        self.write(command).await?;
        self.read_line().await
    }

    /// Send a command and read one definite-length binary block response.
    async fn query_block(&mut self, command: &str) -> BenchResult<Vec<u8>>;

    /// Instrument identification string.
    async fn identify(&mut self) -> BenchResult<String> {
        self.query(IDENTIFY_QUERY).await
    }

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;

    /// Target address (bus resource string or `host:port`).
    fn address(&self) -> &str;

    /// Release the connection. Safe to call repeatedly and from any state.
    fn dispose(&mut self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn connect(&mut self) -> BenchResult<()> {
        (**self).connect().await
    }

    async fn write(&mut self, command: &str) -> BenchResult<()> {
        (**self).write(command).await
    }

    async fn read_line(&mut self) -> BenchResult<String> {
        (**self).read_line().await
    }

    async fn query(&mut self, command: &str) -> BenchResult<String> {
        (**self).query(command).await
    }

    async fn query_block(&mut self, command: &str) -> BenchResult<Vec<u8>> {
        (**self).query_block(command).await
    }

    async fn identify(&mut self) -> BenchResult<String> {
        (**self).identify().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn address(&self) -> &str {
        (**self).address()
    }

    fn dispose(&mut self) {
        (**self).dispose()
    }
}

/// Reject blank commands before anything touches the wire.
pub(crate) fn validate_command(command: &str) -> BenchResult<&str> {
    if command.trim().is_empty() {
        return Err(BenchError::Argument("command must not be empty".to_string()));
    }
    Ok(command)
}

/// Run one I/O future under a deadline, mapping expiry to [`BenchError::Timeout`].
pub(crate) async fn with_deadline<T, F>(after: Duration, operation: &str, io: F) -> BenchResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(after, io).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(BenchError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}
