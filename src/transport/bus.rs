//! Message-based instrument bus transport.
//!
//! The bus (VISA over USB/GPIB/LXI) frames each message itself, so commands are written
//! without a terminator. Sessions are blocking; every call runs on Tokio's blocking pool
//! with the session behind an `Arc<Mutex<..>>`, the same arrangement the serial helpers use.

use super::{block, validate_command, Transport};
use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default bus operation timeout.
pub const DEFAULT_BUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Display capture query used by [`BusTransport::read_binary_block`].
pub const DISPLAY_CAPTURE_QUERY: &str = ":DISPlay:DATA? PNG";

/// Extra time granted to a blocking call beyond the session's own timeout.
const BLOCKING_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 4096;

/// An open, blocking session on the instrument bus.
pub trait BusSession: Read + Write + Send {
    /// Apply the I/O timeout for subsequent reads and writes.
    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;
}

/// Opens sessions on the bus. Implemented by the VISA backend and by test doubles.
pub trait BusBackend: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// Open a session to `resource`, waiting at most `timeout`.
    fn open(&self, resource: &str, timeout: Duration) -> BenchResult<Box<dyn BusSession>>;
}

type SharedSession = Arc<Mutex<Box<dyn BusSession>>>;

/// Transport over a bus session.
///
/// Supports resource strings like:
/// - "USB0::0x2A8D::0x1770::MY58491960::0::INSTR" (USB)
/// - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
/// - "GPIB0::7::INSTR" (GPIB)
pub struct BusTransport {
    resource: String,
    timeout: Duration,
    backend: Arc<dyn BusBackend>,
    session: Option<SharedSession>,
}

impl BusTransport {
    /// Create a transport using an explicit backend.
    pub fn new(resource: impl Into<String>, backend: Arc<dyn BusBackend>) -> Self {
        Self {
            resource: resource.into(),
            timeout: DEFAULT_BUS_TIMEOUT,
            backend,
            session: None,
        }
    }

    /// Create a transport on the VISA backend.
    ///
    /// Without the `instrument_visa` feature, connecting fails with
    /// [`BenchError::FeatureNotEnabled`].
    pub fn visa(resource: impl Into<String>) -> Self {
        Self::new(resource, super::visa::default_backend())
    }

    /// Set the operation timeout, re-applied to the session on every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Capture the instrument display as raw image bytes.
    pub async fn read_binary_block(&mut self) -> BenchResult<Vec<u8>> {
        self.query_block(DISPLAY_CAPTURE_QUERY).await
    }

    /// Query `*IDN?` on the session. A failed query closes the connection.
    pub async fn verify_connection(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }
        match self.identify().await {
            Ok(id) if !id.is_empty() => true,
            Ok(_) => {
                warn!(resource = %self.resource, "Empty identification response");
                self.dispose();
                false
            }
            Err(err) => {
                warn!(resource = %self.resource, "Connection check failed: {}", err);
                self.dispose();
                false
            }
        }
    }

    /// Run `op` against the session on the blocking pool, under the transport timeout.
    async fn with_session<T, F>(&self, operation: String, op: F) -> BenchResult<T>
    where
        F: FnOnce(&mut dyn BusSession) -> BenchResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = self
            .session
            .clone()
            .ok_or_else(|| BenchError::NotConnected(self.resource.clone()))?;
        let timeout = self.timeout;

        let task = tokio::task::spawn_blocking(move || {
            let mut guard = session.blocking_lock();
            guard.set_timeout(timeout)?;
            op(&mut **guard)
        });

        let outcome = match tokio::time::timeout(timeout + BLOCKING_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(BenchError::Connection(format!(
                "Bus task for {} failed: {}",
                operation, join_err
            ))),
            Err(_) => Err(BenchError::Timeout {
                operation: operation.clone(),
                after: timeout,
            }),
        };

        outcome.map_err(|err| match err {
            BenchError::Io(io)
                if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) =>
            {
                BenchError::Timeout {
                    operation,
                    after: timeout,
                }
            }
            other => other,
        })
    }
}

fn write_message(session: &mut dyn BusSession, command: &str) -> BenchResult<()> {
    session.write_all(command.as_bytes())?;
    session.flush()?;
    Ok(())
}

/// Read until the message terminator or the end of one bus transfer.
fn read_message(session: &mut dyn BusSession) -> BenchResult<String> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = session.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
        if raw.last() == Some(&b'\n') || n < chunk.len() {
            break;
        }
    }
    if raw.is_empty() {
        return Err(BenchError::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "Instrument returned no data",
        )));
    }
    Ok(String::from_utf8_lossy(&raw).trim().to_string())
}

#[async_trait]
impl Transport for BusTransport {
    async fn connect(&mut self) -> BenchResult<()> {
        if self.session.is_some() {
            debug!(resource = %self.resource, "Already connected");
            return Ok(());
        }

        let backend = Arc::clone(&self.backend);
        let resource = self.resource.clone();
        let timeout = self.timeout;
        info!(resource = %self.resource, backend = backend.name(), "Opening bus session");

        let task = tokio::task::spawn_blocking(move || -> BenchResult<Box<dyn BusSession>> {
            let mut session = backend.open(&resource, timeout)?;
            session.set_timeout(timeout)?;
            write_message(&mut *session, "*RST")?;
            write_message(&mut *session, "*CLS")?;
            Ok(session)
        });

        let session = match tokio::time::timeout(timeout + BLOCKING_GRACE, task).await {
            Ok(Ok(Ok(session))) => session,
            Ok(Ok(Err(err @ BenchError::FeatureNotEnabled(_)))) => return Err(err),
            Ok(Ok(Err(err))) => {
                return Err(BenchError::Connection(format!(
                    "Failed to open {}: {}",
                    self.resource, err
                )))
            }
            Ok(Err(join_err)) => {
                return Err(BenchError::Connection(format!(
                    "Bus open task failed: {}",
                    join_err
                )))
            }
            Err(_) => {
                return Err(BenchError::Connection(format!(
                    "Connection timeout to {} after {}ms",
                    self.resource,
                    timeout.as_millis()
                )))
            }
        };

        self.session = Some(Arc::new(Mutex::new(session)));
        info!(resource = %self.resource, "Bus session ready");
        Ok(())
    }

    async fn write(&mut self, command: &str) -> BenchResult<()> {
        let command = validate_command(command)?.to_string();
        debug!(resource = %self.resource, "SCPI write: {:?}", command);
        self.with_session(format!("write of {}", command), move |session| {
            write_message(session, &command)
        })
        .await
    }

    async fn read_line(&mut self) -> BenchResult<String> {
        let response = self
            .with_session("response line".to_string(), read_message)
            .await?;
        debug!(resource = %self.resource, "SCPI response: {:?}", response);
        Ok(response)
    }

    async fn query(&mut self, command: &str) -> BenchResult<String> {
        let command = validate_command(command)?.to_string();
        debug!(resource = %self.resource, "SCPI query: {:?}", command);
        let operation = format!("response to {}", command);
        let response = self
            .with_session(operation, move |session| {
                write_message(session, &command)?;
                read_message(session)
            })
            .await?;
        debug!(resource = %self.resource, "SCPI response: {:?}", response);
        Ok(response)
    }

    async fn query_block(&mut self, command: &str) -> BenchResult<Vec<u8>> {
        let command = validate_command(command)?.to_string();
        debug!(resource = %self.resource, "SCPI block query: {:?}", command);
        let operation = format!("block response to {}", command);
        let payload = self
            .with_session(operation, move |session| {
                write_message(session, &command)?;
                block::read_block(session)
            })
            .await?;
        debug!(resource = %self.resource, "SCPI block response: {} bytes", payload.len());
        Ok(payload)
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn address(&self) -> &str {
        &self.resource
    }

    fn dispose(&mut self) {
        if self.session.take().is_some() {
            info!(resource = %self.resource, "Bus session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RefusingBackend;

    impl BusBackend for RefusingBackend {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn open(&self, resource: &str, _timeout: Duration) -> BenchResult<Box<dyn BusSession>> {
            Err(BenchError::Connection(format!("no device at {}", resource)))
        }
    }

    #[test]
    fn transport_creation() {
        let transport = BusTransport::new("GPIB0::7::INSTR", Arc::new(RefusingBackend));
        assert_eq!(transport.address(), "GPIB0::7::INSTR");
        assert_eq!(transport.timeout(), Duration::from_secs(5));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn open_failure_is_connection_error() {
        let mut transport = BusTransport::new("GPIB0::7::INSTR", Arc::new(RefusingBackend))
            .with_timeout(Duration::from_millis(200));
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, BenchError::Connection(_)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn calls_before_connect_fail() {
        let mut transport = BusTransport::new("GPIB0::7::INSTR", Arc::new(RefusingBackend));
        assert!(matches!(
            transport.query("*IDN?").await,
            Err(BenchError::NotConnected(_))
        ));
        assert!(!transport.verify_connection().await);
    }
}
