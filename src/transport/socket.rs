//! Raw socket SCPI transport.
//!
//! Instruments listening on the SCPI raw port accept newline-terminated commands and
//! answer queries with exactly one newline-terminated line (or one binary block).

use super::{block, validate_command, with_deadline, Transport};
use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Default SCPI raw socket port.
pub const DEFAULT_PORT: u16 = 5025;

/// Default read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default connection establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Newline-framed TCP transport.
pub struct SocketTransport {
    host: String,
    port: u16,
    address: String,
    timeout: Duration,
    connect_timeout: Duration,
    stream: Option<BufReader<TcpStream>>,
}

impl SocketTransport {
    /// Create a transport for `host:port`. Nothing is opened until [`Transport::connect`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let address = format!("{}:{}", host, port);
        Self {
            host,
            port,
            address,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream: None,
        }
    }

    /// Set the read/write timeout applied to every call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection establishment timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn stream_mut(&mut self) -> BenchResult<&mut BufReader<TcpStream>> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(BenchError::NotConnected(self.address.clone())),
        }
    }

    async fn send(&mut self, command: &str) -> BenchResult<()> {
        let command = validate_command(command)?;
        let timeout = self.timeout;
        let line = if command.ends_with('\n') {
            command.to_string()
        } else {
            format!("{}\n", command)
        };
        debug!(address = %self.address, "SCPI write: {:?}", line.trim_end());

        let stream = self.stream_mut()?;
        let result = with_deadline(timeout, &format!("write of {}", line.trim_end()), async {
            stream.get_mut().write_all(line.as_bytes()).await?;
            stream.get_mut().flush().await
        })
        .await;
        self.close_on_broken_pipe(result)
    }

    async fn receive_line(&mut self) -> BenchResult<String> {
        let timeout = self.timeout;
        let stream = self.stream_mut()?;

        let mut raw = Vec::new();
        let read =
            with_deadline(timeout, "response line", stream.read_until(b'\n', &mut raw)).await;
        let result = match read {
            Ok(_) if raw.last() == Some(&b'\n') => {
                let text = String::from_utf8_lossy(&raw).trim().to_string();
                debug!(address = %self.address, "SCPI response: {:?}", text);
                Ok(text)
            }
            Ok(_) => Err(BenchError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "Socket closed unexpectedly",
            ))),
            Err(err) => Err(err),
        };
        self.close_on_broken_pipe(result)
    }

    /// Drop the stream when the peer has gone away so later calls report `NotConnected`.
    fn close_on_broken_pipe<T>(&mut self, result: BenchResult<T>) -> BenchResult<T> {
        if let Err(BenchError::Io(err)) = &result {
            if matches!(
                err.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            ) {
                warn!(address = %self.address, "Connection lost: {}", err);
                self.stream = None;
            }
        }
        result
    }

    /// Discard stale bytes left over from an earlier timed-out query.
    fn discard_pending(stream: &mut BufReader<TcpStream>) -> usize {
        let buffered = stream.buffer().len();
        stream.consume(buffered);

        let mut discarded = buffered;
        let mut scratch = [0u8; 512];
        loop {
            match stream.get_ref().try_read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(_) => break,
            }
        }
        discarded
    }

    fn flush_input(&mut self) -> BenchResult<()> {
        let address = self.address.clone();
        let stream = self.stream_mut()?;
        let discarded = Self::discard_pending(stream);
        if discarded > 0 {
            debug!(address = %address, "Flushed {} stale bytes from stream", discarded);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn connect(&mut self) -> BenchResult<()> {
        if self.stream.is_some() {
            debug!(address = %self.address, "Already connected");
            return Ok(());
        }

        let connecting = TcpStream::connect((self.host.as_str(), self.port));
        let stream = match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                return Err(BenchError::Connection(format!(
                    "Failed to connect to {}: {}",
                    self.address, err
                )))
            }
            Err(_) => {
                return Err(BenchError::Connection(format!(
                    "Connection timeout to {} after {}ms",
                    self.address,
                    self.connect_timeout.as_millis()
                )))
            }
        };

        stream.set_nodelay(true)?;
        info!(address = %self.address, "Connected over raw socket");
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    async fn write(&mut self, command: &str) -> BenchResult<()> {
        self.send(command).await
    }

    async fn read_line(&mut self) -> BenchResult<String> {
        self.receive_line().await
    }

    async fn query(&mut self, command: &str) -> BenchResult<String> {
        validate_command(command)?;
        self.flush_input()?;
        self.send(command).await?;
        self.receive_line().await
    }

    async fn query_block(&mut self, command: &str) -> BenchResult<Vec<u8>> {
        validate_command(command)?;
        self.flush_input()?;
        self.send(command).await?;
        let timeout = self.timeout;
        let stream = self.stream_mut()?;
        let result = block::read_block_async(stream, timeout).await;
        if let Ok(payload) = &result {
            debug!(address = %self.address, "SCPI block response: {} bytes", payload.len());
        }
        self.close_on_broken_pipe(result)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn dispose(&mut self) {
        if self.stream.take().is_some() {
            info!(address = %self.address, "Socket connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_raw_scpi_port() {
        let transport = SocketTransport::new("169.254.5.21", DEFAULT_PORT);
        assert_eq!(transport.address(), "169.254.5.21:5025");
        assert_eq!(transport.timeout(), Duration::from_secs(3));
        assert!(!transport.is_connected());
    }

    #[test]
    fn builder_overrides_timeouts() {
        let transport = SocketTransport::new("localhost", 5025)
            .with_timeout(Duration::from_millis(250))
            .with_connect_timeout(Duration::from_millis(100));
        assert_eq!(transport.timeout, Duration::from_millis(250));
        assert_eq!(transport.connect_timeout, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn io_before_connect_is_not_connected() {
        let mut transport = SocketTransport::new("localhost", 5025);
        assert!(matches!(
            transport.write("*CLS").await,
            Err(BenchError::NotConnected(_))
        ));
        assert!(matches!(
            transport.query("*IDN?").await,
            Err(BenchError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn empty_command_is_rejected_first() {
        let mut transport = SocketTransport::new("localhost", 5025);
        assert!(matches!(
            transport.write("  ").await,
            Err(BenchError::Argument(_))
        ));
    }
}
