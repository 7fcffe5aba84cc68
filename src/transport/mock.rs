//! Scripted transport for testing controllers without hardware.
//!
//! Every command written to a [`MockTransport`] is recorded in a shared [`CommandLog`] and
//! handed to a responder closure. A responder that returns a [`Reply`] queues it as the
//! instrument's pending output, read back by the following `read_line`/`query_block`.

use super::{validate_command, Transport};
use crate::error::{BenchError, BenchResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Output queued by the simulated instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// One text line (without terminator).
    Line(String),
    /// One binary block payload.
    Block(Vec<u8>),
}

impl Reply {
    /// Convenience constructor for a text line.
    pub fn line(text: impl Into<String>) -> Self {
        Reply::Line(text.into())
    }
}

type Responder = Box<dyn FnMut(&str) -> BenchResult<Option<Reply>> + Send>;

/// Ordered record of every command sent through a mock transport.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    /// Snapshot of all commands, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of commands sent so far.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// True when nothing has been sent.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Commands starting with `prefix`, in order.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.0.lock().clear();
    }

    fn push(&self, command: &str) {
        self.0.lock().push(command.to_string());
    }
}

/// Shared cable state of one or more mock transports.
///
/// While the link is down, the next operation on a connected transport fails with a
/// broken pipe and leaves it disconnected, and `connect` is refused.
#[derive(Debug, Clone)]
pub struct MockLink(Arc<AtomicBool>);

impl Default for MockLink {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl MockLink {
    pub fn is_up(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Pull the cable.
    pub fn drop_link(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// In-memory transport driven by a responder closure.
pub struct MockTransport {
    address: String,
    connected: bool,
    refuse_connect: bool,
    responder: Responder,
    pending: VecDeque<Reply>,
    log: CommandLog,
    link: MockLink,
}

impl MockTransport {
    /// Create a mock whose responses come from `responder`.
    pub fn new<F>(address: impl Into<String>, responder: F) -> Self
    where
        F: FnMut(&str) -> BenchResult<Option<Reply>> + Send + 'static,
    {
        Self {
            address: address.into(),
            connected: false,
            refuse_connect: false,
            responder: Box::new(responder),
            pending: VecDeque::new(),
            log: CommandLog::default(),
            link: MockLink::default(),
        }
    }

    /// Create a mock answering queries from a fixed table; unknown queries go unanswered.
    pub fn with_replies<I, K, V>(address: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let table: HashMap<String, String> = replies
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(address, move |command| {
            Ok(table.get(command).map(|text| Reply::Line(text.clone())))
        })
    }

    /// Make every `connect` attempt fail.
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Record writes into an existing log, e.g. one shared across reconnects.
    pub fn with_log(mut self, log: CommandLog) -> Self {
        self.log = log;
        self
    }

    /// Share an existing link, e.g. one that outlives reconnects.
    pub fn with_link(mut self, link: MockLink) -> Self {
        self.link = link;
        self
    }

    /// Handle to the link, valid after the transport is boxed away.
    pub fn link(&self) -> MockLink {
        self.link.clone()
    }

    /// Handle to the command log, valid after the transport is boxed away.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    fn ensure_connected(&mut self) -> BenchResult<()> {
        if !self.connected {
            return Err(BenchError::NotConnected(self.address.clone()));
        }
        if !self.link.is_up() {
            self.connected = false;
            self.pending.clear();
            return Err(BenchError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("link to {} dropped", self.address),
            )));
        }
        Ok(())
    }

    fn no_response(&self, operation: &str) -> BenchError {
        BenchError::Timeout {
            operation: format!("{} from {}", operation, self.address),
            after: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> BenchResult<()> {
        if self.refuse_connect || !self.link.is_up() {
            return Err(BenchError::Connection(format!(
                "Mock instrument at {} refused the connection",
                self.address
            )));
        }
        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, command: &str) -> BenchResult<()> {
        let command = validate_command(command)?;
        self.ensure_connected()?;
        debug!(address = %self.address, "Mock SCPI write: {}", command);
        self.log.push(command);
        if let Some(reply) = (self.responder)(command)? {
            self.pending.push_back(reply);
        }
        Ok(())
    }

    async fn read_line(&mut self) -> BenchResult<String> {
        self.ensure_connected()?;
        match self.pending.pop_front() {
            Some(Reply::Line(text)) => Ok(text.trim().to_string()),
            Some(Reply::Block(bytes)) => Err(BenchError::format(
                &format!("{} byte block", bytes.len()),
                "text line",
            )),
            None => Err(self.no_response("response line")),
        }
    }

    async fn query(&mut self, command: &str) -> BenchResult<String> {
        self.pending.clear();
        self.write(command).await?;
        self.read_line().await
    }

    async fn query_block(&mut self, command: &str) -> BenchResult<Vec<u8>> {
        self.pending.clear();
        self.write(command).await?;
        match self.pending.pop_front() {
            Some(Reply::Block(bytes)) => Ok(bytes),
            Some(Reply::Line(text)) => Err(BenchError::format(&text, "binary block header")),
            None => Err(self.no_response("binary block")),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected && self.link.is_up()
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn dispose(&mut self) {
        self.connected = false;
        self.pending.clear();
    }
}
