//! Timestamped status-line messages for the presentation layer.
//!
//! Status events are separate from log records: they are what an operator sees in the
//! status panel, one line per connection change, sweep step or failure.

use crate::instrument::GeneratorChannel;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One status line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub timestamp: DateTime<Local>,
    /// Channel under test, if the message is about one.
    pub channel: Option<GeneratorChannel>,
    pub message: String,
}

impl StatusEvent {
    pub fn new(channel: Option<GeneratorChannel>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            channel,
            message: message.into(),
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.timestamp.format("%H:%M:%S"))?;
        if let Some(channel) = self.channel {
            write!(f, "{}: ", channel)?;
        }
        f.write_str(&self.message)
    }
}

/// Receiver of status events.
///
/// `emit` is called from the sweep worker and must not block.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl<S: StatusSink + ?Sized> StatusSink for Arc<S> {
    fn emit(&self, event: StatusEvent) {
        (**self).emit(event);
    }
}

impl StatusSink for mpsc::UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        // A dropped receiver only means nobody is watching anymore.
        let _ = self.send(event);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> StatusSink for FnSink<F>
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn emit(&self, event: StatusEvent) {
        (self.0)(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: StatusEvent) {}
}

/// Sink that keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    /// Message text of every event, in order.
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }

    /// Messages containing `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.message.contains(needle))
            .map(|event| event.message.clone())
            .collect()
    }
}

impl StatusSink for CollectingSink {
    fn emit(&self, event: StatusEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn display_includes_channel_prefix() {
        let event = StatusEvent::new(Some(GeneratorChannel::Ch2), "Test stopped by user.");
        let line = event.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("CH2: Test stopped by user."));

        let plain = StatusEvent::new(None, "Oscilloscope connected successfully.");
        assert!(!plain.to_string().contains("CH"));
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.emit(StatusEvent::new(None, "first"));
        sink.emit(StatusEvent::new(None, "second"));
        assert_eq!(sink.messages(), vec!["first", "second"]);
        assert_eq!(sink.matching("sec"), vec!["second"]);
    }

    #[test]
    fn closure_sink_is_called() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let sink = FnSink(move |_event: StatusEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        sink.emit(StatusEvent::new(None, "tick"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_sink_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(StatusEvent::new(None, "hello"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "hello");

        drop(rx);
        tx.emit(StatusEvent::new(None, "nobody listening"));
    }
}
