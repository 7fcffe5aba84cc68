//! Live waveform refresh for the presentation layer.

use crate::bench::Bench;
use crate::error::BenchResult;
use crate::instrument::{ScopeChannel, Waveform};
use crate::status::{StatusEvent, StatusSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pause between frames.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Points requested per frame.
pub const DEFAULT_POINTS: u32 = 1000;

/// Repeatedly fetches waveform frames while enabled and publishes the latest one.
///
/// The loop checks its enabled flag once per frame; a fetch already in flight completes
/// before the loop notices a stop.
pub struct LiveDisplay {
    bench: Arc<Bench>,
    channel: ScopeChannel,
    points: u32,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    frames: Arc<watch::Sender<Option<Waveform>>>,
}

impl LiveDisplay {
    /// Display of scope channel 1.
    pub fn new(bench: Arc<Bench>) -> BenchResult<Self> {
        let (frames, _) = watch::channel(None);
        Ok(Self {
            bench,
            channel: ScopeChannel::new(1)?,
            points: DEFAULT_POINTS,
            interval: REFRESH_INTERVAL,
            enabled: Arc::new(AtomicBool::new(false)),
            frames: Arc::new(frames),
        })
    }

    pub fn with_channel(mut self, channel: ScopeChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Receiver of the latest frame; `None` until the first fetch succeeds.
    pub fn subscribe(&self) -> watch::Receiver<Option<Waveform>> {
        self.frames.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Start refreshing. Returns `None` if already running.
    pub fn start(&self, sink: Arc<dyn StatusSink>) -> Option<JoinHandle<()>> {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return None;
        }
        let bench = self.bench.clone();
        let enabled = self.enabled.clone();
        let frames = self.frames.clone();
        let (channel, points, interval) = (self.channel, self.points, self.interval);

        Some(tokio::spawn(async move {
            debug!(%channel, "Live display started");
            let mut last_error: Option<String> = None;
            while enabled.load(Ordering::SeqCst) {
                match fetch_frame(&bench, channel, points).await {
                    Ok(frame) => {
                        last_error = None;
                        frames.send_replace(Some(frame));
                    }
                    Err(err) => {
                        let message = format!("Live display error: {}", err);
                        // Repeats of the same failure are reported once.
                        if last_error.as_deref() != Some(message.as_str()) {
                            warn!("{}", message);
                            sink.emit(StatusEvent::new(None, message.clone()));
                            last_error = Some(message);
                        }
                    }
                }
                tokio::time::sleep(interval).await;
            }
            debug!(%channel, "Live display stopped");
        }))
    }

    /// Ask the refresh loop to exit after its current frame.
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

async fn fetch_frame(bench: &Bench, channel: ScopeChannel, points: u32) -> BenchResult<Waveform> {
    let mut scope = bench.oscilloscope().await?;
    scope.fetch_waveform(channel, points).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBench;
    use crate::status::CollectingSink;

    #[tokio::test]
    async fn publishes_frames_until_stopped() {
        let bench = Arc::new(Bench::new(Arc::new(SimulatedBench::new())));
        bench.connect_oscilloscope(None).await.unwrap();

        let display = LiveDisplay::new(bench)
            .unwrap()
            .with_points(64)
            .with_interval(Duration::from_millis(1));
        let mut frames = display.subscribe();
        let handle = display.start(Arc::new(CollectingSink::new())).unwrap();
        assert!(display.start(Arc::new(CollectingSink::new())).is_none());

        frames.changed().await.unwrap();
        assert_eq!(frames.borrow().as_ref().map(Waveform::len), Some(64));

        display.stop();
        handle.await.unwrap();
        assert!(!display.is_running());
    }

    #[tokio::test]
    async fn errors_become_status_events() {
        let bench = Arc::new(Bench::new(Arc::new(SimulatedBench::new())));
        let sink = CollectingSink::new();
        let display = LiveDisplay::new(bench)
            .unwrap()
            .with_interval(Duration::from_millis(1));
        let handle = display.start(Arc::new(sink.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        display.stop();
        handle.await.unwrap();

        let errors = sink.matching("Live display error");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("oscilloscope"));
    }
}
