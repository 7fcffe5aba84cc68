//! Parameterized sweep test across the generator and the oscilloscope.
//!
//! A run walks shape × frequency × amplitude (plus duty cycle steps for square and width
//! steps for pulse), commanding the generator, scaling the oscilloscope to the expected
//! signal, and scoring each reading against the commanded value.
//!
//! State machine per run:
//!
//! ```text
//! Idle -> Connecting -> Sweeping -> Completed
//!             |             |\----> Stopped
//!             |             \--(session lost)--> Completed (outcome Failed)
//!             \--(connect failure)--> Completed (outcome Failed)
//! ```
//!
//! Cancellation is cooperative. [`SweepEngine::stop`] raises a flag that the loop polls
//! before every combination and every sub-step; instrument state is left as it was.
//! A failing step is reported as a status event and the run moves on, unless the failure
//! took an instrument session down with it.

pub mod plan;
pub mod report;
pub mod retry;
pub mod stats;
pub mod tolerance;

pub use plan::{SettleDelays, SweepPlan};
pub use report::{SweepOutcome, SweepReport};
pub use retry::{measure_with_retry, RetryOutcome, RetryPolicy, COULD_NOT_MEASURE};
pub use stats::{Counter, ParamStats, Parameter, StatsSnapshot};
pub use tolerance::within_tolerance;

use crate::bench::Bench;
use crate::error::{BenchError, BenchResult};
use crate::instrument::{GeneratorChannel, ScopeChannel, Shape};
use crate::status::{StatusEvent, StatusSink};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the engine's current (or last) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// No run has started yet.
    Idle,
    /// A run is connecting whichever instrument is not connected yet.
    Connecting,
    /// A run is walking the plan.
    Sweeping,
    /// The last run ended on a stop request.
    Stopped,
    /// The last run finished, either through the whole plan or on a fatal failure.
    Completed,
}

impl SweepState {
    /// True while a run is in progress and accepts a stop request.
    pub fn is_active(self) -> bool {
        matches!(self, SweepState::Connecting | SweepState::Sweeping)
    }
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SweepState::Idle => "idle",
            SweepState::Connecting => "connecting",
            SweepState::Sweeping => "sweeping",
            SweepState::Stopped => "stopped",
            SweepState::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct RunClock {
    state: SweepState,
    started: Option<Instant>,
    finished: Option<Duration>,
}

struct EngineInner {
    bench: Arc<Bench>,
    plan: SweepPlan,
    stats: ParamStats,
    cancel: AtomicBool,
    clock: Mutex<RunClock>,
}

/// Runs sweeps against a [`Bench`]. Cheap to clone; clones share one run.
#[derive(Clone)]
pub struct SweepEngine {
    inner: Arc<EngineInner>,
}

/// Where inside a run a step sits, for status text.
#[derive(Clone, Copy)]
struct Step {
    channel: GeneratorChannel,
    shape: Shape,
    frequency: f64,
    amplitude: f64,
}

impl Step {
    fn scope_input(&self) -> ScopeChannel {
        self.channel.scope_input()
    }

    fn describe(&self) -> String {
        format!(
            "Wave={}, Freq={} Hz, Amp={} V",
            self.shape, self.frequency, self.amplitude
        )
    }
}

enum Flow {
    Continue,
    Cancelled,
    /// An instrument session went down; carries the reason.
    Lost(String),
}

impl SweepEngine {
    /// Engine for `plan` on `bench`, idle until the first run.
    pub fn new(bench: Arc<Bench>, plan: SweepPlan) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                bench,
                plan,
                stats: ParamStats::new(),
                cancel: AtomicBool::new(false),
                clock: Mutex::new(RunClock {
                    state: SweepState::Idle,
                    started: None,
                    finished: None,
                }),
            }),
        }
    }

    /// The plan every run walks.
    pub fn plan(&self) -> &SweepPlan {
        &self.inner.plan
    }

    /// The bench runs connect and drive.
    pub fn bench(&self) -> &Arc<Bench> {
        &self.inner.bench
    }

    pub fn state(&self) -> SweepState {
        self.inner.clock.lock().state
    }

    /// Wall-clock time of the current run, or of the last one once it ended.
    pub fn elapsed(&self) -> Duration {
        let clock = self.inner.clock.lock();
        match (clock.finished, clock.started) {
            (Some(done), _) => done,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// Consistent snapshot of the statistics table.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Request a cooperative stop. Returns whether a run was active to receive it.
    pub fn stop(&self) -> bool {
        if self.state().is_active() {
            self.inner.cancel.store(true, Ordering::SeqCst);
            info!("Sweep stop requested");
            true
        } else {
            false
        }
    }

    /// Run a sweep on a background task.
    ///
    /// The run is claimed before this returns, so a [`stop`](Self::stop) issued right
    /// after it is honoured.
    pub fn spawn(
        &self,
        channel: GeneratorChannel,
        sink: Arc<dyn StatusSink>,
    ) -> JoinHandle<SweepReport> {
        let engine = self.clone();
        let claimed = self.begin();
        tokio::spawn(async move {
            if claimed {
                engine.execute(channel, sink.as_ref()).await
            } else {
                engine.refuse(channel, sink.as_ref())
            }
        })
    }

    /// Run one sweep on `channel` to completion, cancellation or a fatal failure.
    pub async fn run(&self, channel: GeneratorChannel, sink: &dyn StatusSink) -> SweepReport {
        if !self.begin() {
            return self.refuse(channel, sink);
        }
        self.execute(channel, sink).await
    }

    fn refuse(&self, channel: GeneratorChannel, sink: &dyn StatusSink) -> SweepReport {
        let reason = "a sweep is already running".to_string();
        emit(sink, channel, format!("Cannot start test: {}.", reason));
        self.report(channel, SweepOutcome::Failed(reason), Duration::ZERO)
    }

    /// Body of a run already claimed by [`begin`](Self::begin).
    async fn execute(&self, channel: GeneratorChannel, sink: &dyn StatusSink) -> SweepReport {
        if let Err(err) = self.inner.plan.validate() {
            emit(sink, channel, format!("Invalid sweep plan: {}", err));
            let elapsed = self.finish(SweepState::Completed);
            return self.report(channel, SweepOutcome::Failed(err.to_string()), elapsed);
        }

        if let Err(err) = self.connect_instruments(channel, sink).await {
            let elapsed = self.finish(SweepState::Completed);
            return self.report(channel, SweepOutcome::Failed(err.to_string()), elapsed);
        }

        self.inner.stats.reset(&self.inner.plan.shapes);
        self.set_state(SweepState::Sweeping);
        info!(%channel, combinations = self.inner.plan.combinations(), "Sweep started");
        emit(
            sink,
            channel,
            format!(
                "Starting {} waveform generator test with ±{}% margin...",
                channel, self.inner.plan.tolerance_percent
            ),
        );

        let (state, outcome) = match self.sweep(channel, sink).await {
            Flow::Continue => (SweepState::Completed, SweepOutcome::Completed),
            Flow::Cancelled => {
                emit(sink, channel, "Test stopped by user.");
                (SweepState::Stopped, SweepOutcome::Stopped)
            }
            Flow::Lost(reason) => {
                emit(sink, channel, format!("Test aborted: {}.", reason));
                (SweepState::Completed, SweepOutcome::Failed(reason))
            }
        };
        let elapsed = self.finish(state);
        let report = self.report(channel, outcome, elapsed);
        if report.is_completed() {
            emit(sink, channel, "Test completed.");
        }
        info!(
            %channel,
            outcome = %report.outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sweep finished"
        );
        report
    }

    // =========================================================================
    // Run lifecycle
    // =========================================================================

    fn begin(&self) -> bool {
        let mut clock = self.inner.clock.lock();
        if clock.state.is_active() {
            return false;
        }
        clock.state = SweepState::Connecting;
        clock.started = Some(Instant::now());
        clock.finished = None;
        self.inner.cancel.store(false, Ordering::SeqCst);
        true
    }

    fn set_state(&self, state: SweepState) {
        self.inner.clock.lock().state = state;
    }

    fn finish(&self, state: SweepState) -> Duration {
        let mut clock = self.inner.clock.lock();
        let elapsed = clock.started.map(|s| s.elapsed()).unwrap_or_default();
        clock.state = state;
        clock.finished = Some(elapsed);
        elapsed
    }

    fn report(
        &self,
        channel: GeneratorChannel,
        outcome: SweepOutcome,
        elapsed: Duration,
    ) -> SweepReport {
        SweepReport {
            channel,
            outcome,
            shapes: self.inner.plan.shapes.clone(),
            stats: self.inner.stats.snapshot(),
            elapsed,
        }
    }

    fn cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::SeqCst)
    }

    async fn connect_instruments(
        &self,
        channel: GeneratorChannel,
        sink: &dyn StatusSink,
    ) -> BenchResult<()> {
        let bench = &self.inner.bench;
        if !bench.is_oscilloscope_connected().await {
            emit(sink, channel, "Not connected to oscilloscope. Attempting to connect...");
            match bench.connect_oscilloscope(None).await {
                Ok(()) => emit(sink, channel, "Oscilloscope connected successfully."),
                Err(err) => {
                    warn!(%channel, "Oscilloscope connect failed: {}", err);
                    emit(sink, channel, format!("Failed to connect to oscilloscope: {}", err));
                    return Err(err);
                }
            }
        }
        if !bench.is_generator_connected().await {
            emit(sink, channel, "Not connected to function generator. Attempting to connect...");
            match bench.connect_generator(None).await {
                Ok(()) => emit(sink, channel, "Function generator connected successfully."),
                Err(err) => {
                    warn!(%channel, "Function generator connect failed: {}", err);
                    let message = format!("Failed to connect to function generator: {}", err);
                    emit(sink, channel, message);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Sweep loop
    // =========================================================================

    async fn sweep(&self, channel: GeneratorChannel, sink: &dyn StatusSink) -> Flow {
        let plan = &self.inner.plan;
        for &shape in &plan.shapes {
            emit(sink, channel, format!("==== Testing {} on {} ====", shape, channel));
            for &frequency in &plan.frequencies {
                for &amplitude in &plan.amplitudes {
                    if self.cancelled() {
                        return Flow::Cancelled;
                    }
                    let step = Step {
                        channel,
                        shape,
                        frequency,
                        amplitude,
                    };
                    match self.base_step(&step).await {
                        Ok(line) => emit(sink, channel, line),
                        Err(err) => {
                            self.step_failed(sink, &step, &err.to_string());
                            if let Some(reason) = self.session_lost(&err).await {
                                return Flow::Lost(reason);
                            }
                            continue;
                        }
                    }
                    match self.sub_steps(&step, sink).await {
                        Flow::Continue => {}
                        stopped => return stopped,
                    }
                }
            }
            emit(sink, channel, format!("==== Done with {} on {} ====", shape, channel));
        }
        Flow::Continue
    }

    async fn sub_steps(&self, step: &Step, sink: &dyn StatusSink) -> Flow {
        let plan = &self.inner.plan;
        match step.shape {
            Shape::Square => {
                for &duty in &plan.duty_cycles {
                    if self.cancelled() {
                        return Flow::Cancelled;
                    }
                    match self.duty_step(step, duty).await {
                        Ok(line) => emit(sink, step.channel, line),
                        Err(err) => {
                            self.step_failed(sink, step, &format!("duty={}%: {}", duty, err));
                            if let Some(reason) = self.session_lost(&err).await {
                                return Flow::Lost(reason);
                            }
                        }
                    }
                }
            }
            Shape::Pulse => {
                for &width_us in &plan.pulse_widths_us {
                    if self.cancelled() {
                        return Flow::Cancelled;
                    }
                    match self.pulse_step(step, width_us).await {
                        Ok(line) => emit(sink, step.channel, line),
                        Err(err) => {
                            let detail = format!("width={} us: {}", width_us, err);
                            self.step_failed(sink, step, &detail);
                            if let Some(reason) = self.session_lost(&err).await {
                                return Flow::Lost(reason);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        Flow::Continue
    }

    /// A session-level failure that left an instrument disconnected ends the run.
    /// Anything else, including a transient I/O error on a live session, only fails the step.
    async fn session_lost(&self, err: &BenchError) -> Option<String> {
        if !err.is_connection_failure() {
            return None;
        }
        let bench = &self.inner.bench;
        let lost = if !bench.is_generator_connected().await {
            "function generator"
        } else if !bench.is_oscilloscope_connected().await {
            "oscilloscope"
        } else {
            return None;
        };
        warn!("Lost connection to {}: {}", lost, err);
        Some(format!("lost connection to {} ({})", lost, err))
    }

    fn step_failed(&self, sink: &dyn StatusSink, step: &Step, detail: &str) {
        warn!(
            channel = %step.channel,
            shape = %step.shape,
            frequency = step.frequency,
            amplitude = step.amplitude,
            "Sweep step failed: {}",
            detail
        );
        emit(
            sink,
            step.channel,
            format!(
                "Step failed while testing {} on {}, freq={}, amp={}: {}",
                step.shape, step.channel, step.frequency, step.amplitude, detail
            ),
        );
    }

    /// Apply one combination, measure frequency and amplitude, and score both.
    async fn base_step(&self, step: &Step) -> BenchResult<String> {
        let plan = &self.inner.plan;
        let bench = &self.inner.bench;
        {
            let mut generator = bench.generator().await?;
            generator.set_waveform(step.channel, step.shape).await?;
            generator.set_frequency(step.channel, step.frequency).await?;
            generator.set_amplitude(step.channel, step.amplitude).await?;
            generator.enable_channel(step.channel, true).await?;
        }
        tokio::time::sleep(plan.settle.generator()).await;

        {
            let mut scope = bench.oscilloscope().await?;
            scope
                .apply_timebase_scale(SweepPlan::time_scale_for(step.frequency))
                .await?;
            let volts_per_div = SweepPlan::voltage_scale_for(step.amplitude);
            scope
                .apply_vertical_scale(step.scope_input(), volts_per_div)
                .await?;
        }
        tokio::time::sleep(plan.settle.scope()).await;

        let input = step.scope_input();
        let (frequency, amplitude) = {
            let mut scope = bench.oscilloscope().await?;
            let frequency = measure_with_retry(&mut *scope, &plan.retry, |scope| {
                Box::pin(async move { scope.measure_frequency(input).await.map(|r| r.value()) })
            })
            .await?;
            let amplitude = scope.measure_amplitude(input).await?.value();
            (frequency, amplitude)
        };
        if frequency.retries > 0 {
            debug!(
                retries = frequency.retries,
                measured = frequency.measured,
                "Frequency reading retried"
            );
        }

        let expected_amplitude = 2.0 * step.amplitude;
        let freq_pass = self.score(
            step.shape,
            Parameter::Frequency,
            step.frequency,
            frequency.value,
        );
        let amp_pass = self.score(step.shape, Parameter::Amplitude, expected_amplitude, amplitude);

        Ok(format!(
            "{} => MeasFreq={:.2} Hz {}, MeasAmplitude={:.2} V {}",
            step.describe(),
            frequency.value,
            verdict(freq_pass),
            amplitude,
            verdict(amp_pass)
        ))
    }

    async fn duty_step(&self, step: &Step, duty: f64) -> BenchResult<String> {
        {
            let mut generator = self.inner.bench.generator().await?;
            generator.set_square_duty_cycle(step.channel, duty).await?;
        }
        tokio::time::sleep(self.inner.plan.settle.duty()).await;

        let measured = self.measured_duty(step).await?;
        let pass = self.score(step.shape, Parameter::DutyCycle, duty, measured);
        Ok(format!(
            "{}, SetDuty={:.2}%, MeasDuty={:.2}% {}",
            step.describe(),
            duty,
            measured,
            verdict(pass)
        ))
    }

    async fn pulse_step(&self, step: &Step, width_us: f64) -> BenchResult<String> {
        let period = 1.0 / step.frequency;
        let applied = SweepPlan::applied_pulse_width(width_us, step.frequency);
        {
            let mut generator = self.inner.bench.generator().await?;
            generator.set_pulse_width(step.channel, applied).await?;
        }
        tokio::time::sleep(self.inner.plan.settle.pulse()).await;

        let duty = self.measured_duty(step).await?;
        let derived_us = duty / 100.0 * period * 1e6;
        let applied_us = applied * 1e6;
        let pass = self.score(step.shape, Parameter::PulseWidth, applied_us, derived_us);
        Ok(format!(
            "{}, SetPulseWidth={:.2} us => {:.2} us {}",
            step.describe(),
            applied_us,
            derived_us,
            verdict(pass)
        ))
    }

    /// Duty cycle reading, with anything outside 0 to 100 counted as 0.
    async fn measured_duty(&self, step: &Step) -> BenchResult<f64> {
        let mut scope = self.inner.bench.oscilloscope().await?;
        let duty = scope.measure_duty_cycle(step.scope_input()).await?.value();
        Ok(if (0.0..=100.0).contains(&duty) { duty } else { 0.0 })
    }

    fn score(&self, shape: Shape, parameter: Parameter, expected: f64, measured: f64) -> bool {
        let pass = within_tolerance(expected, measured, self.inner.plan.tolerance_percent);
        self.inner.stats.record(shape, parameter, pass);
        debug!(%shape, %parameter, expected, measured, pass, "Scored");
        pass
    }
}

fn verdict(pass: bool) -> &'static str {
    if pass {
        "PASS"
    } else {
        "FAIL"
    }
}

fn emit(sink: &dyn StatusSink, channel: GeneratorChannel, message: impl Into<String>) {
    sink.emit(StatusEvent::new(Some(channel), message));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBench;
    use crate::status::{CollectingSink, NullSink};

    fn engine_with(sim: &SimulatedBench, plan: SweepPlan) -> SweepEngine {
        let bench = Arc::new(Bench::new(Arc::new(sim.clone())));
        SweepEngine::new(bench, plan)
    }

    fn small_plan() -> SweepPlan {
        SweepPlan {
            shapes: vec![Shape::Sine],
            frequencies: vec![1000.0],
            amplitudes: vec![1.0],
            ..SweepPlan::immediate()
        }
    }

    #[test]
    fn new_engine_is_idle() {
        let engine = engine_with(&SimulatedBench::new(), small_plan());
        assert_eq!(engine.state(), SweepState::Idle);
        assert_eq!(engine.elapsed(), Duration::ZERO);
        assert!(engine.stats().is_empty());
        assert!(!engine.stop());
        assert!(!engine.inner.cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn single_combination_passes_on_ideal_bench() {
        let sim = SimulatedBench::new();
        let engine = engine_with(&sim, small_plan());
        let sink = CollectingSink::new();

        let report = engine.run(GeneratorChannel::Ch1, &sink).await;

        assert_eq!(report.outcome, SweepOutcome::Completed);
        assert_eq!(engine.state(), SweepState::Completed);
        let freq = report.counter(Shape::Sine, Parameter::Frequency).unwrap();
        assert_eq!((freq.passed, freq.total), (1, 1));
        assert_eq!(report.pass_rate(Shape::Sine, Parameter::Amplitude), Some(100.0));
        assert_eq!(
            sink.matching("MeasFreq"),
            vec![concat!(
                "Wave=SIN, Freq=1000 Hz, Amp=1 V => ",
                "MeasFreq=1000.00 Hz PASS, MeasAmplitude=2.00 V PASS"
            )]
        );
    }

    #[tokio::test]
    async fn amplitude_error_beyond_tolerance_fails() {
        let sim = SimulatedBench::new();
        sim.set_amplitude_gain(1.2);
        let engine = engine_with(&sim, small_plan());
        let report = engine.run(GeneratorChannel::Ch1, &NullSink).await;

        assert_eq!(report.pass_rate(Shape::Sine, Parameter::Amplitude), Some(0.0));
        assert_eq!(report.pass_rate(Shape::Sine, Parameter::Frequency), Some(100.0));
    }

    #[tokio::test]
    async fn invalid_frequency_reads_are_retried() {
        let sim = SimulatedBench::new();
        let engine = engine_with(&sim, small_plan());
        sim.queue_invalid_frequency_reads(2);

        let report = engine.run(GeneratorChannel::Ch1, &NullSink).await;
        assert_eq!(report.pass_rate(Shape::Sine, Parameter::Frequency), Some(100.0));
        assert_eq!(sim.scope_log().matching(":MEASure:FREQuency?").len(), 3);
    }

    #[tokio::test]
    async fn exhausted_frequency_retries_score_a_failure() {
        let sim = SimulatedBench::new();
        let engine = engine_with(&sim, small_plan());
        sim.queue_invalid_frequency_reads(3);
        let sink = CollectingSink::new();

        let report = engine.run(GeneratorChannel::Ch1, &sink).await;
        assert_eq!(report.pass_rate(Shape::Sine, Parameter::Frequency), Some(0.0));
        assert!(sink.matching("MeasFreq=-1.00 Hz FAIL").len() == 1);
    }

    #[tokio::test]
    async fn pulse_widths_are_clamped_and_scored() {
        let sim = SimulatedBench::new();
        let plan = SweepPlan {
            shapes: vec![Shape::Pulse],
            frequencies: vec![2000.0],
            amplitudes: vec![1.0],
            pulse_widths_us: vec![100.0, 500.0],
            ..SweepPlan::immediate()
        };
        let engine = engine_with(&sim, plan);
        let sink = CollectingSink::new();

        let report = engine.run(GeneratorChannel::Ch2, &sink).await;

        let width = report.counter(Shape::Pulse, Parameter::PulseWidth).unwrap();
        assert_eq!((width.passed, width.total), (2, 2));
        // 500 us does not fit a 500 us period and goes out at 80% of it.
        assert_eq!(
            sim.generator_log().matching(":SOURce2:FUNCtion:PULSe:WIDTh"),
            vec![
                ":SOURce2:FUNCtion:PULSe:WIDTh 0.0001",
                ":SOURce2:FUNCtion:PULSe:WIDTh 0.0004"
            ]
        );
        assert_eq!(sink.matching("SetPulseWidth=400.00 us => 400.00 us PASS").len(), 1);
    }

    #[tokio::test]
    async fn connect_failure_ends_run() {
        let sim = SimulatedBench::new();
        sim.set_generator_reachable(false);
        let engine = engine_with(&sim, small_plan());
        let sink = CollectingSink::new();

        let report = engine.run(GeneratorChannel::Ch1, &sink).await;

        assert!(matches!(report.outcome, SweepOutcome::Failed(_)));
        assert_eq!(engine.state(), SweepState::Completed);
        assert_eq!(sink.matching("Oscilloscope connected successfully.").len(), 1);
        assert_eq!(sink.matching("Failed to connect to function generator").len(), 1);
        assert!(sim.generator_log().is_empty());
        assert!(report.stats.is_empty());
    }

    #[tokio::test]
    async fn failing_step_is_reported_and_sweep_continues() {
        let sim = SimulatedBench::new();
        let plan = SweepPlan {
            shapes: vec![Shape::Square],
            frequencies: vec![100.0, 500.0],
            amplitudes: vec![1.0],
            duty_cycles: vec![50.0],
            ..SweepPlan::immediate()
        };
        let engine = engine_with(&sim, plan);
        let sink = CollectingSink::new();
        sim.fail_commands_starting_with(":SOURce1:FREQuency 100");

        let report = engine.run(GeneratorChannel::Ch1, &sink).await;

        assert_eq!(report.outcome, SweepOutcome::Completed);
        let failures = sink.matching("Step failed while testing SQU on CH1, freq=100");
        assert_eq!(failures.len(), 1);
        // The failed combination skipped its duty step and recorded nothing.
        let freq = report.counter(Shape::Square, Parameter::Frequency).unwrap();
        assert_eq!(freq.total, 1);
        assert_eq!(report.counter(Shape::Square, Parameter::DutyCycle).unwrap().total, 1);
    }

    #[tokio::test]
    async fn state_and_stats_are_reset_between_runs() {
        let sim = SimulatedBench::new();
        let engine = engine_with(&sim, small_plan());
        engine.run(GeneratorChannel::Ch1, &NullSink).await;
        let second = engine.run(GeneratorChannel::Ch1, &NullSink).await;
        assert_eq!(second.counter(Shape::Sine, Parameter::Frequency).unwrap().total, 1);
        assert!(!engine.stop());
    }
}
