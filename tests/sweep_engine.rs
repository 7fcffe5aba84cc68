//! Full sweeps against the simulated bench.

use bench_sweep::instrument::{GeneratorChannel, Shape};
use bench_sweep::sim::SimulatedBench;
use bench_sweep::status::{CollectingSink, FnSink, NullSink, StatusEvent, StatusSink};
use bench_sweep::sweep::plan::SettleDelays;
use bench_sweep::sweep::stats::Parameter;
use bench_sweep::sweep::SweepOutcome;
use bench_sweep::{Bench, SweepEngine, SweepPlan, SweepState};
use std::sync::Arc;
use std::time::Duration;

fn engine(sim: &SimulatedBench, plan: SweepPlan) -> SweepEngine {
    let bench = Arc::new(Bench::new(Arc::new(sim.clone())));
    SweepEngine::new(bench, plan)
}

fn two_shape_plan() -> SweepPlan {
    SweepPlan {
        shapes: vec![Shape::Sine, Shape::Square],
        frequencies: vec![100.0, 500.0],
        amplitudes: vec![0.5, 1.0],
        duty_cycles: vec![10.0, 50.0, 90.0],
        ..SweepPlan::immediate()
    }
}

#[tokio::test]
async fn every_combination_is_scored_once() {
    let sim = SimulatedBench::new();
    let engine = engine(&sim, two_shape_plan());
    let sink = CollectingSink::new();

    let report = engine.run(GeneratorChannel::Ch1, &sink).await;

    assert_eq!(report.outcome, SweepOutcome::Completed);
    for shape in [Shape::Sine, Shape::Square] {
        assert_eq!(report.counter(shape, Parameter::Frequency).unwrap().total, 4);
        assert_eq!(report.counter(shape, Parameter::Amplitude).unwrap().total, 4);
    }
    let duty = report.counter(Shape::Square, Parameter::DutyCycle).unwrap();
    assert_eq!(duty.total, 12);
    assert_eq!(duty.passed, 12);
    assert!(report.counter(Shape::Sine, Parameter::DutyCycle).is_none());
    assert!(report.counter(Shape::Square, Parameter::PulseWidth).is_none());

    assert_eq!(sink.matching("==== Testing").len(), 2);
    assert_eq!(sink.matching("==== Done with").len(), 2);
    assert_eq!(sink.matching("MeasFreq").len(), 8);
    assert_eq!(sink.matching("SetDuty").len(), 12);
    assert_eq!(sink.messages().last().map(String::as_str), Some("Test completed."));
}

#[tokio::test]
async fn stop_from_status_callback_ends_after_current_step() {
    let sim = SimulatedBench::new();
    let engine = engine(&sim, two_shape_plan());
    let sink = CollectingSink::new();

    let stopper = engine.clone();
    let collector = sink.clone();
    let stopping_sink = FnSink(move |event: StatusEvent| {
        if event.message.contains("MeasFreq") {
            stopper.stop();
        }
        collector.emit(event);
    });

    let report = engine.run(GeneratorChannel::Ch1, &stopping_sink).await;

    assert_eq!(report.outcome, SweepOutcome::Stopped);
    assert_eq!(engine.state(), SweepState::Stopped);
    assert_eq!(report.counter(Shape::Sine, Parameter::Frequency).unwrap().total, 1);
    assert_eq!(report.counter(Shape::Square, Parameter::Frequency).unwrap().total, 0);
    assert_eq!(sink.matching("Test stopped by user.").len(), 1);
    assert!(sink.matching("Test completed.").is_empty());
    assert!(report.to_string().contains("stopped by user"));
}

#[tokio::test]
async fn stop_right_after_spawn_is_honoured() {
    let sim = SimulatedBench::new();
    let engine = engine(&sim, two_shape_plan());
    let sink = CollectingSink::new();

    let handle = engine.spawn(GeneratorChannel::Ch1, Arc::new(sink.clone()));
    assert_eq!(engine.state(), SweepState::Connecting);
    assert!(engine.stop());

    let report = handle.await.unwrap();
    assert_eq!(report.outcome, SweepOutcome::Stopped);
    assert_eq!(engine.state(), SweepState::Stopped);
    for shape in [Shape::Sine, Shape::Square] {
        assert_eq!(report.counter(shape, Parameter::Frequency).unwrap().total, 0);
    }
    assert!(sink.matching("MeasFreq").is_empty());
    assert_eq!(sink.matching("Test stopped by user.").len(), 1);
}

#[tokio::test]
async fn spawn_while_busy_is_refused() {
    let sim = SimulatedBench::new();
    let engine = engine(&sim, two_shape_plan());

    let first = engine.spawn(GeneratorChannel::Ch1, Arc::new(NullSink));
    let second = engine.spawn(GeneratorChannel::Ch2, Arc::new(NullSink));

    assert!(matches!(second.await.unwrap().outcome, SweepOutcome::Failed(_)));
    assert!(first.await.unwrap().is_completed());
}

#[tokio::test]
async fn dropped_generator_link_ends_the_run() {
    let sim = SimulatedBench::new();
    let engine = engine(&sim, two_shape_plan());
    let sink = CollectingSink::new();

    let link = sim.generator_link();
    let collector = sink.clone();
    let unplugging_sink = FnSink(move |event: StatusEvent| {
        if event.message.contains("MeasFreq") {
            link.drop_link();
        }
        collector.emit(event);
    });

    let report = engine.run(GeneratorChannel::Ch1, &unplugging_sink).await;

    match &report.outcome {
        SweepOutcome::Failed(reason) => {
            assert!(reason.contains("function generator"), "{}", reason)
        }
        other => panic!("expected a failed run, got {:?}", other),
    }
    assert_eq!(engine.state(), SweepState::Completed);
    assert_eq!(report.counter(Shape::Sine, Parameter::Frequency).unwrap().total, 1);
    assert_eq!(report.counter(Shape::Square, Parameter::Frequency).unwrap().total, 0);
    assert_eq!(sink.matching("Step failed").len(), 1);
    assert_eq!(sink.matching("Test aborted: lost connection to function generator").len(), 1);
    assert!(sink.matching("Test completed.").is_empty());

    sim.generator_link().restore();
    let retry = engine.run(GeneratorChannel::Ch1, &NullSink).await;
    assert!(retry.is_completed());
}

#[tokio::test]
async fn spawned_sweep_reports_elapsed_time() {
    let sim = SimulatedBench::new();
    let plan = SweepPlan {
        shapes: vec![Shape::Sine],
        frequencies: vec![1000.0],
        amplitudes: vec![1.0],
        ..SweepPlan::immediate()
    };
    let engine = engine(&sim, plan);

    let report = engine
        .spawn(GeneratorChannel::Ch2, Arc::new(NullSink))
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.channel, GeneratorChannel::Ch2);
    assert_eq!(engine.state(), SweepState::Completed);
    assert_eq!(engine.elapsed(), report.elapsed);
    assert!(!engine.stop());
    assert!(sim.output(2).map(|out| out.enabled).unwrap_or(false));
    assert!(report.to_string().starts_with("Sweep on CH2: completed"));
}

#[tokio::test]
async fn second_run_while_busy_is_refused() {
    let sim = SimulatedBench::new();
    let plan = SweepPlan {
        settle: SettleDelays {
            generator_ms: 200,
            ..SettleDelays::none()
        },
        ..two_shape_plan()
    };
    let engine = engine(&sim, plan);

    let first = engine.spawn(GeneratorChannel::Ch1, Arc::new(NullSink));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.state().is_active());

    let second = engine.run(GeneratorChannel::Ch2, &NullSink).await;
    assert!(matches!(second.outcome, SweepOutcome::Failed(_)));

    assert!(engine.stop());
    let report = first.await.unwrap();
    assert_eq!(report.outcome, SweepOutcome::Stopped);
}

#[tokio::test]
async fn unreachable_generator_fails_the_run() {
    let sim = SimulatedBench::new();
    sim.set_generator_reachable(false);
    let engine = engine(&sim, two_shape_plan());
    let sink = CollectingSink::new();

    let report = engine.run(GeneratorChannel::Ch1, &sink).await;

    assert!(matches!(report.outcome, SweepOutcome::Failed(_)));
    assert_eq!(sink.matching("Oscilloscope connected successfully.").len(), 1);
    assert_eq!(sink.matching("Failed to connect to function generator").len(), 1);
    assert!(report.stats.is_empty());

    sim.set_generator_reachable(true);
    let retry = engine.run(GeneratorChannel::Ch1, &NullSink).await;
    assert!(retry.is_completed());
}

#[tokio::test]
async fn pulse_sweep_scores_clamped_widths() {
    let sim = SimulatedBench::new();
    let plan = SweepPlan {
        shapes: vec![Shape::Pulse],
        frequencies: vec![2000.0],
        amplitudes: vec![1.0],
        pulse_widths_us: vec![100.0, 500.0],
        ..SweepPlan::immediate()
    };
    let engine = engine(&sim, plan);

    let report = engine.run(GeneratorChannel::Ch1, &NullSink).await;

    let width = report.counter(Shape::Pulse, Parameter::PulseWidth).unwrap();
    assert_eq!((width.passed, width.total), (2, 2));
    assert_eq!(
        sim.generator_log().matching(":SOURce1:FUNCtion:PULSe:WIDTh"),
        vec![
            ":SOURce1:FUNCtion:PULSe:WIDTh 0.0001",
            ":SOURce1:FUNCtion:PULSe:WIDTh 0.0004",
        ]
    );
}
