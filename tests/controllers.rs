//! Generator and oscilloscope controllers over mock transports.

use bench_sweep::instrument::{
    FunctionGenerator, GeneratorChannel, Oscilloscope, ScopeChannel, Shape, TriggerSlope,
    TriggerSweep, TriggerType, WgenSettings,
};
use bench_sweep::transport::{CommandLog, MockTransport};
use bench_sweep::BenchError;
use std::time::Duration;

async fn generator() -> (FunctionGenerator, CommandLog) {
    let transport = MockTransport::with_replies(
        "169.254.5.21:5025",
        [("*IDN?", "Agilent Technologies,33522B,MY52400000,4.00")],
    );
    let log = transport.log();
    let mut fg = FunctionGenerator::new(Box::new(transport)).with_reset_settle(Duration::ZERO);
    fg.connect().await.unwrap();
    (fg, log)
}

async fn scope(replies: Vec<(&'static str, &'static str)>) -> (Oscilloscope, CommandLog) {
    let transport =
        MockTransport::with_replies("USB0::0x2A8D::0x1770::MY58491960::0::INSTR", replies);
    let log = transport.log();
    let mut scope =
        Oscilloscope::new(Box::new(transport)).with_settle_times(Duration::ZERO, Duration::ZERO);
    scope.connect().await.unwrap();
    (scope, log)
}

#[tokio::test]
async fn shape_specific_setters_send_nothing_for_other_shapes() {
    let (mut fg, log) = generator().await;
    let ch = GeneratorChannel::Ch1;

    for shape in Shape::ALL {
        fg.set_waveform(ch, shape).await.unwrap();
        let before = log.len();

        fg.set_square_duty_cycle(ch, 30.0).await.unwrap();
        let after_duty = log.len();
        fg.set_pulse_width(ch, 1e-4).await.unwrap();
        fg.set_pulse_leading_edge(ch, 1e-8).await.unwrap();
        fg.set_pulse_trailing_edge(ch, 1e-8).await.unwrap();
        let after_pulse = log.len();

        let duty_writes = after_duty - before;
        let pulse_writes = after_pulse - after_duty;
        assert_eq!(duty_writes, usize::from(shape == Shape::Square), "{}", shape);
        assert_eq!(pulse_writes, if shape == Shape::Pulse { 3 } else { 0 }, "{}", shape);
    }
}

#[tokio::test]
async fn square_waveform_is_tracked_per_channel() {
    let (mut fg, log) = generator().await;
    fg.set_waveform(GeneratorChannel::Ch2, Shape::Square).await.unwrap();
    fg.set_square_duty_cycle(GeneratorChannel::Ch2, 25.0).await.unwrap();
    fg.set_square_duty_cycle(GeneratorChannel::Ch1, 25.0).await.unwrap();

    assert_eq!(fg.shape(GeneratorChannel::Ch2), Shape::Square);
    assert_eq!(fg.shape(GeneratorChannel::Ch2).mnemonic(), "SQU");
    assert_eq!(
        log.entries(),
        vec![
            ":SOURce2:FUNCtion SQU",
            ":SOURce2:FUNCtion:SQUare:DCYCle 25",
        ]
    );
}

#[tokio::test]
async fn pulse_setters_write_seconds() {
    let (mut fg, log) = generator().await;
    let ch = GeneratorChannel::Ch1;
    fg.set_waveform(ch, Shape::Pulse).await.unwrap();
    fg.set_pulse_width(ch, 0.0004).await.unwrap();
    fg.enable_channel(ch, true).await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            ":SOURce1:FUNCtion PULS",
            ":SOURce1:FUNCtion:PULSe:WIDTh 0.0004",
            ":OUTPut1:STATe ON",
        ]
    );
}

#[tokio::test]
async fn output_and_trigger_commands() {
    let (mut fg, log) = generator().await;
    fg.select_channel(GeneratorChannel::Ch2).await.unwrap();
    fg.set_output_state(false).await.unwrap();
    fg.send_software_trigger().await.unwrap();

    assert_eq!(
        log.entries(),
        vec![":INSTrument:SELect 2", ":OUTPut:STATe OFF", ":TRIGger:IMMediate"]
    );
}

#[tokio::test]
async fn trigger_setters_write_keywords() {
    let (mut scope, log) = scope(vec![]).await;
    scope.set_trigger_type(TriggerType::Pulse).await.unwrap();
    scope.set_trigger_sweep_mode(TriggerSweep::Normal).await.unwrap();
    scope.set_trigger_edge_source(" chan2 ").await.unwrap();
    scope.set_trigger_edge_slope(TriggerSlope::Negative).await.unwrap();
    scope.set_trigger_level(0.25).await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            ":TRIGger:MODE PULSE",
            ":TRIGger:SWEep NORMal",
            ":TRIGger:EDGE:SOURce CHAN2",
            ":TRIGger:EDGE:SLOPe NEGative",
            ":TRIGger:EDGE:LEVel 0.25",
        ]
    );
}

#[tokio::test]
async fn trigger_setters_reject_bad_values_before_io() {
    let (mut scope, log) = scope(vec![]).await;
    assert!(matches!(
        scope.set_trigger_edge_source("  ").await,
        Err(BenchError::Argument(_))
    ));
    assert!(matches!(
        scope.set_trigger_level(f64::INFINITY).await,
        Err(BenchError::Argument(_))
    ));
    assert!(log.is_empty());
}

#[tokio::test]
async fn acquisition_control_commands() {
    let (mut scope, log) = scope(vec![]).await;
    scope.run().await.unwrap();
    scope.stop().await.unwrap();
    scope.single().await.unwrap();
    scope.autoscale().await.unwrap();

    assert_eq!(log.entries(), vec![":RUN", ":STOP", ":SINGle", ":AUTOSCALE"]);
}

#[tokio::test]
async fn signal_delay_subtracts_one_period() {
    let (mut scope, log) = scope(vec![(":MEASure:RISetime?", "1.5E-03")]).await;
    let ch1 = ScopeChannel::new(1).unwrap();

    let delay = scope.measure_signal_delay(ch1, 1000.0).await.unwrap();
    assert!((delay - 0.5e-3).abs() < 1e-12);
    assert_eq!(
        log.entries(),
        vec![":MEASure:SOURce CHANnel1", ":MEASure:RISetime?"]
    );

    assert!(matches!(
        scope.measure_signal_delay(ch1, 0.0).await,
        Err(BenchError::Argument(_))
    ));
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn builtin_generator_commands_follow_fixed_order() {
    let (mut scope, log) = scope(vec![(":WGEN:FUNCtion?", "square\n")]).await;
    let settings = WgenSettings {
        frequency: 1000.0,
        amplitude: 2.0,
        offset: 0.0,
        duty_cycle: 25.0,
        ..WgenSettings::default()
    };

    scope.configure_waveform_generator("SQUARE", &settings).await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            ":WGEN:FUNCtion SQUARE",
            ":WGEN:FREQuency 1000",
            ":WGEN:VOLTage 2",
            ":WGEN:VOLTage:OFFSet 0",
            ":WGEN:FUNCtion:SQUare:DCYCle 25",
            ":WGEN:OUTPut ON",
            ":WGEN:FUNCtion?",
        ]
    );
}

#[tokio::test]
async fn builtin_generator_readback_mismatch_is_reported() {
    let (mut scope, _log) = scope(vec![(":WGEN:FUNCtion?", "SIN")]).await;
    let err = scope
        .configure_waveform_generator("RAMP", &WgenSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Configuration(_)), "got {:?}", err);
}

#[tokio::test]
async fn builtin_generator_readback_must_name_the_written_shape() {
    let (mut scope, _log) = scope(vec![(":WGEN:FUNCtion?", "SQU")]).await;
    let err = scope
        .configure_waveform_generator("SQU", &WgenSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::Configuration(_)), "got {:?}", err);
}

#[tokio::test]
async fn builtin_generator_rejects_bad_input_before_io() {
    let (mut scope, log) = scope(vec![]).await;
    assert!(matches!(
        scope.configure_waveform_generator("", &WgenSettings::default()).await,
        Err(BenchError::Argument(_))
    ));
    assert!(matches!(
        scope.configure_waveform_generator("TRIANGLE", &WgenSettings::default()).await,
        Err(BenchError::Argument(_))
    ));
    let bad_duty = WgenSettings {
        duty_cycle: 120.0,
        ..WgenSettings::default()
    };
    assert!(matches!(
        scope.configure_waveform_generator("SQUARE", &bad_duty).await,
        Err(BenchError::Argument(_))
    ));
    assert!(log.is_empty());
}

#[tokio::test]
async fn vertical_scale_readback_outside_tolerance_fails() {
    let (mut scope, log) = scope(vec![(":CHANnel1:SCALe?", "5.0E-01")]).await;
    let err = scope
        .set_vertical_scale(ScopeChannel::new(1).unwrap(), 0.2)
        .await
        .unwrap_err();

    match err {
        BenchError::Verification { requested, actual, .. } => {
            assert_eq!(requested, "0.2");
            assert_eq!(actual, "0.5");
        }
        other => panic!("expected verification error, got {:?}", other),
    }
    assert_eq!(log.entries()[0], ":CHANnel1:SCALe 0.2");
}

#[tokio::test]
async fn channel_display_state_is_verified() {
    let (mut scope, _log) = scope(vec![(":CHANnel2:DISPlay?", "0")]).await;
    let ch2 = ScopeChannel::new(2).unwrap();
    assert!(matches!(
        scope.set_channel_state(ch2, true).await,
        Err(BenchError::Verification { .. })
    ));
    scope.set_channel_state(ch2, false).await.unwrap();
}

#[tokio::test]
async fn invalid_marker_is_flagged_not_hidden() {
    let (mut scope, _log) = scope(vec![(":MEASure:FREQuency?", "9.9E+37")]).await;
    let result = scope
        .measure_frequency(ScopeChannel::new(1).unwrap())
        .await
        .unwrap();
    assert!(!result.is_valid());
    assert_eq!(result.valid_value(), None);
}

#[test]
fn channel_numbers_outside_the_instrument_are_rejected() {
    assert!(matches!(GeneratorChannel::from_number(3), Err(BenchError::Argument(_))));
    assert!(matches!(GeneratorChannel::from_number(0), Err(BenchError::Argument(_))));
    assert!(matches!(ScopeChannel::new(5), Err(BenchError::Argument(_))));
    assert!(matches!(ScopeChannel::new(0), Err(BenchError::Argument(_))));
    assert!(matches!("CH3".parse::<GeneratorChannel>(), Err(BenchError::Argument(_))));
    assert_eq!("ch2".parse::<GeneratorChannel>().unwrap(), GeneratorChannel::Ch2);
}
