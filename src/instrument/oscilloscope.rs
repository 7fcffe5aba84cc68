//! Oscilloscope controller.
//!
//! Covers the horizontal and vertical systems, automatic measurements, triggering,
//! the built-in waveform generator (WGEN), waveform transfer and screen capture.
//!
//! # Verified setters
//!
//! `set_timebase_scale`, `set_vertical_scale` and `set_channel_state` read the setting back
//! after writing it and fail with [`BenchError::Verification`] when the instrument did not
//! take the value. The sweep uses the unverified `apply_*` variants instead, which only
//! range-check and write.

use super::channel::ScopeChannel;
use super::measurement::{Measurement, MeasurementResult, Waveform};
use super::shape::Shape;
use crate::error::{BenchError, BenchResult};
use crate::scpi;
use crate::transport::{block, Transport, DISPLAY_CAPTURE_QUERY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Accepted timebase scale in seconds per division.
pub const TIMEBASE_RANGE: RangeInclusive<f64> = 500e-12..=100.0;

/// Accepted vertical scale in volts per division.
pub const VERTICAL_RANGE: RangeInclusive<f64> = 1e-3..=10.0;

/// Offset limit as a multiple of the current vertical scale.
pub const OFFSET_DIVISIONS: f64 = 40.0;

/// Relative tolerance (percent) for write-then-verify setters.
pub const VERIFY_TOLERANCE_PERCENT: f64 = 1.0;

const RESET_SETTLE: Duration = Duration::from_millis(1000);
const AUTOSCALE_SETTLE: Duration = Duration::from_millis(200);

// =============================================================================
// Setting enums
// =============================================================================

/// Horizontal reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimebaseReference {
    Left,
    Center,
    Right,
}

impl TimebaseReference {
    fn keyword(self) -> &'static str {
        match self {
            TimebaseReference::Left => "LEFT",
            TimebaseReference::Center => "CENTer",
            TimebaseReference::Right => "RIGHt",
        }
    }
}

impl FromStr for TimebaseReference {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LEFT" => Ok(TimebaseReference::Left),
            "CENTER" | "CENT" => Ok(TimebaseReference::Center),
            "RIGHT" | "RIGH" => Ok(TimebaseReference::Right),
            _ => Err(BenchError::Argument(format!(
                "Invalid reference point '{}'. Use one of: LEFT, CENTER, RIGHT",
                s
            ))),
        }
    }
}

/// Trigger sweep mode (not the trigger type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSweep {
    Auto,
    Normal,
    Single,
}

impl FromStr for TriggerSweep {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(TriggerSweep::Auto),
            "NORM" | "NORMAL" => Ok(TriggerSweep::Normal),
            "SING" | "SINGLE" => Ok(TriggerSweep::Single),
            _ => Err(BenchError::Argument(format!(
                "Unsupported trigger sweep mode: {}",
                s
            ))),
        }
    }
}

/// Edge trigger slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSlope {
    Positive,
    Negative,
}

impl FromStr for TriggerSlope {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POS" | "POSITIVE" => Ok(TriggerSlope::Positive),
            "NEG" | "NEGATIVE" => Ok(TriggerSlope::Negative),
            _ => Err(BenchError::Argument(format!("Unsupported trigger slope: {}", s))),
        }
    }
}

/// Trigger type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Edge,
    Pulse,
    Pattern,
}

impl FromStr for TriggerType {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EDGE" => Ok(TriggerType::Edge),
            "PULSE" => Ok(TriggerType::Pulse),
            "PATTERN" => Ok(TriggerType::Pattern),
            _ => Err(BenchError::Argument(format!("Unsupported trigger type: {}", s))),
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerType::Edge => "EDGE",
            TriggerType::Pulse => "PULSE",
            TriggerType::Pattern => "PATTERN",
        })
    }
}

/// Parameters for the built-in waveform generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WgenSettings {
    /// Hz; not sent when zero or for shapes without a frequency.
    pub frequency: f64,
    /// Volts; not sent when zero or for DC.
    pub amplitude: f64,
    pub offset: f64,
    /// Percent, square only.
    pub duty_cycle: f64,
    /// Percent, ramp only.
    pub symmetry: f64,
    /// Nanoseconds, pulse only.
    pub width_ns: f64,
}

impl Default for WgenSettings {
    fn default() -> Self {
        Self {
            frequency: 1000.0,
            amplitude: 1.0,
            offset: 0.0,
            duty_cycle: 50.0,
            symmetry: 50.0,
            width_ns: 0.0,
        }
    }
}

// =============================================================================
// Oscilloscope
// =============================================================================

/// Controller for a four-channel oscilloscope.
pub struct Oscilloscope {
    transport: Box<dyn Transport>,
    reset_settle: Duration,
    autoscale_settle: Duration,
}

impl Oscilloscope {
    /// Wrap a transport. Nothing is sent until [`connect`](Self::connect).
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            reset_settle: RESET_SETTLE,
            autoscale_settle: AUTOSCALE_SETTLE,
        }
    }

    /// Override the settle times after reset and autoscale.
    pub fn with_settle_times(mut self, reset: Duration, autoscale: Duration) -> Self {
        self.reset_settle = reset;
        self.autoscale_settle = autoscale;
        self
    }

    /// Open the transport. Call [`initialize`](Self::initialize) for a known state.
    pub async fn connect(&mut self) -> BenchResult<()> {
        self.transport.connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn address(&self) -> &str {
        self.transport.address()
    }

    /// Reset, clear status and switch response headers off.
    pub async fn initialize(&mut self) -> BenchResult<()> {
        self.transport.write("*RST").await?;
        tokio::time::sleep(self.reset_settle).await;
        self.transport.write("*CLS").await?;
        self.transport.write(":SYSTem:HEADer OFF").await?;
        info!(address = %self.address(), "Oscilloscope initialized");
        Ok(())
    }

    pub async fn identify(&mut self) -> BenchResult<String> {
        self.transport.identify().await
    }

    /// Send a raw command.
    pub async fn send_command(&mut self, command: &str) -> BenchResult<()> {
        self.transport.write(command).await
    }

    /// Send a raw query and return its text response.
    pub async fn query(&mut self, command: &str) -> BenchResult<String> {
        self.transport.query(command).await
    }

    /// Read one pending response without writing first.
    pub async fn read_response(&mut self) -> BenchResult<String> {
        self.transport.read_line().await
    }

    pub fn dispose(&mut self) {
        self.transport.dispose();
    }

    // =========================================================================
    // Horizontal
    // =========================================================================

    /// Set and verify the timebase scale (seconds per division).
    pub async fn set_timebase_scale(&mut self, seconds_per_div: f64) -> BenchResult<()> {
        check_range("Timebase scale", seconds_per_div, &TIMEBASE_RANGE, "500ps and 100s")?;
        let command = scpi::command_with_value(":TIMebase:SCALe", seconds_per_div);
        self.write_verified(
            "timebase scale",
            &command,
            ":TIMebase:SCALe?",
            seconds_per_div,
            VERIFY_TOLERANCE_PERCENT,
        )
        .await
    }

    /// Set the timebase scale without reading it back.
    pub async fn apply_timebase_scale(&mut self, seconds_per_div: f64) -> BenchResult<()> {
        check_range("Timebase scale", seconds_per_div, &TIMEBASE_RANGE, "500ps and 100s")?;
        self.transport
            .write(&scpi::command_with_value(":TIMebase:SCALe", seconds_per_div))
            .await
    }

    /// Current timebase scale in seconds per division.
    pub async fn timebase_scale(&mut self) -> BenchResult<f64> {
        self.query_number(":TIMebase:SCALe?").await
    }

    /// Horizontal position of the trigger point on screen.
    pub async fn set_timebase_reference(
        &mut self,
        reference: TimebaseReference,
    ) -> BenchResult<()> {
        let command = format!(":TIMebase:REFerence {}", reference.keyword());
        self.transport.write(&command).await
    }

    // =========================================================================
    // Vertical
    // =========================================================================

    /// Set and verify a channel's vertical scale (volts per division).
    pub async fn set_vertical_scale(
        &mut self,
        channel: ScopeChannel,
        volts_per_div: f64,
    ) -> BenchResult<()> {
        check_range("Voltage scale", volts_per_div, &VERTICAL_RANGE, "1mV and 10V")?;
        let header = format!(":CHANnel{}:SCALe", channel.number());
        let command = scpi::command_with_value(&header, volts_per_div);
        let query = format!(":CHANnel{}:SCALe?", channel.number());
        self.write_verified(
            "vertical scale",
            &command,
            &query,
            volts_per_div,
            VERIFY_TOLERANCE_PERCENT,
        )
        .await
    }

    /// Set a channel's vertical scale without reading it back.
    pub async fn apply_vertical_scale(
        &mut self,
        channel: ScopeChannel,
        volts_per_div: f64,
    ) -> BenchResult<()> {
        check_range("Voltage scale", volts_per_div, &VERTICAL_RANGE, "1mV and 10V")?;
        let header = format!(":CHANnel{}:SCALe", channel.number());
        let command = scpi::command_with_value(&header, volts_per_div);
        self.transport.write(&command).await
    }

    /// Current vertical scale of `channel` in volts per division.
    pub async fn vertical_scale(&mut self, channel: ScopeChannel) -> BenchResult<f64> {
        self.query_number(&format!(":CHANnel{}:SCALe?", channel.number()))
            .await
    }

    /// Set a channel offset, bounded by the current vertical scale.
    pub async fn set_vertical_offset(
        &mut self,
        channel: ScopeChannel,
        volts: f64,
    ) -> BenchResult<()> {
        scpi::reject_non_finite("offset", volts)?;
        let max_offset = self.vertical_scale(channel).await? * OFFSET_DIVISIONS;
        if volts.abs() > max_offset {
            return Err(BenchError::Argument(format!(
                "Offset must be between {} and {}",
                -max_offset, max_offset
            )));
        }
        let header = format!(":CHANnel{}:OFFSet", channel.number());
        let command = scpi::command_with_value(&header, volts);
        self.transport.write(&command).await
    }

    /// Show or hide a channel and verify the display state.
    pub async fn set_channel_state(
        &mut self,
        channel: ScopeChannel,
        enabled: bool,
    ) -> BenchResult<()> {
        let command = format!(":CHANnel{}:DISPlay {}", channel.number(), scpi::on_off(enabled));
        self.transport.write(&command).await?;

        let response = self
            .transport
            .query(&format!(":CHANnel{}:DISPlay?", channel.number()))
            .await?;
        let actual = scpi::parse_bool(&response)?;
        if actual != enabled {
            return Err(BenchError::Verification {
                setting: format!("channel {} state", channel.number()),
                requested: scpi::on_off(enabled).to_string(),
                actual: scpi::on_off(actual).to_string(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Built-in waveform generator
    // =========================================================================

    /// Configure and enable the built-in generator, then confirm the shape took effect.
    ///
    /// Command order: shape, frequency, amplitude, offset, one shape-specific extra
    /// (duty for square, symmetry for ramp, width for pulse), output on, shape readback.
    pub async fn configure_waveform_generator(
        &mut self,
        shape: &str,
        settings: &WgenSettings,
    ) -> BenchResult<()> {
        if shape.trim().is_empty() {
            return Err(BenchError::Argument("Waveform type cannot be empty".to_string()));
        }
        let shape: Shape = shape.parse()?;
        for (name, value) in [
            ("frequency", settings.frequency),
            ("amplitude", settings.amplitude),
            ("offset", settings.offset),
            ("width", settings.width_ns),
        ] {
            scpi::reject_non_finite(name, value)?;
        }
        match shape {
            Shape::Square => check_percent("duty cycle", settings.duty_cycle)?,
            Shape::Ramp => check_percent("symmetry", settings.symmetry)?,
            _ => {}
        }

        self.transport
            .write(&format!(":WGEN:FUNCtion {}", shape.wgen_name()))
            .await?;
        if shape.uses_frequency() && settings.frequency > 0.0 {
            self.transport
                .write(&scpi::command_with_value(":WGEN:FREQuency", settings.frequency))
                .await?;
        }
        if shape.uses_amplitude() && settings.amplitude > 0.0 {
            self.transport
                .write(&scpi::command_with_value(":WGEN:VOLTage", settings.amplitude))
                .await?;
        }
        self.transport
            .write(&scpi::command_with_value(":WGEN:VOLTage:OFFSet", settings.offset))
            .await?;

        let extra = match shape {
            Shape::Square => Some(scpi::command_with_value(
                ":WGEN:FUNCtion:SQUare:DCYCle",
                settings.duty_cycle,
            )),
            Shape::Ramp => Some(scpi::command_with_value(
                ":WGEN:FUNCtion:RAMP:SYMMetry",
                settings.symmetry,
            )),
            Shape::Pulse => Some(scpi::command_with_value(
                ":WGEN:FUNCtion:PULSe:WIDTh",
                settings.width_ns * 1e-9,
            )),
            Shape::Sine | Shape::Noise | Shape::Dc => None,
        };
        if let Some(command) = extra {
            self.transport.write(&command).await?;
        }

        self.transport.write(":WGEN:OUTPut ON").await?;

        let readback = self.transport.query(":WGEN:FUNCtion?").await?;
        if readback.trim().eq_ignore_ascii_case(shape.wgen_name()) {
            debug!(shape = shape.wgen_name(), "Waveform generator configured");
            Ok(())
        } else {
            Err(BenchError::Configuration(format!(
                "Failed to configure waveform generator. Expected: {}, got: {}",
                shape.wgen_name(),
                readback
            )))
        }
    }

    // =========================================================================
    // Measurements
    // =========================================================================

    /// Select `channel` as the measurement source and run one measurement.
    pub async fn measure(
        &mut self,
        channel: ScopeChannel,
        measurement: Measurement,
    ) -> BenchResult<MeasurementResult> {
        self.select_measurement_source(channel).await?;
        let value = self.query_number(measurement.query()).await?;
        Ok(MeasurementResult::from_raw(value))
    }

    /// Peak-to-peak voltage.
    pub async fn measure_vpp(&mut self, channel: ScopeChannel) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::PeakToPeak).await
    }

    /// RMS voltage.
    pub async fn measure_vrms(&mut self, channel: ScopeChannel) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Rms).await
    }

    /// Signal frequency in Hz.
    pub async fn measure_frequency(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Frequency).await
    }

    /// Signal period in seconds.
    pub async fn measure_period(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Period).await
    }

    /// Average voltage.
    pub async fn measure_mean_voltage(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Mean).await
    }

    /// Top minus base voltage.
    pub async fn measure_amplitude(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Amplitude).await
    }

    /// Phase in degrees.
    pub async fn measure_phase(&mut self, channel: ScopeChannel) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Phase).await
    }

    /// Positive duty cycle in percent.
    pub async fn measure_duty_cycle(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::DutyCycle).await
    }

    /// Positive pulse width in seconds.
    pub async fn measure_pulse_width(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::PulseWidth).await
    }

    /// Rise time in seconds.
    pub async fn measure_rise_time(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::RiseTime).await
    }

    /// Fall time in seconds.
    pub async fn measure_fall_time(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::FallTime).await
    }

    /// Overshoot in percent.
    pub async fn measure_overshoot(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Overshoot).await
    }

    /// Preshoot in percent.
    pub async fn measure_preshoot(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Preshoot).await
    }

    /// Edge slew rate in volts per second.
    pub async fn measure_slew_rate(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::SlewRate).await
    }

    /// Edge transition time.
    pub async fn measure_transition(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Transition).await
    }

    /// Estimated signal bandwidth in Hz.
    pub async fn measure_bandwidth(
        &mut self,
        channel: ScopeChannel,
    ) -> BenchResult<MeasurementResult> {
        self.measure(channel, Measurement::Bandwidth).await
    }

    /// Rise time as a percentage of the period.
    pub async fn measure_symmetry(&mut self, channel: ScopeChannel) -> BenchResult<f64> {
        self.select_measurement_source(channel).await?;
        let rise = self.query_number(Measurement::RiseTime.query()).await?;
        let period = self.query_number(Measurement::Period.query()).await?;
        if period == 0.0 {
            return Err(BenchError::format("0", "non-zero period"));
        }
        Ok(rise / period * 100.0)
    }

    /// Rise time minus one period of `frequency`.
    pub async fn measure_signal_delay(
        &mut self,
        channel: ScopeChannel,
        frequency: f64,
    ) -> BenchResult<f64> {
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(BenchError::Argument(format!(
                "frequency must be positive, got {}",
                frequency
            )));
        }
        self.select_measurement_source(channel).await?;
        let measured = self.query_number(Measurement::RiseTime.query()).await?;
        Ok(measured - 1.0 / frequency)
    }

    // =========================================================================
    // Trigger and acquisition
    // =========================================================================

    /// Trigger sweep mode, see [`TriggerSweep`].
    pub async fn set_trigger_sweep_mode(&mut self, mode: TriggerSweep) -> BenchResult<()> {
        let keyword = match mode {
            TriggerSweep::Auto => "AUTO",
            TriggerSweep::Normal => "NORMal",
            TriggerSweep::Single => "SINGle",
        };
        self.transport
            .write(&format!(":TRIGger:SWEep {}", keyword))
            .await
    }

    /// Edge trigger source such as `CHAN1`, `LINE` or `WGEN`.
    pub async fn set_trigger_edge_source(&mut self, source: &str) -> BenchResult<()> {
        let source = source.trim();
        if source.is_empty() {
            return Err(BenchError::Argument("Trigger source cannot be empty".to_string()));
        }
        self.transport
            .write(&format!(":TRIGger:EDGE:SOURce {}", source.to_ascii_uppercase()))
            .await
    }

    pub async fn set_trigger_edge_slope(&mut self, slope: TriggerSlope) -> BenchResult<()> {
        let keyword = match slope {
            TriggerSlope::Positive => "POSitive",
            TriggerSlope::Negative => "NEGative",
        };
        self.transport
            .write(&format!(":TRIGger:EDGE:SLOPe {}", keyword))
            .await
    }

    /// Trigger level in volts for the active edge source.
    pub async fn set_trigger_level(&mut self, volts: f64) -> BenchResult<()> {
        scpi::reject_non_finite("trigger level", volts)?;
        self.transport
            .write(&scpi::command_with_value(":TRIGger:EDGE:LEVel", volts))
            .await
    }

    /// Trigger type, see [`TriggerType`].
    pub async fn set_trigger_type(&mut self, trigger: TriggerType) -> BenchResult<()> {
        self.transport
            .write(&format!(":TRIGger:MODE {}", trigger))
            .await
    }

    pub async fn run(&mut self) -> BenchResult<()> {
        self.transport.write(":RUN").await
    }

    pub async fn stop(&mut self) -> BenchResult<()> {
        self.transport.write(":STOP").await
    }

    pub async fn single(&mut self) -> BenchResult<()> {
        self.transport.write(":SINGle").await
    }

    /// Autoscale, then give the instrument time to settle.
    pub async fn autoscale(&mut self) -> BenchResult<()> {
        self.transport.write(":AUTOSCALE").await?;
        tokio::time::sleep(self.autoscale_settle).await;
        Ok(())
    }

    // =========================================================================
    // Data transfer
    // =========================================================================

    /// Raw display image bytes (PNG). Interpretation is left to the caller.
    pub async fn get_screen_capture(&mut self) -> BenchResult<Vec<u8>> {
        let image = self.transport.query_block(DISPLAY_CAPTURE_QUERY).await?;
        debug!(bytes = image.len(), "Screen captured");
        Ok(image)
    }

    /// Fetch one ASCII waveform frame from `channel`, scaled to seconds and volts.
    pub async fn fetch_waveform(
        &mut self,
        channel: ScopeChannel,
        points: u32,
    ) -> BenchResult<Waveform> {
        if points == 0 {
            return Err(BenchError::Argument("waveform point count must be positive".to_string()));
        }
        self.transport
            .write(&format!(":WAVeform:SOURce {}", channel.source_name()))
            .await?;
        self.transport.write(":WAVeform:FORMat ASCii").await?;
        self.transport
            .write(&format!(":WAVeform:POINts {}", points))
            .await?;

        let x_increment = self.query_number(":WAVeform:XINCrement?").await?;
        let x_origin = self.query_number(":WAVeform:XORigin?").await?;
        let raw = self.transport.query(":WAVeform:DATA?").await?;

        let volts: Vec<f64> = block::strip_text_header(&raw)
            .split(',')
            .filter_map(|point| point.trim().parse::<f64>().ok())
            .collect();
        if volts.is_empty() {
            return Err(BenchError::format(
                &raw.chars().take(32).collect::<String>(),
                "comma-separated waveform data",
            ));
        }
        let time = (0..volts.len())
            .map(|i| x_origin + i as f64 * x_increment)
            .collect();
        Ok(Waveform { time, volts })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn select_measurement_source(&mut self, channel: ScopeChannel) -> BenchResult<()> {
        self.transport
            .write(&format!(":MEASure:SOURce {}", channel.source_name()))
            .await
    }

    async fn query_number(&mut self, query: &str) -> BenchResult<f64> {
        let response = self.transport.query(query).await?;
        scpi::parse_number(&response)
    }

    /// Write `command`, read `query` back and require it within `tolerance_percent` of `requested`.
    async fn write_verified(
        &mut self,
        setting: &str,
        command: &str,
        query: &str,
        requested: f64,
        tolerance_percent: f64,
    ) -> BenchResult<()> {
        self.transport.write(command).await?;
        let actual = self.query_number(query).await?;
        if scpi::approx_eq(requested, actual, tolerance_percent) {
            Ok(())
        } else {
            Err(BenchError::Verification {
                setting: setting.to_string(),
                requested: scpi::format_number(requested),
                actual: scpi::format_number(actual),
            })
        }
    }
}

fn check_range(
    name: &str,
    value: f64,
    range: &RangeInclusive<f64>,
    described: &str,
) -> BenchResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(BenchError::Argument(format!(
            "{} must be between {}, got {}",
            name, described, value
        )))
    }
}

fn check_percent(name: &str, value: f64) -> BenchResult<()> {
    check_range(name, value, &(0.0..=100.0), "0 and 100 percent")
}
