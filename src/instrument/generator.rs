//! Two-channel function generator controller.
//!
//! The controller tracks the shape last commanded on each output. Shape-specific setters
//! (phase, duty cycle, symmetry, pulse timing, noise bandwidth) consult that record and
//! become silent no-ops when the current shape does not accept the parameter, so the
//! instrument never sees a command it would reject.

use super::channel::GeneratorChannel;
use super::shape::Shape;
use crate::error::{BenchError, BenchResult};
use crate::scpi;
use crate::transport::Transport;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settle time after `*RST`.
pub const RESET_SETTLE: Duration = Duration::from_millis(1000);

/// Controller for a two-output function generator.
pub struct FunctionGenerator {
    transport: Box<dyn Transport>,
    shapes: [Shape; 2],
    reset_settle: Duration,
}

impl FunctionGenerator {
    /// Wrap a transport. Both channels start out as sine.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            shapes: [Shape::Sine; 2],
            reset_settle: RESET_SETTLE,
        }
    }

    /// Override the settle time after reset.
    pub fn with_reset_settle(mut self, settle: Duration) -> Self {
        self.reset_settle = settle;
        self
    }

    /// Open the transport. The outputs and tracked shapes are left as they are.
    pub async fn connect(&mut self) -> BenchResult<()> {
        self.transport.connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn address(&self) -> &str {
        self.transport.address()
    }

    /// Reset the instrument and clear its status registers.
    pub async fn initialize(&mut self) -> BenchResult<()> {
        self.transport.write("*RST").await?;
        tokio::time::sleep(self.reset_settle).await;
        self.transport.write("*CLS").await?;
        info!(address = %self.address(), "Function generator initialized");
        Ok(())
    }

    pub async fn identify(&mut self) -> BenchResult<String> {
        self.transport.identify().await
    }

    /// Shape last commanded on `channel`.
    pub fn shape(&self, channel: GeneratorChannel) -> Shape {
        self.shapes[channel.index()]
    }

    // =========================================================================
    // Shared parameters
    // =========================================================================

    /// Select the waveform shape. The tracked shape changes only when the write succeeds.
    pub async fn set_waveform(
        &mut self,
        channel: GeneratorChannel,
        shape: Shape,
    ) -> BenchResult<()> {
        let command = format!(":SOURce{}:FUNCtion {}", channel.number(), shape.mnemonic());
        self.transport.write(&command).await?;
        self.shapes[channel.index()] = shape;
        debug!(%channel, %shape, "Waveform shape set");
        Ok(())
    }

    /// Output frequency in Hz.
    pub async fn set_frequency(
        &mut self,
        channel: GeneratorChannel,
        hertz: f64,
    ) -> BenchResult<()> {
        require_positive("frequency", hertz)?;
        self.write_value(channel, ":FREQuency", hertz).await
    }

    /// Amplitude in volts, interpreted by the bench as a half-span value.
    pub async fn set_amplitude(
        &mut self,
        channel: GeneratorChannel,
        volts: f64,
    ) -> BenchResult<()> {
        scpi::reject_non_finite("amplitude", volts)?;
        if volts < 0.0 {
            return Err(BenchError::Argument(format!(
                "amplitude must not be negative, got {}",
                volts
            )));
        }
        self.write_value(channel, ":VOLTage", volts).await
    }

    /// DC offset in volts.
    pub async fn set_offset(&mut self, channel: GeneratorChannel, volts: f64) -> BenchResult<()> {
        scpi::reject_non_finite("offset", volts)?;
        self.write_value(channel, ":VOLTage:OFFSet", volts).await
    }

    // =========================================================================
    // Shape-gated parameters
    // =========================================================================

    /// Phase in degrees. Skipped for noise and DC.
    pub async fn set_phase(&mut self, channel: GeneratorChannel, degrees: f64) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_phase, "phase") {
            return Ok(());
        }
        scpi::reject_non_finite("phase", degrees)?;
        self.write_value(channel, ":PHASe", degrees).await
    }

    /// Square wave duty cycle in percent. Skipped unless the channel is square.
    pub async fn set_square_duty_cycle(
        &mut self,
        channel: GeneratorChannel,
        percent: f64,
    ) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_duty_cycle, "duty cycle") {
            return Ok(());
        }
        require_percent("duty cycle", percent)?;
        self.write_value(channel, ":FUNCtion:SQUare:DCYCle", percent).await
    }

    /// Ramp symmetry in percent. Skipped unless the channel is ramp.
    pub async fn set_ramp_symmetry(
        &mut self,
        channel: GeneratorChannel,
        percent: f64,
    ) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_symmetry, "ramp symmetry") {
            return Ok(());
        }
        require_percent("symmetry", percent)?;
        self.write_value(channel, ":FUNCtion:RAMP:SYMMetry", percent).await
    }

    /// Pulse width in seconds. Skipped unless the channel is pulse.
    pub async fn set_pulse_width(
        &mut self,
        channel: GeneratorChannel,
        seconds: f64,
    ) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_pulse_timing, "pulse width") {
            return Ok(());
        }
        require_positive("pulse width", seconds)?;
        self.write_value(channel, ":FUNCtion:PULSe:WIDTh", seconds).await
    }

    /// Leading edge time in seconds. Skipped unless the channel is pulse.
    pub async fn set_pulse_leading_edge(
        &mut self,
        channel: GeneratorChannel,
        seconds: f64,
    ) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_pulse_timing, "leading edge") {
            return Ok(());
        }
        require_positive("leading edge", seconds)?;
        self.write_value(channel, ":FUNCtion:PULSe:TRANsition:LEADing", seconds).await
    }

    /// Trailing edge time in seconds. Skipped unless the channel is pulse.
    pub async fn set_pulse_trailing_edge(
        &mut self,
        channel: GeneratorChannel,
        seconds: f64,
    ) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_pulse_timing, "trailing edge") {
            return Ok(());
        }
        require_positive("trailing edge", seconds)?;
        self.write_value(channel, ":FUNCtion:PULSe:TRANsition:TRAiling", seconds).await
    }

    /// Noise bandwidth in Hz. Skipped unless the channel is noise.
    pub async fn set_noise_bandwidth(
        &mut self,
        channel: GeneratorChannel,
        hertz: f64,
    ) -> BenchResult<()> {
        if self.skip_unless(channel, Shape::supports_noise_bandwidth, "noise bandwidth") {
            return Ok(());
        }
        require_positive("noise bandwidth", hertz)?;
        self.write_value(channel, ":FUNCtion:NOISe:BWIDth", hertz).await
    }

    // =========================================================================
    // Outputs and triggering
    // =========================================================================

    /// Switch one output on or off.
    pub async fn enable_channel(
        &mut self,
        channel: GeneratorChannel,
        enable: bool,
    ) -> BenchResult<()> {
        let command = format!(":OUTPut{}:STATe {}", channel.number(), scpi::on_off(enable));
        self.transport.write(&command).await
    }

    /// Switch the currently selected output on or off.
    pub async fn set_output_state(&mut self, enable: bool) -> BenchResult<()> {
        let command = format!(":OUTPut:STATe {}", scpi::on_off(enable));
        self.transport.write(&command).await
    }

    /// Make `channel` the target of unqualified commands such as [`set_output_state`].
    ///
    /// [`set_output_state`]: Self::set_output_state
    pub async fn select_channel(&mut self, channel: GeneratorChannel) -> BenchResult<()> {
        let command = format!(":INSTrument:SELect {}", channel.number());
        self.transport.write(&command).await
    }

    /// Fire a bus trigger.
    pub async fn send_software_trigger(&mut self) -> BenchResult<()> {
        self.transport.write(":TRIGger:IMMediate").await
    }

    /// Switch both outputs off, then release the connection.
    ///
    /// The connection is released even when switching off fails.
    pub async fn shutdown(&mut self) -> BenchResult<()> {
        let mut result = Ok(());
        if self.transport.is_connected() {
            for channel in GeneratorChannel::ALL {
                if let Err(err) = self.enable_channel(channel, false).await {
                    warn!(%channel, "Failed to switch output off: {}", err);
                    result = Err(err);
                    break;
                }
            }
        }
        self.dispose();
        result
    }

    /// Release the connection without touching the outputs. Idempotent.
    pub fn dispose(&mut self) {
        self.transport.dispose();
    }

    fn skip_unless(
        &self,
        channel: GeneratorChannel,
        supported: fn(Shape) -> bool, what: &str,
    ) -> bool {
        let shape = self.shape(channel);
        if supported(shape) {
            false
        } else {
            debug!(%channel, %shape, "Skipping {}: not applicable to this shape", what);
            true
        }
    }

    async fn write_value(
        &mut self,
        channel: GeneratorChannel,
        subsystem: &str,
        value: f64,
    ) -> BenchResult<()> {
        let header = format!(":SOURce{}{}", channel.number(), subsystem);
        self.transport
            .write(&scpi::command_with_value(&header, value))
            .await
    }
}

fn require_positive(name: &str, value: f64) -> BenchResult<()> {
    scpi::reject_non_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(BenchError::Argument(format!("{} must be positive, got {}", name, value)))
    }
}

fn require_percent(name: &str, value: f64) -> BenchResult<()> {
    scpi::reject_non_finite(name, value)?;
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(BenchError::Argument(format!(
            "{} must be between 0 and 100 percent, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CommandLog, MockTransport};

    async fn generator() -> (FunctionGenerator, CommandLog) {
        let transport = MockTransport::with_replies(
            "mock-fg",
            [("*IDN?", "Agilent Technologies,33522B,MY0000,4.00")],
        );
        let log = transport.log();
        let mut fg = FunctionGenerator::new(Box::new(transport)).with_reset_settle(Duration::ZERO);
        fg.connect().await.unwrap();
        (fg, log)
    }

    #[tokio::test]
    async fn writes_channel_qualified_commands() {
        let (mut fg, log) = generator().await;
        fg.set_frequency(GeneratorChannel::Ch2, 1000.0).await.unwrap();
        fg.set_amplitude(GeneratorChannel::Ch1, 0.5).await.unwrap();
        fg.set_offset(GeneratorChannel::Ch1, -0.25).await.unwrap();
        assert_eq!(
            log.entries(),
            vec![
                ":SOURce2:FREQuency 1000",
                ":SOURce1:VOLTage 0.5",
                ":SOURce1:VOLTage:OFFSet -0.25",
            ]
        );
    }

    #[tokio::test]
    async fn shape_state_tracks_successful_writes() {
        let (mut fg, _log) = generator().await;
        assert_eq!(fg.shape(GeneratorChannel::Ch1), Shape::Sine);
        fg.set_waveform(GeneratorChannel::Ch1, Shape::Square).await.unwrap();
        assert_eq!(fg.shape(GeneratorChannel::Ch1).mnemonic(), "SQU");
        assert_eq!(fg.shape(GeneratorChannel::Ch2), Shape::Sine);
    }

    #[tokio::test]
    async fn phase_is_skipped_for_dc() {
        let (mut fg, log) = generator().await;
        fg.set_waveform(GeneratorChannel::Ch1, Shape::Dc).await.unwrap();
        let before = log.len();
        fg.set_phase(GeneratorChannel::Ch1, 90.0).await.unwrap();
        assert_eq!(log.len(), before);
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected_before_io() {
        let (mut fg, log) = generator().await;
        fg.set_waveform(GeneratorChannel::Ch1, Shape::Square).await.unwrap();
        let before = log.len();
        assert!(matches!(
            fg.set_square_duty_cycle(GeneratorChannel::Ch1, 120.0).await,
            Err(BenchError::Argument(_))
        ));
        assert!(matches!(
            fg.set_frequency(GeneratorChannel::Ch1, f64::NAN).await,
            Err(BenchError::Argument(_))
        ));
        assert_eq!(log.len(), before);
    }

    #[tokio::test]
    async fn initialize_resets_and_clears() {
        let (mut fg, log) = generator().await;
        fg.set_waveform(GeneratorChannel::Ch2, Shape::Ramp).await.unwrap();
        fg.initialize().await.unwrap();
        assert_eq!(fg.shape(GeneratorChannel::Ch2), Shape::Ramp);
        assert_eq!(log.matching("*"), vec!["*RST", "*CLS"]);
    }

    #[tokio::test]
    async fn shutdown_switches_outputs_off_then_disconnects() {
        let (mut fg, log) = generator().await;
        fg.shutdown().await.unwrap();
        assert_eq!(log.entries(), vec![":OUTPut1:STATe OFF", ":OUTPut2:STATe OFF"]);
        assert!(!fg.is_connected());
        fg.shutdown().await.unwrap();
    }
}
