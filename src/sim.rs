//! Simulated bench: a function generator wired to an oscilloscope, all in memory.
//!
//! Both simulated instruments answer the same SCPI subset the controllers send and share
//! one state, so scope channel `n` observes generator output `n`. A few knobs inject the
//! faults a real bench produces: amplitude error, invalid frequency readings, failing
//! commands, unreachable instruments and a generator link that drops mid-run.

use crate::bench::InstrumentConnector;
use crate::error::{BenchError, BenchResult};
use crate::instrument::{FunctionGenerator, Measurement, Oscilloscope, ScopeChannel, Shape};
use crate::scpi;
use crate::transport::{CommandLog, MockLink, MockTransport, Reply};
use parking_lot::Mutex;
use std::f64::consts::PI;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Reading returned when there is nothing to measure.
const NO_SIGNAL: f64 = 9.9e37;

/// Frame size cap for waveform dumps.
const MAX_WAVEFORM_POINTS: u32 = 2000;

/// First bytes of a PNG file.
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

pub const SIM_OSCILLOSCOPE_ADDRESS: &str = "SIM::OSCILLOSCOPE::INSTR";
pub const SIM_GENERATOR_ADDRESS: &str = "sim-generator:5025";

/// What one simulated generator output is currently producing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimOutput {
    pub shape: Shape,
    pub frequency: f64,
    pub amplitude: f64,
    pub offset: f64,
    pub duty_cycle: f64,
    /// Seconds.
    pub pulse_width: f64,
    pub enabled: bool,
}

impl Default for SimOutput {
    fn default() -> Self {
        Self {
            shape: Shape::Sine,
            frequency: 1000.0,
            amplitude: 0.1,
            offset: 0.0,
            duty_cycle: 50.0,
            pulse_width: 100e-6,
            enabled: false,
        }
    }
}

impl SimOutput {
    fn period(&self) -> f64 {
        1.0 / self.frequency
    }

    /// Duty cycle the scope would see, in percent.
    fn observed_duty(&self) -> f64 {
        match self.shape {
            Shape::Square => self.duty_cycle,
            Shape::Pulse => self.pulse_width / self.period() * 100.0,
            _ => 50.0,
        }
    }

    fn sample(&self, t: f64, gain: f64) -> f64 {
        let phase = (t * self.frequency).rem_euclid(1.0);
        let amplitude = self.amplitude * gain;
        let level = match self.shape {
            Shape::Sine => (2.0 * PI * phase).sin(),
            Shape::Square | Shape::Pulse => {
                if phase * 100.0 < self.observed_duty() {
                    1.0
                } else {
                    -1.0
                }
            }
            Shape::Ramp => 2.0 * phase - 1.0,
            Shape::Noise => (2.0 * PI * phase * 7.0).sin() * (2.0 * PI * phase * 3.0).cos(),
            Shape::Dc => 0.0,
        };
        self.offset + amplitude * level
    }
}

#[derive(Debug)]
struct ScopeState {
    timebase: f64,
    vertical: [f64; ScopeChannel::COUNT as usize],
    displayed: [bool; ScopeChannel::COUNT as usize],
    measure_source: u8,
    waveform_source: u8,
    waveform_points: u32,
    wgen_shape: Shape,
}

impl Default for ScopeState {
    fn default() -> Self {
        Self {
            timebase: 1e-3,
            vertical: [1.0; ScopeChannel::COUNT as usize],
            displayed: [true, false, false, false],
            measure_source: 1,
            waveform_source: 1,
            waveform_points: 1000,
            wgen_shape: Shape::Sine,
        }
    }
}

#[derive(Debug)]
struct SimState {
    outputs: [SimOutput; 2],
    scope: ScopeState,
    amplitude_gain: f64,
    invalid_frequency_reads: u32,
    fail_prefix: Option<String>,
    generator_reachable: bool,
    oscilloscope_reachable: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            outputs: [SimOutput::default(); 2],
            scope: ScopeState::default(),
            amplitude_gain: 1.0,
            invalid_frequency_reads: 0,
            fail_prefix: None,
            generator_reachable: true,
            oscilloscope_reachable: true,
        }
    }
}

/// Connector producing controllers wired to one shared simulated bench.
#[derive(Clone, Default)]
pub struct SimulatedBench {
    state: Arc<Mutex<SimState>>,
    scope_log: CommandLog,
    generator_log: CommandLog,
    generator_link: MockLink,
}

impl SimulatedBench {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale every observed amplitude by `gain` (1.0 is a perfect bench).
    pub fn set_amplitude_gain(&self, gain: f64) {
        self.state.lock().amplitude_gain = gain;
    }

    /// The next `count` frequency readings return the invalid-measurement marker.
    pub fn queue_invalid_frequency_reads(&self, count: u32) {
        self.state.lock().invalid_frequency_reads = count;
    }

    /// Fail every command (on either instrument) starting with `prefix`, ignoring case.
    pub fn fail_commands_starting_with(&self, prefix: &str) {
        self.state.lock().fail_prefix = Some(prefix.to_ascii_uppercase());
    }

    pub fn clear_failures(&self) {
        self.state.lock().fail_prefix = None;
    }

    pub fn set_generator_reachable(&self, reachable: bool) {
        self.state.lock().generator_reachable = reachable;
    }

    pub fn set_oscilloscope_reachable(&self, reachable: bool) {
        self.state.lock().oscilloscope_reachable = reachable;
    }

    /// Cable of the generator, shared by every generator this bench hands out.
    pub fn generator_link(&self) -> MockLink {
        self.generator_link.clone()
    }

    /// Every command the oscilloscope received, across reconnects.
    pub fn scope_log(&self) -> CommandLog {
        self.scope_log.clone()
    }

    /// Every command the generator received, across reconnects.
    pub fn generator_log(&self) -> CommandLog {
        self.generator_log.clone()
    }

    /// Current state of generator output `number` (1 or 2).
    pub fn output(&self, number: u8) -> Option<SimOutput> {
        let index = usize::from(number.checked_sub(1)?);
        self.state.lock().outputs.get(index).copied()
    }
}

impl InstrumentConnector for SimulatedBench {
    fn default_oscilloscope_address(&self) -> String {
        SIM_OSCILLOSCOPE_ADDRESS.to_string()
    }

    fn default_generator_address(&self) -> String {
        SIM_GENERATOR_ADDRESS.to_string()
    }

    fn oscilloscope(&self, address: &str) -> BenchResult<Oscilloscope> {
        let state = self.state.clone();
        let reachable = self.state.lock().oscilloscope_reachable;
        let mut transport = MockTransport::new(address, move |command| {
            let mut state = state.lock();
            state.check_failure(command)?;
            state.scope_reply(command)
        })
        .with_log(self.scope_log.clone());
        if !reachable {
            transport = transport.refusing_connections();
        }
        Ok(Oscilloscope::new(Box::new(transport)).with_settle_times(Duration::ZERO, Duration::ZERO))
    }

    fn generator(&self, address: &str) -> BenchResult<FunctionGenerator> {
        let state = self.state.clone();
        let reachable = self.state.lock().generator_reachable;
        let mut transport = MockTransport::new(address, move |command| {
            let mut state = state.lock();
            state.check_failure(command)?;
            state.generator_reply(command)
        })
        .with_log(self.generator_log.clone())
        .with_link(self.generator_link.clone());
        if !reachable {
            transport = transport.refusing_connections();
        }
        Ok(FunctionGenerator::new(Box::new(transport)).with_reset_settle(Duration::ZERO))
    }
}

impl SimState {
    fn check_failure(&self, command: &str) -> BenchResult<()> {
        match &self.fail_prefix {
            Some(prefix) if command.to_ascii_uppercase().starts_with(prefix.as_str()) => {
                Err(BenchError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("simulated failure on '{}'", command),
                )))
            }
            _ => Ok(()),
        }
    }

    fn generator_reply(&mut self, command: &str) -> BenchResult<Option<Reply>> {
        let (header, arg) = split_command(command);
        match header.as_str() {
            "*IDN?" => return Ok(Some(Reply::line("SIMULATED,FUNCGEN,0,1.0"))),
            "*RST" => {
                self.outputs = [SimOutput::default(); 2];
                return Ok(None);
            }
            _ => {}
        }

        if let Some((index, sub)) = header.strip_prefix(":SOURCE").and_then(split_channel) {
            let output = &mut self.outputs[index];
            match sub {
                ":FUNCTION" => output.shape = arg.parse()?,
                ":FREQUENCY" => output.frequency = scpi::parse_number(arg)?,
                ":VOLTAGE" => output.amplitude = scpi::parse_number(arg)?,
                ":VOLTAGE:OFFSET" => output.offset = scpi::parse_number(arg)?,
                ":FUNCTION:SQUARE:DCYCLE" => output.duty_cycle = scpi::parse_number(arg)?,
                ":FUNCTION:PULSE:WIDTH" => output.pulse_width = scpi::parse_number(arg)?,
                _ => {}
            }
        } else if let Some((index, ":STATE")) =
            header.strip_prefix(":OUTPUT").and_then(split_channel)
        {
            self.outputs[index].enabled = scpi::parse_bool(arg)?;
        } else if header == ":OUTPUT:STATE" {
            let enabled = scpi::parse_bool(arg)?;
            for output in &mut self.outputs {
                output.enabled = enabled;
            }
        }
        Ok(None)
    }

    fn scope_reply(&mut self, command: &str) -> BenchResult<Option<Reply>> {
        let (header, arg) = split_command(command);
        let reply = match header.as_str() {
            "*IDN?" => Some(Reply::line("SIMULATED,OSCILLOSCOPE,0,1.0")),
            ":TIMEBASE:SCALE" => {
                self.scope.timebase = scpi::parse_number(arg)?;
                None
            }
            ":TIMEBASE:SCALE?" => Some(number_reply(self.scope.timebase)),
            ":MEASURE:SOURCE" => {
                self.scope.measure_source = arg.parse::<ScopeChannel>()?.number();
                None
            }
            ":WGEN:FUNCTION" => {
                self.scope.wgen_shape = arg.parse()?;
                None
            }
            ":WGEN:FUNCTION?" => Some(Reply::line(self.scope.wgen_shape.wgen_name())),
            ":WAVEFORM:SOURCE" => {
                self.scope.waveform_source = arg.parse::<ScopeChannel>()?.number();
                None
            }
            ":WAVEFORM:POINTS" => {
                let points = arg
                    .parse::<u32>()
                    .map_err(|_| BenchError::format(arg, "point count"))?;
                self.scope.waveform_points = points.clamp(1, MAX_WAVEFORM_POINTS);
                None
            }
            ":WAVEFORM:XINCREMENT?" => Some(number_reply(self.x_increment())),
            ":WAVEFORM:XORIGIN?" => Some(number_reply(self.x_origin())),
            ":WAVEFORM:DATA?" => Some(Reply::line(self.waveform_dump())),
            ":DISPLAY:DATA?" => Some(Reply::Block(self.screen_image())),
            _ => {
                let channel = header.strip_prefix(":CHANNEL").and_then(split_scope_channel);
                if let Some((index, sub)) = channel {
                    self.channel_reply(index, sub, arg)?
                } else if let Some(measurement) = Measurement::ALL
                    .into_iter()
                    .find(|m| m.query().to_ascii_uppercase() == header)
                {
                    let value = self.observe(self.scope.measure_source, measurement);
                    Some(number_reply(value))
                } else {
                    None
                }
            }
        };
        Ok(reply)
    }

    fn channel_reply(&mut self, index: usize, sub: &str, arg: &str) -> BenchResult<Option<Reply>> {
        let reply = match sub {
            ":SCALE" => {
                self.scope.vertical[index] = scpi::parse_number(arg)?;
                None
            }
            ":SCALE?" => Some(number_reply(self.scope.vertical[index])),
            ":DISPLAY" => {
                self.scope.displayed[index] = scpi::parse_bool(arg)?;
                None
            }
            ":DISPLAY?" => Some(Reply::line(if self.scope.displayed[index] { "1" } else { "0" })),
            _ => None,
        };
        Ok(reply)
    }

    /// What scope channel `channel` reads for `measurement`.
    fn observe(&mut self, channel: u8, measurement: Measurement) -> f64 {
        let Some(output) = usize::from(channel)
            .checked_sub(1)
            .and_then(|i| self.outputs.get(i))
            .copied()
        else {
            return NO_SIGNAL;
        };
        if !output.enabled {
            return NO_SIGNAL;
        }
        let periodic = output.shape.uses_frequency();
        let period = output.period();
        let swing = 2.0 * output.amplitude * self.amplitude_gain;

        match measurement {
            Measurement::Frequency if periodic => {
                if self.invalid_frequency_reads > 0 {
                    self.invalid_frequency_reads -= 1;
                    NO_SIGNAL
                } else {
                    output.frequency
                }
            }
            Measurement::Period if periodic => period,
            Measurement::PeakToPeak | Measurement::Amplitude => swing,
            Measurement::Rms => match output.shape {
                Shape::Sine => swing / 2.0 / 2f64.sqrt(),
                Shape::Ramp => swing / 2.0 / 3f64.sqrt(),
                _ => swing / 2.0,
            },
            Measurement::Mean => output.offset,
            Measurement::DutyCycle if periodic => output.observed_duty(),
            Measurement::PulseWidth if periodic => output.observed_duty() / 100.0 * period,
            Measurement::RiseTime | Measurement::FallTime | Measurement::Transition if periodic => {
                period * 0.01
            }
            Measurement::SlewRate if periodic => swing / (period * 0.01),
            Measurement::Phase | Measurement::Overshoot | Measurement::Preshoot => 0.0,
            Measurement::Bandwidth => 1e9,
            _ => NO_SIGNAL,
        }
    }

    fn x_increment(&self) -> f64 {
        self.scope.timebase * 10.0 / f64::from(self.scope.waveform_points)
    }

    fn x_origin(&self) -> f64 {
        -self.scope.timebase * 5.0
    }

    fn waveform_dump(&self) -> String {
        let index = usize::from(self.scope.waveform_source.saturating_sub(1));
        let output = self.outputs.get(index).copied().unwrap_or_default();
        let (origin, step) = (self.x_origin(), self.x_increment());
        let body = (0..self.scope.waveform_points)
            .map(|i| {
                let volts = if output.enabled {
                    output.sample(origin + f64::from(i) * step, self.amplitude_gain)
                } else {
                    0.0
                };
                format!("{:.6E}", volts)
            })
            .collect::<Vec<_>>()
            .join(",");
        format!("#8{:08}{}", body.len(), body)
    }

    fn screen_image(&self) -> Vec<u8> {
        let mut image = PNG_SIGNATURE.to_vec();
        image.extend_from_slice(b"simulated display");
        image
    }
}

fn number_reply(value: f64) -> Reply {
    Reply::line(format!("{:E}", value))
}

/// Uppercased header and trimmed argument.
fn split_command(command: &str) -> (String, &str) {
    let (header, arg) = command.trim().split_once(' ').unwrap_or((command.trim(), ""));
    (header.to_ascii_uppercase(), arg.trim())
}

/// Generator output index and remainder for `1:FREQUENCY`.
fn split_channel(rest: &str) -> Option<(usize, &str)> {
    match rest.as_bytes().first()? {
        b'1' => Some((0, &rest[1..])),
        b'2' => Some((1, &rest[1..])),
        _ => None,
    }
}

/// Scope channel index and remainder for `3:SCALE`.
fn split_scope_channel(rest: &str) -> Option<(usize, &str)> {
    let digit = rest.chars().next()?.to_digit(10)?;
    let channel = ScopeChannel::new(u8::try_from(digit).ok()?).ok()?;
    Some((usize::from(channel.number() - 1), &rest[1..]))
}
