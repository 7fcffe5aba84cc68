//! Oscilloscope measurement kinds and results.

use crate::scpi;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Automatic measurements available through `:MEASure:<name>?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measurement {
    PeakToPeak,
    Rms,
    Frequency,
    Period,
    Mean,
    Amplitude,
    Phase,
    DutyCycle,
    PulseWidth,
    RiseTime,
    FallTime,
    Overshoot,
    Preshoot,
    SlewRate,
    Transition,
    Bandwidth,
}

impl Measurement {
    /// Every measurement the oscilloscope controller can run.
    pub const ALL: [Measurement; 16] = [
        Measurement::PeakToPeak,
        Measurement::Rms,
        Measurement::Frequency,
        Measurement::Period,
        Measurement::Mean,
        Measurement::Amplitude,
        Measurement::Phase,
        Measurement::DutyCycle,
        Measurement::PulseWidth,
        Measurement::RiseTime,
        Measurement::FallTime,
        Measurement::Overshoot,
        Measurement::Preshoot,
        Measurement::SlewRate,
        Measurement::Transition,
        Measurement::Bandwidth,
    ];

    /// The `:MEASure` query for this measurement.
    pub fn query(self) -> &'static str {
        match self {
            Measurement::PeakToPeak => ":MEASure:VPP?",
            Measurement::Rms => ":MEASure:VRMS?",
            Measurement::Frequency => ":MEASure:FREQuency?",
            Measurement::Period => ":MEASure:PERiod?",
            Measurement::Mean => ":MEASure:VAVerage?",
            Measurement::Amplitude => ":MEASure:VAMPlitude?",
            Measurement::Phase => ":MEASure:PHASe?",
            Measurement::DutyCycle => ":MEASure:DUTYcycle?",
            Measurement::PulseWidth => ":MEASure:PWIDth?",
            Measurement::RiseTime => ":MEASure:RISetime?",
            Measurement::FallTime => ":MEASure:FALLtime?",
            Measurement::Overshoot => ":MEASure:OVERshoot?",
            Measurement::Preshoot => ":MEASure:PREShoot?",
            Measurement::SlewRate => ":MEASure:SLEWrate?",
            Measurement::Transition => ":MEASure:TRANsition?",
            Measurement::Bandwidth => ":MEASure:BANDwidth?",
        }
    }

    /// Engineering unit of the returned value.
    pub fn unit(self) -> &'static str {
        match self {
            Measurement::PeakToPeak
            | Measurement::Rms
            | Measurement::Mean
            | Measurement::Amplitude => "V",
            Measurement::Frequency | Measurement::Bandwidth => "Hz",
            Measurement::Period
            | Measurement::PulseWidth
            | Measurement::RiseTime
            | Measurement::FallTime
            | Measurement::Transition => "s",
            Measurement::Phase => "deg",
            Measurement::DutyCycle | Measurement::Overshoot | Measurement::Preshoot => "%",
            Measurement::SlewRate => "V/s",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Measurement::PeakToPeak => "Vpp",
            Measurement::Rms => "Vrms",
            Measurement::Frequency => "Frequency",
            Measurement::Period => "Period",
            Measurement::Mean => "Mean",
            Measurement::Amplitude => "Amplitude",
            Measurement::Phase => "Phase",
            Measurement::DutyCycle => "Duty Cycle",
            Measurement::PulseWidth => "Pulse Width",
            Measurement::RiseTime => "Rise Time",
            Measurement::FallTime => "Fall Time",
            Measurement::Overshoot => "Overshoot",
            Measurement::Preshoot => "Preshoot",
            Measurement::SlewRate => "Slew Rate",
            Measurement::Transition => "Transition",
            Measurement::Bandwidth => "Bandwidth",
        };
        f.write_str(name)
    }
}

/// A measured value and whether the instrument considered it valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasurementResult {
    value: f64,
    valid: bool,
}

impl MeasurementResult {
    /// Wrap a raw value, flagging the instrument's invalid-measurement marker.
    pub fn from_raw(value: f64) -> Self {
        Self {
            value,
            valid: !scpi::is_invalid_measurement(value),
        }
    }

    /// Raw value as returned by the instrument.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The value if valid.
    pub fn valid_value(&self) -> Option<f64> {
        self.valid.then_some(self.value)
    }
}

/// One captured waveform frame, already scaled to seconds and volts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Waveform {
    pub time: Vec<f64>,
    pub volts: Vec<f64>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.volts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volts.is_empty()
    }
}
