//! Waveform shapes and the parameters each one accepts.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const VALID_SHAPES: &str = "SINUSOID, SQUARE, RAMP, PULSE, NOISE, DC";

/// Commanded waveform type of a generator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shape {
    #[serde(rename = "SIN", alias = "SINUSOID", alias = "SINE")]
    Sine,
    #[serde(rename = "SQU", alias = "SQUARE")]
    Square,
    #[serde(rename = "RAMP")]
    Ramp,
    #[serde(rename = "PULS", alias = "PULSE")]
    Pulse,
    #[serde(rename = "NOIS", alias = "NOISE")]
    Noise,
    #[serde(rename = "DC")]
    Dc,
}

impl Shape {
    /// Every shape the instruments know.
    pub const ALL: [Shape; 6] = [
        Shape::Sine,
        Shape::Square,
        Shape::Ramp,
        Shape::Pulse,
        Shape::Noise,
        Shape::Dc,
    ];

    /// Generator short form (`:SOURce<n>:FUNCtion` argument).
    pub fn mnemonic(self) -> &'static str {
        match self {
            Shape::Sine => "SIN",
            Shape::Square => "SQU",
            Shape::Ramp => "RAMP",
            Shape::Pulse => "PULS",
            Shape::Noise => "NOIS",
            Shape::Dc => "DC",
        }
    }

    /// Oscilloscope built-in generator long form (`:WGEN:FUNCtion` argument).
    pub fn wgen_name(self) -> &'static str {
        match self {
            Shape::Sine => "SINUSOID",
            Shape::Square => "SQUARE",
            Shape::Ramp => "RAMP",
            Shape::Pulse => "PULSE",
            Shape::Noise => "NOISE",
            Shape::Dc => "DC",
        }
    }

    /// Display name used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Shape::Sine => "Sine",
            Shape::Square => "Square",
            Shape::Ramp => "Ramp",
            Shape::Pulse => "Pulse",
            Shape::Noise => "Noise",
            Shape::Dc => "DC",
        }
    }

    pub fn supports_phase(self) -> bool {
        matches!(self, Shape::Sine | Shape::Square | Shape::Ramp | Shape::Pulse)
    }

    pub fn supports_duty_cycle(self) -> bool {
        self == Shape::Square
    }

    pub fn supports_symmetry(self) -> bool {
        self == Shape::Ramp
    }

    /// Pulse width and both edge times.
    pub fn supports_pulse_timing(self) -> bool {
        self == Shape::Pulse
    }

    pub fn supports_noise_bandwidth(self) -> bool {
        self == Shape::Noise
    }

    /// Whether a frequency setting has any meaning for this shape.
    pub fn uses_frequency(self) -> bool {
        !matches!(self, Shape::Noise | Shape::Dc)
    }

    /// Whether an amplitude setting has any meaning for this shape.
    pub fn uses_amplitude(self) -> bool {
        self != Shape::Dc
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for Shape {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        let normalized = s.trim().trim_matches('"').to_ascii_uppercase();
        let shape = match normalized.as_str() {
            "SIN" | "SINE" | "SINUSOID" => Shape::Sine,
            "SQU" | "SQUARE" => Shape::Square,
            "RAMP" => Shape::Ramp,
            "PULS" | "PULSE" => Shape::Pulse,
            "NOIS" | "NOISE" => Shape::Noise,
            "DC" => Shape::Dc,
            _ => {
                return Err(BenchError::Argument(format!(
                    "Invalid waveform shape '{}'. Valid shapes: {}",
                    s, VALID_SHAPES
                )))
            }
        };
        Ok(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!("SQU".parse::<Shape>().unwrap(), Shape::Square);
        assert_eq!("square".parse::<Shape>().unwrap(), Shape::Square);
        assert_eq!("SINUSOID".parse::<Shape>().unwrap(), Shape::Sine);
        assert_eq!("\"PULS\"".parse::<Shape>().unwrap(), Shape::Pulse);
        assert!(matches!("TRIANGLE".parse::<Shape>(), Err(BenchError::Argument(_))));
    }

    #[test]
    fn parameter_support_table() {
        for shape in Shape::ALL {
            assert_eq!(shape.supports_duty_cycle(), shape == Shape::Square);
            assert_eq!(shape.supports_pulse_timing(), shape == Shape::Pulse);
        }
        assert!(!Shape::Noise.supports_phase());
        assert!(!Shape::Dc.supports_phase());
        assert!(Shape::Noise.supports_noise_bandwidth());
        assert!(!Shape::Dc.uses_amplitude());
        assert!(!Shape::Noise.uses_frequency());
    }

    #[test]
    fn names_round_trip_through_parse() {
        for shape in Shape::ALL {
            assert_eq!(shape.mnemonic().parse::<Shape>().unwrap(), shape);
            assert_eq!(shape.wgen_name().parse::<Shape>().unwrap(), shape);
        }
    }
}
