//! Candidate sets and timing of a sweep run.

use super::retry::RetryPolicy;
use crate::error::{BenchError, BenchResult};
use crate::instrument::oscilloscope::{TIMEBASE_RANGE, VERTICAL_RANGE};
use crate::instrument::Shape;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Screen divisions across the horizontal axis.
const HORIZONTAL_DIVISIONS: f64 = 10.0;

/// Divisions the expected peak-to-peak swing is spread over vertically.
const VERTICAL_DIVISIONS: f64 = 6.0;

/// Vertical headroom above the expected swing.
const VERTICAL_HEADROOM: f64 = 1.2;

/// Longest pulse width allowed, as a fraction of the period.
pub const MAX_PULSE_FRACTION: f64 = 0.8;

fn default_shapes() -> Vec<Shape> {
    vec![Shape::Sine, Shape::Square, Shape::Ramp, Shape::Pulse]
}

fn default_frequencies() -> Vec<f64> {
    vec![100.0, 500.0, 1000.0]
}

fn default_amplitudes() -> Vec<f64> {
    vec![0.5, 1.0, 2.0]
}

fn default_duty_cycles() -> Vec<f64> {
    vec![10.0, 50.0, 90.0]
}

fn default_pulse_widths() -> Vec<f64> {
    vec![10.0, 100.0, 500.0]
}

fn default_tolerance() -> f64 {
    15.0
}

/// Fixed pauses that let the hardware settle between commands and measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    /// After applying generator settings.
    pub generator_ms: u64,
    /// After applying scope scales.
    pub scope_ms: u64,
    /// After each duty cycle change.
    pub duty_ms: u64,
    /// After each pulse width change.
    pub pulse_ms: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            generator_ms: 50,
            scope_ms: 100,
            duty_ms: 20,
            pulse_ms: 50,
        }
    }
}

impl SettleDelays {
    /// No settling at all, for simulated instruments.
    pub fn none() -> Self {
        Self {
            generator_ms: 0,
            scope_ms: 0,
            duty_ms: 0,
            pulse_ms: 0,
        }
    }

    pub fn generator(&self) -> Duration {
        Duration::from_millis(self.generator_ms)
    }

    pub fn scope(&self) -> Duration {
        Duration::from_millis(self.scope_ms)
    }

    pub fn duty(&self) -> Duration {
        Duration::from_millis(self.duty_ms)
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_millis(self.pulse_ms)
    }
}

/// The Cartesian product a sweep walks, plus how it judges each point.
///
/// Amplitudes are half-span values: the scorer expects a peak-to-peak reading of twice
/// the commanded amplitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepPlan {
    pub shapes: Vec<Shape>,
    /// Hz.
    pub frequencies: Vec<f64>,
    /// Volts, half-span.
    pub amplitudes: Vec<f64>,
    /// Percent, square only.
    pub duty_cycles: Vec<f64>,
    /// Microseconds, pulse only.
    pub pulse_widths_us: Vec<f64>,
    /// Relative tolerance in percent for every scored parameter.
    pub tolerance_percent: f64,
    /// Retry policy for the frequency reading.
    pub retry: RetryPolicy,
    pub settle: SettleDelays,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            shapes: default_shapes(),
            frequencies: default_frequencies(),
            amplitudes: default_amplitudes(),
            duty_cycles: default_duty_cycles(),
            pulse_widths_us: default_pulse_widths(),
            tolerance_percent: default_tolerance(),
            retry: RetryPolicy::default(),
            settle: SettleDelays::default(),
        }
    }
}

impl SweepPlan {
    /// The default plan with every pause removed.
    pub fn immediate() -> Self {
        Self {
            retry: RetryPolicy::immediate(RetryPolicy::default().attempts),
            settle: SettleDelays::none(),
            ..Self::default()
        }
    }

    /// Number of (shape, frequency, amplitude) combinations.
    pub fn combinations(&self) -> usize {
        self.shapes.len() * self.frequencies.len() * self.amplitudes.len()
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.shapes.is_empty() {
            return Err(invalid("sweep.shapes must not be empty"));
        }
        for shape in &self.shapes {
            if !shape.uses_frequency() || !shape.uses_amplitude() {
                return Err(invalid(format!(
                    "sweep.shapes: {} has no measurable frequency and amplitude",
                    shape
                )));
            }
        }
        require_positive_set("sweep.frequencies", &self.frequencies)?;
        require_positive_set("sweep.amplitudes", &self.amplitudes)?;
        if self.shapes.contains(&Shape::Square) {
            if self.duty_cycles.is_empty() {
                return Err(invalid("sweep.duty_cycles must not be empty when SQU is swept"));
            }
            if let Some(bad) = self
                .duty_cycles
                .iter()
                .find(|d| !(d.is_finite() && **d > 0.0 && **d < 100.0))
            {
                return Err(invalid(format!(
                    "sweep.duty_cycles: {} is outside (0, 100)",
                    bad
                )));
            }
        }
        if self.shapes.contains(&Shape::Pulse) {
            require_positive_set("sweep.pulse_widths_us", &self.pulse_widths_us)?;
        }
        if !(self.tolerance_percent > 0.0 && self.tolerance_percent <= 100.0) {
            return Err(invalid(format!(
                "sweep.tolerance_percent: {} is outside (0, 100]",
                self.tolerance_percent
            )));
        }
        if self.retry.attempts == 0 {
            return Err(invalid("sweep.retry.attempts must be at least 1"));
        }
        Ok(())
    }

    /// Seconds per division that show ten periods across the screen.
    pub fn time_scale_for(frequency: f64) -> f64 {
        clamp_to(
            1.0 / (HORIZONTAL_DIVISIONS * frequency),
            TIMEBASE_RANGE.start(),
            TIMEBASE_RANGE.end(),
        )
    }

    /// Volts per division fitting the expected peak-to-peak swing with headroom.
    pub fn voltage_scale_for(amplitude: f64) -> f64 {
        clamp_to(
            2.0 * amplitude * VERTICAL_HEADROOM / VERTICAL_DIVISIONS,
            VERTICAL_RANGE.start(),
            VERTICAL_RANGE.end(),
        )
    }

    /// Pulse width in seconds actually applied for a requested width in microseconds.
    pub fn applied_pulse_width(width_us: f64, frequency: f64) -> f64 {
        let period = 1.0 / frequency;
        (width_us / 1e6).min(MAX_PULSE_FRACTION * period)
    }
}

fn clamp_to(value: f64, min: &f64, max: &f64) -> f64 {
    value.clamp(*min, *max)
}

fn require_positive_set(name: &str, values: &[f64]) -> BenchResult<()> {
    if values.is_empty() {
        return Err(invalid(format!("{} must not be empty", name)));
    }
    match values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        Some(bad) => Err(invalid(format!("{}: {} is not a positive number", name, bad))),
        None => Ok(()),
    }
}

fn invalid(message: impl Into<String>) -> BenchError {
    BenchError::Configuration(message.into())
}
