//! Pass/fail counters per (shape, parameter).

use crate::instrument::Shape;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scored sweep parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    #[serde(rename = "freq")]
    Frequency,
    #[serde(rename = "amp")]
    Amplitude,
    #[serde(rename = "duty")]
    DutyCycle,
    #[serde(rename = "pulseWidth")]
    PulseWidth,
}

impl Parameter {
    pub const ALL: [Parameter; 4] = [
        Parameter::Frequency,
        Parameter::Amplitude,
        Parameter::DutyCycle,
        Parameter::PulseWidth,
    ];

    /// Short key used in logs and serialized stats.
    pub fn key(self) -> &'static str {
        match self {
            Parameter::Frequency => "freq",
            Parameter::Amplitude => "amp",
            Parameter::DutyCycle => "duty",
            Parameter::PulseWidth => "pulseWidth",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Parameter::Frequency => "Frequency",
            Parameter::Amplitude => "Amplitude",
            Parameter::DutyCycle => "Duty Cycle",
            Parameter::PulseWidth => "Pulse Width",
        }
    }

    /// Whether a sweep over `shape` scores this parameter.
    pub fn applies_to(self, shape: Shape) -> bool {
        match self {
            Parameter::Frequency | Parameter::Amplitude => true,
            Parameter::DutyCycle => shape == Shape::Square,
            Parameter::PulseWidth => shape == Shape::Pulse,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Attempts and passes for one (shape, parameter) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub total: u32,
    pub passed: u32,
}

impl Counter {
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        }
    }

    pub fn failed(&self) -> u32 {
        self.total - self.passed
    }

    /// Success rate in percent; zero when nothing was scored.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.passed) * 100.0 / f64::from(self.total)
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}% success)",
            self.passed,
            self.total,
            self.pass_rate()
        )
    }
}

type Table = BTreeMap<(Shape, Parameter), Counter>;

/// Live statistics table, written by the sweep worker and readable at any time.
#[derive(Debug, Default)]
pub struct ParamStats {
    table: RwLock<Table>,
}

impl ParamStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with zeroed counters for every pair the shapes score.
    pub fn reset(&self, shapes: &[Shape]) {
        let fresh: Table = shapes
            .iter()
            .flat_map(|&shape| {
                Parameter::ALL
                    .into_iter()
                    .filter(move |p| p.applies_to(shape))
                    .map(move |p| ((shape, p), Counter::default()))
            })
            .collect();
        *self.table.write() = fresh;
    }

    pub fn record(&self, shape: Shape, parameter: Parameter, passed: bool) {
        self.table
            .write()
            .entry((shape, parameter))
            .or_default()
            .record(passed);
    }

    pub fn get(&self, shape: Shape, parameter: Parameter) -> Option<Counter> {
        self.table.read().get(&(shape, parameter)).copied()
    }

    /// Consistent copy of the whole table.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            entries: self.table.read().clone(),
        }
    }
}

/// Point-in-time copy of [`ParamStats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    entries: Table,
}

impl StatsSnapshot {
    pub fn get(&self, shape: Shape, parameter: Parameter) -> Option<Counter> {
        self.entries.get(&(shape, parameter)).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Shape, Parameter, Counter)> + '_ {
        self.entries
            .iter()
            .map(|(&(shape, parameter), &counter)| (shape, parameter, counter))
    }

    /// Counters of one shape, in parameter order.
    pub fn for_shape(&self, shape: Shape) -> impl Iterator<Item = (Parameter, Counter)> + '_ {
        self.iter()
            .filter(move |(s, _, _)| *s == shape)
            .map(|(_, parameter, counter)| (parameter, counter))
    }

    /// Sum over every pair.
    pub fn total(&self) -> Counter {
        self.entries.values().fold(Counter::default(), |acc, c| Counter {
            total: acc.total + c.total,
            passed: acc.passed + c.passed,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
