//! Summary of one sweep run.

use super::stats::{Counter, Parameter, StatsSnapshot};
use crate::instrument::{GeneratorChannel, Shape};
use std::fmt;
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every combination was visited.
    Completed,
    /// A stop request ended the run early.
    Stopped,
    /// The run could not start, usually because an instrument did not connect.
    Failed(String),
}

impl fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepOutcome::Completed => f.write_str("completed"),
            SweepOutcome::Stopped => f.write_str("stopped by user"),
            SweepOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub channel: GeneratorChannel,
    pub outcome: SweepOutcome,
    /// Shapes in sweep order.
    pub shapes: Vec<Shape>,
    pub stats: StatsSnapshot,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn counter(&self, shape: Shape, parameter: Parameter) -> Option<Counter> {
        self.stats.get(shape, parameter)
    }

    /// Success rate in percent for one pair, if it was part of the run.
    pub fn pass_rate(&self, shape: Shape, parameter: Parameter) -> Option<f64> {
        self.counter(shape, parameter).map(|c| c.pass_rate())
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == SweepOutcome::Completed
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sweep on {}: {}", self.channel, self.outcome)?;
        for &shape in &self.shapes {
            let mut lines = self.stats.for_shape(shape).peekable();
            if lines.peek().is_none() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "==== {} ({}) ====", shape.label(), shape)?;
            for (parameter, counter) in lines {
                writeln!(f, "{}: {}", parameter.label(), counter)?;
            }
        }
        writeln!(f)?;
        let secs = self.elapsed.as_secs();
        write!(f, "Total Test Time: {}m {}s", secs / 60, secs % 60)
    }
}
