//! Channel identifiers for both instruments.

use crate::error::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two generator output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeneratorChannel {
    #[serde(rename = "CH1", alias = "1")]
    Ch1,
    #[serde(rename = "CH2", alias = "2")]
    Ch2,
}

impl GeneratorChannel {
    /// Both channels, in order.
    pub const ALL: [GeneratorChannel; 2] = [GeneratorChannel::Ch1, GeneratorChannel::Ch2];

    /// 1-based channel number used in `:SOURce<n>` and `:OUTPut<n>`.
    pub fn number(self) -> u8 {
        match self {
            GeneratorChannel::Ch1 => 1,
            GeneratorChannel::Ch2 => 2,
        }
    }

    /// Channel for a 1-based number.
    pub fn from_number(number: u8) -> BenchResult<Self> {
        match number {
            1 => Ok(GeneratorChannel::Ch1),
            2 => Ok(GeneratorChannel::Ch2),
            other => Err(BenchError::Argument(format!(
                "Invalid generator channel {}. Use 'CH1' or 'CH2'.",
                other
            ))),
        }
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    /// The oscilloscope input wired to this output on the bench.
    pub fn scope_input(self) -> ScopeChannel {
        ScopeChannel(self.number())
    }
}

impl fmt::Display for GeneratorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CH{}", self.number())
    }
}

impl FromStr for GeneratorChannel {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix("CH").unwrap_or(&upper);
        match digits {
            "1" => Ok(GeneratorChannel::Ch1),
            "2" => Ok(GeneratorChannel::Ch2),
            _ => Err(BenchError::Argument(format!(
                "Invalid channel '{}'. Use 'CH1' or 'CH2'.",
                s
            ))),
        }
    }
}

/// A validated oscilloscope input channel (1 to 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeChannel(u8);

impl ScopeChannel {
    /// Number of analog inputs on the oscilloscope.
    pub const COUNT: u8 = 4;

    /// Input `number`, 1 to [`COUNT`](Self::COUNT). Anything else is an `Argument` error.
    pub fn new(number: u8) -> BenchResult<Self> {
        if (1..=Self::COUNT).contains(&number) {
            Ok(ScopeChannel(number))
        } else {
            Err(BenchError::Argument(format!(
                "Invalid oscilloscope channel {}. Valid channels are 1 to {}.",
                number,
                Self::COUNT
            )))
        }
    }

    /// One-based input number.
    pub fn number(self) -> u8 {
        self.0
    }

    /// Source name used by `:MEASure:SOURce` and `:WAVeform:SOURce`.
    pub fn source_name(self) -> String {
        format!("CHANnel{}", self.0)
    }
}

impl fmt::Display for ScopeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CHANnel{}", self.0)
    }
}

impl FromStr for ScopeChannel {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let digits = upper
            .strip_prefix("CHANNEL")
            .or_else(|| upper.strip_prefix("CHAN"))
            .or_else(|| upper.strip_prefix("CH"))
            .unwrap_or(&upper);
        let number = digits.parse::<u8>().map_err(|_| {
            BenchError::Argument(format!("Invalid oscilloscope channel '{}'", s))
        })?;
        ScopeChannel::new(number)
    }
}
