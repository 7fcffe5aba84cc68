//! Bench configuration using Figment
//!
//! Configuration is layered from:
//! 1. Built-in defaults (every field has one)
//! 2. A TOML file: `bench_sweep.toml` when present, or a named file that must exist
//! 3. Environment variables prefixed with `BENCH_SWEEP_`, with `__` between nested keys
//!
//! # Example
//! ```no_run
//! use bench_sweep::config::BenchConfig;
//!
//! let config = BenchConfig::load()?;
//! println!("Generator at {}", config.generator.address());
//! # Ok::<(), bench_sweep::error::BenchError>(())
//! ```
//!
//! `BENCH_SWEEP_GENERATOR__PORT=5026` overrides `generator.port`.

use crate::error::{BenchError, BenchResult};
use crate::logging::{self, OutputFormat};
use crate::sweep::SweepPlan;
use crate::transport::socket::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File read by [`BenchConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "bench_sweep.toml";

/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "BENCH_SWEEP_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub application: ApplicationConfig,
    pub oscilloscope: OscilloscopeConfig,
    pub generator: GeneratorConfig,
    pub sweep: SweepPlan,
    /// Use the simulated bench instead of real instruments.
    pub mock: bool,
}

/// Application-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "bench_sweep".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
        }
    }
}

/// Oscilloscope on the instrument bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscilloscopeConfig {
    /// Bus resource string
    pub resource: String,
    pub timeout_ms: u64,
}

impl Default for OscilloscopeConfig {
    fn default() -> Self {
        Self {
            resource: "USB0::0x2A8D::0x1770::MY58491960::0::INSTR".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl OscilloscopeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Function generator on a raw socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            host: "169.254.5.21".to_string(),
            port: DEFAULT_PORT,
            timeout_ms: u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(3000),
        }
    }
}

impl GeneratorConfig {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BenchConfig {
    /// Load from [`DEFAULT_CONFIG_FILE`] and the environment. Without the file, the
    /// defaults apply.
    pub fn load() -> BenchResult<Self> {
        Self::extract(Figment::new().merge(Toml::file(DEFAULT_CONFIG_FILE)))
    }

    /// Load from a file the user named, then the environment. The file must exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BenchResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BenchError::Configuration(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Self::extract(Figment::new().merge(Toml::file(path)))
    }

    fn extract(figment: Figment) -> BenchResult<Self> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BenchResult<()> {
        logging::parse_log_level(&self.application.log_level)?;

        if self.oscilloscope.resource.trim().is_empty() {
            return Err(invalid("oscilloscope.resource must not be empty"));
        }
        if self.oscilloscope.timeout_ms == 0 {
            return Err(invalid("oscilloscope.timeout_ms must be positive"));
        }
        if self.generator.host.trim().is_empty() {
            return Err(invalid("generator.host must not be empty"));
        }
        if self.generator.port == 0 {
            return Err(invalid("generator.port must not be 0"));
        }
        if self.generator.timeout_ms == 0 {
            return Err(invalid("generator.timeout_ms must be positive"));
        }

        self.sweep.validate()
    }
}

fn invalid(message: &str) -> BenchError {
    BenchError::Configuration(message.to_string())
}
