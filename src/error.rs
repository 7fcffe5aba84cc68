//! Custom error types for the bench.
//!
//! This module defines the primary error type, `BenchError`, shared by the transport,
//! instrument and sweep layers. Using the `thiserror` crate, it provides a single place
//! where every failure a bench run can hit is named.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**, **`NotConnected`**, **`Timeout`**: the transport could not establish
//!   or keep a session. Fatal to the attempted operation; callers retry explicitly.
//! - **`Argument`**: an out-of-domain value (channel, shape, reference, physical range).
//!   Raised before any command is sent.
//! - **`Verification`**: a write-then-verify setter read back a different value. The write
//!   has already taken effect.
//! - **`Format`**: a response could not be parsed as the expected number or text.
//! - **`Configuration`**: an instrument refused a composite configuration, or a config file
//!   carried a semantically invalid value.
//! - **`Io`** / **`Config`**: wrapped `std::io` and `figment` errors.
//! - **`FeatureNotEnabled`**: the requested backend was not compiled in.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the bench error type.
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Primary error type for bench communication and sweep runs.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected to instrument at {0}")]
    NotConnected(String),

    #[error("Timed out after {}ms waiting for {operation}", after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Failed to set {setting}. Requested: {requested}, Actual: {actual}")]
    Verification {
        setting: String,
        requested: String,
        actual: String,
    },

    #[error("Failed to parse '{response}' as {expected}")]
    Format {
        response: String,
        expected: &'static str,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config load error: {0}")]
    Config(Box<figment::Error>),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(&'static str),
}

impl BenchError {
    /// True for failures of the session itself rather than of one command.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            BenchError::Connection(_)
                | BenchError::NotConnected(_)
                | BenchError::Timeout { .. }
                | BenchError::Io(_)
        )
    }

    pub(crate) fn format(response: &str, expected: &'static str) -> Self {
        BenchError::Format {
            response: response.to_string(),
            expected,
        }
    }
}

impl From<figment::Error> for BenchError {
    fn from(value: figment::Error) -> Self {
        BenchError::Config(Box::new(value))
    }
}
