//! SCPI text helpers shared by both instrument controllers.
//!
//! Numbers always go out through Rust's `Display` for `f64`, which never consults the host
//! locale, so the decimal separator is `.` everywhere. Responses are parsed leniently: a
//! leading header token (when the instrument has headers enabled) is skipped.

use crate::error::{BenchError, BenchResult};

/// Values at or above this magnitude are the instrument's "no valid measurement" marker.
pub const INVALID_MEASUREMENT_THRESHOLD: f64 = 1e36;

/// Format a numeric parameter for a command.
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Build `<header> <value>` with the invariant numeric convention.
pub fn command_with_value(header: &str, value: f64) -> String {
    format!("{} {}", header, format_number(value))
}

/// Parse a numeric response such as `1.000E+03` or `:TIM:SCAL 1.0E-3`.
pub fn parse_number(response: &str) -> BenchResult<f64> {
    let trimmed = response.trim();
    let value_text = trimmed.rsplit(' ').next().unwrap_or(trimmed);
    value_text
        .parse::<f64>()
        .map_err(|_| BenchError::format(trimmed, "number"))
}

/// Parse a boolean response (ON/OFF or 1/0).
pub fn parse_bool(response: &str) -> BenchResult<bool> {
    let trimmed = response.trim();
    let value_text = trimmed.rsplit(' ').next().unwrap_or(trimmed);
    match value_text.to_ascii_uppercase().as_str() {
        "ON" | "1" | "TRUE" => Ok(true),
        "OFF" | "0" | "FALSE" => Ok(false),
        _ => Err(BenchError::format(trimmed, "boolean")),
    }
}

pub(crate) fn on_off(state: bool) -> &'static str {
    if state {
        "ON"
    } else {
        "OFF"
    }
}

/// True when the magnitude marks an invalid or missing measurement.
pub fn is_invalid_measurement(value: f64) -> bool {
    !value.is_finite() || value.abs() >= INVALID_MEASUREMENT_THRESHOLD
}

/// Values within `tolerance_percent` of each other, relative to `requested`.
pub(crate) fn approx_eq(requested: f64, actual: f64, tolerance_percent: f64) -> bool {
    if requested == 0.0 {
        return actual.abs() <= f64::EPSILON;
    }
    (actual - requested).abs() <= requested.abs() * tolerance_percent / 100.0
}

pub(crate) fn reject_non_finite(name: &str, value: f64) -> BenchResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(BenchError::Argument(format!("{} must be finite, got {}", name, value)))
    }
}
