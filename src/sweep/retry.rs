//! Retrying measurements that come back as the instrument's invalid marker.

use crate::error::BenchResult;
use crate::scpi;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Reported value when every attempt produced an invalid reading.
pub const COULD_NOT_MEASURE: f64 = -1.0;

/// How often to re-read an invalid measurement and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Result of [`measure_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryOutcome {
    /// The valid reading, or [`COULD_NOT_MEASURE`].
    pub value: f64,
    /// Attempts made after the first.
    pub retries: u32,
    pub measured: bool,
}

/// Run `measure` against `target` until it returns a valid reading or the policy is exhausted.
///
/// Errors from `measure` end the loop immediately; only invalid readings are retried.
pub async fn measure_with_retry<T, F>(
    target: &mut T,
    policy: &RetryPolicy,
    mut measure: F,
) -> BenchResult<RetryOutcome>
where
    T: ?Sized + Send,
    F: for<'a> FnMut(&'a mut T) -> BoxFuture<'a, BenchResult<f64>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        let value = measure(&mut *target).await?;
        if !scpi::is_invalid_measurement(value) {
            return Ok(RetryOutcome {
                value,
                retries: attempt - 1,
                measured: true,
            });
        }
        debug!(attempt, attempts, "Invalid reading {}, retrying", value);
        if attempt < attempts {
            tokio::time::sleep(policy.delay()).await;
        }
    }
    Ok(RetryOutcome {
        value: COULD_NOT_MEASURE,
        retries: attempts - 1,
        measured: false,
    })
}
