//! Bounded exponential backoff for transient failures.

use std::thread;
use std::time::Duration;

use crate::error::StoreError;

/// Retry policy applied at the adapter layer.
///
/// Only [`StoreError::Transient`] failures are retried; everything else
/// returns immediately. The delay grows geometrically after each failed
/// attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub tries: u32,
    /// Sleep before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each failure.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { tries: 3, base_delay: Duration::from_millis(100), factor: 4 }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self { tries: 1, base_delay: Duration::ZERO, factor: 1 }
    }

    /// Run `op`, retrying transient errors with exponential backoff.
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tries = self.tries.max(1);
        let mut delay = self.base_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Err(e) if e.is_transient() && attempt < tries => {
                    tracing::debug!(attempt, error = %e, "retrying transient failure");
                    thread::sleep(delay);
                    delay *= self.factor;
                }
                other => return other,
            }
        }
    }
}
