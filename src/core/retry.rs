// src/core/retry.rs — Bounded retry with exponential backoff for loop stages
//
// Used by the controller for generation attempts and executor timeouts.
// Retries never count against max_iterations.

use std::time::Duration;

use crate::infra::config::RefinementConfig;

const BACKOFF_FACTOR: f64 = 2.0;
const JITTER_FRACTION: f64 = 0.2;
const MIN_DELAY_MS: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RefinementConfig::default())
    }
}

impl From<&RefinementConfig> for RetryPolicy {
    fn from(cfg: &RefinementConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.retry_initial_delay_ms),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. For tests and offline runs.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
            jitter_fraction: 0.0,
        }
    }

    /// Delay before retry `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        let base_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        let jitter = deterministic_jitter(attempt, self.jitter_fraction);
        let final_ms = (capped_ms * jitter).max(MIN_DELAY_MS);
        Duration::from_millis(final_ms as u64)
    }
}

/// Multiplier in [1 - fraction, 1 + fraction], fixed per attempt so runs
/// are reproducible.
pub fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}
