//! Retry backoff policy
//!
//! Exponential backoff with down-jitter as a pure function of the attempt number,
//! so the schedule is testable without sleeping.

use serde::Deserialize;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial call)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Down-jitter factor (0.25 = up to 25% reduction)
    pub jitter_factor: f64,
}

impl RetryPolicy {
    /// Policy that never retries (tiered resolver strategies)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0 = before the first retry)
    ///
    /// `jitter_sample` is a uniform sample in [0, 1); it is clamped so callers
    /// cannot push the delay outside `[capped * (1 - jitter_factor), capped]`.
    pub fn next_delay(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exponent = attempt.min(30) as i32;
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        let sample = if jitter_sample.is_finite() {
            jitter_sample.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let multiplier = 1.0 - sample * jitter_factor;

        Duration::from_secs_f64(capped * multiplier)
    }

    /// `next_delay` with a fresh random jitter sample
    pub fn next_delay_random(&self, attempt: u32) -> Duration {
        self.next_delay(attempt, rand::random::<f64>())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.25,
        }
    }
}

/// TOML form of `RetryPolicy`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter_factor: policy.jitter_factor,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_factor: settings.jitter_factor,
        }
    }
}
