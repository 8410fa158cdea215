//! Per-source circuit breaker
//!
//! CLOSED → OPEN after `failure_threshold` consecutive failures inside the
//! monitoring window. OPEN → HALF_OPEN once `cool_down` has elapsed (checked
//! lazily on the next acquire). HALF_OPEN admits one trial call at a time;
//! `success_threshold` consecutive trial successes close the circuit, any trial
//! failure re-opens it.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an await,
//! so every outcome is applied atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::types::{SourceError, SourceId};

/// Breaker thresholds and timings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Failures further apart than this do not form a streak
    #[serde(with = "duration_secs")]
    pub monitoring_window: Duration,
    /// Time spent OPEN before a trial call is allowed
    #[serde(with = "duration_secs")]
    pub cool_down: Duration,
    /// Consecutive HALF_OPEN successes needed to close
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 4,
            monitoring_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(45),
            success_threshold: 2,
        }
    }
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only view of a breaker for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub source: SourceId,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker for one source adapter
#[derive(Debug)]
pub struct CircuitBreaker {
    source: SourceId,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(source: SourceId, config: BreakerConfig) -> Self {
        Self {
            source,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                last_failure_wall: None,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Current state, applying a due OPEN → HALF_OPEN transition
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        CircuitSnapshot {
            source: self.source.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_at: inner.last_failure_wall,
        }
    }

    /// Ask permission to call the underlying adapter
    ///
    /// # Errors
    /// `SourceError::CircuitOpen` while OPEN, or while HALF_OPEN with a trial
    /// call already in flight.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, SourceError> {
        let mut inner = self.lock();
        self.refresh(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                debug!(source = %self.source, "Circuit half-open: admitting trial call");
                Ok(CallPermit::new(self, true))
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                Err(SourceError::CircuitOpen(self.source.clone()))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // A poisoned breaker still holds consistent counters; keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.cool_down {
                    info!(source = %self.source, "Circuit cool-down elapsed: OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.trial_in_flight = false;
                }
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold.max(1) {
                    info!(
                        source = %self.source,
                        successes = inner.success_count,
                        "Circuit recovered: HALF_OPEN -> CLOSED"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            // A call admitted before the circuit opened finished late
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        if trial {
            inner.trial_in_flight = false;
        }

        let streak_expired = inner
            .last_failure_at
            .map(|last| now.duration_since(last) > self.config.monitoring_window)
            .unwrap_or(false);
        if streak_expired {
            inner.failure_count = 0;
        }

        inner.failure_count += 1;
        inner.last_failure_at = Some(now);
        inner.last_failure_wall = Some(Utc::now());

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold.max(1) => {
                warn!(
                    source = %self.source,
                    failures = inner.failure_count,
                    cool_down_secs = self.config.cool_down.as_secs(),
                    "Circuit opened: CLOSED -> OPEN"
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
            }
            CircuitState::HalfOpen => {
                warn!(source = %self.source, "Trial call failed: HALF_OPEN -> OPEN");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.success_count = 0;
            }
            _ => {}
        }
    }

    fn on_release(&self, trial: bool) {
        if trial {
            self.lock().trial_in_flight = false;
        }
    }
}

/// Permission for one call through a breaker
///
/// Settle it with `success`, `failure`, or `release` (outcome says nothing about
/// source health). Dropping an unsettled permit releases a HALF_OPEN trial slot
/// so an abandoned call cannot wedge the breaker.
#[must_use = "settle the permit with success(), failure() or release()"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.trial);
    }

    /// Settle according to a call outcome
    pub fn record<T>(self, outcome: &Result<T, SourceError>) {
        match outcome {
            Ok(_) => self.success(),
            Err(e) if e.counts_as_failure() => self.failure(),
            Err(_) => self.release(),
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_release(self.trial);
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
