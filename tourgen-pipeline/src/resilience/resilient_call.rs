//! Resilient call wrapper
//!
//! Runs one adapter operation through its circuit breaker, bounded by the
//! operation's own timeout, retrying retryable failures with backoff while the
//! timeout budget allows.
//!
//! **Algorithm:**
//! 1. Acquire a breaker permit (fail fast with `CircuitOpen` otherwise)
//! 2. Run the operation with the remaining budget as its timeout
//! 3. Settle the permit with the outcome
//! 4. On a retryable error with retries left and budget remaining after the
//!    backoff delay: sleep, go to 1. Otherwise return the outcome.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::backoff::RetryPolicy;
use super::circuit_breaker::CircuitBreaker;
use crate::types::SourceError;

/// Call `operation` through `breaker` within `timeout`, retrying per `policy`
///
/// `operation` receives the time left in the budget so adapters can pass it on
/// to their HTTP client.
pub async fn call_resilient<T, F, Fut>(
    breaker: &CircuitBreaker,
    timeout: Duration,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut attempt: u32 = 0;

    loop {
        let permit = breaker.try_acquire()?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            permit.release();
            return Err(SourceError::Timeout(timeout));
        }

        let outcome = match tokio::time::timeout(remaining, operation(remaining)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(timeout)),
        };
        permit.record(&outcome);

        let err = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        source = %breaker.source(),
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Source call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= policy.max_retries {
            tracing::debug!(
                source = %breaker.source(),
                attempt,
                error = %err,
                "Source call failed"
            );
            return Err(err);
        }

        let delay = policy.next_delay_random(attempt);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if delay >= remaining {
            tracing::debug!(
                source = %breaker.source(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                remaining_ms = remaining.as_millis() as u64,
                "No budget left for retry"
            );
            return Err(err);
        }

        tracing::warn!(
            source = %breaker.source(),
            attempt,
            error = %err,
            backoff_ms = delay.as_millis() as u64,
            "Source call failed, will retry after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
