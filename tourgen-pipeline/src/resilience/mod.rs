//! Resilience layer: circuit breakers, retry backoff, and the resilient call wrapper
//!
//! Breaker state is the only mutable state shared across concurrent pipeline runs.

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod resilient_call;

pub use backoff::{RetryPolicy, RetrySettings};
pub use circuit_breaker::{BreakerConfig, CallPermit, CircuitBreaker, CircuitSnapshot, CircuitState};
pub use registry::BreakerRegistry;
pub use resilient_call::call_resilient;
