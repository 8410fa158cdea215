//! Breaker registry
//!
//! Explicit map of source id → breaker, built at startup and injected into the
//! resolver, aggregator and orchestrator. Tests build a fresh registry each so
//! breaker state never leaks between them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitSnapshot};
use crate::types::SourceId;

/// Registry of per-source circuit breakers
#[derive(Debug)]
pub struct BreakerRegistry {
    default_config: BreakerConfig,
    breakers: RwLock<HashMap<SourceId, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            default_config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a source with its own breaker configuration
    ///
    /// Re-registering an id keeps the existing breaker and its state.
    pub fn register(&self, source: SourceId, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            breakers
                .entry(source.clone())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(source, config))),
        )
    }

    /// Breaker for `source`, registering one with the default config if missing
    pub fn breaker(&self, source: &SourceId) -> Arc<CircuitBreaker> {
        {
            let breakers = self
                .breakers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(b) = breakers.get(source) {
                return Arc::clone(b);
            }
        }
        self.register(source.clone(), self.default_config.clone())
    }

    /// Snapshots of every registered breaker, sorted by source id
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut snapshots: Vec<CircuitSnapshot> = breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.source.cmp(&b.source));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
