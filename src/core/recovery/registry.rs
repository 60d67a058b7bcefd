//! Circuit breaker registry
//!
//! One breaker per (provider, service) pair, shared by every caller
//! targeting that pair. The registry is an explicitly constructed component
//! passed by handle; tests build fresh ones.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics};
use dashmap::DashMap;
use std::sync::Arc;

/// Process-lifetime registry of circuit breakers
pub struct CircuitBreakerRegistry {
    breakers: DashMap<(String, String), Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry; every breaker it creates shares `config`
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get or create the breaker for a (provider, service) pair
    pub fn get(&self, provider: &str, service: &str) -> Arc<CircuitBreaker> {
        let key = (provider.to_string(), service.to_string());
        self.breakers
            .entry(key)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(provider, service, self.config.clone()))
            })
            .clone()
    }

    /// Metrics for every registered breaker
    pub fn all_metrics(&self) -> Vec<((String, String), CircuitBreakerMetrics)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect()
    }

    /// Reset every breaker to closed
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breakers have been created yet
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
