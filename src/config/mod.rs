//! Relay configuration types
//!
//! Serde-deserializable settings with per-field defaults. How these get
//! loaded (files, env) is the embedding application's concern; this module
//! only defines the shapes and their conversion into runtime components.

use crate::core::error::ErrorKind;
use crate::core::recovery::{CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_retryable_kinds() -> Vec<ErrorKind> {
    vec![
        ErrorKind::RateLimit,
        ErrorKind::ServiceUnavailable,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::Streaming,
    ]
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Exponential growth factor
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Randomize delays
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Kinds eligible for retry
    #[serde(default = "default_retryable_kinds")]
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            retryable_kinds: default_retryable_kinds(),
        }
    }
}

impl RetrySettings {
    /// Build the runtime policy
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
            self.jitter,
        )
        .with_retryable_kinds(self.retryable_kinds.iter().copied().collect())
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_min_requests() -> u32 {
    10
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

fn default_half_open_max_attempts() -> u32 {
    3
}

fn default_failure_kinds() -> Vec<ErrorKind> {
    vec![
        ErrorKind::RateLimit,
        ErrorKind::ServiceUnavailable,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::Streaming,
        ErrorKind::Provider,
    ]
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Counting failures before the circuit may open
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Requests observed before failure rate is evaluated
    #[serde(default = "default_min_requests")]
    pub min_requests: u32,
    /// Time the circuit stays open before probing (milliseconds)
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Successful probes required to close
    #[serde(default = "default_half_open_max_attempts")]
    pub half_open_max_attempts: u32,
    /// Kinds that count as failures
    #[serde(default = "default_failure_kinds")]
    pub failure_kinds: Vec<ErrorKind>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            min_requests: default_min_requests(),
            reset_timeout_ms: default_reset_timeout_ms(),
            half_open_max_attempts: default_half_open_max_attempts(),
            failure_kinds: default_failure_kinds(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Build the runtime breaker config
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            min_requests: self.min_requests,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            half_open_max_attempts: self.half_open_max_attempts,
            failure_kinds: self.failure_kinds.iter().copied().collect(),
        }
    }
}

fn default_cache_capacity() -> u64 {
    1_000
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_degraded_message() -> String {
    "The assistant is temporarily unavailable. Please try again in a moment.".to_string()
}

/// Recovery chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    /// Per-provider model downgrade table; empty uses the built-in table
    #[serde(default)]
    pub fallback_models: HashMap<String, Vec<String>>,
    /// Response cache capacity
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Response cache TTL (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Content of the degraded-mode response
    #[serde(default = "default_degraded_message")]
    pub degraded_message: String,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            fallback_models: HashMap::new(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            degraded_message: default_degraded_message(),
        }
    }
}

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Default retry settings
    #[serde(default)]
    pub retry: RetrySettings,
    /// Per-provider retry overrides
    #[serde(default)]
    pub provider_retry: HashMap<String, RetrySettings>,
    /// Circuit breaker settings, shared by every (provider, service) pair
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Recovery chain settings
    #[serde(default)]
    pub recovery: RecoverySettings,
}
