//! Error recovery manager
//!
//! An ordered chain of fallback strategies consulted after retries and the
//! circuit breaker have given up. Strategies are sorted by descending
//! priority once, at registration; a strategy that fails during recovery is
//! skipped and the next is tried.

use crate::core::error::AiError;
use crate::core::service::GenerationService;
use crate::core::types::{GenerationRequest, GenerationResponse};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Re-executes the original operation against a (service, request) pair
///
/// Strategies vary the service (fallback provider) or the request (model
/// downgrade, simplification); the operation itself is supplied by the
/// caller and is not retried through the retry engine.
pub type RecoveryOperation = Arc<
    dyn Fn(
            Arc<dyn GenerationService>,
            GenerationRequest,
        ) -> BoxFuture<'static, Result<GenerationResponse, AiError>>
        + Send
        + Sync,
>;

/// State threaded through the strategy chain
#[derive(Clone)]
pub struct RecoveryContext {
    /// The service the failed call targeted
    pub service: Arc<dyn GenerationService>,
    /// Provider of the failed call
    pub provider: String,
    /// Service type of the failed call
    pub service_kind: String,
    /// Attempt count the retry engine reached before recovery
    pub attempt: u32,
    /// Alternate services, in preference order
    pub fallback_services: Vec<Arc<dyn GenerationService>>,
    /// The original request
    pub request: GenerationRequest,
    /// Free-form metadata passed between strategies
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RecoveryContext {
    /// Build a context for a failed call
    pub fn new(service: Arc<dyn GenerationService>, request: GenerationRequest) -> Self {
        let provider = service.provider().to_string();
        let service_kind = service.service_kind().to_string();
        Self {
            service,
            provider,
            service_kind,
            attempt: 1,
            fallback_services: Vec::new(),
            request,
            metadata: HashMap::new(),
        }
    }

    /// Record the attempt count the retry engine reached
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Supply alternate services in preference order
    pub fn with_fallback_services(mut self, services: Vec<Arc<dyn GenerationService>>) -> Self {
        self.fallback_services = services;
        self
    }
}

/// Outcome of running the recovery chain
#[derive(Debug)]
pub enum RecoveryResult {
    /// A strategy produced a usable response
    Recovered {
        /// The recovered response
        response: GenerationResponse,
        /// Name of the strategy that produced it
        strategy: &'static str,
    },
    /// Every eligible strategy failed; carries the original error
    Failed {
        /// The error recovery was attempted for
        error: AiError,
    },
}

/// One fallback behavior in the chain
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    /// Strategy name, used to tag recovered responses
    fn name(&self) -> &'static str;

    /// Chain position; higher runs first
    fn priority(&self) -> u8;

    /// Whether this strategy applies to the given error
    fn can_recover(&self, error: &AiError) -> bool;

    /// Attempt recovery; an `Err` means "try the next strategy"
    async fn recover(
        &self,
        error: &AiError,
        operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> Result<GenerationResponse, AiError>;
}

/// Ordered strategy chain
pub struct RecoveryManager {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl RecoveryManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Register a strategy, keeping the chain sorted by descending priority
    ///
    /// Sorting happens here, not at recover time; the sort is stable so
    /// equal priorities keep registration order.
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.push(strategy);
        self.strategies
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Registered strategy names in chain order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the chain for `error`
    ///
    /// Returns the first successful strategy's response, or `Failed` with
    /// the original error when every eligible strategy fails.
    pub async fn recover(
        &self,
        error: &AiError,
        operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> RecoveryResult {
        for strategy in &self.strategies {
            if !strategy.can_recover(error) {
                continue;
            }
            debug!(
                strategy = strategy.name(),
                kind = %error.kind,
                "attempting recovery"
            );
            match strategy.recover(error, operation, ctx).await {
                Ok(mut response) => {
                    info!(
                        strategy = strategy.name(),
                        provider = %ctx.provider,
                        "recovered from {} error",
                        error.kind
                    );
                    response.metadata.recovered_by = Some(strategy.name().to_string());
                    return RecoveryResult::Recovered {
                        response,
                        strategy: strategy.name(),
                    };
                }
                Err(strategy_error) => {
                    warn!(
                        strategy = strategy.name(),
                        "recovery strategy failed: {strategy_error}"
                    );
                }
            }
        }
        RecoveryResult::Failed {
            error: error.clone(),
        }
    }
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}
