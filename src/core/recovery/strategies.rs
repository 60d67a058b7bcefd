//! Built-in recovery strategies
//!
//! Priority order (highest first): fallback provider, model fallback,
//! request simplification, cache recovery, degraded mode. Degraded mode is
//! always eligible, so a chain containing it never fails outright.

use super::manager::{RecoveryContext, RecoveryManager, RecoveryOperation, RecoveryStrategy};
use crate::core::error::{AiError, ErrorKind};
use crate::core::types::{FinishReason, GenerationRequest, GenerationResponse, MessageRole};
use async_trait::async_trait;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cached responses keyed by request fingerprint
pub struct ResponseCache {
    cache: Cache<String, GenerationResponse>,
}

impl ResponseCache {
    /// Create a cache holding up to `capacity` responses for `ttl`
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Stable fingerprint of a request: model plus message roles/contents
    pub fn fingerprint(request: &GenerationRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.model.as_bytes());
        for message in &request.messages {
            hasher.update([0u8]);
            hasher.update(format!("{:?}", message.role).as_bytes());
            hasher.update([0u8]);
            hasher.update(message.content.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Store a completed response for later recovery
    pub async fn record(&self, request: &GenerationRequest, response: &GenerationResponse) {
        self.cache
            .insert(Self::fingerprint(request), response.clone())
            .await;
    }

    /// Look up a previously cached equivalent response
    pub async fn lookup(&self, request: &GenerationRequest) -> Option<GenerationResponse> {
        self.cache.get(&Self::fingerprint(request)).await
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(1_000, Duration::from_secs(600))
    }
}

/// Re-execute against alternate configured services
pub struct ProviderFallbackStrategy;

#[async_trait]
impl RecoveryStrategy for ProviderFallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback_provider"
    }

    fn priority(&self) -> u8 {
        100
    }

    fn can_recover(&self, error: &AiError) -> bool {
        matches!(
            error.kind,
            ErrorKind::ServiceUnavailable
                | ErrorKind::RateLimit
                | ErrorKind::QuotaExceeded
                | ErrorKind::Provider
        )
    }

    async fn recover(
        &self,
        error: &AiError,
        operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> Result<GenerationResponse, AiError> {
        if ctx.fallback_services.is_empty() {
            return Err(AiError::new(
                ErrorKind::Unknown,
                "no fallback services configured",
                ctx.provider.clone(),
                ctx.service_kind.clone(),
            ));
        }

        let mut last_error = error.clone();
        for service in &ctx.fallback_services {
            debug!(
                from = %ctx.provider,
                to = service.provider(),
                "re-executing against fallback provider"
            );
            match operation(service.clone(), ctx.request.clone()).await {
                Ok(mut response) => {
                    response.metadata.used_fallback = true;
                    return Ok(response);
                }
                Err(err) => {
                    warn!(provider = service.provider(), "fallback provider failed: {err}");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

/// Retry the same provider with a cheaper or alternate model
pub struct ModelFallbackStrategy {
    fallbacks: HashMap<String, Vec<String>>,
}

impl ModelFallbackStrategy {
    /// Create with an explicit per-provider downgrade table
    pub fn new(fallbacks: HashMap<String, Vec<String>>) -> Self {
        Self { fallbacks }
    }

    /// Built-in downgrade table for the bundled providers
    pub fn with_default_table() -> Self {
        let mut fallbacks = HashMap::new();
        fallbacks.insert(
            "openai".to_string(),
            vec!["gpt-4o-mini".to_string(), "gpt-3.5-turbo".to_string()],
        );
        fallbacks.insert(
            "anthropic".to_string(),
            vec![
                "claude-3-5-haiku-latest".to_string(),
                "claude-3-haiku-20240307".to_string(),
            ],
        );
        Self { fallbacks }
    }
}

#[async_trait]
impl RecoveryStrategy for ModelFallbackStrategy {
    fn name(&self) -> &'static str {
        "model_fallback"
    }

    fn priority(&self) -> u8 {
        80
    }

    fn can_recover(&self, error: &AiError) -> bool {
        matches!(
            error.kind,
            ErrorKind::ModelNotFound | ErrorKind::QuotaExceeded | ErrorKind::RateLimit
        )
    }

    async fn recover(
        &self,
        error: &AiError,
        operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> Result<GenerationResponse, AiError> {
        let candidates = self
            .fallbacks
            .get(&ctx.provider)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut last_error = error.clone();
        let mut tried_any = false;
        for model in candidates {
            if *model == ctx.request.model {
                continue;
            }
            tried_any = true;
            debug!(from = %ctx.request.model, to = %model, "retrying with fallback model");
            let request = ctx.request.clone().with_model(model.clone());
            match operation(ctx.service.clone(), request).await {
                Ok(mut response) => {
                    response.metadata.used_fallback = true;
                    response.metadata.model_used = model.clone();
                    return Ok(response);
                }
                Err(err) => {
                    warn!(model = %model, "fallback model failed: {err}");
                    last_error = err;
                }
            }
        }

        if !tried_any {
            return Err(AiError::new(
                ErrorKind::Unknown,
                format!("no fallback models configured for {}", ctx.provider),
                ctx.provider.clone(),
                ctx.service_kind.clone(),
            ));
        }
        Err(last_error)
    }
}

/// Shrink the request and retry once
pub struct RequestSimplificationStrategy {
    keep_recent: usize,
}

impl RequestSimplificationStrategy {
    /// Keep leading system messages plus the `keep_recent` newest messages
    pub fn new(keep_recent: usize) -> Self {
        Self {
            keep_recent: keep_recent.max(1),
        }
    }

    fn simplify(&self, request: &GenerationRequest) -> GenerationRequest {
        let mut simplified = request.clone();

        let system: Vec<_> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .cloned()
            .collect();
        let recent: Vec<_> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .rev()
            .take(self.keep_recent)
            .cloned()
            .collect();

        simplified.messages = system;
        simplified.messages.extend(recent.into_iter().rev());
        if let Some(max_tokens) = simplified.max_tokens {
            simplified.max_tokens = Some((max_tokens / 2).max(16));
        }
        simplified
    }
}

impl Default for RequestSimplificationStrategy {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl RecoveryStrategy for RequestSimplificationStrategy {
    fn name(&self) -> &'static str {
        "request_simplification"
    }

    fn priority(&self) -> u8 {
        60
    }

    fn can_recover(&self, error: &AiError) -> bool {
        matches!(
            error.kind,
            ErrorKind::InvalidRequest | ErrorKind::QuotaExceeded | ErrorKind::Validation
        )
    }

    async fn recover(
        &self,
        _error: &AiError,
        operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> Result<GenerationResponse, AiError> {
        let simplified = self.simplify(&ctx.request);
        if simplified.messages.len() >= ctx.request.messages.len()
            && simplified.max_tokens == ctx.request.max_tokens
        {
            return Err(AiError::new(
                ErrorKind::Unknown,
                "request cannot be simplified further",
                ctx.provider.clone(),
                ctx.service_kind.clone(),
            ));
        }
        debug!(
            original = ctx.request.messages.len(),
            simplified = simplified.messages.len(),
            "retrying with simplified request"
        );
        operation(ctx.service.clone(), simplified).await
    }
}

/// Return a previously cached equivalent response
pub struct CacheRecoveryStrategy {
    cache: Arc<ResponseCache>,
}

impl CacheRecoveryStrategy {
    /// Create over a shared response cache
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RecoveryStrategy for CacheRecoveryStrategy {
    fn name(&self) -> &'static str {
        "cache_recovery"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn can_recover(&self, error: &AiError) -> bool {
        !matches!(
            error.kind,
            ErrorKind::Authentication | ErrorKind::Authorization
        )
    }

    async fn recover(
        &self,
        _error: &AiError,
        _operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> Result<GenerationResponse, AiError> {
        match self.cache.lookup(&ctx.request).await {
            Some(mut response) => {
                debug!("serving cached response");
                response
                    .extra
                    .insert("served_from_cache".to_string(), serde_json::json!(true));
                Ok(response)
            }
            None => Err(AiError::new(
                ErrorKind::Unknown,
                "no cached response for request",
                ctx.provider.clone(),
                ctx.service_kind.clone(),
            )),
        }
    }
}

/// Synthesize a minimal degraded response instead of failing
///
/// Always eligible; trades correctness for availability as the last rung of
/// the chain.
pub struct DegradedModeStrategy {
    message: String,
}

impl DegradedModeStrategy {
    /// Create with the content returned while degraded
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for DegradedModeStrategy {
    fn default() -> Self {
        Self::new(
            "The assistant is temporarily unavailable. Please try again in a moment.",
        )
    }
}

#[async_trait]
impl RecoveryStrategy for DegradedModeStrategy {
    fn name(&self) -> &'static str {
        "degraded_mode"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn can_recover(&self, _error: &AiError) -> bool {
        true
    }

    async fn recover(
        &self,
        error: &AiError,
        _operation: &RecoveryOperation,
        ctx: &RecoveryContext,
    ) -> Result<GenerationResponse, AiError> {
        let mut response =
            GenerationResponse::new(ctx.request.model.clone(), self.message.clone());
        response.finish_reason = FinishReason::Stop;
        response
            .extra
            .insert("degraded".to_string(), serde_json::json!(true));
        response.extra.insert(
            "original_error".to_string(),
            serde_json::json!(error.kind.to_string()),
        );
        Ok(response)
    }
}

/// The standard chain, highest priority first
pub fn standard_chain(
    cache: Arc<ResponseCache>,
    fallback_models: Option<HashMap<String, Vec<String>>>,
    degraded_message: Option<String>,
) -> RecoveryManager {
    let mut manager = RecoveryManager::new();
    manager.register(Arc::new(ProviderFallbackStrategy));
    manager.register(Arc::new(match fallback_models {
        Some(table) => ModelFallbackStrategy::new(table),
        None => ModelFallbackStrategy::with_default_table(),
    }));
    manager.register(Arc::new(RequestSimplificationStrategy::default()));
    manager.register(Arc::new(CacheRecoveryStrategy::new(cache)));
    manager.register(Arc::new(match degraded_message {
        Some(message) => DegradedModeStrategy::new(message),
        None => DegradedModeStrategy::default(),
    }));
    manager
}
