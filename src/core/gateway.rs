//! Relay gateway
//!
//! The calling layer's surface. Composes the reliability stack around a
//! provider service as explicit wrappers: circuit breaker gate, retry
//! engine inside it, error normalization on every failure, recovery chain
//! when retries and the breaker have given up.

use crate::config::RelayConfig;
use crate::core::error::{AiError, ErrorMapper};
use crate::core::recovery::{
    CircuitBreakerRegistry, RecoveryContext, RecoveryManager, RecoveryOperation, RecoveryResult,
    ResponseCache, RetryExecutor, RetryPolicy, standard_chain,
};
use crate::core::service::{ConversationSink, GenerationService};
use crate::core::streaming::{StreamContext, StreamHandle, StreamRelay, StreamSummary};
use crate::core::types::{GenerationRequest, GenerationResponse, MessageRole};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Composition facade over the reliability stack
///
/// One instance per process; every component is explicitly constructed and
/// reachable for tests and operational overrides.
pub struct RelayGateway {
    mapper: Arc<ErrorMapper>,
    breakers: Arc<CircuitBreakerRegistry>,
    recovery: Arc<RecoveryManager>,
    cache: Arc<ResponseCache>,
    default_policy: RetryPolicy,
    provider_policies: HashMap<String, RetryPolicy>,
    sink: Option<Arc<dyn ConversationSink>>,
}

impl RelayGateway {
    /// Build a gateway from configuration
    pub fn new(config: RelayConfig) -> Self {
        let cache = Arc::new(ResponseCache::new(
            config.recovery.cache_capacity,
            std::time::Duration::from_secs(config.recovery.cache_ttl_secs),
        ));
        let fallback_models = if config.recovery.fallback_models.is_empty() {
            None
        } else {
            Some(config.recovery.fallback_models.clone())
        };
        let recovery = Arc::new(standard_chain(
            cache.clone(),
            fallback_models,
            Some(config.recovery.degraded_message.clone()),
        ));

        Self {
            mapper: Arc::new(ErrorMapper::with_default_rules()),
            breakers: Arc::new(CircuitBreakerRegistry::new(
                config.circuit_breaker.to_config(),
            )),
            recovery,
            cache,
            default_policy: config.retry.to_policy(),
            provider_policies: config
                .provider_retry
                .iter()
                .map(|(provider, settings)| (provider.clone(), settings.to_policy()))
                .collect(),
            sink: None,
        }
    }

    /// Replace the error mapper (custom provider rule tables)
    pub fn with_mapper(mut self, mapper: Arc<ErrorMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Replace the recovery chain
    pub fn with_recovery(mut self, recovery: Arc<RecoveryManager>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Attach the conversation persistence hook
    pub fn with_sink(mut self, sink: Arc<dyn ConversationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Circuit breaker registry handle, for metrics and overrides
    pub fn breakers(&self) -> Arc<CircuitBreakerRegistry> {
        self.breakers.clone()
    }

    /// Response cache handle
    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    fn policy_for(&self, provider: &str) -> RetryPolicy {
        self.provider_policies
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Non-streaming generation with the full reliability stack
    ///
    /// `fallbacks` are alternate services the recovery chain may re-execute
    /// against, in preference order.
    pub async fn generate(
        &self,
        service: Arc<dyn GenerationService>,
        fallbacks: Vec<Arc<dyn GenerationService>>,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, AiError> {
        let provider = service.provider().to_string();
        let service_kind = service.service_kind().to_string();
        let breaker = self.breakers.get(&provider, &service_kind);
        let executor = RetryExecutor::new(self.policy_for(&provider), self.mapper.clone());

        let started = Instant::now();
        let attempts = Arc::new(AtomicU32::new(0));

        let attempt_counter = attempts.clone();
        let call_service = service.clone();
        let call_request = request.clone();
        let call_provider = provider.clone();
        let call_kind = service_kind.clone();
        let result = breaker
            .execute(|| async {
                executor
                    .execute(&call_provider, &call_kind, |attempt| {
                        attempt_counter.store(attempt, Ordering::SeqCst);
                        let service = call_service.clone();
                        let request = call_request.clone();
                        async move { service.generate(&request).await }
                    })
                    .await
            })
            .await;

        match result {
            Ok(mut response) => {
                response.metadata.attempts = attempts.load(Ordering::SeqCst).max(1);
                response.metadata.latency_ms = started.elapsed().as_millis() as u64;
                self.cache.record(&request, &response).await;
                self.persist_turn(&request, &response).await?;
                Ok(response)
            }
            Err(error) => {
                info!(
                    provider = %provider,
                    kind = %error.kind,
                    "generation failed after retries, entering recovery"
                );
                let ctx = RecoveryContext::new(service, request.clone())
                    .with_attempt(attempts.load(Ordering::SeqCst).max(1))
                    .with_fallback_services(fallbacks);
                match self.recovery.recover(&error, &self.recovery_operation(), &ctx).await {
                    RecoveryResult::Recovered { mut response, strategy } => {
                        debug!(strategy, "request recovered");
                        response.metadata.attempts = attempts.load(Ordering::SeqCst).max(1);
                        response.metadata.latency_ms = started.elapsed().as_millis() as u64;
                        self.persist_turn(&request, &response).await?;
                        Ok(response)
                    }
                    RecoveryResult::Failed { error } => Err(error),
                }
            }
        }
    }

    /// Streaming generation
    ///
    /// The breaker and retry engine wrap the stream-open step; the relay
    /// then emits partial progress before final success or failure is
    /// known. Open failures surface as errors rather than entering the
    /// recovery chain (a recovered non-streaming response cannot be
    /// retrofitted onto a live stream; callers wanting degradation fall
    /// back to [`Self::generate`]). After draining the handle, pass the
    /// summary to [`Self::complete_stream_turn`] to persist the turn.
    pub async fn generate_stream(
        &self,
        service: Arc<dyn GenerationService>,
        request: GenerationRequest,
    ) -> Result<StreamHandle, AiError> {
        let provider = service.provider().to_string();
        let service_kind = service.service_kind().to_string();
        let breaker = self.breakers.get(&provider, &service_kind);
        let executor = RetryExecutor::new(self.policy_for(&provider), self.mapper.clone());

        let call_service = service.clone();
        let call_request = request.clone();
        let call_provider = provider.clone();
        let call_kind = service_kind.clone();
        let upstream = breaker
            .execute(|| async {
                executor
                    .execute(&call_provider, &call_kind, |_| {
                        let service = call_service.clone();
                        let request = call_request.clone();
                        async move { service.generate_stream(&request).await }
                    })
                    .await
            })
            .await?;

        Ok(StreamRelay::spawn(
            upstream,
            StreamContext {
                provider,
                service: service_kind,
                model: request.model,
            },
            self.mapper.clone(),
        ))
    }

    /// Finalize a drained stream: cache the result and persist the turn
    pub async fn complete_stream_turn(
        &self,
        request: &GenerationRequest,
        summary: StreamSummary,
    ) -> Result<GenerationResponse, AiError> {
        let response = summary.into_response();
        self.cache.record(request, &response).await;
        self.persist_turn(request, &response).await?;
        Ok(response)
    }

    /// Persist the assistant turn exactly once, when a sink and
    /// conversation are present
    async fn persist_turn(
        &self,
        request: &GenerationRequest,
        response: &GenerationResponse,
    ) -> Result<(), AiError> {
        let (Some(sink), Some(conversation_id)) = (&self.sink, &request.conversation_id) else {
            return Ok(());
        };
        let mut metadata = HashMap::new();
        metadata.insert("model".to_string(), serde_json::json!(response.model));
        metadata.insert(
            "attempts".to_string(),
            serde_json::json!(response.metadata.attempts),
        );
        if let Some(strategy) = &response.metadata.recovered_by {
            metadata.insert("recovered_by".to_string(), serde_json::json!(strategy));
        }
        sink.append_message(
            conversation_id,
            MessageRole::Assistant,
            &response.content,
            &metadata,
        )
        .await?;
        sink.touch_conversation(conversation_id).await?;
        Ok(())
    }

    /// The operation the recovery chain re-executes: one mapped attempt,
    /// not routed back through the retry engine
    fn recovery_operation(&self) -> RecoveryOperation {
        let mapper = self.mapper.clone();
        Arc::new(move |service, request| {
            let mapper = mapper.clone();
            Box::pin(async move {
                service.generate(&request).await.map_err(|raw| {
                    mapper.map_error(
                        raw,
                        service.provider(),
                        service.service_kind(),
                        Some(&request.model),
                    )
                })
            })
        })
    }
}

impl Default for RelayGateway {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use crate::core::error::{ErrorKind, RawError};
    use crate::core::service::ByteStream;
    use crate::core::streaming::StreamEvent;
    use crate::core::types::Message;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use parking_lot::Mutex;

    /// Scripted service: errors until `fail_count` exhausted
    struct CountdownService {
        provider: &'static str,
        remaining: Mutex<u32>,
        error: fn() -> RawError,
    }

    impl CountdownService {
        fn new(provider: &'static str, fail_count: u32, error: fn() -> RawError) -> Self {
            Self {
                provider,
                remaining: Mutex::new(fail_count),
                error,
            }
        }
    }

    #[async_trait]
    impl GenerationService for CountdownService {
        fn provider(&self) -> &str {
            self.provider
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResponse, RawError> {
            let mut remaining = self.remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err((self.error)());
            }
            Ok(GenerationResponse::new(request.model.clone(), "ok"))
        }

        async fn generate_stream(
            &self,
            _request: &GenerationRequest,
        ) -> Result<ByteStream, RawError> {
            let mut remaining = self.remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err((self.error)());
            }
            let body = "data: {\"id\":\"s1\",\"choices\":[{\"delta\":{\"content\":\"streamed\"},\"finish_reason\":null}]}\n\ndata: [DONE]\n\n";
            Ok(Box::pin(futures::stream::iter(vec![Ok(Bytes::from(body))])))
        }
    }

    fn rate_limited() -> RawError {
        RawError::response(
            429,
            std::collections::HashMap::new(),
            r#"{"error":{"message":"Rate limit"}}"#,
        )
    }

    fn auth_denied() -> RawError {
        RawError::response(
            401,
            std::collections::HashMap::new(),
            r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#,
        )
    }

    fn gateway() -> RelayGateway {
        let mut config = RelayConfig::default();
        config.retry = RetrySettings {
            max_attempts: 3,
            base_delay_ms: 1,
            jitter: false,
            ..RetrySettings::default()
        };
        RelayGateway::new(config)
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("gpt-4o", vec![Message::user("hello")])
    }

    #[tokio::test]
    async fn test_generate_success_records_attempts() {
        let gw = gateway();
        let service = Arc::new(CountdownService::new("openai", 1, rate_limited));
        let response = gw.generate(service, vec![], request()).await.unwrap();

        assert_eq!(response.content, "ok");
        assert_eq!(response.metadata.attempts, 2);
        assert!(!response.metadata.used_fallback);
    }

    #[tokio::test]
    async fn test_generate_auth_failure_degrades() {
        let gw = gateway();
        let service = Arc::new(CountdownService::new("openai", u32::MAX, auth_denied));
        let response = gw.generate(service, vec![], request()).await.unwrap();

        // Auth errors skip retry and every strategy except degraded mode
        assert_eq!(
            response.metadata.recovered_by.as_deref(),
            Some("degraded_mode")
        );
        assert_eq!(
            response.extra.get("degraded"),
            Some(&serde_json::json!(true))
        );
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_alternate_provider() {
        let gw = gateway();
        let primary = Arc::new(CountdownService::new("openai", u32::MAX, rate_limited));
        let fallback: Arc<dyn GenerationService> =
            Arc::new(CountdownService::new("anthropic", 0, rate_limited));

        let response = gw
            .generate(primary, vec![fallback], request())
            .await
            .unwrap();
        assert_eq!(response.content, "ok");
        assert!(response.metadata.used_fallback);
        assert_eq!(
            response.metadata.recovered_by.as_deref(),
            Some("fallback_provider")
        );
    }

    #[tokio::test]
    async fn test_generate_stream_end_to_end() {
        let gw = gateway();
        let service = Arc::new(CountdownService::new("openai", 0, rate_limited));
        let handle = gw.generate_stream(service, request()).await.unwrap();

        let events: Vec<StreamEvent> = handle.collect().await;
        let content: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk(c) => Some(c.delta_content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(content, "streamed");

        match events.last().unwrap() {
            StreamEvent::Completed(summary) => {
                let response = gw
                    .complete_stream_turn(&request(), summary.clone())
                    .await
                    .unwrap();
                assert_eq!(response.content, "streamed");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_stream_retries_open_failure() {
        let gw = gateway();
        let service = Arc::new(CountdownService::new("openai", 1, rate_limited));
        let handle = gw.generate_stream(service, request()).await.unwrap();
        let events: Vec<StreamEvent> = handle.collect().await;
        assert!(matches!(events.last().unwrap(), StreamEvent::Completed(_)));
    }

    #[tokio::test]
    async fn test_breaker_shared_across_calls() {
        let gw = gateway();
        let breaker = gw.breakers().get("openai", "chat");
        breaker.force_open();

        let service = Arc::new(CountdownService::new("openai", 0, rate_limited));
        // Breaker rejects before the service is invoked; recovery degrades
        let response = gw.generate(service, vec![], request()).await.unwrap();
        assert_eq!(
            response.metadata.recovered_by.as_deref(),
            Some("degraded_mode")
        );
    }

    #[tokio::test]
    async fn test_cached_response_survives_outage() {
        let gw = gateway();
        let healthy = Arc::new(CountdownService::new("openai", 0, rate_limited));
        let req = request();
        gw.generate(healthy, vec![], req.clone()).await.unwrap();

        // Same request against a hard-down provider with no fallbacks:
        // cache recovery beats degraded mode
        let down = Arc::new(CountdownService::new("openai", u32::MAX, rate_limited));
        let response = gw.generate(down, vec![], req).await.unwrap();
        assert_eq!(
            response.metadata.recovered_by.as_deref(),
            Some("cache_recovery")
        );
        assert_eq!(response.content, "ok");
    }

    #[tokio::test]
    async fn test_failed_error_propagates_kind() {
        // Recovery chain without degraded mode: failure propagates
        let mut config = RelayConfig::default();
        config.retry = RetrySettings {
            max_attempts: 2,
            base_delay_ms: 1,
            jitter: false,
            ..RetrySettings::default()
        };
        let gw = RelayGateway::new(config)
            .with_recovery(Arc::new(crate::core::recovery::RecoveryManager::new()));

        let service = Arc::new(CountdownService::new("openai", u32::MAX, rate_limited));
        let error = gw.generate(service, vec![], request()).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::RateLimit);
    }
}
