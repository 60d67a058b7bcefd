//! Recovery chains across providers over a live HTTP boundary

use crate::common::chat_request;
use llm_relay::core::provider::{HttpChatService, HttpServiceConfig};
use llm_relay::core::service::GenerationService;
use llm_relay::{RelayConfig, RelayGateway, RetrySettings};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reply_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-ok",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn gateway() -> RelayGateway {
    let mut config = RelayConfig::default();
    config.retry = RetrySettings {
        max_attempts: 2,
        base_delay_ms: 1,
        jitter: false,
        ..RetrySettings::default()
    };
    RelayGateway::new(config)
}

async fn mount_outage(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(server)
        .await;
}

async fn mount_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body(content)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_outage_recovers_via_fallback_provider() {
    let primary_server = MockServer::start().await;
    let fallback_server = MockServer::start().await;
    mount_outage(&primary_server).await;
    mount_reply(&fallback_server, "fallback says hi").await;

    let primary = Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(primary_server.uri())).unwrap(),
    );
    let fallback: Arc<dyn GenerationService> = Arc::new(
        HttpChatService::new("anthropic", HttpServiceConfig::new(fallback_server.uri()))
            .unwrap(),
    );

    let gw = gateway();
    let response = gw
        .generate(primary, vec![fallback], chat_request("gpt-4o"))
        .await
        .unwrap();

    assert_eq!(response.content, "fallback says hi");
    assert!(response.metadata.used_fallback);
    assert_eq!(
        response.metadata.recovered_by.as_deref(),
        Some("fallback_provider")
    );
}

#[tokio::test]
async fn test_outage_without_fallback_degrades() {
    let server = MockServer::start().await;
    mount_outage(&server).await;

    let service = Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(server.uri())).unwrap(),
    );

    let gw = gateway();
    let response = gw
        .generate(service, vec![], chat_request("gpt-4o"))
        .await
        .unwrap();

    // No fallback services, cache is cold, so the chain bottoms out in
    // degraded mode but still returns something usable
    assert_eq!(
        response.metadata.recovered_by.as_deref(),
        Some("degraded_mode")
    );
    assert!(!response.content.is_empty());
    assert_eq!(
        response.extra.get("degraded"),
        Some(&serde_json::json!(true))
    );
}

#[tokio::test]
async fn test_outage_serves_cached_response() {
    let server = MockServer::start().await;
    mount_reply(&server, "warm answer").await;

    let service = Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(server.uri())).unwrap(),
    );
    let gw = gateway();
    let request = chat_request("gpt-4o");

    // Warm the cache through a healthy call
    gw.generate(service, vec![], request.clone()).await.unwrap();

    // Same request against a dead endpoint is served from cache
    let dead_server = MockServer::start().await;
    mount_outage(&dead_server).await;
    let dead = Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(dead_server.uri())).unwrap(),
    );

    let response = gw.generate(dead, vec![], request).await.unwrap();
    assert_eq!(response.content, "warm answer");
    assert_eq!(
        response.metadata.recovered_by.as_deref(),
        Some("cache_recovery")
    );
}

#[tokio::test]
async fn test_breaker_opens_under_sustained_failure() {
    let server = MockServer::start().await;
    mount_outage(&server).await;

    let mut config = RelayConfig::default();
    config.retry = RetrySettings {
        max_attempts: 1,
        base_delay_ms: 1,
        jitter: false,
        ..RetrySettings::default()
    };
    config.circuit_breaker.min_requests = 4;
    config.circuit_breaker.failure_threshold = 4;
    let gw = RelayGateway::new(config)
        .with_recovery(Arc::new(llm_relay::RecoveryManager::new()));

    let service = Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(server.uri())).unwrap(),
    );

    for _ in 0..4 {
        let _ = gw
            .generate(service.clone(), vec![], chat_request("gpt-4o"))
            .await;
    }

    assert_eq!(
        gw.breakers().get("openai", "chat").state(),
        llm_relay::CircuitState::Open
    );

    // Further calls are rejected without reaching the wire
    let received_before = server.received_requests().await.unwrap().len();
    let error = gw
        .generate(service, vec![], chat_request("gpt-4o"))
        .await
        .unwrap_err();
    assert_eq!(error.kind, llm_relay::ErrorKind::ServiceUnavailable);
    assert!(error.retry_after_secs.is_some());
    let received_after = server.received_requests().await.unwrap().len();
    assert_eq!(received_before, received_after);
}
