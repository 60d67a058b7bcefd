//! Retry behavior against a live HTTP boundary
//!
//! Exercises the full stack: HTTP service, error mapper, retry engine and
//! gateway metadata, against wiremock-scripted provider responses.

use crate::common::{RecordingSink, chat_request, init_tracing};
use llm_relay::core::provider::{HttpChatService, HttpServiceConfig};
use llm_relay::{ErrorKind, RelayConfig, RelayGateway, RetrySettings};
use std::sync::Arc;
use std::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn success_body() -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-ok",
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hello there"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
    })
}

fn gateway(max_attempts: u32) -> RelayGateway {
    let mut config = RelayConfig::default();
    config.retry = RetrySettings {
        max_attempts,
        base_delay_ms: 1,
        jitter: false,
        ..RetrySettings::default()
    };
    RelayGateway::new(config)
}

fn service(server: &MockServer) -> Arc<HttpChatService> {
    Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(server.uri())).unwrap(),
    )
}

// ==================== Rate Limit + Retry-After ====================

/// 429 with Retry-After: 2, then success. The retry engine must wait at
/// least the hinted two seconds and the caller sees attempt 2 in the
/// response metadata.
#[tokio::test]
async fn test_rate_limit_retry_after_honored() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_string(r#"{"error":{"message":"Rate limit reached"}}"#),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let gw = gateway(3);
    let started = Instant::now();
    let response = gw
        .generate(service(&server), vec![], chat_request("gpt-4o"))
        .await
        .unwrap();

    assert!(
        started.elapsed().as_millis() >= 2000,
        "must wait at least the Retry-After hint, waited {}ms",
        started.elapsed().as_millis()
    );
    assert_eq!(response.metadata.attempts, 2);
    assert_eq!(response.content, "hello there");
    assert_eq!(response.usage.unwrap().total_tokens, 15);
}

// ==================== Exhaustion ====================

#[tokio::test]
async fn test_persistent_503_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .expect(3)
        .mount(&server)
        .await;

    // Strip the recovery chain so the mapped error surfaces
    let gw = gateway(3).with_recovery(Arc::new(llm_relay::RecoveryManager::new()));
    let error = gw
        .generate(service(&server), vec![], chat_request("gpt-4o"))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::ServiceUnavailable);
    assert!(error.retryable);
}

#[tokio::test]
async fn test_auth_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string(r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gw = gateway(5).with_recovery(Arc::new(llm_relay::RecoveryManager::new()));
    let error = gw
        .generate(service(&server), vec![], chat_request("gpt-4o"))
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::Authentication);
    assert!(!error.retryable);
}

// ==================== Persistence Hook ====================

#[tokio::test]
async fn test_completed_turn_persisted_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let gw = gateway(3).with_sink(sink.clone());

    let mut request = chat_request("gpt-4o");
    request.conversation_id = Some("conv-7".to_string());
    gw.generate(service(&server), vec![], request).await.unwrap();

    let appends = sink.appends.lock();
    assert_eq!(appends.len(), 1);
    assert_eq!(appends[0].0, "conv-7");
    assert_eq!(appends[0].2, "hello there");
    assert_eq!(sink.touches.lock().as_slice(), &["conv-7".to_string()]);
}
