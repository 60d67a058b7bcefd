//! Streaming relay over a live HTTP boundary

use crate::common::{chat_request, sse_body};
use futures_util::StreamExt;
use llm_relay::core::provider::{HttpChatService, HttpServiceConfig};
use llm_relay::{
    FinishReason, RelayConfig, RelayGateway, RetrySettings, StreamEvent,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

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

fn service(server: &MockServer) -> Arc<HttpChatService> {
    Arc::new(
        HttpChatService::new("openai", HttpServiceConfig::new(server.uri())).unwrap(),
    )
}

async fn mount_sse(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

// ==================== Happy Path ====================

#[tokio::test]
async fn test_stream_relayed_in_order() {
    let server = MockServer::start().await;
    mount_sse(&server, sse_body(&["Hel", "lo, ", "world"], Some("stop"))).await;

    let gw = gateway();
    let handle = gw
        .generate_stream(service(&server), chat_request("gpt-4o").streaming())
        .await
        .unwrap();

    let events: Vec<StreamEvent> = handle.collect().await;
    let content: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk(c) => Some(c.delta_content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(content, "Hello, world");

    match events.last().unwrap() {
        StreamEvent::Completed(summary) => {
            assert_eq!(summary.content, "Hello, world");
            assert_eq!(summary.finish_reason, FinishReason::Stop);
            assert!(summary.clean_end);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_summary_becomes_response() {
    let server = MockServer::start().await;
    mount_sse(&server, sse_body(&["streamed answer"], Some("stop"))).await;

    let gw = gateway();
    let request = chat_request("gpt-4o").streaming();
    let handle = gw
        .generate_stream(service(&server), request.clone())
        .await
        .unwrap();

    let events: Vec<StreamEvent> = handle.collect().await;
    let StreamEvent::Completed(summary) = events.into_iter().last().unwrap() else {
        panic!("expected Completed");
    };
    let response = gw.complete_stream_turn(&request, summary).await.unwrap();
    assert_eq!(response.content, "streamed answer");
    assert_eq!(response.model, "gpt-4o");
}

// ==================== Degenerate Upstreams ====================

/// Upstream ends without [DONE] or a finish reason. Easy to get wrong by
/// discarding the buffered text; the relay must surface it.
#[tokio::test]
async fn test_truncated_stream_keeps_partial_content() {
    let server = MockServer::start().await;
    let body = sse_body(&["partial "], None)
        .replace("data: [DONE]\n\n", "")
        + "data: {\"id\":\"chatcmpl-test\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"answer\"},\"finish_reason\":null}]}\n\n";
    mount_sse(&server, body).await;

    let gw = gateway();
    let handle = gw
        .generate_stream(service(&server), chat_request("gpt-4o").streaming())
        .await
        .unwrap();

    let events: Vec<StreamEvent> = handle.collect().await;
    match events.last().unwrap() {
        StreamEvent::Completed(summary) => {
            assert_eq!(summary.content, "partial answer");
            assert!(!summary.clean_end);
        }
        other => panic!("expected Completed with kept content, got {other:?}"),
    }
}

#[tokio::test]
async fn test_noisy_stream_skips_malformed_frames() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {{broken\n\n{}",
        sse_body(&["clean"], Some("stop"))
    );
    mount_sse(&server, body).await;

    let gw = gateway();
    let handle = gw
        .generate_stream(service(&server), chat_request("gpt-4o").streaming())
        .await
        .unwrap();

    let events: Vec<StreamEvent> = handle.collect().await;
    match events.last().unwrap() {
        StreamEvent::Completed(summary) => {
            assert_eq!(summary.content, "clean");
            assert_eq!(summary.skipped_frames, 1);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

// ==================== Open Failures ====================

#[tokio::test]
async fn test_stream_open_retries_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_sse(&server, sse_body(&["recovered"], Some("stop"))).await;

    let gw = gateway();
    let handle = gw
        .generate_stream(service(&server), chat_request("gpt-4o").streaming())
        .await
        .unwrap();

    let events: Vec<StreamEvent> = handle.collect().await;
    match events.last().unwrap() {
        StreamEvent::Completed(summary) => assert_eq!(summary.content, "recovered"),
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_open_auth_failure_surfaces() {
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

    let gw = gateway();
    let error = gw
        .generate_stream(service(&server), chat_request("gpt-4o").streaming())
        .await
        .unwrap_err();
    assert_eq!(error.kind, llm_relay::ErrorKind::Authentication);
}
