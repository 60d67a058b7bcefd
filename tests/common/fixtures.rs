//! Test fixtures and factories

use async_trait::async_trait;
use llm_relay::core::service::ConversationSink;
use llm_relay::{AiError, GenerationRequest, Message, MessageRole};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Initialize tracing once for test output; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A small chat request for a given model
pub fn chat_request(model: &str) -> GenerationRequest {
    GenerationRequest::new(
        model,
        vec![
            Message::system("You are a helpful assistant."),
            Message::user("Say hello."),
        ],
    )
}

/// Build an OpenAI-style SSE body from content deltas, ending with `[DONE]`
pub fn sse_body(deltas: &[&str], finish_reason: Option<&str>) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-test\",\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{delta}\"}},\"finish_reason\":null}}]}}\n\n"
        ));
    }
    if let Some(reason) = finish_reason {
        body.push_str(&format!(
            "data: {{\"id\":\"chatcmpl-test\",\"choices\":[{{\"index\":0,\"delta\":{{}},\"finish_reason\":\"{reason}\"}}]}}\n\n"
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Records persistence calls for assertion
#[derive(Default)]
pub struct RecordingSink {
    /// (conversation_id, role, content) per append
    pub appends: Mutex<Vec<(String, MessageRole, String)>>,
    /// conversation_id per touch
    pub touches: Mutex<Vec<String>>,
}

#[async_trait]
impl ConversationSink for RecordingSink {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        _metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<(), AiError> {
        self.appends
            .lock()
            .push((conversation_id.to_string(), role, content.to_string()));
        Ok(())
    }

    async fn touch_conversation(&self, conversation_id: &str) -> Result<(), AiError> {
        self.touches.lock().push(conversation_id.to_string());
        Ok(())
    }
}
