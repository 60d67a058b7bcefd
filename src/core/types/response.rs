//! Generation response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop or stop sequence
    Stop,
    /// Token limit reached
    Length,
    /// Content was filtered by safety systems
    ContentFilter,
    /// Model requested tool invocation
    ToolCalls,
}

impl FinishReason {
    /// Parse a provider finish-reason string; providers disagree on naming
    pub fn parse(reason: &str) -> Option<Self> {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => Some(Self::Stop),
            "length" | "max_tokens" => Some(Self::Length),
            "tool_calls" | "function_call" | "tool_use" => Some(Self::ToolCalls),
            "content_filter" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

/// Token usage accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total tokens billed
    #[serde(default)]
    pub total_tokens: u32,
}

/// Execution metadata attached to a relayed response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Total attempts across retries (1 = first try succeeded)
    pub attempts: u32,
    /// The model that actually produced the response
    pub model_used: String,
    /// Whether a fallback provider or model produced the response
    pub used_fallback: bool,
    /// Recovery strategy that produced the response, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_by: Option<String>,
    /// End-to-end latency in milliseconds, including retries
    pub latency_ms: u64,
}

/// A completed generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Response identifier
    pub id: String,
    /// Model that produced the response
    pub model: String,
    /// Generated content
    pub content: String,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Token accounting, when the provider reported it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Relay execution metadata
    #[serde(default)]
    pub metadata: ResponseMetadata,
    /// Free-form diagnostics
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl GenerationResponse {
    /// Create a response with the given content
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            id: format!("gen-{}", uuid::Uuid::new_v4()),
            model: model.clone(),
            content: content.into(),
            finish_reason: FinishReason::Stop,
            usage: None,
            metadata: ResponseMetadata {
                model_used: model,
                attempts: 1,
                ..ResponseMetadata::default()
            },
            extra: HashMap::new(),
        }
    }
}
