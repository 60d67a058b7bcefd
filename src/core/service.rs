//! Provider-facing seams
//!
//! [`GenerationService`] is the contract a provider integration implements;
//! the relay composes reliability around it. [`ConversationSink`] captures
//! the persistence hook the calling layer supplies.

use crate::core::error::{AiError, RawError};
use crate::core::types::{GenerationRequest, GenerationResponse, MessageRole};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Raw upstream byte stream plus transport errors
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, RawError>> + Send>>;

/// A single provider service (one provider, one service type)
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Provider identifier, e.g. "openai"
    fn provider(&self) -> &str;

    /// Service type within the provider
    fn service_kind(&self) -> &str {
        "chat"
    }

    /// Perform a non-streaming generation call
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, RawError>;

    /// Open a streaming generation call, returning the raw byte stream
    ///
    /// The returned stream is SSE-framed provider output; dropping it must
    /// release the underlying transport.
    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ByteStream, RawError>;
}

/// Conversation persistence hook supplied by the calling layer
///
/// Must be invoked exactly once per completed assistant turn.
#[async_trait]
pub trait ConversationSink: Send + Sync {
    /// Append a message to a conversation
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<(), AiError>;

    /// Bump the conversation's last-activity marker
    async fn touch_conversation(&self, conversation_id: &str) -> Result<(), AiError>;
}
