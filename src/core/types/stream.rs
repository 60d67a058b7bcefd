//! Streaming chunk types

use super::response::{FinishReason, Usage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized incremental chunk relayed to the consumer
///
/// Chunks arrive in strict upstream order. A stream terminates with exactly
/// one chunk carrying a `finish_reason`, or with an error event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Chunk identifier (provider id when present, relay-assigned otherwise)
    pub id: String,
    /// Incremental content; may be empty on a terminal chunk
    pub delta_content: String,
    /// Set on the terminal chunk only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token accounting, when the provider attaches it to a chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// When the relay observed the chunk
    pub timestamp: DateTime<Utc>,
}

impl StreamChunk {
    /// Create a content delta chunk
    pub fn delta(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            delta_content: content.into(),
            finish_reason: None,
            usage: None,
            timestamp: Utc::now(),
        }
    }

    /// Whether this chunk terminates the stream
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}
