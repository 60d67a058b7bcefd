//! Outward wire framing
//!
//! The relay's client-facing stream is newline-delimited `data: <json>\n\n`
//! frames terminated by a literal `data: [DONE]\n\n`. Each payload carries a
//! `status` discriminant the browser/CLI client switches on.

use crate::core::error::AiError;
use crate::core::types::GenerationResponse;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Error payload sent to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Canonical kind name
    pub kind: String,
    /// Human-readable description
    pub message: String,
    /// Whether the client may retry the request
    pub retryable: bool,
    /// Provider retry hint, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&AiError> for ErrorPayload {
    fn from(error: &AiError) -> Self {
        Self {
            kind: error.kind.to_string(),
            message: error.message.clone(),
            retryable: error.retryable,
            retry_after_secs: error.retry_after_secs,
        }
    }
}

/// One outward frame payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Request accepted, upstream call in flight
    Processing,
    /// Incremental content
    Streaming {
        /// Delta content for this frame
        content: String,
    },
    /// Stream finished; full result attached
    Completed {
        /// The completed response
        result: GenerationResponse,
    },
    /// Stream failed; terminal
    Error {
        /// What went wrong
        error: ErrorPayload,
    },
}

impl ClientFrame {
    /// Encode as a wire frame: `data: <json>\n\n`
    ///
    /// Serialization of these shapes cannot fail; a defect here degrades to
    /// an error frame rather than a broken stream.
    pub fn to_bytes(&self) -> Bytes {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"status\":\"error\",\"error\":{{\"kind\":\"unknown\",\"message\":\"frame encoding failed: {e}\",\"retryable\":false}}}}"
            )
        });
        Bytes::from(format!("data: {json}\n\n"))
    }

    /// The literal terminator every outward stream ends with
    pub fn done() -> Bytes {
        Bytes::from_static(b"data: [DONE]\n\n")
    }
}

/// Wrap a relay handle into the outward wire stream
///
/// Emits `processing`, then a `streaming` frame per content delta, then
/// exactly one `completed` or `error` frame, then the `[DONE]` terminator.
/// A cancelled relay still terminates the outward stream explicitly rather
/// than closing it silently.
pub fn client_frame_stream(
    handle: crate::core::streaming::relay::StreamHandle,
) -> impl futures::Stream<Item = Bytes> {
    use crate::core::streaming::relay::StreamEvent;
    use futures_util::StreamExt;

    async_stream::stream! {
        yield ClientFrame::Processing.to_bytes();

        let mut handle = handle;
        let mut terminated = false;
        while let Some(event) = handle.next().await {
            match event {
                StreamEvent::Chunk(chunk) => {
                    if !chunk.delta_content.is_empty() {
                        yield ClientFrame::Streaming {
                            content: chunk.delta_content,
                        }
                        .to_bytes();
                    }
                }
                StreamEvent::Completed(summary) => {
                    yield ClientFrame::Completed {
                        result: summary.into_response(),
                    }
                    .to_bytes();
                    terminated = true;
                }
                StreamEvent::Error(error) => {
                    yield ClientFrame::Error {
                        error: ErrorPayload::from(&error),
                    }
                    .to_bytes();
                    terminated = true;
                }
            }
        }

        if !terminated {
            yield ClientFrame::Error {
                error: ErrorPayload {
                    kind: "streaming".to_string(),
                    message: "stream cancelled before completion".to_string(),
                    retryable: false,
                    retry_after_secs: None,
                },
            }
            .to_bytes();
        }
        yield ClientFrame::done();
    }
}
