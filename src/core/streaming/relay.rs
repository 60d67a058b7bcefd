//! Streaming relay
//!
//! Consumes an upstream incremental byte stream and republishes a normalized
//! chunk stream to the consumer. Handles partial network frames through the
//! SSE carry-over parser, tolerates malformed frames, and supports prompt
//! cancellation that releases the upstream transport.

use super::sse::{self, SseParser};
use crate::core::error::{AiError, ErrorMapper, RawError};
use crate::core::service::ByteStream;
use crate::core::types::{FinishReason, GenerationResponse, StreamChunk, Usage};
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Notify, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Created but not yet reading upstream
    Idle,
    /// Actively relaying chunks
    Streaming,
    /// Terminated successfully
    Completed,
    /// Terminated by an upstream error
    Failed,
    /// Terminated by the consumer
    Cancelled,
}

/// Final accounting for a completed stream
#[derive(Debug, Clone)]
pub struct StreamSummary {
    /// Full accumulated content in arrival order
    pub content: String,
    /// Terminal reason; `Stop` when upstream ended without one
    pub finish_reason: FinishReason,
    /// Usage totals, when upstream reported them
    pub usage: Option<Usage>,
    /// Model the stream was opened for
    pub model: String,
    /// Chunks yielded to the consumer
    pub chunk_count: u64,
    /// Malformed frames skipped as transport noise
    pub skipped_frames: u64,
    /// Whether upstream signalled a clean end (`[DONE]` or finish reason)
    pub clean_end: bool,
}

impl StreamSummary {
    /// Convert into a response the calling layer can persist
    pub fn into_response(self) -> GenerationResponse {
        let mut response = GenerationResponse::new(self.model, self.content);
        response.finish_reason = self.finish_reason;
        response.usage = self.usage;
        response
    }
}

/// Event yielded by the relay
///
/// A relay yields zero or more `Chunk`s followed by exactly one `Completed`
/// or `Error`; a cancelled relay stops yielding instead.
#[derive(Debug)]
pub enum StreamEvent {
    /// One normalized upstream delta
    Chunk(StreamChunk),
    /// Stream ended; carries the accumulated result
    Completed(StreamSummary),
    /// Stream failed; terminal
    Error(AiError),
}

/// Identity of the stream being relayed
#[derive(Debug, Clone)]
pub struct StreamContext {
    /// Provider name
    pub provider: String,
    /// Service type
    pub service: String,
    /// Model requested
    pub model: String,
}

/// Consumer handle: a stream of [`StreamEvent`]s plus `cancel()`
#[derive(Debug)]
pub struct StreamHandle {
    events: ReceiverStream<StreamEvent>,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    state: Arc<Mutex<RelayState>>,
}

impl StreamHandle {
    /// Abort the upstream read immediately
    ///
    /// No further chunks are yielded after cancellation; the pump task drops
    /// the upstream stream, releasing the transport.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel.notify_one();
    }

    /// Current relay state
    pub fn state(&self) -> RelayState {
        *self.state.lock()
    }
}

impl futures::Stream for StreamHandle {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

/// Spawns relay pump tasks
pub struct StreamRelay;

impl StreamRelay {
    /// Start relaying `upstream` and return the consumer handle
    pub fn spawn(upstream: ByteStream, ctx: StreamContext, mapper: Arc<ErrorMapper>) -> StreamHandle {
        let (tx, rx) = mpsc::channel(64);
        let cancel = Arc::new(Notify::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let state = Arc::new(Mutex::new(RelayState::Idle));

        tokio::spawn(pump(
            upstream,
            tx,
            cancel.clone(),
            cancelled.clone(),
            state.clone(),
            ctx,
            mapper,
        ));

        StreamHandle {
            events: ReceiverStream::new(rx),
            cancel,
            cancelled,
            state,
        }
    }
}

async fn pump(
    mut upstream: ByteStream,
    tx: mpsc::Sender<StreamEvent>,
    cancel: Arc<Notify>,
    cancelled: Arc<AtomicBool>,
    state: Arc<Mutex<RelayState>>,
    ctx: StreamContext,
    mapper: Arc<ErrorMapper>,
) {
    *state.lock() = RelayState::Streaming;

    let stream_id = format!("stream-{}", Uuid::new_v4());
    let mut parser = SseParser::new();
    let mut accumulated = String::new();
    let mut finish: Option<FinishReason> = None;
    let mut usage: Option<Usage> = None;
    let mut chunk_count: u64 = 0;
    let mut skipped_frames: u64 = 0;
    let mut saw_done = false;

    'read: loop {
        if cancelled.load(Ordering::SeqCst) {
            *state.lock() = RelayState::Cancelled;
            debug!(stream = %stream_id, "relay cancelled");
            return;
        }

        tokio::select! {
            biased;
            _ = cancel.notified() => {
                *state.lock() = RelayState::Cancelled;
                debug!(stream = %stream_id, "relay cancelled, upstream aborted");
                return;
            }
            next = upstream.next() => match next {
                Some(Ok(bytes)) => {
                    for line in parser.push(&bytes) {
                        let Some(payload) = sse::data_payload(&line) else {
                            continue;
                        };
                        if sse::is_done(payload) {
                            saw_done = true;
                            break 'read;
                        }
                        match parse_delta(payload, &stream_id) {
                            Err(()) => {
                                // Transport noise, not an application error
                                skipped_frames += 1;
                                debug!(
                                    stream = %stream_id,
                                    skipped = skipped_frames,
                                    "skipping malformed stream frame"
                                );
                            }
                            Ok(None) => {}
                            Ok(Some(chunk)) => {
                                accumulated.push_str(&chunk.delta_content);
                                if let Some(reason) = chunk.finish_reason {
                                    finish = Some(reason);
                                }
                                if let Some(reported) = chunk.usage {
                                    usage = Some(reported);
                                }
                                chunk_count += 1;
                                if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                                    // Consumer dropped the handle
                                    *state.lock() = RelayState::Cancelled;
                                    debug!(stream = %stream_id, "consumer gone, aborting upstream");
                                    return;
                                }
                                if finish.is_some() {
                                    break 'read;
                                }
                            }
                        }
                    }
                }
                Some(Err(raw)) => {
                    let mapped = mapper.map_error(raw, &ctx.provider, &ctx.service, Some(&ctx.model));
                    let err = AiError::streaming(
                        format!("stream interrupted: {}", mapped.message),
                        ctx.provider.clone(),
                        ctx.service.clone(),
                    )
                    .with_context("original_kind", mapped.kind.to_string());
                    warn!(stream = %stream_id, "upstream error: {err}");
                    *state.lock() = RelayState::Failed;
                    let _ = tx.send(StreamEvent::Error(err)).await;
                    return;
                }
                None => break 'read,
            }
        }
    }

    // Upstream may end without [DONE] or a terminal finish reason; the
    // accumulated content is still the caller's answer and must be kept.
    if !saw_done && finish.is_none() {
        debug!(
            stream = %stream_id,
            chars = accumulated.len(),
            "upstream ended without terminal marker, keeping accumulated content"
        );
    }

    let summary = StreamSummary {
        content: accumulated,
        finish_reason: finish.unwrap_or(FinishReason::Stop),
        usage,
        model: ctx.model,
        chunk_count,
        skipped_frames,
        clean_end: saw_done || finish.is_some(),
    };
    *state.lock() = RelayState::Completed;
    let _ = tx.send(StreamEvent::Completed(summary)).await;
}

/// Parse one `data:` payload into a chunk
///
/// `Err(())` means malformed JSON (counted and skipped); `Ok(None)` means a
/// valid frame with nothing to emit (keepalives, role-only deltas).
fn parse_delta(payload: &str, stream_id: &str) -> Result<Option<StreamChunk>, ()> {
    let value: Value = serde_json::from_str(payload).map_err(|_| ())?;

    let id = value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or(stream_id)
        .to_string();

    let mut content = String::new();
    let mut finish_reason = None;

    if let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    {
        if let Some(delta) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
        {
            content.push_str(delta);
        }
        finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .and_then(FinishReason::parse);
    } else if let Some(text) = value
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
    {
        // Anthropic content_block_delta shape
        content.push_str(text);
    } else if let Some(text) = value.get("text").and_then(Value::as_str) {
        content.push_str(text);
    }

    let usage = value
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

    if content.is_empty() && finish_reason.is_none() && usage.is_none() {
        return Ok(None);
    }

    let mut chunk = StreamChunk::delta(id, content);
    chunk.finish_reason = finish_reason;
    chunk.usage = usage;
    Ok(Some(chunk))
}
