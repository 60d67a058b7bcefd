//! Streaming relay: upstream SSE consumption and outward framing

pub mod frames;
pub mod relay;
pub mod sse;

pub use frames::{ClientFrame, ErrorPayload};
pub use relay::{
    RelayState, StreamContext, StreamEvent, StreamHandle, StreamRelay, StreamSummary,
};
pub use sse::SseParser;
