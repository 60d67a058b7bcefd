//! Core value types shared across the relay
//!
//! Request/response shapes follow the OpenAI-compatible wire format.

pub mod request;
pub mod response;
pub mod stream;

pub use request::{GenerationRequest, Message, MessageRole};
pub use response::{FinishReason, GenerationResponse, ResponseMetadata, Usage};
pub use stream::StreamChunk;
