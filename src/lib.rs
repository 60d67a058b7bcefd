//! # llm-relay
//!
//! The reliability core of a chatbot backend: keeps AI-provider calls
//! dependable and turns a provider's token-by-token HTTP stream into a
//! cancellable, client-consumable event stream.
//!
//! ## Components
//!
//! - **Error taxonomy** ([`AiError`], [`ErrorKind`]): the canonical value
//!   every retry/breaker/recovery decision keys off.
//! - **Error mapper** ([`ErrorMapper`]): normalizes HTTP-client wrappers,
//!   raw responses and transport exceptions through per-provider rule
//!   tables with a heuristic fallback. Pure, idempotent, never fails.
//! - **Retry engine** ([`RetryPolicy`], [`RetryExecutor`]): bounded
//!   attempts with capped exponential backoff, jitter, and provider
//!   retry-after hints.
//! - **Circuit breaker** ([`CircuitBreaker`], [`CircuitBreakerRegistry`]):
//!   per-(provider, service) closed/open/half-open gate over a bounded ring
//!   of recent results.
//! - **Recovery chain** ([`RecoveryManager`]): fallback provider, model
//!   downgrade, request simplification, cache recovery, and degraded mode,
//!   in that priority order.
//! - **Streaming relay** ([`StreamRelay`]): reassembles SSE frames across
//!   arbitrary chunk boundaries, tolerates malformed frames, cancels
//!   promptly, and never drops trailing partial content.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use llm_relay::{RelayConfig, RelayGateway};
//! use llm_relay::core::provider::{HttpChatService, HttpServiceConfig};
//! use llm_relay::core::types::{GenerationRequest, Message};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = RelayGateway::new(RelayConfig::default());
//!     let service = Arc::new(HttpChatService::new(
//!         "openai",
//!         HttpServiceConfig::new("https://api.openai.com/v1").with_api_key("sk-..."),
//!     ).map_err(|e| format!("{e:?}"))?);
//!
//!     let request = GenerationRequest::new("gpt-4o", vec![Message::user("hello")]);
//!     let response = gateway.generate(service, vec![], request).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;

// Re-export the primary surface
pub use config::{CircuitBreakerSettings, RecoverySettings, RelayConfig, RetrySettings};
pub use core::error::{AiError, ErrorKind, ErrorMapper, RawError, Result, Severity};
pub use core::gateway::RelayGateway;
pub use core::recovery::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, RecoveryManager,
    RecoveryResult, ResponseCache, RetryExecutor, RetryPolicy,
};
pub use core::service::{ByteStream, ConversationSink, GenerationService};
pub use core::streaming::{
    ClientFrame, RelayState, StreamEvent, StreamHandle, StreamRelay, StreamSummary,
};
pub use core::types::{
    FinishReason, GenerationRequest, GenerationResponse, Message, MessageRole, StreamChunk, Usage,
};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
