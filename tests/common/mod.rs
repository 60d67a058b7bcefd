//! Common test utilities for llm-relay integration tests

pub mod fixtures;

pub use fixtures::{RecordingSink, chat_request, init_tracing, sse_body};
