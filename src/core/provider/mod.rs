//! Provider service implementations

pub mod http;

pub use http::{HttpChatService, HttpServiceConfig};
