//! Raw error shapes and normalization
//!
//! Provider failures arrive in three shapes: an HTTP-client wrapper error, a
//! raw HTTP response, or a generic transport exception. All are flattened
//! into [`NormalizedError`] before rule matching. An already-canonical
//! [`AiError`] passes through the mapper unchanged.

use crate::core::error::types::AiError;
use serde_json::Value;
use std::collections::HashMap;

/// A provider failure before normalization
#[derive(Debug)]
pub enum RawError {
    /// Already canonical; the mapper returns it unchanged
    Canonical(AiError),
    /// HTTP-client wrapper error (status may be absent on connect failures)
    Client {
        /// HTTP status, when the failure carried a response
        status: Option<u16>,
        /// Wrapper message
        message: String,
        /// Whether the client classified this as a timeout
        timed_out: bool,
        /// Whether the client classified this as a connect failure
        connect: bool,
    },
    /// Raw HTTP error response
    Response {
        /// HTTP status code
        status: u16,
        /// Response headers, lower-cased names
        headers: HashMap<String, String>,
        /// Raw response body
        body: String,
    },
    /// Generic exception with only a message
    Transport {
        /// Exception message
        message: String,
    },
}

impl RawError {
    /// Wrap a raw HTTP response
    pub fn response(status: u16, headers: HashMap<String, String>, body: impl Into<String>) -> Self {
        Self::Response {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Wrap a generic exception message
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl From<AiError> for RawError {
    fn from(error: AiError) -> Self {
        Self::Canonical(error)
    }
}

impl From<reqwest::Error> for RawError {
    fn from(error: reqwest::Error) -> Self {
        Self::Client {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
            timed_out: error.is_timeout(),
            connect: error.is_connect(),
        }
    }
}

/// The flattened view rule predicates match against
#[derive(Debug, Default)]
pub struct NormalizedError {
    /// HTTP status, when one was observed
    pub status: Option<u16>,
    /// Provider error code extracted from the body
    pub code: Option<String>,
    /// Best available message
    pub message: String,
    /// Response headers, lower-cased names
    pub headers: HashMap<String, String>,
    /// Parsed JSON body, when the body was JSON
    pub body: Option<Value>,
}

impl NormalizedError {
    /// Normalize a raw shape; `Canonical` must be short-circuited by the caller
    pub fn from_raw(raw: &RawError) -> Self {
        match raw {
            RawError::Canonical(error) => Self {
                status: None,
                code: error.code.clone(),
                message: error.message.clone(),
                headers: HashMap::new(),
                body: None,
            },
            RawError::Client {
                status,
                message,
                timed_out,
                connect,
            } => {
                // Client wrappers lose the body; fold classification hints
                // into the message so substring heuristics still fire.
                let mut message = message.clone();
                if *timed_out && !message.to_ascii_lowercase().contains("timeout") {
                    message.push_str(" (timeout)");
                }
                if *connect && !message.to_ascii_lowercase().contains("connect") {
                    message.push_str(" (connection failed)");
                }
                Self {
                    status: *status,
                    code: None,
                    message,
                    headers: HashMap::new(),
                    body: None,
                }
            }
            RawError::Response {
                status,
                headers,
                body,
            } => {
                let parsed = serde_json::from_str::<Value>(body).ok();
                let code = parsed.as_ref().and_then(extract_code);
                let message = parsed
                    .as_ref()
                    .and_then(extract_message)
                    .unwrap_or_else(|| {
                        if body.is_empty() {
                            format!("HTTP {status}")
                        } else {
                            body.clone()
                        }
                    });
                Self {
                    status: Some(*status),
                    code,
                    message,
                    headers: lowercase_headers(headers),
                    body: parsed,
                }
            }
            RawError::Transport { message } => Self {
                status: None,
                code: None,
                message: message.clone(),
                headers: HashMap::new(),
                body: None,
            },
        }
    }

    /// Lower-cased message for substring matching
    pub fn message_lower(&self) -> String {
        self.message.to_ascii_lowercase()
    }

    /// Retry-after hint: `retry-after` header first, then common body fields
    pub fn retry_after_secs(&self) -> Option<u64> {
        if let Some(value) = self.headers.get("retry-after") {
            if let Ok(secs) = value.trim().parse::<u64>() {
                return Some(secs);
            }
        }
        let body = self.body.as_ref()?;
        body.get("error")
            .and_then(|e| e.get("retry_after"))
            .or_else(|| body.get("retry_after"))
            .and_then(Value::as_u64)
    }
}

fn lowercase_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}

/// Pull an error code out of the common provider body layouts
fn extract_code(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .get("code")
        .or_else(|| error.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            // Anthropic nests under error.type at the top level too
            body.get("type").and_then(Value::as_str).map(str::to_string)
        })
}

/// Pull a message out of the common provider body layouts
fn extract_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.get("message"))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
