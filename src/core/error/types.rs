//! Canonical error taxonomy for provider failures
//!
//! Every failure in the relay is normalized into [`AiError`], the single
//! value type that retry, circuit-breaker and recovery decisions key off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result type alias for the relay
pub type Result<T> = std::result::Result<T, AiError>;

/// Canonical error category
///
/// | Kind | Retryable by default |
/// |------|----------------------|
/// | Authentication / Authorization | No (invariant) |
/// | RateLimit | Yes (after delay) |
/// | QuotaExceeded | No |
/// | InvalidRequest / Validation | No |
/// | ModelNotFound | No (invariant) |
/// | ServiceUnavailable / Timeout / Network / Streaming | Yes |
/// | Parsing / Provider | No |
/// | Unknown | Yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials rejected
    Authentication,
    /// Credentials valid but operation forbidden
    Authorization,
    /// Request rate exceeded
    RateLimit,
    /// Account quota or billing limit exhausted
    QuotaExceeded,
    /// Request rejected as malformed by the provider
    InvalidRequest,
    /// The requested model does not exist or is inaccessible
    ModelNotFound,
    /// Provider is down or overloaded
    ServiceUnavailable,
    /// Request exceeded a deadline
    Timeout,
    /// Transport-level failure
    Network,
    /// Provider response could not be parsed
    Parsing,
    /// Request failed local validation
    Validation,
    /// Failure inside an active stream
    Streaming,
    /// Provider-reported internal error
    Provider,
    /// Anything that could not be classified
    Unknown,
}

impl ErrorKind {
    /// Default retryability for this kind
    ///
    /// Authentication, authorization, validation and model-not-found are
    /// never retryable; builders enforce this even when callers override.
    pub fn default_retryable(self) -> bool {
        match self {
            Self::RateLimit
            | Self::ServiceUnavailable
            | Self::Timeout
            | Self::Network
            | Self::Streaming
            | Self::Unknown => true,
            Self::Authentication
            | Self::Authorization
            | Self::QuotaExceeded
            | Self::InvalidRequest
            | Self::ModelNotFound
            | Self::Parsing
            | Self::Validation
            | Self::Provider => false,
        }
    }

    /// Kinds that may never be marked retryable
    pub fn forces_non_retryable(self) -> bool {
        matches!(
            self,
            Self::Authentication | Self::Authorization | Self::Validation | Self::ModelNotFound
        )
    }

    /// Default severity for this kind
    pub fn default_severity(self) -> Severity {
        match self {
            Self::Authentication | Self::Authorization | Self::QuotaExceeded => Severity::High,
            Self::ServiceUnavailable | Self::Provider => Severity::High,
            Self::RateLimit | Self::Timeout | Self::Network | Self::Streaming | Self::Unknown => {
                Severity::Medium
            }
            Self::ModelNotFound => Severity::Medium,
            Self::InvalidRequest | Self::Parsing | Self::Validation => Severity::Low,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::RateLimit => "rate_limit",
            Self::QuotaExceeded => "quota_exceeded",
            Self::InvalidRequest => "invalid_request",
            Self::ModelNotFound => "model_not_found",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Validation => "validation",
            Self::Streaming => "streaming",
            Self::Provider => "provider_error",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Operational severity of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Caller mistake, no operator action needed
    Low,
    /// Transient condition
    Medium,
    /// Degraded dependency
    High,
    /// Requires operator intervention
    Critical,
}

/// Canonical provider error value
///
/// Immutable once built. The `retryable` flag is always `false` for
/// authentication, authorization, validation and model-not-found kinds,
/// regardless of what a mapping rule or caller requests.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{provider}/{service} {kind}: {message}")]
pub struct AiError {
    /// Canonical category
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// Provider that produced the failure
    pub provider: String,
    /// Service type within the provider (e.g. "chat")
    pub service: String,
    /// Operational severity
    pub severity: Severity,
    /// Whether the retry engine may re-attempt
    pub retryable: bool,
    /// Provider-supplied retry hint, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Provider-specific error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// When the error was observed
    pub timestamp: DateTime<Utc>,
    /// Opaque diagnostic key/value bag
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl AiError {
    /// Create an error with kind defaults for severity and retryability
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: provider.into(),
            service: service.into(),
            severity: kind.default_severity(),
            retryable: kind.default_retryable(),
            retry_after_secs: None,
            code: None,
            timestamp: Utc::now(),
            context: HashMap::new(),
        }
    }

    /// Authentication failure (never retryable)
    pub fn authentication(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Authentication, message, provider, service)
    }

    /// Rate limit with an optional provider retry hint
    pub fn rate_limit(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
        retry_after_secs: Option<u64>,
    ) -> Self {
        Self::new(ErrorKind::RateLimit, message, provider, service).with_retry_after(retry_after_secs)
    }

    /// Provider outage or overload
    pub fn service_unavailable(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message, provider, service)
    }

    /// Deadline exceeded
    pub fn timeout(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Timeout, message, provider, service)
    }

    /// Transport failure
    pub fn network(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Network, message, provider, service)
    }

    /// Failure inside an active stream
    pub fn streaming(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Streaming, message, provider, service)
    }

    /// Unclassifiable failure; retryable so transient faults are not dropped
    pub fn unknown(
        message: impl Into<String>,
        provider: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Unknown, message, provider, service)
    }

    /// Override severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Override retryability; clamped by the kind invariant
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable && !self.kind.forces_non_retryable();
        self
    }

    /// Attach a retry-after hint
    pub fn with_retry_after(mut self, retry_after_secs: Option<u64>) -> Self {
        self.retry_after_secs = retry_after_secs;
        self
    }

    /// Attach a provider error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach a diagnostic key/value pair
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Whether the retry engine may re-attempt this error
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}
