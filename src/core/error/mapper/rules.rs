//! Provider-scoped mapping rules
//!
//! Each provider registers an ordered list of [`ErrorMapping`]s; the first
//! rule whose predicate matches wins. Rules only see the normalized view.

use super::normalize::NormalizedError;
use crate::core::error::types::{ErrorKind, Severity};

type Predicate = Box<dyn Fn(&NormalizedError) -> bool + Send + Sync>;
type RetryAfterFn = Box<dyn Fn(&NormalizedError) -> Option<u64> + Send + Sync>;

/// One provider-scoped classification rule
pub struct ErrorMapping {
    /// Matches against the normalized raw error
    predicate: Predicate,
    /// Kind this rule maps to
    pub kind: ErrorKind,
    /// Severity the rule assigns
    pub severity: Severity,
    /// Retryability the rule assigns (clamped by the kind invariant)
    pub retryable: bool,
    /// Optional retry-after extractor
    retry_after: Option<RetryAfterFn>,
}

impl ErrorMapping {
    /// Create a rule with kind-default severity and retryability
    pub fn new(
        kind: ErrorKind,
        predicate: impl Fn(&NormalizedError) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            kind,
            severity: kind.default_severity(),
            retryable: kind.default_retryable(),
            retry_after: None,
        }
    }

    /// Override the assigned severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Override the assigned retryability
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a retry-after extractor
    pub fn with_retry_after(
        mut self,
        extractor: impl Fn(&NormalizedError) -> Option<u64> + Send + Sync + 'static,
    ) -> Self {
        self.retry_after = Some(Box::new(extractor));
        self
    }

    /// Whether this rule claims the error
    pub fn matches(&self, error: &NormalizedError) -> bool {
        (self.predicate)(error)
    }

    /// Extract the retry hint, if the rule carries an extractor
    pub fn retry_after(&self, error: &NormalizedError) -> Option<u64> {
        self.retry_after.as_ref().and_then(|f| f(error))
    }
}

impl std::fmt::Debug for ErrorMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMapping")
            .field("kind", &self.kind)
            .field("severity", &self.severity)
            .field("retryable", &self.retryable)
            .finish()
    }
}

fn code_is(error: &NormalizedError, expected: &[&str]) -> bool {
    error
        .code
        .as_deref()
        .map(|c| expected.contains(&c))
        .unwrap_or(false)
}

/// OpenAI-compatible rule table
///
/// Classifications match OpenAI's `error.type`/`error.code` vocabulary.
pub fn openai_rules() -> Vec<ErrorMapping> {
    vec![
        ErrorMapping::new(ErrorKind::Authentication, |e| {
            e.status == Some(401) || code_is(e, &["invalid_api_key", "authentication_error"])
        }),
        ErrorMapping::new(ErrorKind::Authorization, |e| {
            e.status == Some(403) || code_is(e, &["permission_error"])
        }),
        ErrorMapping::new(ErrorKind::QuotaExceeded, |e| {
            code_is(e, &["insufficient_quota", "quota_exceeded"])
                || e.message_lower().contains("quota")
        }),
        ErrorMapping::new(ErrorKind::RateLimit, |e| {
            e.status == Some(429) || code_is(e, &["rate_limit_error", "rate_limit_exceeded"])
        })
        .with_retry_after(NormalizedError::retry_after_secs),
        ErrorMapping::new(ErrorKind::ModelNotFound, |e| {
            code_is(e, &["model_not_found"])
                || (e.status == Some(404) && e.message_lower().contains("model"))
        }),
        ErrorMapping::new(ErrorKind::InvalidRequest, |e| {
            code_is(e, &["invalid_request_error", "context_length_exceeded"])
                || e.status == Some(400)
        }),
        ErrorMapping::new(ErrorKind::ServiceUnavailable, |e| {
            code_is(e, &["overloaded_error", "api_error", "server_error"])
                || matches!(e.status, Some(500..=599))
        }),
    ]
}

/// Anthropic rule table
///
/// Anthropic reports `type` at the top of the error object; normalization
/// surfaces it through `code`.
pub fn anthropic_rules() -> Vec<ErrorMapping> {
    vec![
        ErrorMapping::new(ErrorKind::Authentication, |e| {
            e.status == Some(401) || code_is(e, &["authentication_error"])
        }),
        ErrorMapping::new(ErrorKind::Authorization, |e| {
            e.status == Some(403) || code_is(e, &["permission_error"])
        }),
        ErrorMapping::new(ErrorKind::RateLimit, |e| {
            e.status == Some(429) || code_is(e, &["rate_limit_error"])
        })
        .with_retry_after(NormalizedError::retry_after_secs),
        ErrorMapping::new(ErrorKind::ModelNotFound, |e| {
            code_is(e, &["not_found_error"]) && e.message_lower().contains("model")
        }),
        ErrorMapping::new(ErrorKind::ServiceUnavailable, |e| {
            code_is(e, &["overloaded_error", "api_error"]) || matches!(e.status, Some(500..=599))
        }),
        ErrorMapping::new(ErrorKind::Validation, |e| {
            code_is(e, &["invalid_request_error"]) && e.message_lower().contains("validation")
        }),
        ErrorMapping::new(ErrorKind::InvalidRequest, |e| {
            code_is(e, &["invalid_request_error"]) || e.status == Some(400)
        }),
    ]
}
