//! Provider error mapper
//!
//! Turns raw transport/provider failures into the canonical [`AiError`].
//! Mapping is pure, idempotent and never fails: canonical input passes
//! through unchanged, unmappable input becomes `kind = unknown`.

pub mod heuristics;
pub mod normalize;
pub mod rules;

pub use normalize::{NormalizedError, RawError};
pub use rules::ErrorMapping;

use crate::core::error::types::{AiError, ErrorKind};
use std::collections::HashMap;
use tracing::debug;

/// Registry of per-provider mapping rules with a shared heuristic fallback
pub struct ErrorMapper {
    rules: HashMap<String, Vec<ErrorMapping>>,
}

impl ErrorMapper {
    /// Create a mapper with no provider rules; everything goes through the
    /// heuristic classifier
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Create a mapper with the built-in provider tables
    pub fn with_default_rules() -> Self {
        let mut mapper = Self::new();
        mapper.register("openai", rules::openai_rules());
        mapper.register("anthropic", rules::anthropic_rules());
        mapper
    }

    /// Register (or replace) a provider's ordered rule list
    pub fn register(&mut self, provider: impl Into<String>, rules: Vec<ErrorMapping>) {
        self.rules.insert(provider.into(), rules);
    }

    /// Map a raw failure into the canonical error value
    ///
    /// Never fails. Canonical input is returned unchanged.
    pub fn map_error(
        &self,
        raw: RawError,
        provider: &str,
        service: &str,
        model: Option<&str>,
    ) -> AiError {
        // Idempotence: an already-canonical error passes through untouched.
        if let RawError::Canonical(error) = raw {
            return error;
        }

        let normalized = NormalizedError::from_raw(&raw);

        let mut error = match self.match_rule(provider, &normalized) {
            Some(rule) => {
                AiError::new(rule.kind, normalized.message.clone(), provider, service)
                    .with_severity(rule.severity)
                    .with_retryable(rule.retryable)
                    .with_retry_after(
                        rule.retry_after(&normalized)
                            .or_else(|| normalized.retry_after_secs()),
                    )
            }
            None => {
                let kind = heuristics::classify(&normalized);
                debug!(provider, %kind, "no mapping rule matched, classified heuristically");
                let retry_after = if kind == ErrorKind::RateLimit {
                    normalized.retry_after_secs()
                } else {
                    None
                };
                AiError::new(kind, normalized.message.clone(), provider, service)
                    .with_retry_after(retry_after)
            }
        };

        if let Some(code) = &normalized.code {
            error = error.with_code(code.clone());
        }
        if let Some(status) = normalized.status {
            error = error.with_context("status", status.to_string());
        }
        if let Some(model) = model {
            error = error.with_context("model", model.to_string());
        }
        error
    }

    fn match_rule(&self, provider: &str, error: &NormalizedError) -> Option<&ErrorMapping> {
        self.rules
            .get(provider)?
            .iter()
            .find(|rule| rule.matches(error))
    }
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self::with_default_rules()
    }
}
