//! Shared heuristic classifier
//!
//! Used when no provider rule matches. Classifies from status code ranges
//! first, then message substrings, mirroring the spread of failure shapes
//! providers actually return.

use super::normalize::NormalizedError;
use crate::core::error::types::ErrorKind;

const QUOTA_KEYWORDS: &[&str] = &["quota", "billing", "insufficient funds", "credit"];
const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "deadline"];
const NETWORK_KEYWORDS: &[&str] = &[
    "connection",
    "connect",
    "dns",
    "refused",
    "reset",
    "broken pipe",
    "unreachable",
];

/// Infer a kind from a normalized error no rule claimed
pub fn classify(error: &NormalizedError) -> ErrorKind {
    let message = error.message_lower();

    if let Some(status) = error.status {
        match status {
            401 | 403 => return ErrorKind::Authentication,
            429 => return ErrorKind::RateLimit,
            402 => return ErrorKind::QuotaExceeded,
            404 => {
                if message.contains("model") {
                    return ErrorKind::ModelNotFound;
                }
                return ErrorKind::InvalidRequest;
            }
            408 => return ErrorKind::Timeout,
            400 => {
                if contains_any(&message, QUOTA_KEYWORDS) {
                    return ErrorKind::QuotaExceeded;
                }
                return ErrorKind::InvalidRequest;
            }
            500..=599 => return ErrorKind::ServiceUnavailable,
            _ => {}
        }
    }

    if contains_any(&message, QUOTA_KEYWORDS) {
        return ErrorKind::QuotaExceeded;
    }
    if contains_any(&message, TIMEOUT_KEYWORDS) {
        return ErrorKind::Timeout;
    }
    if contains_any(&message, NETWORK_KEYWORDS) {
        return ErrorKind::Network;
    }

    ErrorKind::Unknown
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
