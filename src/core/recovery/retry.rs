//! Retry engine with exponential backoff and jitter
//!
//! Wraps an operation in bounded attempts. Failed attempts are normalized
//! through the error mapper before eligibility is decided; ineligible or
//! final errors are rethrown unchanged.

use crate::core::error::{AiError, ErrorKind, ErrorMapper, RawError};
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Observer invoked before each backoff sleep; must not affect control flow
pub type OnRetry = Arc<dyn Fn(u32, &AiError) + Send + Sync>;

/// Per-error eligibility override
pub type ShouldRetry = Arc<dyn Fn(&AiError, u32) -> bool + Send + Sync>;

/// Immutable retry policy
///
/// `max_attempts = 1` performs the operation once with no retry. Attempt
/// numbering is 1-based.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for the computed backoff
    pub max_delay: Duration,
    /// Exponential growth factor
    pub backoff_multiplier: f64,
    /// Whether to randomize delays to desynchronize concurrent callers
    pub jitter: bool,
    /// Kinds eligible for retry
    pub retryable_kinds: HashSet<ErrorKind>,
    should_retry: Option<ShouldRetry>,
}

impl RetryPolicy {
    /// Create a policy with the default kind set and no override
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
        jitter: bool,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff_multiplier,
            jitter,
            retryable_kinds: Self::default_retryable_kinds(),
            should_retry: None,
        }
    }

    /// Default retryable kinds: the transient transport and provider faults
    pub fn default_retryable_kinds() -> HashSet<ErrorKind> {
        [
            ErrorKind::RateLimit,
            ErrorKind::ServiceUnavailable,
            ErrorKind::Timeout,
            ErrorKind::Network,
            ErrorKind::Streaming,
        ]
        .into_iter()
        .collect()
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Fewer, slower attempts for expensive operations
    pub fn conservative() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            ..Self::default()
        }
    }

    /// Many fast attempts for cheap operations
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.2,
            ..Self::default()
        }
    }

    /// Provider-tuned policy
    ///
    /// Anthropic's overload responses benefit from a longer initial
    /// backoff; everyone else gets the default curve.
    pub fn for_provider(provider: &str) -> Self {
        match provider {
            "anthropic" => Self {
                base_delay: Duration::from_millis(250),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }

    /// Install an eligibility override consulted instead of the kind set
    pub fn with_should_retry(
        mut self,
        f: impl Fn(&AiError, u32) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Some(Arc::new(f));
        self
    }

    /// Replace the retryable kind set
    pub fn with_retryable_kinds(mut self, kinds: HashSet<ErrorKind>) -> Self {
        self.retryable_kinds = kinds;
        self
    }

    /// Whether the given error is eligible for another attempt
    pub fn should_retry(&self, error: &AiError, attempt: u32) -> bool {
        if let Some(f) = &self.should_retry {
            return f(error, attempt);
        }
        error.is_retryable() && self.retryable_kinds.contains(&error.kind)
    }

    /// Deterministic backoff for an attempt, before jitter and hints
    ///
    /// `min(base × multiplier^(attempt-1), max_delay)` with 1-based attempts.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_kinds: Self::default_retryable_kinds(),
            should_retry: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("jitter", &self.jitter)
            .field("retryable_kinds", &self.retryable_kinds)
            .finish()
    }
}

/// Executes operations under a retry policy
pub struct RetryExecutor {
    policy: RetryPolicy,
    mapper: Arc<ErrorMapper>,
    on_retry: Option<OnRetry>,
}

impl RetryExecutor {
    /// Create an executor for the given policy
    pub fn new(policy: RetryPolicy, mapper: Arc<ErrorMapper>) -> Self {
        Self {
            policy,
            mapper,
            on_retry: None,
        }
    }

    /// Install an observer fired before each backoff sleep
    pub fn with_on_retry(mut self, f: impl Fn(u32, &AiError) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }

    /// The policy this executor runs
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `op` with bounded attempts
    ///
    /// `op` receives the 1-based attempt number. The backoff sleep is the
    /// only suspension point between attempts; dropping the returned future
    /// cancels the in-flight attempt and any pending sleep.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        service: &str,
        mut op: F,
    ) -> Result<T, AiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(provider, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(raw) => {
                    let err = self.mapper.map_error(raw, provider, service, None);

                    if attempt >= max_attempts {
                        error!(provider, attempt, kind = %err.kind, "retries exhausted: {err}");
                        return Err(err);
                    }
                    if !self.policy.should_retry(&err, attempt) {
                        warn!(provider, attempt, kind = %err.kind, "error not retryable: {err}");
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt, &err);
                    debug!(
                        provider,
                        attempt,
                        kind = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    if let Some(on_retry) = &self.on_retry {
                        on_retry(attempt, &err);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Delay before the attempt following `attempt`
    ///
    /// Jitter scales the computed backoff by a uniform factor in [0.5, 1.0).
    /// A provider retry-after hint is a floor: the final delay is never
    /// shorter than the hint.
    fn delay_for(&self, attempt: u32, error: &AiError) -> Duration {
        let mut delay = self.policy.backoff_for_attempt(attempt);
        if self.policy.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.0);
            delay = Duration::from_millis((delay.as_millis() as f64 * factor) as u64);
        }
        if let Some(hint_secs) = error.retry_after_secs {
            delay = delay.max(Duration::from_millis(hint_secs.saturating_mul(1000)));
        }
        delay
    }
}
