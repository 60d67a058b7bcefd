//! Per-(provider, service) circuit breaker
//!
//! Closed/open/half-open state machine over a bounded ring of recent
//! results. All transitions happen inside `execute()` under a single mutex
//! guarding the whole read-modify-write; the lock is never held across the
//! awaited operation.

use crate::core::error::{AiError, ErrorKind};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Ring buffer hard cap
const RING_CAP: usize = 50;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests fail fast
    Open,
    /// Limited probing after the reset timeout
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Counting failures before the circuit may open
    pub failure_threshold: u32,
    /// Requests observed before failure rate is evaluated
    pub min_requests: u32,
    /// Time the circuit stays open before probing
    pub reset_timeout: Duration,
    /// Successful probes required to close from half-open
    pub half_open_max_attempts: u32,
    /// Error kinds that count as failures; everything else is recorded as a
    /// success so a caller mistake cannot trip a transient-fault detector
    pub failure_kinds: HashSet<ErrorKind>,
}

impl CircuitBreakerConfig {
    /// Kinds that indicate provider health problems
    pub fn default_failure_kinds() -> HashSet<ErrorKind> {
        [
            ErrorKind::RateLimit,
            ErrorKind::ServiceUnavailable,
            ErrorKind::Timeout,
            ErrorKind::Network,
            ErrorKind::Streaming,
            ErrorKind::Provider,
        ]
        .into_iter()
        .collect()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            min_requests: 10,
            reset_timeout: Duration::from_secs(60),
            half_open_max_attempts: 3,
            failure_kinds: Self::default_failure_kinds(),
        }
    }
}

/// Point-in-time breaker metrics
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    /// Current state
    pub state: CircuitState,
    /// Counting failures in the current window
    pub failure_count: u32,
    /// Successful probes while half-open
    pub success_count: u32,
    /// Requests observed in the current window
    pub total_requests: u32,
    /// Failure share of the ring buffer, 0.0 when empty
    pub failure_rate: f64,
    /// Success share of the ring buffer, 1.0 when empty
    pub success_rate: f64,
    /// Time until the next probe is allowed, while open
    pub time_until_retry: Option<Duration>,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u32,
    recent: VecDeque<bool>,
    next_retry_at: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            recent: VecDeque::new(),
            next_retry_at: None,
        }
    }

    fn reset_window(&mut self) {
        self.failure_count = 0;
        self.success_count = 0;
        self.total_requests = 0;
        self.recent.clear();
    }

    fn ring_failure_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let failures = self.recent.iter().filter(|ok| !**ok).count();
        failures as f64 / self.recent.len() as f64
    }
}

/// A breaker guarding one (provider, service) pair
pub struct CircuitBreaker {
    provider: String,
    service: String,
    config: CircuitBreakerConfig,
    ring_capacity: usize,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker for a (provider, service) pair
    pub fn new(
        provider: impl Into<String>,
        service: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        let ring_capacity = ((config.min_requests as usize) * 2).clamp(2, RING_CAP);
        Self {
            provider: provider.into(),
            service: service.into(),
            config,
            ring_capacity,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Execute `op` behind the breaker
    ///
    /// While open and before the reset timeout, fails fast with a synthetic
    /// `service_unavailable` error without invoking `op`. The open→half-open
    /// transition is lazy: it happens on the first call at or past
    /// `next_retry_at`, not on a timer.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, AiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AiError>>,
    {
        if let Some(rejection) = self.before_call() {
            return Err(rejection);
        }

        let result = op().await;

        match &result {
            Ok(_) => self.record(None),
            Err(err) => self.record(Some(err.kind)),
        }
        result
    }

    /// Gate check; returns the synthetic rejection while open
    fn before_call(&self) -> Option<AiError> {
        let mut state = self.state.lock();
        match (state.state, state.next_retry_at) {
            (CircuitState::Closed | CircuitState::HalfOpen, _) => None,
            (CircuitState::Open, Some(next_retry_at)) if Instant::now() < next_retry_at => {
                let wait = next_retry_at - Instant::now();
                Some(
                    AiError::service_unavailable(
                        format!(
                            "circuit open for {}/{}; retry in {}s",
                            self.provider,
                            self.service,
                            wait.as_secs().max(1)
                        ),
                        self.provider.clone(),
                        self.service.clone(),
                    )
                    .with_retry_after(Some(wait.as_secs().max(1)))
                    .with_context("circuit", "open"),
                )
            }
            (CircuitState::Open, _) => {
                debug!(
                    provider = %self.provider,
                    service = %self.service,
                    "circuit transitioning open -> half-open"
                );
                state.state = CircuitState::HalfOpen;
                state.success_count = 0;
                state.next_retry_at = None;
                None
            }
        }
    }

    /// Record an observed result; `failure_kind` is `None` on success
    fn record(&self, failure_kind: Option<ErrorKind>) {
        let mut state = self.state.lock();

        // A failure outside failure_kinds is recorded as a success: it says
        // nothing about provider health.
        let counts_as_failure = failure_kind
            .map(|kind| self.config.failure_kinds.contains(&kind))
            .unwrap_or(false);

        state.total_requests = state.total_requests.saturating_add(1);
        if state.recent.len() == self.ring_capacity {
            state.recent.pop_front();
        }
        state.recent.push_back(!counts_as_failure);

        match state.state {
            CircuitState::Closed => {
                if counts_as_failure {
                    state.failure_count += 1;
                    self.maybe_trip(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                if counts_as_failure {
                    warn!(
                        provider = %self.provider,
                        service = %self.service,
                        "probe failed, circuit reopening"
                    );
                    self.open(&mut state);
                } else {
                    state.success_count += 1;
                    if state.success_count >= self.config.half_open_max_attempts {
                        debug!(
                            provider = %self.provider,
                            service = %self.service,
                            "circuit closing after successful probes"
                        );
                        state.state = CircuitState::Closed;
                        state.reset_window();
                        state.next_retry_at = None;
                    }
                }
            }
            // Late result from a call admitted before the circuit opened;
            // the window already tripped, nothing more to decide.
            CircuitState::Open => {}
        }
    }

    fn maybe_trip(&self, state: &mut BreakerState) {
        if state.total_requests < self.config.min_requests {
            return;
        }
        let rate_threshold =
            self.config.failure_threshold as f64 / self.config.min_requests as f64;
        if state.failure_count >= self.config.failure_threshold
            || state.ring_failure_rate() >= rate_threshold
        {
            warn!(
                provider = %self.provider,
                service = %self.service,
                failures = state.failure_count,
                requests = state.total_requests,
                "failure threshold reached, circuit opening"
            );
            self.open(state);
        }
    }

    fn open(&self, state: &mut BreakerState) {
        state.state = CircuitState::Open;
        state.success_count = 0;
        state.next_retry_at = Some(Instant::now() + self.config.reset_timeout);
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        let failure_rate = state.ring_failure_rate();
        CircuitBreakerMetrics {
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            total_requests: state.total_requests,
            failure_rate,
            success_rate: 1.0 - failure_rate,
            time_until_retry: state
                .next_retry_at
                .map(|at| at.saturating_duration_since(Instant::now())),
        }
    }

    /// Operational override: return to closed with fresh counters
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.reset_window();
        state.next_retry_at = None;
        debug!(provider = %self.provider, service = %self.service, "circuit reset");
    }

    /// Operational override: open the circuit now
    pub fn force_open(&self) {
        let mut state = self.state.lock();
        self.open(&mut state);
        warn!(provider = %self.provider, service = %self.service, "circuit forced open");
    }

    /// Operational override: close the circuit now
    pub fn force_close(&self) {
        self.reset();
    }
}
