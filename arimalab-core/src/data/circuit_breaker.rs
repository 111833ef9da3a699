//! Circuit breaker for a single price source.
//!
//! When a source returns HTTP 403 or keeps failing, the breaker opens and
//! the orchestrator's later calls skip that source until the cooldown
//! (default 30 minutes) has elapsed.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::provider::FetchError;

/// State of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests are allowed.
    Closed,
    /// Requests are refused until cooldown expires.
    Open { tripped_at: Instant },
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
}

/// Guards one source against being hammered after a ban or repeated errors.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// 30-minute cooldown, trips after 3 consecutive failures.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning is ignored: the state is two plain fields.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if requests are currently allowed.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.cooldown {
                    inner.state = BreakerState::Closed;
                    inner.consecutive_failures = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.lock().consecutive_failures = 0;
    }

    /// Count a failure and open the breaker once the threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.state = BreakerState::Open {
                tripped_at: Instant::now(),
            };
        }
    }

    /// Open immediately (HTTP 403).
    pub fn trip(&self) {
        self.lock().state = BreakerState::Open {
            tripped_at: Instant::now(),
        };
    }

    /// Update the breaker from a single-request fetch: 403 trips it, network
    /// errors, 429 and 5xx count as failures, success resets the count.
    /// Other errors (parse, empty, 4xx) say nothing about availability.
    pub fn record_outcome<T>(&self, outcome: &Result<T, FetchError>) {
        match outcome {
            Ok(_) => self.record_success(),
            Err(FetchError::Http { status: 403, .. }) => self.trip(),
            Err(FetchError::Http { status, .. }) if *status >= 500 => self.record_failure(),
            Err(FetchError::Network(_) | FetchError::RateLimited { .. }) => self.record_failure(),
            Err(_) => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::default_provider()
    }
}
