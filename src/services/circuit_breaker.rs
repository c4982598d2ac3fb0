//! Circuit breaker guarding calls to the payment gateway.
//!
//! After `failure_threshold` consecutive failures the breaker opens and
//! rejects calls outright. Once `timeout` has elapsed one trial call is let
//! through (half-open); its outcome closes or re-opens the breaker. A trial
//! that never reports back (its future was dropped) stops blocking once
//! another `timeout` has passed, and the next caller becomes the trial.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    /// When the breaker opened, or when the current trial was let through.
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the next call may go out. Moves an expired `Open` breaker to
    /// `HalfOpen`, and hands a stale `HalfOpen` trial to the caller.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == CircuitState::Closed {
            return true;
        }

        let expired = inner
            .opened_at
            .map_or(true, |at| at.elapsed() >= self.timeout);
        if !expired {
            return false;
        }
        match inner.state {
            CircuitState::Open => info!("Circuit breaker transitioning to HalfOpen state"),
            _ => warn!("Circuit breaker trial call never finished, allowing a new trial"),
        }
        inner.state = CircuitState::HalfOpen;
        inner.opened_at = Some(Instant::now());
        true
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered, transitioning to Closed state");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        match inner.state {
            CircuitState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(
                    failures = inner.consecutive_failures,
                    threshold = self.failure_threshold,
                    "Circuit breaker OPENED"
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit breaker trial call failed, returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }
}
