//! Circuit breaker, adapted from `resilience::circuit_breaker::CircuitBreaker`.
//! Trips open after `failure_threshold` consecutive failures, stays open for
//! `reset_timeout`, then allows one half-open probe before fully closing.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl CircuitState {
    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "backend".to_string(),
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// A single backend's circuit breaker. Call [`CircuitBreaker::allow`] before
/// attempting an operation; report the outcome with
/// [`CircuitBreaker::record_success`] / [`CircuitBreaker::record_failure`].
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    next_attempt: RwLock<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            next_attempt: RwLock::new(Instant::now()),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    /// Whether a call should be attempted right now. Transitions Open ->
    /// HalfOpen once the reset timeout has elapsed.
    pub fn allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if Instant::now() >= *self.next_attempt.read() {
                    self.state.store(CircuitState::HalfOpen.as_u8(), Ordering::SeqCst);
                    info!(backend = %self.config.name, "circuit breaker entering half-open");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold {
                    self.close();
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => self.open(),
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self) {
        self.state.store(CircuitState::Open.as_u8(), Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        *self.next_attempt.write() = Instant::now() + self.config.reset_timeout;
        warn!(backend = %self.config.name, "circuit breaker open");
    }

    fn close(&self) {
        self.state.store(CircuitState::Closed.as_u8(), Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        info!(backend = %self.config.name, "circuit breaker closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cb() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            name: "test".into(),
            failure_threshold: 2,
            success_threshold: 1,
            reset_timeout: Duration::from_millis(10),
        })
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = cb();
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[tokio::test]
    async fn half_opens_after_reset_timeout_then_closes_on_success() {
        let breaker = cb();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = cb();
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
