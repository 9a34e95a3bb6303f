//! Retry with exponential backoff and jitter, adapted from
//! `resilience::retry::RetryExecutor`, scaled to this engine's single use
//! case (retrying a model backend call a bounded number of times before
//! falling through to the next backend in the chain).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

/// Whether a failure is worth retrying within the same backend, or should
/// fall through to the next backend immediately without consuming retry
/// budget. A backend returning a non-retriable error (bad auth, malformed
/// response, client error) is not going to start working on a second try.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for String {
    fn is_retriable(&self) -> bool {
        true
    }
}

pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` up to `max_attempts` times, sleeping with jittered
    /// exponential backoff between attempts. Returns the last error once
    /// attempts are exhausted, or immediately once a non-retriable error is
    /// returned.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display + Retriable,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retriable() {
                        warn!(attempt, %error, "non-retriable failure, not retrying");
                        return Err(error);
                    }
                    if attempt >= self.config.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "retrying after failure");
                    sleep(delay).await;
                }
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.config.max_delay_ms as f64);
        let jitter_range = capped * self.config.jitter_factor;
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range.max(0.0));
        Duration::from_millis((capped - jitter).max(0.0) as u64)
    }
}
