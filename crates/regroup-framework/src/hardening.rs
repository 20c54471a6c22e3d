//! Retry and rate limiting around remote calls
//!
//! The composition is fixed: retry-with-backoff on the outside, the in-flight
//! gate inside it, the raw call innermost. A retried attempt therefore queues
//! for the gate again instead of holding a slot while it sleeps.
//!
//! # Example
//!
//! ```rust,ignore
//! let deletes = Hardened::new(RetryConfig::default(), RateLimiter::new("delete", 5));
//! deletes.call("delete group", || api.delete(&id))?;
//! ```

use parking_lot::{Condvar, Mutex};
use rand::Rng;
use regroup_sdk::ApiError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Errors that can tell whether retrying might help
pub trait Transient {
    /// Check if the failure may clear up on its own
    fn is_transient(&self) -> bool;
}

impl Transient for ApiError {
    fn is_transient(&self) -> bool {
        ApiError::is_transient(self)
    }
}

/// Backoff policy for transient failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one (at least one)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Ceiling for the delay between attempts
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with a different attempt budget
    #[must_use]
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Self::default()
        }
    }

    /// Millisecond-scale delays, for simulated backends
    #[must_use]
    pub fn fast(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    /// Delay following `delay`, capped at `max_delay`
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget runs out; the last error is returned on exhaustion
pub fn retried<T, E, F>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Transient + fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "operation failed after max retries"
                    );
                    return Err(e);
                }

                // 0.5x..1.5x jitter
                let jitter = rand::rng().random_range(0.5..1.5);
                let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = jittered.as_millis(),
                    "transient failure, retrying"
                );
                std::thread::sleep(jittered);

                delay = config.next_delay(delay);
            }
        }
    }
}

/// Ceiling on concurrently running requests of one kind
///
/// Callers over the ceiling block until a slot frees up.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    max_in_flight: usize,
    in_flight: Mutex<usize>,
    released: Condvar,
}

impl RateLimiter {
    /// Gate named `name` admitting `max_in_flight` callers at once
    #[must_use]
    pub fn new(name: impl Into<String>, max_in_flight: usize) -> Self {
        Self {
            name: name.into(),
            max_in_flight: max_in_flight.max(1),
            in_flight: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Gate name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured ceiling
    #[inline]
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Requests currently inside the gate
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Block until a slot is free, then run `f` inside it
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _permit = self.acquire();
        f()
    }

    fn acquire(&self) -> Permit<'_> {
        let mut in_flight = self.in_flight.lock();
        while *in_flight >= self.max_in_flight {
            self.released.wait(&mut in_flight);
        }
        *in_flight += 1;
        Permit { limiter: self }
    }
}

struct Permit<'a> {
    limiter: &'a RateLimiter,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.limiter.in_flight.lock();
        *in_flight -= 1;
        self.limiter.released.notify_one();
    }
}

/// Retry policy plus rate gate for one kind of remote call
#[derive(Debug, Clone)]
pub struct Hardened {
    retry: RetryConfig,
    limiter: Arc<RateLimiter>,
}

impl Hardened {
    /// Combine `retry` with `limiter`
    #[must_use]
    pub fn new(retry: RetryConfig, limiter: RateLimiter) -> Self {
        Self {
            retry,
            limiter: Arc::new(limiter),
        }
    }

    /// Underlying gate
    #[inline]
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Retry `operation` with each attempt passing through the gate
    pub fn call<T, E, F>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Transient + fmt::Display,
    {
        retried(&self.retry, operation_name, || self.limiter.run(&mut operation))
    }
}
