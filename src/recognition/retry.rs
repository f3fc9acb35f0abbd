//! Generic retry-with-backoff policy

use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Default number of attempts
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Growth factor between consecutive delays
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Resilient invocation policy for fallible operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Delay multiplier per failed attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.multiplier.is_finite() {
            self.multiplier.max(0.0).powi(attempt as i32)
        } else {
            1.0
        };
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX)
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error on exhaustion.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        self.run_while(op, |_| true)
    }

    /// Like [`RetryPolicy::run`], but stops early on errors `retryable` refuses
    pub fn run_while<T, E, F, P>(&self, mut op: F, retryable: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let last = attempt + 1 >= attempts;
                    if last || !retryable(&e) {
                        return Err(e);
                    }
                    let wait = self.delay_for(attempt);
                    warn!(
                        "attempt {}/{} failed: {}; retrying in {:.1}s",
                        attempt + 1,
                        attempts,
                        e,
                        wait.as_secs_f32()
                    );
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
