use std::future::Future;
use std::time::Duration;

use crate::error::{PipelineError, Result};

/// Bounded retry with a fixed backoff between attempts. No jitter, no
/// exponential growth: the loader's contract is 1 initial attempt plus
/// `max_retries` retries, pausing `backoff` between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Policy with no backoff, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `operation` until it succeeds or attempts are exhausted,
    /// returning the last error.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err: Option<PipelineError> = None;

        for attempt in 1..=self.max_attempts() {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        "attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts(),
                        e
                    );
                    last_err = Some(e);
                    if attempt < self.max_attempts() && !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PipelineError::Config("retry policy ran zero attempts".to_string())
        }))
    }
}
