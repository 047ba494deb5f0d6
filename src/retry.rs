//! Retry policy for embedding and retrieval calls
//!
//! Bounded, constant-backoff retries:
//! - Default: 2 attempts (one retry) with 250ms between them
//! - Only transient errors ([`RagError::is_transient`]) are retried
//! - The last error is surfaced unchanged once attempts run out
//!
//! Generation is never wrapped in this policy: streamed output is not
//! idempotent once a chunk has reached the caller.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::errors::Result;
use crate::telemetry::{PipelineEvent, PipelineTelemetry};

/// Retry policy with constant backoff
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    max_attempts: u32,

    /// Delay between attempts
    backoff: Duration,

    telemetry: Option<PipelineTelemetry>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a policy with explicit settings
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            telemetry: None,
        }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Report retry attempts to a telemetry collector
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Execute operation, retrying transient failures
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;

        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        backoff_ms = self.backoff.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.record(PipelineEvent::RetryAttempt {
                            operation: operation.to_string(),
                            attempt,
                            timestamp: Instant::now(),
                        });
                    }

                    sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get backoff
    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}
