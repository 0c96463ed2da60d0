//! Retry Mechanism Module
//!
//! Bounded retries for the connection phase of a request. Retries are keyed on
//! the HTTP status embedded in a transport error and wait a fixed interval
//! between attempts.

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::utils::cancel::{CancelHandle, sleep_cancellable};

/// Status codes that are always retryable; configured codes are added to these.
pub const DEFAULT_RETRY_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// When false exactly one attempt is made.
    pub enabled: bool,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub interval_ms: u64,
    /// Additional retryable status codes, unioned with the defaults.
    pub status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            interval_ms: 1000,
            status_codes: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set maximum attempts
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the fixed interval between attempts
    pub const fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Add retryable status codes on top of the defaults
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes.extend(codes);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Attempts the executor will make under this policy.
    pub fn effective_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Default codes unioned with the configured ones, sorted and deduplicated.
    pub fn retryable_status_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = DEFAULT_RETRY_STATUS_CODES
            .iter()
            .copied()
            .chain(self.status_codes.iter().copied())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    /// Check if an error should be retried
    pub fn should_retry(&self, error: &LlmError) -> bool {
        self.enabled && error.is_retryable_with(&self.retryable_status_codes())
    }
}

/// Retry executor that handles the actual retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with retry logic and no cancellation.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        self.execute_cancellable(operation, &CancelHandle::new())
            .await
    }

    /// Execute an operation with retry logic.
    ///
    /// Cancellation aborts both an in-flight attempt and the wait before the
    /// next attempt.
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        mut operation: F,
        cancel: &CancelHandle,
    ) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.policy.effective_attempts();
        let mut interval = Constant::new(self.policy.interval());
        let mut attempt = 1;

        loop {
            cancel.check()?;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= max_attempts || !self.policy.should_retry(&error) {
                return Err(error);
            }

            let delay = interval
                .next_backoff()
                .unwrap_or_else(|| self.policy.interval());
            tracing::warn!(
                attempt,
                max_attempts,
                status = error.status_code(),
                delay_ms = delay.as_millis() as u64,
                "retrying request after transient failure"
            );
            sleep_cancellable(delay, cancel).await?;
            attempt += 1;
        }
    }
}
