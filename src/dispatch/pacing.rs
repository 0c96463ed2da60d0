//! Inter-request pacing
//!
//! When a delay is configured, requests are serialized: each one waits until
//! `delay` has passed since the previous request completed, and holds a permit
//! until its own stream is finished or dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::error::LlmError;
use crate::utils::cancel::{CancelHandle, sleep_cancellable};

#[derive(Debug, Clone, Default)]
pub struct RequestPacer {
    last_completion: Arc<Mutex<Option<Instant>>>,
}

/// Held for the lifetime of a paced request; records the completion instant on drop.
#[derive(Debug)]
pub struct PacePermit {
    guard: OwnedMutexGuard<Option<Instant>>,
}

impl Drop for PacePermit {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}

impl RequestPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the previous paced request and the remaining delay window.
    pub async fn acquire(&self, delay: Duration, cancel: &CancelHandle) -> Result<PacePermit, LlmError> {
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            guard = self.last_completion.clone().lock_owned() => guard,
        };

        if let Some(last) = *guard {
            let ready_at = last + delay;
            let now = Instant::now();
            if ready_at > now {
                let wait = ready_at - now;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "pacing request start");
                sleep_cancellable(wait, cancel).await?;
            }
        }
        Ok(PacePermit { guard })
    }

    /// Completion instant of the last paced request, if any.
    pub async fn last_completion(&self) -> Option<Instant> {
        *self.last_completion.lock().await
    }
}
