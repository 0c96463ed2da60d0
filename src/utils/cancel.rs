//! Cancellation utilities
//!
//! Provides first-class cancellation handles for streams, retry waits and
//! pacing waits.

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a new, not yet cancelled handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Streams and waits observing this handle stop as
    /// soon as possible; dropping the stream closes the HTTP connection so the
    /// provider stops generating tokens.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Child handle cancelled together with this one.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Fail fast with `LlmError::Cancelled` when cancellation was requested.
    pub fn check(&self) -> Result<(), LlmError> {
        if self.is_cancelled() {
            Err(LlmError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl From<CancellationToken> for CancelHandle {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

/// Sleep for `duration` unless cancelled first.
pub async fn sleep_cancellable(
    duration: std::time::Duration,
    cancel: &CancelHandle,
) -> Result<(), LlmError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn child_follows_parent() {
        let parent = CancelHandle::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.check(), Err(LlmError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_aborts_on_cancel() {
        let handle = CancelHandle::new();
        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let started = tokio::time::Instant::now();
        let res = sleep_cancellable(Duration::from_secs(60), &handle).await;
        assert!(matches!(res, Err(LlmError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
