use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Per-call runtime context
///
/// Carries the single cancellation token that aborts the HTTP request,
/// any in-progress stream read, and every remaining emulation step.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
}

impl CallContext {
    /// Context that is never cancelled unless [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an existing token (e.g. a child of a server shutdown token)
    pub const fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    /// Cancel the call this context belongs to
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The underlying token
    pub const fn token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fail fast if the call was already cancelled
    pub(crate) fn check(&self) -> Result<(), LlmError> {
        if self.is_cancelled() {
            Err(LlmError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Race a fallible future against cancellation
    pub(crate) async fn guard<T, F>(&self, future: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(LlmError::Cancelled),
            result = future => result,
        }
    }
}
