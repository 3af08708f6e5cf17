//! Job processing error types.

use thiserror::Error;

/// Result type alias using `JobError`.
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors raised by webhook and sync processing.
#[derive(Debug, Error)]
pub enum JobError {
    /// Remote Genesis API call failed. Retryable.
    #[error("remote call failed: {message}")]
    RemoteCall {
        /// What went wrong, suitable for the log row's error_message.
        message: String,
    },

    /// A webhook handler reported a transient failure. Retryable.
    #[error("handler failed: {message}")]
    Handler {
        /// Failure detail from the handler.
        message: String,
    },

    /// Retry budget exhausted; the job will not run again.
    #[error("permanently failed after {attempts} attempts: {message}")]
    PermanentFailure {
        /// Attempts consumed before giving up.
        attempts: i32,
        /// Last failure detail.
        message: String,
    },

    /// The operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The job queue has been closed for shutdown.
    #[error("job queue closed")]
    QueueClosed,

    /// Workers did not stop within the shutdown timeout.
    #[error("shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// How long shutdown waited before giving up.
        timeout: std::time::Duration,
    },

    /// Underlying storage failure.
    #[error(transparent)]
    Core(#[from] genesis_core::CoreError),
}

impl JobError {
    /// Whether this failure should be retried with backoff.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteCall { .. } | Self::Handler { .. })
    }

    /// Convenience constructor for remote call failures.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteCall { message: message.into() }
    }

    /// Convenience constructor for handler failures.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_identified() {
        assert!(JobError::remote("timeout").is_retryable());
        assert!(JobError::handler("flaky downstream").is_retryable());
        assert!(!JobError::Cancelled.is_retryable());
        assert!(!JobError::QueueClosed.is_retryable());
        assert!(
            !JobError::PermanentFailure { attempts: 3, message: "gone".into() }.is_retryable()
        );
    }
}
