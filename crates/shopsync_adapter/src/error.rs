//! Error types for platform adapters.

use thiserror::Error;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors that can occur while talking to a platform.
///
/// Value-level refusals (`NotFound`, `Rejected`, rate limits) are not errors;
/// they are [`ApplyOutcome`](crate::ApplyOutcome) variants. An `AdapterError`
/// means the call itself could not be carried out.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Network or transport failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The platform rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The call exceeded its timeout budget.
    #[error("operation timed out")]
    Timeout,
}

impl AdapterError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Transport { retryable, .. } => *retryable,
            AdapterError::Timeout => true,
            AdapterError::Authentication(_) | AdapterError::Protocol(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(AdapterError::transport_retryable("503").is_retryable());
        assert!(AdapterError::Timeout.is_retryable());
        assert!(!AdapterError::transport_fatal("tls failure").is_retryable());
        assert!(!AdapterError::Authentication("bad token".into()).is_retryable());
        assert!(!AdapterError::Protocol("not json".into()).is_retryable());
    }
}
