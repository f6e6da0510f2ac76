//! Error types for sessions and external collaborators.
//!
//! `ProviderError` lives here rather than in `proctor-providers` so the
//! session can classify grader failures without string matching.

use thiserror::Error;

use crate::clock::Phase;

/// Errors returned by an exam session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session reached a terminal phase; nothing more is accepted.
    #[error("session is {0}; no further changes or submissions are accepted")]
    Terminal(Phase),

    /// A submission is being assembled; answers are frozen until it settles.
    #[error("a submission is in progress")]
    Submitting,

    /// The answer references a question that is not part of the exam.
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// Navigation outside the question list.
    #[error("question index {index} out of range (exam has {len} questions)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Saving failed while the session was still open; submitting again may succeed.
    #[error("failed to save submission: {0:#}")]
    Persistence(anyhow::Error),

    /// Saving failed after the session had already ended; no retry is possible.
    #[error("failed to save submission after the session {phase}: {cause:#}")]
    PersistenceAfterEnd { phase: Phase, cause: anyhow::Error },
}

impl SessionError {
    /// Returns `true` if the same operation may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Persistence(_) | SessionError::Submitting)
    }
}

/// Errors that can occur when talking to an essay grading backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The model answered, but not with the feedback structure we asked for.
    #[error("malformed grader output: {0}")]
    MalformedOutput(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(SessionError::Persistence(anyhow::anyhow!("disk full")).is_retryable());
        assert!(!SessionError::Terminal(Phase::Ended).is_retryable());
        assert!(!SessionError::PersistenceAfterEnd {
            phase: Phase::Ended,
            cause: anyhow::anyhow!("disk full"),
        }
        .is_retryable());
    }

    #[test]
    fn provider_error_classification() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(!ProviderError::Timeout(30).is_permanent());
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_ms: 5000
            }
            .retry_after_ms(),
            Some(5000)
        );
        assert_eq!(ProviderError::NetworkError("x".into()).retry_after_ms(), None);
    }

    #[test]
    fn terminal_message_names_phase() {
        let msg = SessionError::Terminal(Phase::Prevented).to_string();
        assert!(msg.contains("prevented"), "got: {msg}");
    }
}
