// Model call errors.
//
// Callers branch on these: rate limits abandon the retry loop immediately,
// everything else except Unavailable is worth another attempt.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model provider rate limited the request")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model transport failed: {0}")]
    Transport(String),

    #[error("model returned an empty reply")]
    EmptyReply,

    #[error("no moderation model is configured")]
    Unavailable,
}

impl ModelError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        if status == 429 {
            ModelError::RateLimited { retry_after }
        } else {
            ModelError::Status { status, body }
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ModelError::RateLimited { .. })
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ModelError::RateLimited { .. } | ModelError::Unavailable)
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ModelError::Timeout(Duration::ZERO);
        }
        match err.status() {
            Some(status) => ModelError::from_status(status.as_u16(), err.to_string(), None),
            None => ModelError::Transport(err.to_string()),
        }
    }
}
