//! Error types for feed operations.

use thiserror::Error;

/// Errors that can occur while fetching the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP transport failed: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No HTTP clients configured")]
    NoClients,
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else {
            FeedError::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for FeedError {
    fn from(err: url::ParseError) -> Self {
        FeedError::InvalidRequest(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Transport(_) | FeedError::Timeout(_) => true,
            FeedError::Status { status, .. } => *status == 429 || *status >= 500,
            FeedError::InvalidProxy(_) | FeedError::InvalidRequest(_) | FeedError::NoClients => {
                false
            }
        }
    }
}
