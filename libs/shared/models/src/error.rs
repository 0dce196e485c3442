use std::time::Duration;

use thiserror::Error;

/// Failure talking to a persistence backend.
///
/// A `Timeout` says nothing about whether the write landed; callers must
/// re-read before retrying.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store request failed: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Store returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Transport(_) => true,
            StoreError::Backend { status, .. } => *status >= 500 || *status == 429,
            StoreError::Auth(_) | StoreError::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(StoreError::Transport("connection reset".to_string()).is_retryable());
        assert!(StoreError::Backend { status: 503, message: String::new() }.is_retryable());
        assert!(StoreError::Backend { status: 429, message: String::new() }.is_retryable());
        assert!(!StoreError::Backend { status: 409, message: String::new() }.is_retryable());
        assert!(!StoreError::Auth("expired".to_string()).is_retryable());
    }
}
