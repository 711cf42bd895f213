//! Loader error types

use std::time::Duration;

use thiserror::Error;

/// Errors a loader can report for a single request
///
/// These never surface through the preheater; they travel on the event bus
/// as `TaskFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not cached and loading is disallowed: {url}")]
    NotCached { url: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Processor '{processor}' failed")]
    Processing { processor: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl LoadError {
    /// Check if retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Network(_) => true,
            LoadError::Timeout(_) => true,
            LoadError::NotCached { .. } => false,
            LoadError::Decode(_) => false,
            LoadError::Processing { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LoadError::Network("reset".to_string()).is_retryable());
        assert!(LoadError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!LoadError::Decode("bad header".to_string()).is_retryable());
        assert!(
            !LoadError::Processing {
                processor: "blur".to_string()
            }
            .is_retryable()
        );
        assert!(
            !LoadError::NotCached {
                url: "http://a".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = LoadError::Processing {
            processor: "resize".to_string(),
        };
        assert_eq!(err.to_string(), "Processor 'resize' failed");
    }
}
