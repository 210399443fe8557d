use std::time::Duration;

use thiserror::Error;

/// Fallback shown when a failure carries no message of its own.
pub const GENERIC_FAILURE: &str = "Download failed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    /// Transport failures, malformed responses and errors reported by the service.
    /// Server-supplied messages are carried verbatim.
    #[error("{0}")]
    Upstream(String),

    #[error("No progress received for {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),
}

impl AppError {
    /// Message to put in front of the user.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            GENERIC_FAILURE.to_string()
        } else {
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_is_verbatim() {
        let err = AppError::Upstream("unsupported url".to_string());
        assert_eq!(err.user_message(), "unsupported url");
    }

    #[test]
    fn test_empty_message_falls_back() {
        let err = AppError::Upstream(String::new());
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }

    #[test]
    fn test_timeout_message() {
        let err = AppError::Timeout(Duration::from_secs(30));
        assert_eq!(err.user_message(), "No progress received for 30 seconds");
    }
}
