//! Error taxonomy for the job card client.
//!
//! Validation errors are raised before any network call. Transport errors
//! distinguish timeouts from everything else. Any non-2xx response is a
//! rejection carrying the server's message when it sent one.

use thiserror::Error;

/// Fallback shown when the server rejects a request without a message.
pub const GENERIC_REJECTION: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("The request timed out. Please check your connection and try again.")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Photo error: {0}")]
    Photo(String),

    #[error("A submission is already in progress")]
    Busy,

    #[error("Request cancelled")]
    Cancelled,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Text for the blocking alert dialog.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } if message.trim().is_empty() => {
                GENERIC_REJECTION.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if err.is_connect() {
            return Self::Network("cannot reach the garage server".into());
        }
        if err.is_builder() {
            return Self::NotConfigured(format!("invalid request: {err}"));
        }
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<keyring::Error> for AppError {
    fn from(err: keyring::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        Self::Photo(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_with_empty_message_falls_back() {
        let err = AppError::Rejected {
            status: 500,
            message: "  ".into(),
        };
        assert_eq!(err.user_message(), GENERIC_REJECTION);
    }

    #[test]
    fn test_rejection_shows_server_message() {
        let err = AppError::Rejected {
            status: 422,
            message: "Plate number already registered".into(),
        };
        assert_eq!(err.user_message(), "Plate number already registered");
    }

    #[test]
    fn test_timeout_has_distinct_message() {
        let timeout = AppError::Timeout.user_message();
        let network = AppError::Network("connection reset".into()).user_message();
        assert!(timeout.contains("timed out"));
        assert_ne!(timeout, network);
    }
}
