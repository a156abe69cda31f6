//! Unified error handling for tally-core

use thiserror::Error;

/// Core error type for tally-core
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid limits or thresholds. Raised at construction, never recovered.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The quota refused the call and no fallback was supplied.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Ledger or dedup-marker read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No secret is available and there is no interactive path to get one
    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    /// A single connect, auth or send attempt failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport, auth or send failure after all retries
    #[error("Delivery failed after {attempts} attempt(s): {message}")]
    Delivery { attempts: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for tally-core
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a quota-exceeded error
    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Error::QuotaExceeded(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    /// Create a credentials-unavailable error
    pub fn credentials_unavailable(msg: impl Into<String>) -> Self {
        Error::CredentialsUnavailable(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(attempts: u32, msg: impl Into<String>) -> Self {
        Error::Delivery {
            attempts,
            message: msg.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether retrying the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("monthly_limit must be at least 1");
        assert_eq!(
            err.to_string(),
            "Configuration error: monthly_limit must be at least 1"
        );
    }

    #[test]
    fn test_delivery_error_display() {
        let err = Error::delivery(3, "connection refused");
        assert_eq!(
            err.to_string(),
            "Delivery failed after 3 attempt(s): connection refused"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_transport_error_is_transient() {
        assert!(Error::transport("454 try again later").is_transient());
        assert!(!Error::delivery(3, "gave up").is_transient());
    }

    #[test]
    fn test_credentials_error_is_not_transient() {
        assert!(!Error::credentials_unavailable("no secret").is_transient());
        assert!(!Error::quota_exceeded("API quota reached!").is_transient());
    }
}
