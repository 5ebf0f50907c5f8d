//! Error types for the plugin host
//!
//! Module defines all error types that can occur while managing plugin
//! packages and their lifecycle, providing structured error handling
//! with detailed context.

use thiserror::Error;

/// The main error type for the plugin host
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Storage I/O errors (disk full, permission denied, missing directory)
    #[error("Storage error: {0}")]
    Storage(String),

    /// The package is unreadable, missing required metadata, or malformed
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// No plugin registered under the given id
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// The requested transition is not valid from the plugin's current state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A load or start attempt left the plugin non-functional
    #[error("Plugin failed: {0}")]
    Failed(String),

    /// Missing or mismatched bearer token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The host is draining; no new lifecycle operations are accepted
    #[error("Shutting down")]
    ShuttingDown,

    /// A calling layer abandoned its wait on an in-flight operation
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration errors (bad port, unreadable environment)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual From implementation since io::Error doesn't implement Clone
impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError::Storage(err.to_string())
    }
}

/// Result type alias for plugin host operations
pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }

    /// Create a new invalid-package error
    pub fn invalid_package<S: Into<String>>(message: S) -> Self {
        Self::InvalidPackage(message.into())
    }

    /// Create a new not-found error for a plugin id
    pub fn not_found<S: Into<String>>(plugin_id: S) -> Self {
        Self::NotFound(plugin_id.into())
    }

    /// Create a new illegal-state error
    pub fn illegal_state<S: Into<String>>(message: S) -> Self {
        Self::IllegalState(message.into())
    }

    /// Create a new failed error
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed(message.into())
    }

    /// Create a new unauthorized error
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is safe to retry blindly
    ///
    /// Replace-in-place load semantics make `load` retries safe; `start`
    /// retries are not, since a prior partial failure leaves the entry
    /// in `Failed` and requires a fresh load.
    pub fn is_retryable(&self) -> bool {
        match self {
            HostError::Storage(_) => true,
            HostError::Timeout(_) => true,
            HostError::InvalidPackage(_) => false,
            HostError::NotFound(_) => false,
            HostError::IllegalState(_) => false,
            HostError::Failed(_) => false,
            HostError::Unauthorized(_) => false,
            HostError::ShuttingDown => false,
            HostError::Config(_) => false,
            HostError::Internal(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HostError::Storage(_) => "storage",
            HostError::InvalidPackage(_) => "invalid_package",
            HostError::NotFound(_) => "not_found",
            HostError::IllegalState(_) => "illegal_state",
            HostError::Failed(_) => "failed",
            HostError::Unauthorized(_) => "auth",
            HostError::ShuttingDown => "shutting_down",
            HostError::Timeout(_) => "timeout",
            HostError::Config(_) => "config",
            HostError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = HostError::storage("disk full");
        assert_eq!(error.to_string(), "Storage error: disk full");
        assert_eq!(error.category(), "storage");
        assert!(error.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(HostError::not_found("sample").category(), "not_found");
        assert_eq!(
            HostError::illegal_state("must stop before unload").category(),
            "illegal_state"
        );
        assert_eq!(HostError::ShuttingDown.category(), "shutting_down");
    }

    #[test]
    fn test_retry_policy() {
        assert!(!HostError::failed("start hook panicked").is_retryable());
        assert!(!HostError::invalid_package("truncated").is_retryable());
        assert!(HostError::Timeout("caller gave up".into()).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: HostError = io.into();
        assert!(matches!(err, HostError::Storage(_)));
    }

    #[test]
    fn test_helper_constructors_match_variants() {
        assert!(matches!(
            HostError::unauthorized("bad token"),
            HostError::Unauthorized(_)
        ));
        assert!(matches!(
            HostError::internal("broken invariant"),
            HostError::Internal(_)
        ));
    }
}
