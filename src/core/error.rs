//! Error type system for the scene tagger
//!
//! This module provides the error taxonomy used across the orchestrator:
//! - Transport failures and structured remote error lists
//! - Configuration and validation failures
//! - Error context and chaining support
//! - Error classification helpers used when reporting to the user

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Main error type for the scene tagger
#[derive(Debug, thiserror::Error)]
pub enum TaggerError {
    // System-level errors
    #[error("System initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Remote API errors
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A GraphQL-style response that carried a list of errors
    #[error("{}", .0.join(", "))]
    RemoteError(Vec<String>),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    // Source-related errors
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("No scrape source selected")]
    NoSourceSelected,

    #[error("Operation not supported by source {source_id}: {operation}")]
    UnsupportedOperation { source_id: String, operation: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // I/O errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaggerError {
    /// Get the error type name used in notifications and logs
    pub fn error_type(&self) -> &'static str {
        match self {
            TaggerError::InitializationError(_) => "InitializationError",
            TaggerError::ConfigError(_) => "ConfigError",
            TaggerError::NetworkError(_) => "NetworkError",
            TaggerError::RemoteError(_) => "RemoteError",
            TaggerError::InvalidResponse(_) => "InvalidResponse",
            TaggerError::SourceNotFound(_) => "SourceNotFound",
            TaggerError::NoSourceSelected => "NoSourceSelected",
            TaggerError::UnsupportedOperation { .. } => "UnsupportedOperation",
            TaggerError::NotFound(_) => "NotFound",
            TaggerError::Timeout(_) => "Timeout",
            TaggerError::IoError(_) => "IoError",
            TaggerError::SerializationError(_) => "SerializationError",
            TaggerError::DeserializationError(_) => "DeserializationError",
            TaggerError::ValidationError(_) => "ValidationError",
            TaggerError::Internal(_) => "Internal",
        }
    }

    /// Check if this error is retryable by the caller
    ///
    /// The orchestrator never retries on its own; this only informs the user.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaggerError::NetworkError(_) | TaggerError::Timeout(_)
        )
    }

    /// Whether this error came back from the remote API rather than from
    /// local processing
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            TaggerError::NetworkError(_)
                | TaggerError::RemoteError(_)
                | TaggerError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for TaggerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TaggerError::Timeout(err.to_string())
        } else if err.is_decode() {
            TaggerError::InvalidResponse(err.to_string())
        } else {
            TaggerError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TaggerError {
    fn from(err: serde_json::Error) -> Self {
        TaggerError::DeserializationError(err.to_string())
    }
}

/// Error report structure handed to notification consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Unique trace ID for correlating with logs
    pub trace_id: String,
}

impl ErrorReport {
    /// Create an error report from a TaggerError with a generated trace ID
    pub fn from_error(error: &TaggerError) -> Self {
        Self {
            error: error.error_type().to_string(),
            message: error.to_string(),
            trace_id: Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (trace_id: {})", self.error, self.message, self.trace_id)
    }
}

/// Result type alias for operations that can fail with TaggerError
pub type Result<T> = std::result::Result<T, TaggerError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TaggerError::Internal(format!("{}: {}", context.into(), e)))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TaggerError::Internal(format!("{}: {}", f(), e)))
    }
}
