// Error handling module
// Defines the loader error taxonomy and the query-engine error boundary

use std::time::Duration;
use thiserror::Error;

/// Literal marker Earth Engine puts in error payloads when the bearer token
/// is expired or invalid. Any engine substitution must map its
/// authentication failures onto this marker (or onto
/// [`QueryError::Unauthenticated`] directly).
pub const UNAUTHENTICATED_MARKER: &str = "\"UNAUTHENTICATED\"";

/// Errors returned by a query engine
#[derive(Error, Debug)]
pub enum QueryError {
    /// The request was rejected because the credential is expired or invalid.
    /// This is the only retryable condition.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Non-success HTTP response unrelated to authentication
    #[error("Earth Engine API error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl QueryError {
    /// Classify an I/O error message coming back from the engine
    pub fn from_io_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(UNAUTHENTICATED_MARKER) {
            QueryError::Unauthenticated(message)
        } else {
            QueryError::Io(message)
        }
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 401 || body.contains(UNAUTHENTICATED_MARKER) {
            QueryError::Unauthenticated(body)
        } else {
            QueryError::Http {
                status,
                message: body,
            }
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, QueryError::Unauthenticated(_))
    }
}

/// Errors surfaced by [`crate::loader::AuthenticatedLoader`]
#[derive(Error, Debug)]
pub enum LoadError {
    /// Credential acquisition failed at construction time. Never retried.
    #[error("Credential acquisition failed: {0:#}")]
    Credential(anyhow::Error),

    /// The refresh transport failed while renewing the bearer token
    #[error("Token refresh failed: {0:#}")]
    Refresh(anyhow::Error),

    /// Error from the query engine, passed through unchanged
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The engine did not answer within the configured query timeout
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl LoadError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, LoadError::Query(e) if e.is_unauthenticated())
    }
}

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;
