//! Error types for compilation, traversal and pagination.

use labsearch::{ConfigurationError, ValidationError, ValidationErrors};
use thiserror::Error;

/// Failure reported by a backend capability.
///
/// The message is kept opaque; the optional source preserves the backend's
/// own error for callers that want to downcast it.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DataAccessError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DataAccessError {
    /// Creates an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping a backend error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while compiling or running a search.
#[derive(Error, Debug)]
pub enum SearchExecutorError {
    /// The catalog or calling code is wrong; abort the request.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The user's input is invalid; nothing was executed.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// The backend failed.
    #[error("data access error: {0}")]
    DataAccess(#[from] DataAccessError),
}

impl From<ValidationError> for SearchExecutorError {
    fn from(err: ValidationError) -> Self {
        SearchExecutorError::Validation(err.into())
    }
}

impl SearchExecutorError {
    /// Returns true for errors caused by user input.
    pub fn is_validation(&self) -> bool {
        matches!(self, SearchExecutorError::Validation(_))
    }

    /// Returns true for fatal configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SearchExecutorError::Configuration(_))
    }
}

/// Result type for executor operations.
pub type SearchResult<T> = std::result::Result<T, SearchExecutorError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_display_configuration() {
        let err: SearchExecutorError = ConfigurationError::UnknownTerm("Barcode".to_string()).into();
        assert_eq!(err.to_string(), "configuration error: unknown search term: Barcode");
        assert!(err.is_configuration());
    }

    #[test]
    fn test_error_display_validation() {
        let err: SearchExecutorError = ValidationError::NoSearchValues.into();
        assert_eq!(
            err.to_string(),
            "validation failed: A value is required for each selected search term."
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_error_display_data_access() {
        let err: SearchExecutorError = DataAccessError::new("connection reset").into();
        assert_eq!(err.to_string(), "data access error: connection reset");
    }

    #[test]
    fn test_data_access_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timeout");
        let err = DataAccessError::with_source("fetch failed", io);
        assert_eq!(err.message(), "fetch failed");
        assert_eq!(err.source().unwrap().to_string(), "socket timeout");
    }
}
