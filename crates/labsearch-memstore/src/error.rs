//! Error types for the in-memory store.

use labsearch::EntityId;
use labsearch_executor::DataAccessError;

#[cfg(feature = "persistence")]
use std::path::PathBuf;

/// Result type for store operations.
pub type MemStoreResult<T> = Result<T, MemStoreError>;

/// Errors that can occur while loading or querying the store.
#[derive(Debug, thiserror::Error)]
pub enum MemStoreError {
    /// Entity type was never registered.
    #[error("Unknown entity type '{0}'")]
    UnknownEntity(String),

    /// A record with this id already exists.
    #[error("Duplicate {entity} record {id}")]
    DuplicateRecord {
        /// Entity type.
        entity: String,
        /// Record id.
        id: EntityId,
    },

    /// Record key type differs from earlier records of the entity.
    #[error("Record {id} of {entity} has a different key type")]
    KeyTypeMismatch {
        /// Entity type.
        entity: String,
        /// Record id.
        id: EntityId,
    },

    /// A literal restriction has no registered evaluator.
    #[error("No evaluator registered for literal restriction '{0}'")]
    UnknownLiteral(String),

    /// I/O error during persistence operations.
    #[cfg(feature = "persistence")]
    #[error("I/O error at {path}: {source}")]
    IoError {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid snapshot during load.
    #[cfg(feature = "persistence")]
    #[error("Invalid snapshot: {message}")]
    InvalidFormat {
        /// What was wrong.
        message: String,
    },

    /// Serialization error.
    #[cfg(feature = "persistence")]
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MemStoreError {
    /// Creates an I/O error with path context.
    #[cfg(feature = "persistence")]
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid format error.
    #[cfg(feature = "persistence")]
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}

impl From<MemStoreError> for DataAccessError {
    fn from(err: MemStoreError) -> Self {
        let message = format!("in-memory store: {}", err);
        DataAccessError::with_source(message, err)
    }
}
