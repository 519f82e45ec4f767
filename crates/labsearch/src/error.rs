//! Error types for catalog construction and search validation.
//!
//! A [`ConfigurationError`] means the catalog or the calling code is wrong
//! and the request must be aborted. [`ValidationError`]s describe bad user
//! input; they are collected and handed back for display.

use std::fmt;

use thiserror::Error;

/// Fatal errors caused by catalog definitions or programming mistakes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A term name is not defined in the catalog.
    #[error("unknown search term: {0}")]
    UnknownTerm(String),

    /// A criteria projection name is not defined in the catalog.
    #[error("unknown criteria projection: {0}")]
    UnknownProjection(String),

    /// An operator name could not be recognised.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// Two terms share a name.
    #[error("duplicate search term: {0}")]
    DuplicateTerm(String),

    /// Two projections share a name.
    #[error("duplicate criteria projection: {0}")]
    DuplicateProjection(String),

    /// A traversal evaluator key was registered twice.
    #[error("duplicate traversal evaluator: {0}")]
    DuplicateEvaluator(String),

    /// A traversal evaluator key is not registered.
    #[error("unknown traversal evaluator: {0}")]
    UnknownEvaluator(String),

    /// A criteria path or order path could not be parsed.
    #[error("invalid path '{path}' at position {position}: {message}")]
    InvalidPath {
        /// The offending path text.
        path: String,
        /// Byte offset of the failure.
        position: usize,
        /// Description of the failure.
        message: String,
    },

    /// The declarative catalog source is malformed.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// A child term was attached under a term that does not declare it.
    #[error("term '{child}' is not a dependent of '{parent}'")]
    NotADependent {
        /// Parent term name.
        parent: String,
        /// Child term name.
        child: String,
    },

    /// An IN list exceeds the backend value-list limit.
    #[error("IN list of {count} values exceeds the limit of {limit}")]
    InListTooLarge {
        /// Number of values supplied.
        count: usize,
        /// Hard limit.
        limit: usize,
    },

    /// A direction-fixed evaluator was asked to walk the other way.
    #[error("traversal evaluator '{evaluator}' does not support direction {direction}")]
    UnsupportedDirection {
        /// Evaluator label.
        evaluator: String,
        /// Requested direction.
        direction: String,
    },

    /// A traversal was requested but no lineage graph is configured.
    #[error("traversal '{0}' selected but no lineage graph is configured")]
    MissingLineageGraph(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Recoverable errors caused by the values a user supplied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No top-level term carries a value.
    #[error("A value is required for each selected search term.")]
    NoSearchValues,

    /// A required term has no value.
    #[error("a value is required for search term '{0}'")]
    MissingRequiredValue(String),

    /// An exclusive term was combined with other terms.
    #[error("No other search terms are allowed with exclusive search term '{0}'.")]
    ExclusiveViolation(String),

    /// A raw value could not be converted to the term's type.
    #[error("invalid value '{value}' for search term '{term}': expected {expected}")]
    InvalidValue {
        /// Term name.
        term: String,
        /// Raw value.
        value: String,
        /// Expected type description.
        expected: String,
    },

    /// An operator received the wrong number of values.
    #[error("operator {operator} on '{term}' expects {expected} value(s), got {actual}")]
    WrongValueCount {
        /// Term name.
        term: String,
        /// Operator name.
        operator: String,
        /// Expected count.
        expected: usize,
        /// Supplied count.
        actual: usize,
    },
}

/// A non-empty collection of validation errors returned together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Wraps the collected errors, returning `None` when there are none.
    pub fn from_vec(errors: Vec<ValidationError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    /// Returns the individual errors.
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Returns true if any error matches the predicate.
    pub fn contains(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        Self(vec![err])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Result type for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, ConfigurationError>;
