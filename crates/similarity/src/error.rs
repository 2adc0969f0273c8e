//! Error types for the similarity crate.

use thiserror::Error;

/// Errors raised by the similarity pipelines.
///
/// Every variant describes a programming or configuration mistake; none of
/// them is transient, so nothing here is ever retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimilarityError {
    /// The inputs make the requested quantity undefined
    /// (e.g. Jaccard similarity of two empty sets)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value is unusable
    #[error("Invalid configuration for {field}: {reason}")]
    Configuration { field: String, reason: String },

    /// A lookup referenced something that was never indexed
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },
}

impl SimilarityError {
    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        SimilarityError::Configuration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: &str, id: impl ToString) -> Self {
        SimilarityError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SimilarityError>;
