//! Errors raised while reading ratings files.

use thiserror::Error;

/// Why a ratings file could not be turned into a [`crate::RatingIndex`]
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("Ratings file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read ratings: {0}")]
    IoError(#[from] std::io::Error),

    /// A field that should be numeric was not
    #[error("{file}:{line}: {reason}")]
    ParseError {
        file: String,
        line: usize,
        reason: String,
    },

    /// A field parsed but can't be used (e.g. a NaN rating)
    #[error("Unusable {field} value: {value}")]
    InvalidValue { field: String, value: String },

    /// Every rating line needs at least user, item and rating
    #[error("Line {line} has {found} fields, a rating needs at least {expected}")]
    FieldCountMismatch {
        expected: usize,
        found: usize,
        line: usize,
    },

    /// The parsed ratings as a whole were rejected
    #[error("Ratings rejected: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DataLoadError>;
