//! Error types for the tangent-ad library
//!
//! All errors use the `thiserror` crate for automatic trait implementations.
//! Evaluation and linearization surface errors synchronously to the caller;
//! nothing is recovered or retried inside this crate.

use crate::values::{Key, ValueKind};
use thiserror::Error;

/// Main result type used throughout the tangent-ad library
pub type AdResult<T> = Result<T, AdError>;

/// Main error type for the tangent-ad library
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdError {
    /// A variable required by an expression is absent from the assignment
    #[error("variable {key} is missing from the assignment")]
    MissingVariable {
        /// Key of the absent variable
        key: Key,
    },

    /// The assignment holds a different type than a leaf declares
    #[error("variable {key} holds a {actual} value, expected {expected}")]
    TypeMismatch {
        /// Key of the offending variable
        key: Key,
        /// Variant the leaf was built for
        expected: ValueKind,
        /// Variant actually stored
        actual: ValueKind,
    },

    /// A Jacobian block's shape disagrees with the declared tangent dimension
    #[error("Jacobian block for variable {key} has {actual} columns, expected {expected}")]
    DimensionMismatch {
        /// Key of the offending variable
        key: Key,
        /// Tangent dimension declared by the assignment
        expected: usize,
        /// Column count actually produced
        actual: usize,
    },

    /// A Jacobian block's row count disagrees with the residual dimension
    #[error("Jacobian block for variable {key} has {actual} rows, residual has {expected}")]
    RowMismatch {
        /// Key of the offending variable
        key: Key,
        /// Residual dimension
        expected: usize,
        /// Row count actually produced
        actual: usize,
    },
}
