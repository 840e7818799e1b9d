//! Error types for pivotree.

use thiserror::Error;

/// Errors that can occur during index construction, search or persistence.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Invalid parameter value (branching < 2, k < 1, dimension mismatch, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O failure while saving or loading an index.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// An internal invariant did not hold (e.g. best-bin-first search ran
    /// out of branches before filling the result set).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type alias for pivotree operations.
pub type Result<T> = std::result::Result<T, IndexError>;
