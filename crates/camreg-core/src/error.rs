//! Error handling for camreg
//!
//! Provides the error taxonomy shared by every layer:
//! - Precondition errors (caller-contract violations)
//! - Computation errors (degenerate or failed fits)
//! - Persistence errors (archive I/O and format problems)
//!
//! All error types use `thiserror` for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Precondition error type
///
/// Raised synchronously when an operation is invoked in a state that
/// does not allow it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreconditionError {
    /// Not enough calibration points to fit a transform
    #[error("At least {required} calibration points are required, have {available}")]
    InsufficientPoints {
        /// The minimum number of points required.
        required: usize,
        /// The number of points currently stored.
        available: usize,
    },

    /// The operation needs a computed registration
    #[error("No registration computed: {operation} requires a registered transform")]
    NotRegistered {
        /// The operation that was attempted.
        operation: String,
    },
}

/// Computation error type
///
/// Represents failures of the rigid-body fit itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    /// The point geometry does not determine a unique rotation
    #[error("Degenerate point geometry: {reason}")]
    DegenerateGeometry {
        /// Description of the degeneracy.
        reason: String,
    },

    /// Input coordinates contain NaN or infinity
    #[error("Non-finite coordinate in calibration point {index}")]
    NonFinite {
        /// Index of the offending point.
        index: usize,
    },

    /// The singular value decomposition did not produce both factors
    #[error("SVD decomposition failed to produce U or V^T matrices")]
    SvdFailed,
}

/// Persistence error type
///
/// Represents failures while saving or loading a registration archive.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The archive file could not be opened or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive container is unreadable
    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive {
        /// The archive path.
        path: PathBuf,
        /// The reason the archive was rejected.
        reason: String,
    },

    /// A required entry is missing from the archive
    #[error("Archive {path} is missing entry '{entry}'")]
    MissingEntry {
        /// The archive path.
        path: PathBuf,
        /// The missing entry name.
        entry: String,
    },

    /// An entry is present but its content is malformed
    #[error("Corrupt entry '{entry}' in {path}: {reason}")]
    CorruptEntry {
        /// The archive path.
        path: PathBuf,
        /// The entry name.
        entry: String,
        /// Why the entry content was rejected.
        reason: String,
    },
}

/// Main error type for camreg
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Precondition error
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Computation error
    #[error(transparent)]
    Computation(#[from] ComputationError),

    /// Persistence error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a precondition error
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_))
    }

    /// Check if this is a computation error
    pub fn is_computation(&self) -> bool {
        matches!(self, Error::Computation(_))
    }

    /// Check if this is a persistence error
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_display() {
        let err = PreconditionError::InsufficientPoints {
            required: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "At least 3 calibration points are required, have 2"
        );

        let err = PreconditionError::NotRegistered {
            operation: "transform_point".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No registration computed: transform_point requires a registered transform"
        );
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ComputationError::SvdFailed.into();
        assert!(err.is_computation());
        assert!(!err.is_precondition());

        let err: Error = PersistenceError::MissingEntry {
            path: PathBuf::from("reg.zip"),
            entry: "rotation.json".to_string(),
        }
        .into();
        assert!(err.is_persistence());
        assert_eq!(
            err.to_string(),
            "Archive reg.zip is missing entry 'rotation.json'"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
