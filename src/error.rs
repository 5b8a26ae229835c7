//! Unified error hierarchy for DiskVec.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. The error
//! kinds intentionally form a small, stable namespace so that embedders can
//! map them onto a C-style status code via [`DiskVecError::code`].
//!
//! # Error Codes
//!
//! | Code | Kind | Meaning |
//! |-----:|:-----|:--------|
//! | 0 | `Ok` | success (never carried by an error value) |
//! | 1 | `Invalid` | invalid argument or malformed request |
//! | 2 | `NoMem` | a bounded resource was exhausted |
//! | 3 | `NotFound` | index or rowid absent |
//! | 4 | `Exists` | duplicate index or rowid |
//! | 5 | `Dimension` | vector dimension mismatch |
//! | 6 | `Io` | underlying storage failure |
//! | 7 | `Corrupt` | metadata or block failed structural checks |

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DiskVecError>;

/// Stable integer codes exposed to embedders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Success.
    Ok = 0,
    /// Invalid argument.
    Invalid = 1,
    /// Allocation or bounded-resource failure.
    NoMem = 2,
    /// Index or rowid absent.
    NotFound = 3,
    /// Duplicate index or rowid.
    Exists = 4,
    /// Vector dimension mismatch.
    Dimension = 5,
    /// Underlying storage error.
    Io = 6,
    /// Metadata or block fails structural checks.
    Corrupt = 7,
}

/// The unified DiskVec error type.
#[derive(Debug, Error)]
pub enum DiskVecError {
    /// An argument failed validation (bad parameter, malformed vector,
    /// reserved column name, nested batch, ...).
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// A bounded resource was exhausted (deferred-edge list with no spill
    /// target, visited-set capacity overflow).
    #[error("out of memory: {0}")]
    NoMem(String),

    /// The named index or rowid does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The named index or rowid already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// A vector's dimension does not match the index configuration.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    Dimension {
        /// Dimension the index was created with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// The host storage engine reported a failure.
    #[error("storage error: {0}")]
    Io(String),

    /// Metadata or a node block failed structural validation.
    #[error("corruption detected: {0}")]
    Corrupt(String),
}

impl DiskVecError {
    /// Returns the stable [`ErrorCode`] for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            DiskVecError::Invalid(_) => ErrorCode::Invalid,
            DiskVecError::NoMem(_) => ErrorCode::NoMem,
            DiskVecError::NotFound(_) => ErrorCode::NotFound,
            DiskVecError::Exists(_) => ErrorCode::Exists,
            DiskVecError::Dimension { .. } => ErrorCode::Dimension,
            DiskVecError::Io(_) => ErrorCode::Io,
            DiskVecError::Corrupt(_) => ErrorCode::Corrupt,
        }
    }

    /// True when the error means "the target row is gone".
    ///
    /// Traversal code uses this to skip zombie edges instead of failing the
    /// whole operation.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiskVecError::NotFound(_))
    }

    /// Wraps the error with the index name and operation that produced it.
    ///
    /// The message is what the host engine surfaces to SQL users, so it
    /// carries enough context to identify the failing statement.
    #[must_use]
    pub fn in_context(self, index: &str, operation: &str) -> Self {
        let decorate = |msg: String| format!("{index}: {operation}: {msg}");
        match self {
            DiskVecError::Invalid(m) => DiskVecError::Invalid(decorate(m)),
            DiskVecError::NoMem(m) => DiskVecError::NoMem(decorate(m)),
            DiskVecError::NotFound(m) => DiskVecError::NotFound(decorate(m)),
            DiskVecError::Exists(m) => DiskVecError::Exists(decorate(m)),
            e @ DiskVecError::Dimension { .. } => e,
            DiskVecError::Io(m) => DiskVecError::Io(decorate(m)),
            DiskVecError::Corrupt(m) => DiskVecError::Corrupt(decorate(m)),
        }
    }
}

impl From<std::io::Error> for DiskVecError {
    fn from(err: std::io::Error) -> Self {
        DiskVecError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        assert_eq!(DiskVecError::Invalid("x".into()).code(), ErrorCode::Invalid);
        assert_eq!(DiskVecError::NoMem("x".into()).code(), ErrorCode::NoMem);
        assert_eq!(
            DiskVecError::NotFound("x".into()).code(),
            ErrorCode::NotFound
        );
        assert_eq!(DiskVecError::Exists("x".into()).code(), ErrorCode::Exists);
        assert_eq!(
            DiskVecError::Dimension {
                expected: 3,
                actual: 4
            }
            .code(),
            ErrorCode::Dimension
        );
        assert_eq!(DiskVecError::Io("x".into()).code(), ErrorCode::Io);
        assert_eq!(DiskVecError::Corrupt("x".into()).code(), ErrorCode::Corrupt);
        assert_eq!(ErrorCode::Ok as i32, 0);
        assert_eq!(ErrorCode::Corrupt as i32, 7);
    }

    #[test]
    fn test_context_decoration() {
        let err = DiskVecError::NotFound("rowid 7".into()).in_context("embeddings", "delete");
        assert_eq!(err.to_string(), "not found: embeddings: delete: rowid 7");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_dimension_keeps_structure() {
        let err = DiskVecError::Dimension {
            expected: 128,
            actual: 64,
        }
        .in_context("embeddings", "insert");
        assert!(matches!(
            err,
            DiskVecError::Dimension {
                expected: 128,
                actual: 64
            }
        ));
    }
}
