// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::operation::IndexOperation;

/// Error codes surfaced by the index lifecycle and its data-layer verbs
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum ErrorCode {
    /// `create` was called on an active index
    CannotCreateActiveIndex,

    /// `activate` was called on an active index
    CannotActivateActiveIndex,

    /// `deactivate` was called on an inactive index
    CannotDeactivateInactiveIndex,

    /// `destroy` was called on an active index
    CannotDestroyActiveIndex,

    /// `clear` was called on an inactive index
    CannotClearInactiveIndex,

    /// `allocate_memory_components` was called on an inactive index
    CannotAllocateMemoryForInactiveIndex,

    /// A bulk load asked for an empty index, but the index has data
    LoadNonEmptyIndex,

    /// Disk component scans are only allowed on primary indexes
    DiskComponentScanNotAllowedForSecondaryIndex,
}

impl ErrorCode {
    /// Classifies the error code.
    #[must_use]
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::CannotCreateActiveIndex
            | Self::CannotActivateActiveIndex
            | Self::CannotDeactivateInactiveIndex
            | Self::CannotDestroyActiveIndex
            | Self::CannotClearInactiveIndex
            | Self::CannotAllocateMemoryForInactiveIndex => ErrorKind::LifecycleViolation,
            Self::LoadNonEmptyIndex => ErrorKind::LoadNonEmptyIndex,
            Self::DiskComponentScanNotAllowedForSecondaryIndex => ErrorKind::ScanNotAllowed,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Coarse classification of errors
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub enum ErrorKind {
    /// A lifecycle verb was called in the wrong state
    LifecycleViolation,

    /// Memory for a memory component could not be provided
    CapacityExhausted,

    /// I/O error from the buffer cache or file manager
    IoFailure,

    /// An internal invariant was found broken, or a file is corrupt
    InvariantViolation,

    /// The operation is not supported by this index or harness
    UnsupportedOperation,

    /// A bulk load required an empty index
    LoadNonEmptyIndex,

    /// Disk component scan on a secondary index
    ScanNotAllowed,

    /// A blocking wait was abandoned
    Interrupted,
}

/// Represents errors that can occur in the LSM index core
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Lifecycle or data-layer error code
    Index(ErrorCode),

    /// The virtual buffer cache could not provide the requested memory
    CapacityExhausted {
        /// Bytes requested
        requested: u64,

        /// Bytes still available in the budget
        available: u64,
    },

    /// Internal invariant broken
    InvariantViolation(&'static str),

    /// Operation not supported by the index, e.g. during component selection
    UnsupportedOperation(IndexOperation),

    /// A component file is malformed
    Corrupted(&'static str),

    /// Waiting on an IO operation was interrupted, because the operation was dropped
    Interrupted,

    /// A flush or merge failed
    ///
    /// Errors raised while cleaning up the operation's files are kept in `suppressed`.
    IoOperationFailed {
        /// Primary error
        cause: Box<Error>,

        /// Errors raised during cleanup
        suppressed: Vec<Error>,
    },
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Index(code) => code.kind(),
            Self::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            Self::InvariantViolation(_) | Self::Corrupted(_) => ErrorKind::InvariantViolation,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Interrupted => ErrorKind::Interrupted,
            Self::IoOperationFailed { cause, .. } => cause.kind(),
        }
    }

    /// Returns the error code, if this is an index error.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Index(code) => Some(*code),
            Self::IoOperationFailed { cause, .. } => cause.code(),
            _ => None,
        }
    }

    /// Returns the cleanup errors attached to a failed flush or merge.
    #[must_use]
    pub fn suppressed(&self) -> &[Self] {
        match self {
            Self::IoOperationFailed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Wraps an error raised by a flush or merge.
    pub(crate) fn operation_failed(cause: Self, suppressed: Vec<Self>) -> Self {
        match cause {
            // NOTE: Don't nest, keep all cleanup errors on the outermost error
            Self::IoOperationFailed {
                cause,
                suppressed: mut inner,
            } => {
                inner.extend(suppressed);
                Self::IoOperationFailed {
                    cause,
                    suppressed: inner,
                }
            }
            cause => Self::IoOperationFailed {
                cause: Box::new(cause),
                suppressed,
            },
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LsmIndexError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::IoOperationFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ErrorCode> for Error {
    fn from(value: ErrorCode) -> Self {
        Self::Index(value)
    }
}

/// Index result
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn error_code_kinds() {
        assert_eq!(
            ErrorKind::LifecycleViolation,
            Error::from(ErrorCode::CannotCreateActiveIndex).kind()
        );
        assert_eq!(
            ErrorKind::LoadNonEmptyIndex,
            Error::from(ErrorCode::LoadNonEmptyIndex).kind()
        );
        assert_eq!(
            ErrorKind::ScanNotAllowed,
            Error::from(ErrorCode::DiskComponentScanNotAllowedForSecondaryIndex).kind()
        );
    }

    #[test]
    fn operation_failed_flattens() {
        let inner = Error::operation_failed(
            Error::Io(std::io::Error::other("disk full")),
            vec![Error::Corrupted("a")],
        );
        let outer = Error::operation_failed(inner, vec![Error::Corrupted("b")]);

        assert_eq!(ErrorKind::IoFailure, outer.kind());
        assert_eq!(2, outer.suppressed().len());
    }
}
