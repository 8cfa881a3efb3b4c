//! Filesystem errors and their errno values.

use libc::{EEXIST, EINVAL, EIO, ENOENT, ENOTEMPTY, EPERM};
use tagfs_core::StoreError;
use thiserror::Error;

/// Why a filesystem operation failed.
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("no such entry")]
    NotFound,

    #[error("operation not permitted")]
    Permission,

    #[error("directory not empty")]
    NotEmpty,

    #[error("entry already exists")]
    Exists,

    #[error("invalid argument: {0}")]
    Invalid(String),

    /// Unexpected repository failure
    #[error(transparent)]
    Store(tagfs_core::Error),
}

impl VfsError {
    /// The errno reported to the kernel.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => ENOENT,
            Self::Permission => EPERM,
            Self::NotEmpty => ENOTEMPTY,
            Self::Exists => EEXIST,
            Self::Invalid(_) => EINVAL,
            Self::Store(_) => EIO,
        }
    }
}

impl From<tagfs_core::Error> for VfsError {
    fn from(err: tagfs_core::Error) -> Self {
        use tagfs_core::Error;

        match err {
            Error::Validation(e) => Self::Invalid(e.to_string()),
            Error::ImplicationCycle => Self::Invalid(Error::ImplicationCycle.to_string()),
            Error::Query(_) | Error::NotFound { .. } | Error::FileTagNotFound { .. } => {
                Self::NotFound
            }
            Error::Store(StoreError::Duplicate { .. }) => Self::Exists,
            Error::Store(StoreError::Missing { .. }) => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

/// Result type for filesystem operations.
pub type VfsResult<T> = std::result::Result<T, VfsError>;
