//! Error types for filesystem operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors reported by a [`FileSystem`](crate::FileSystem).
///
/// The variants are the conditions the transfer engine branches on, so a
/// backend must report e.g. a directory copy as [`FsError::WouldRecurse`]
/// rather than a generic I/O failure.
#[derive(Debug, Error)]
pub enum FsError {
    /// The job's cancellation token fired.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Path not found.
    #[error("No such file or directory: {path}")]
    NotFound { path: PathBuf },

    /// The target already exists.
    #[error("Target already exists: {path}")]
    Exists { path: PathBuf },

    /// The target is a directory where a file was expected.
    #[error("Target is a directory: {path}")]
    IsDirectory { path: PathBuf },

    /// A directory was expected.
    #[error("Not a directory: {path}")]
    NotDirectory { path: PathBuf },

    /// A directory could not be removed because it has children.
    #[error("Directory not empty: {path}")]
    NotEmpty { path: PathBuf },

    /// The source is a directory; the caller must recurse.
    #[error("Cannot copy directory without recursing: {path}")]
    WouldRecurse { path: PathBuf },

    /// The source and target are both directories; the caller must merge.
    #[error("Cannot copy directory over directory: {path}")]
    WouldMerge { path: PathBuf },

    /// The name is not valid on the target filesystem.
    #[error("Invalid filename: {path}")]
    InvalidFilename { path: PathBuf },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// The filesystem is mounted read-only.
    #[error("Read-only filesystem: {path}")]
    ReadOnly { path: PathBuf },

    /// The backend cannot perform the request.
    #[error("Operation not supported: {message}")]
    NotSupported { message: String },

    /// A location string could not be parsed.
    #[error("Invalid location: {uri}")]
    InvalidUri { uri: String },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

/// How the engine treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Not reported; the job ends silently.
    Cancelled,
    /// Reported with retry/skip options.
    Retryable,
    /// Handled by recursing into a directory.
    Structural,
    /// Handled by renaming or asking about the conflict.
    Naming,
}

impl FsError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let path = path.into();
        match source.kind() {
            ErrorKind::NotFound => Self::NotFound { path },
            ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            ErrorKind::AlreadyExists => Self::Exists { path },
            ErrorKind::IsADirectory => Self::IsDirectory { path },
            ErrorKind::NotADirectory => Self::NotDirectory { path },
            ErrorKind::DirectoryNotEmpty => Self::NotEmpty { path },
            ErrorKind::ReadOnlyFilesystem => Self::ReadOnly { path },
            ErrorKind::InvalidFilename | ErrorKind::InvalidInput => Self::InvalidFilename { path },
            ErrorKind::Unsupported => Self::NotSupported {
                message: format!("{}: {source}", path.display()),
            },
            _ => Self::Io { path, source },
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    /// Create a free-form error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The handling category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::WouldRecurse { .. } | Self::WouldMerge { .. } | Self::IsDirectory { .. } => {
                ErrorCategory::Structural
            }
            Self::Exists { .. } | Self::InvalidFilename { .. } => ErrorCategory::Naming,
            _ => ErrorCategory::Retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_mapping() {
        let err = FsError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        assert!(matches!(err, FsError::Exists { .. }));
        assert_eq!(err.category(), ErrorCategory::Naming);

        let err = FsError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.category(), ErrorCategory::Retryable);
    }

    #[test]
    fn test_categories() {
        assert_eq!(FsError::Cancelled.category(), ErrorCategory::Cancelled);
        assert!(FsError::Cancelled.is_cancelled());
        let err = FsError::WouldMerge {
            path: PathBuf::from("/a"),
        };
        assert_eq!(err.category(), ErrorCategory::Structural);
    }
}
