//! Error types for the filesystem layer.

use thiserror::Error;

use partfs_meta::MetaError;
use partfs_storage::StorageError;

/// Result type alias for filesystem operations.
pub type VfsResult<T> = Result<T, VfsError>;

/// Error variants surfaced by file handles and the facade.
#[derive(Debug, Clone, Error)]
pub enum VfsError {
    /// Byte I/O was attempted on a directory handle.
    #[error("is a directory")]
    IsADirectory,

    /// A directory operation was attempted on a file handle.
    #[error("not a directory")]
    NotADirectory,

    /// A seek resolved to a negative offset.
    #[error("invalid seek offset")]
    InvalidSeek,

    /// The operation is not supported by this filesystem.
    #[error("operation not supported")]
    NotSupported,

    /// A metadata operation failed.
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// A storage operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<VfsError> for std::io::Error {
    fn from(err: VfsError) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            VfsError::IsADirectory => ErrorKind::IsADirectory,
            VfsError::NotADirectory => ErrorKind::NotADirectory,
            VfsError::InvalidSeek => ErrorKind::InvalidInput,
            VfsError::NotSupported => ErrorKind::Unsupported,
            VfsError::Meta(MetaError::NotFound(_)) => ErrorKind::NotFound,
            VfsError::Meta(MetaError::AlreadyExists(_)) => ErrorKind::AlreadyExists,
            VfsError::Meta(MetaError::NotADirectory(_)) => ErrorKind::NotADirectory,
            VfsError::Meta(MetaError::NotEmpty(_)) => ErrorKind::DirectoryNotEmpty,
            VfsError::Meta(_) => ErrorKind::Other,
            VfsError::Storage(StorageError::Closed) => ErrorKind::BrokenPipe,
            VfsError::Storage(StorageError::NoParts) => ErrorKind::UnexpectedEof,
            VfsError::Storage(_) => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_io_not_found() {
        let err: std::io::Error = VfsError::Meta(MetaError::NotFound("/x".into())).into();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_is_a_directory_maps() {
        let err: std::io::Error = VfsError::IsADirectory.into();
        assert_eq!(err.kind(), std::io::ErrorKind::IsADirectory);
    }

    #[test]
    fn test_not_supported_maps() {
        let err: std::io::Error = VfsError::NotSupported.into();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
    }
}
