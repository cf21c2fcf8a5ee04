//! Error types for the parted I/O engine and the remote storage driver.

use thiserror::Error;

use partfs_meta::KvError;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error variants for storage operations.
///
/// The enum is `Clone` so a sticky worker failure can be observed by the
/// producer while the original value is still returned from `close`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Use of a reader or writer after it was closed.
    #[error("stream is closed")]
    Closed,

    /// A reader was requested for a file with no recorded parts.
    #[error("file has no recorded parts")]
    NoParts,

    /// A writer worker failed; all further writes fail with the first error.
    #[error("upload aborted: {0}")]
    Aborted(String),

    /// The remote blob service rejected a request.
    #[error("remote service error (status {status}): {message}")]
    Remote {
        /// HTTP status code returned by the service.
        status: u16,
        /// Response body or a short description.
        message: String,
    },

    /// No credential is configured for the asset's owner.
    #[error("no token configured for username: {username}")]
    MissingToken {
        /// The credential key that has no token.
        username: String,
    },

    /// A configuration value violates its constraints.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A transport-level HTTP failure.
    #[error("http transport error: {0}")]
    Http(String),

    /// A stream ended short of or past the recorded part boundary.
    #[error("i/o error: {0}")]
    Io(String),

    /// A persisted part list could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// An error occurred in the KV store layer.
    #[error(transparent)]
    Kv(#[from] KvError),
}

impl From<StorageError> for std::io::Error {
    fn from(err: StorageError) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            StorageError::Closed => ErrorKind::BrokenPipe,
            StorageError::NoParts => ErrorKind::UnexpectedEof,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
