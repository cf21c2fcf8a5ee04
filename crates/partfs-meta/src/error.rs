//! Error types for metadata operations.

use thiserror::Error;

/// Result type alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Error raised by the key-value layer.
///
/// Kept separate from [`MetaError`] so other subsystems can share the KV
/// abstraction without pulling in the whole metadata error vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("kv store error: {0}")]
pub struct KvError(pub String);

/// Error variants for metadata operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    /// The path, or a required parent of it, does not exist.
    #[error("path not found: {0}")]
    NotFound(String),

    /// The destination path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A directory operation was attempted on a non-directory node.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Attempted to remove a non-empty directory.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Rename would move a directory into its own subtree.
    #[error("cannot move {old} inside itself at {new}")]
    InvalidOperation {
        /// Source path of the rejected rename.
        old: String,
        /// Destination path of the rejected rename.
        new: String,
    },

    /// The root directory cannot be renamed or removed.
    #[error("invalid operation on root directory")]
    InvalidRootOperation,

    /// A stored node could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// An error occurred in the KV store layer.
    #[error(transparent)]
    Kv(#[from] KvError),
}
