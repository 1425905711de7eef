use std::path::PathBuf;

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage location could not be created or is not a directory.
    #[error("invalid store location {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// The key cannot be used as part of a file name.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The payload could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored record could not be decoded.
    #[error("deserialization error for {key:?}: {reason}")]
    Deserialization { key: String, reason: String },

    /// No record exists for the key.
    #[error("record not found: {0}")]
    NotFound(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if this is a [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
