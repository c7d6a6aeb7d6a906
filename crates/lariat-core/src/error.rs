use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The short id is already taken by a different URL. Callers regenerate
    /// the id and retry; this never escapes the resolution loop.
    #[error("short id '{0}' already maps to a different url")]
    KeyExists(String),
    /// The URL is already shortened. Not a failure: callers return the
    /// existing mapping instead of creating a duplicate.
    #[error("url is already shortened as '{existing_id}'")]
    ValueExists { existing_id: String },
    #[error("short id '{0}' not found")]
    KeyNotFound(String),
    /// The record exists but was soft-deleted. Surfaced distinctly from
    /// [`StorageError::KeyNotFound`] so callers can answer "gone" rather
    /// than "never existed".
    #[error("record '{0}' is deleted")]
    RecordDeleted(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
    #[error("storage is closed")]
    Closed,
}
