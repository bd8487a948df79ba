//! Error types for the blob store.

/// Errors that can occur when working with the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The atomic rename of a staged blob into place failed
    #[error("failed to commit staged blob: {0}")]
    Persist(std::io::Error),

    /// Handle names are single path components
    #[error("invalid storage handle: {0:?}")]
    InvalidHandle(String),
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;
