use crate::blob_store::BlobStoreError;

/// Errors surfaced by the relay to its transport.
///
/// `Unauthorized` and `NotFound` deliberately carry no detail: callers must
/// not be able to tell an expired credential from a wrong one, or a consumed
/// task from one that never existed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upload secret is not configured")]
    Configuration,

    #[error("unauthorized")]
    Unauthorized,

    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(#[from] BlobStoreError),

    #[error("upload interrupted: {0}")]
    Interrupted(String),
}
