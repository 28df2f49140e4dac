use thiserror::Error;

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by governance storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or compare-and-swap conflict occurred.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A storage invariant was violated (stale status, broken sequence).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The caller supplied input the backend cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying backend failed (I/O, SQL, lock poisoning).
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// How storage failures surface through the public governance taxonomy.
/// CAS misses of either flavor become `ConcurrencyConflict`; the caller
/// re-reads and retries.
impl From<StoreError> for agora_types::GovernanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => agora_types::GovernanceError::NotFound(msg),
            StoreError::Conflict(msg) | StoreError::InvariantViolation(msg) => {
                agora_types::GovernanceError::ConcurrencyConflict(msg)
            }
            StoreError::InvalidInput(msg) => agora_types::GovernanceError::Validation(msg),
            StoreError::Serialization(msg) | StoreError::Backend(msg) => {
                agora_types::GovernanceError::Store(msg)
            }
        }
    }
}
