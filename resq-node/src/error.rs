//! Error types for resq-node.

use resq_core::DraftError;
use resq_types::RequestId;

/// Local store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be opened, initialized or queried.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// No record with this id.
    #[error("request not found: {id}")]
    NotFound {
        /// The request id that was not found.
        id: RequestId,
    },

    /// A stored row could not be decoded.
    #[error("corrupt record {id}: {reason}")]
    Corrupt {
        /// Id of the offending row.
        id: String,
        /// What failed to decode.
        reason: String,
    },

    /// A record could not be encoded for storage.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Device identity errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Underlying key-value store failed.
    #[error("identity store error: {0}")]
    Store(#[from] StoreError),

    /// The persisted role is not one we know.
    #[error("invalid stored role: {0}")]
    InvalidRole(String),
}

/// Reconciliation engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Status update for an id that is not in the local store.
    #[error("request not found: {id}")]
    NotFound {
        /// The request id that was not found.
        id: RequestId,
    },

    /// The record cannot be stored as given.
    #[error("malformed request {id:?}: {reason}")]
    Malformed {
        /// Id as given (may be empty).
        id: RequestId,
        /// What is missing.
        reason: &'static str,
    },

    /// Local store failure.
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// A draft failed validation.
    #[error("invalid request: {0}")]
    Invalid(#[from] DraftError),

    /// Identity lookup failed.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => EngineError::NotFound { id },
            other => EngineError::Storage(other),
        }
    }
}
