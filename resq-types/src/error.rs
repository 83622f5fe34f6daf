//! Error types for ResQLink wire and model types.

use thiserror::Error;

/// Errors that can occur while decoding or validating model types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Envelope carries a wire version this build does not understand
    #[error("unsupported wire version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown request status name
    #[error("unknown request status: {0}")]
    UnknownStatus(String),

    /// Unknown role name
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::UnsupportedVersion(9);
        assert_eq!(err.to_string(), "unsupported wire version: 9");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
