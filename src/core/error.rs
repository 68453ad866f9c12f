//! Error types and handling for Player Vaults
//!
//! This module defines all error types used throughout the system. `Busy`,
//! `NotHeld` and `InvalidInput` are returned synchronously by the coordinator;
//! every other kind originates in a worker and travels back through the
//! completion channel.

use crate::types::VaultKey;
use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Player Vaults
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The vault is locked by another operation
    #[error("Vault {key} is already in use by {holder}")]
    Busy {
        /// Key that could not be acquired
        key: VaultKey,
        /// Holder label of the current lock owner
        holder: String,
    },

    /// The caller tried to act on a vault it does not hold the lock for
    #[error("Lock for vault {key} is not held by the caller")]
    NotHeld {
        /// Key whose lock did not match
        key: VaultKey,
    },

    /// No stored data exists for the key
    #[error("Vault not found: {0}")]
    NotFound(VaultKey),

    /// Storage backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal system errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Disk I/O operation failed
    #[error("Disk I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored document could not be parsed or written
    #[error("Malformed document {path}: {reason}")]
    Document {
        /// File the document lives in
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Stored bytes for one vault could not be decoded
    #[error("Corrupt stored contents: {0}")]
    Corrupt(#[from] SerializationError),
}

/// Serialization/deserialization errors
#[derive(Error, Debug)]
pub enum SerializationError {
    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// Input ended before a complete tag was read
    #[error("Unexpected end of data while reading {0}")]
    UnexpectedEnd(&'static str),

    /// Unknown tag type byte
    #[error("Unknown tag type {0}")]
    UnknownTag(u8),

    /// Structure does not match the expected inventory layout
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// Tags nested deeper than the decoder allows
    #[error("Tag nesting exceeds depth {0}")]
    TooDeep(usize),

    /// Base64 payload in a document was invalid
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Busy { .. }
                | Error::Backend(BackendError::Io(_))
                | Error::Backend(BackendError::Database(_))
        )
    }

    /// Check if this is a "no data" signal rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error was caused by the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Busy { .. } | Error::NotHeld { .. } | Error::NotFound(_) | Error::InvalidInput(_)
        )
    }
}

impl BackendError {
    /// Create a malformed document error
    pub fn document(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::Document {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_retryable_client_error() {
        let key = VaultKey::new("Alice", 1).unwrap();
        let err = Error::Busy { key, holder: "bob".to_string() };
        assert!(err.is_retryable());
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Vault alice#1 is already in use by bob");
    }

    #[test]
    fn test_serialization_is_not_retryable() {
        let err = Error::from(SerializationError::UnknownTag(99));
        assert!(!err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_backend_error_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from(BackendError::from(io));
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_corrupt_contents_are_not_retryable() {
        let decode = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            "!!!not base64!!!",
        )
        .unwrap_err();
        let err = Error::from(BackendError::from(SerializationError::from(decode)));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Corrupt stored contents"));
    }
}
