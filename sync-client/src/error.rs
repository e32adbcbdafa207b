//! Error types for sync-client.

use std::path::PathBuf;
use sync_types::{ChannelId, NetworkError};

/// Main error type for sync engine operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote request failed.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The channel is not in the local store.
    #[error("unknown channel: {0}")]
    UnknownChannel(ChannelId),
}

impl SyncError {
    /// True for failures of a remote request, which a manual retry may fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

/// Local store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema setup failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },

    /// A stored row could not be turned back into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Result type alias for sync engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        let err = SyncError::from(NetworkError::Status { code: 500 });
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "network error: unexpected status: 500");
    }

    #[test]
    fn storage_errors_are_not_retryable() {
        let err = SyncError::from(StorageError::Corrupt("bad timestamp".into()));
        assert!(!err.is_retryable());
        assert!(!SyncError::UnknownChannel(ChannelId::from("x")).is_retryable());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
        assert_send_sync::<StorageError>();
    }
}
