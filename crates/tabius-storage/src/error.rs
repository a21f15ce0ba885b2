use std::path::PathBuf;

/// Errors from storage adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The adapter was used before `init` completed.
    #[error("storage for namespace {namespace} is not initialized")]
    NotInitialized { namespace: String },

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The write would grow the backend past its byte quota.
    #[error("quota exceeded for namespace {namespace}: {attempted} bytes > limit {limit}")]
    QuotaExceeded {
        namespace: String,
        limit: usize,
        attempted: usize,
    },

    /// Persisted data could not be decoded.
    #[error("corrupt storage at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The backend is temporarily or permanently unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
