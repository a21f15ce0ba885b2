use tabius_storage::StorageError;
use tabius_types::TypeError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage adapter (or server-state import) failed during store
    /// initialization. Fatal: the store must be recreated.
    #[error("store {namespace} failed to initialize: {reason}")]
    InitFailed { namespace: String, reason: String },

    /// The store's initialization task went away before completing.
    #[error("store {namespace} is closed")]
    Closed { namespace: String },

    /// One-time initialization of a key failed; a later `get` retries it.
    #[error("initialization of key {key:?} failed: {reason}")]
    KeyInit { key: String, reason: String },

    /// Error from the storage adapter.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored value could not be decoded into the requested type.
    #[error("cannot decode value: {0}")]
    Decode(#[from] serde_json::Error),

    /// A spawned write task panicked or was cancelled.
    #[error("write task failed: {0}")]
    Task(String),

    /// The server-state transfer document is malformed.
    #[error("invalid transfer state: {0}")]
    Transfer(String),

    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
