use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid namespace name {name:?}: {reason}")]
    InvalidNamespace { name: String, reason: String },

    #[error("invalid refresh mode: {0}")]
    InvalidRefreshMode(String),

    #[error("invalid state stamp: {0}")]
    InvalidStamp(String),
}
