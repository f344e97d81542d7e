//! Error types shared across the outbox engine and its adapters.

use thiserror::Error;

/// Main error type for RelayBox operations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("message encoding error: {0}")]
    Encoding(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("lock not held")]
    LockNotHeld,

    #[error("lock held by another owner")]
    Locked,

    #[error("broker error: {0}")]
    Broker(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for RelayBox operations.
pub type Result<T> = std::result::Result<T, RelayError>;
