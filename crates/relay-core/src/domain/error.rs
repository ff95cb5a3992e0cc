//! Domain-level error taxonomy for Relay.

use relay_state::StorageError;

/// Relay infrastructure errors (configuration, storage, I/O).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Relay domain operations.
pub type Result<T> = std::result::Result<T, RelayError>;
