//! Client error types.

use thiserror::Error;

use clinicsync_core::cache::SerializationError;
use clinicsync_core::clinic::ParseNameError;
use clinicsync_core::remote::SyncError;

/// Result type alias for client module.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur outside the cache's own sync taxonomy.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Persisted state error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ParseNameError> for ClientError {
    fn from(err: ParseNameError) -> Self {
        ClientError::InvalidInput(err.to_string())
    }
}
