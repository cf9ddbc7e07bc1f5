use thiserror::Error;

/// Errors reported by the fetch and mutate collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Transient transport failure. Retryable.
    #[error("Network error: {0}")]
    Network(String),
    /// The entity no longer exists. Never retried.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    /// The server rejected the caller's input. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The local optimistic assumption was wrong. Needs caller intervention.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl SyncError {
    /// Returns true for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// Returns true if a failed read should be attempted again.
    ///
    /// Reads retry on everything except `NotFound`: a missing entity will not
    /// come back by asking again.
    pub fn should_retry_read(&self) -> bool {
        !matches!(self, SyncError::NotFound { .. })
    }

    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network",
            SyncError::NotFound { .. } => "not_found",
            SyncError::Validation(_) => "validation",
            SyncError::Conflict(_) => "conflict",
        }
    }
}

/// Result type for collaborator operations.
pub type Result<T> = std::result::Result<T, SyncError>;
