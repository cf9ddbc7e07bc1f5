//! Pure functions for sizing cached data and encoding persisted state.
//!
//! Sizes are estimated from the JSON encoding, which is also the format
//! persisted state is written in.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::{PersistedState, QueryKey};

/// Errors that can occur during serialization/deserialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Failed to serialize a value to bytes.
    #[error("Failed to serialize: {0}")]
    SerializeFailed(String),
    /// Failed to deserialize bytes to a value.
    #[error("Failed to deserialize: {0}")]
    DeserializeFailed(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

/// Estimates the footprint of one cached entry in bytes.
///
/// Counts the JSON-encoded data plus the displayed key. `Value` always
/// serializes, so the estimate never fails.
pub fn estimate_size(key: &QueryKey, data: &Value) -> usize {
    let data_len = serde_json::to_vec(data).map(|b| b.len()).unwrap_or(0);
    data_len + key.to_string().len()
}

/// Decodes cached data into a typed domain record.
pub fn decode_data<T: DeserializeOwned>(data: &Value) -> Result<T> {
    T::deserialize(data).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}

/// Serializes persisted state to JSON bytes.
pub fn serialize_state(state: &PersistedState) -> Result<Vec<u8>> {
    serde_json::to_vec(state).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

/// Deserializes persisted state from JSON bytes.
pub fn deserialize_state(bytes: &[u8]) -> Result<PersistedState> {
    serde_json::from_slice(bytes)
        .map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}
