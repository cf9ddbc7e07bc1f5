use async_trait::async_trait;
use serde_json::Value;

use crate::cache::QueryKey;

use super::{MutationRequest, Result};

/// Idempotent read of the data behind a query key.
///
/// Implementations must not have side effects. Timeouts are the
/// implementation's concern.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, key: &QueryKey) -> Result<Value>;
}

/// Create/update/delete call returning the authoritative post-mutation
/// entity.
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn mutate(&self, request: &MutationRequest) -> Result<Value>;
}
