//! Persisting the cache across restarts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use clinicsync_core::cache::{
    deserialize_state, serialize_state, PersistedState, PERSISTED_STATE_VERSION,
};

use crate::error::Result;
use crate::query_client::QueryClient;

/// Where persisted state lives.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Loads the saved state, or `None` if nothing was saved.
    async fn load(&self) -> Result<Option<PersistedState>>;

    async fn save(&self, state: &PersistedState) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// JSON file storage.
#[derive(Debug, Clone)]
pub struct FileStateStorage {
    path: PathBuf,
}

impl FileStateStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStorage for FileStateStorage {
    async fn load(&self) -> Result<Option<PersistedState>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(deserialize_state(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let bytes = serialize_state(state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write to a sibling file, then rename over the target.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage holding the serialized bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStorage {
    bytes: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStateStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for MemoryStateStorage {
    async fn load(&self) -> Result<Option<PersistedState>> {
        let bytes = self
            .bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match bytes {
            Some(bytes) => Ok(Some(deserialize_state(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &PersistedState) -> Result<()> {
        let bytes = serialize_state(state)?;
        *self.bytes.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

/// Saves and restores a client's persistable state.
pub struct Persister {
    client: QueryClient,
    storage: Arc<dyn StateStorage>,
}

impl Persister {
    pub fn new(client: QueryClient, storage: Arc<dyn StateStorage>) -> Self {
        Self { client, storage }
    }

    pub async fn save(&self) -> Result<()> {
        let state = self.client.snapshot();
        self.storage.save(&state).await?;
        tracing::debug!(entries = state.entries.len(), "Saved cache state");
        Ok(())
    }

    /// Loads saved state into the client. Returns false when there was
    /// nothing usable to load.
    pub async fn restore(&self) -> Result<bool> {
        let Some(state) = self.storage.load().await? else {
            return Ok(false);
        };
        if state.version != PERSISTED_STATE_VERSION {
            tracing::warn!(
                found = state.version,
                expected = PERSISTED_STATE_VERSION,
                "Ignoring persisted state with unknown version"
            );
            return Ok(false);
        }
        self.client.hydrate(&state);
        tracing::info!(entries = state.entries.len(), "Restored cache state");
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.clear().await
    }
}
