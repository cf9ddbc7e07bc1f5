//! Optimistic mutations.
//!
//! A mutation is staged into the cache before the server is called, then
//! either committed with the server's response or rolled back to the
//! snapshot taken at staging time. Dropping the mutation future after it
//! staged rolls it back as well, so tentative data never outlives its call.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use clinicsync_core::cache::{entity_key, temp_id, QueryKey, StoreAction};
use clinicsync_core::clinic::EntityClass;
use clinicsync_core::mutation::{tentative_data, MutationState, OptimisticUpdate};
use clinicsync_core::remote::{
    MutationKind, MutationRequest, Mutator, Result as SyncResult, SyncError,
};

use crate::error::{ClientError, Result};
use crate::query_client::QueryClient;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle notifications for mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEvent {
    Staged {
        id: Uuid,
        key: QueryKey,
        kind: MutationKind,
    },
    Committed {
        id: Uuid,
        key: QueryKey,
        kind: MutationKind,
        data: Value,
    },
    RolledBack {
        id: Uuid,
        key: QueryKey,
        kind: MutationKind,
        error: SyncError,
    },
    /// The caller dropped the mutation before the server answered.
    Cancelled {
        id: Uuid,
        key: QueryKey,
        kind: MutationKind,
    },
}

#[derive(Clone)]
pub struct MutationCoordinator {
    client: QueryClient,
    mutator: Arc<dyn Mutator>,
    events: broadcast::Sender<MutationEvent>,
}

impl MutationCoordinator {
    pub fn new(client: QueryClient, mutator: Arc<dyn Mutator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            mutator,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events.subscribe()
    }

    pub async fn create(&self, class: EntityClass, payload: Value) -> Result<Value> {
        self.mutate(class, MutationKind::Create, None, payload)
            .await
    }

    pub async fn update(&self, class: EntityClass, id: &str, patch: Value) -> Result<Value> {
        self.mutate(class, MutationKind::Update, Some(id), patch)
            .await
    }

    pub async fn delete(&self, class: EntityClass, id: &str) -> Result<Value> {
        self.mutate(class, MutationKind::Delete, Some(id), Value::Null)
            .await
    }

    /// Stages, sends and settles one mutation.
    ///
    /// Creates take no id and are staged under a temporary one. Updates and
    /// deletes need the id of the entity they target; a bad id is rejected
    /// as [`ClientError::InvalidInput`] before anything is staged. Server
    /// failures are never retried: the staged write is rolled back and the
    /// error returned as [`ClientError::Sync`].
    pub async fn mutate(
        &self,
        class: EntityClass,
        kind: MutationKind,
        entity_id: Option<&str>,
        payload: Value,
    ) -> Result<Value> {
        let entity_id = match (kind, entity_id) {
            (MutationKind::Create, None) => temp_id(),
            (MutationKind::Create, Some(_)) => {
                return Err(ClientError::InvalidInput(
                    "create must not name an entity id".to_string(),
                ))
            }
            (_, None) => {
                return Err(ClientError::InvalidInput(format!(
                    "{kind} needs an entity id"
                )));
            }
            (_, Some(id)) if id.is_empty() || id.contains(':') => {
                return Err(ClientError::InvalidInput(format!(
                    "invalid entity id: {id:?}"
                )));
            }
            (_, Some(id)) => id.to_string(),
        };

        let key = entity_key(class, &entity_id);
        let mut staged = self.stage(class, kind, key, &entity_id, &payload);

        let request = MutationRequest {
            class,
            kind,
            entity_id,
            payload,
        };
        match self.mutator.mutate(&request).await {
            Ok(data) => {
                staged.settle(MutationState::Committed);
                self.commit(class, &staged.update, &data);
                Ok(data)
            }
            Err(error) => {
                staged.settle(MutationState::RolledBack);
                self.rollback(&staged.update);
                tracing::warn!(
                    key = %staged.update.key,
                    kind = %kind,
                    error_kind = error.kind(),
                    error = %error,
                    "Mutation rolled back"
                );
                self.emit(MutationEvent::RolledBack {
                    id: staged.update.id,
                    key: staged.update.key.clone(),
                    kind,
                    error: error.clone(),
                });
                Err(error.into())
            }
        }
    }

    fn stage(
        &self,
        class: EntityClass,
        kind: MutationKind,
        key: QueryKey,
        entity_id: &str,
        payload: &Value,
    ) -> StagedMutation<'_> {
        let now = self.client.now();
        let issued = self.client.issue();

        let update = self.client.apply(|store| {
            let snapshot = store.get(&key).cloned();
            let tentative = tentative_data(
                kind,
                snapshot.as_ref().map(|e| &e.data),
                payload,
                entity_id,
            );
            let update =
                OptimisticUpdate::new(kind, key.clone(), snapshot, tentative.clone(), now);
            let store = store.reduce(StoreAction::Stage {
                key,
                data: tentative,
                tier: class.tier(),
                issued,
                now,
            });
            (store, update)
        });
        self.client.pending().push(update.clone());

        tracing::debug!(key = %update.key, kind = %kind, id = %update.id, "Mutation staged");
        self.emit(MutationEvent::Staged {
            id: update.id,
            key: update.key.clone(),
            kind,
        });

        StagedMutation {
            coordinator: self,
            update,
            state: MutationState::Staged,
        }
    }

    fn commit(&self, class: EntityClass, update: &OptimisticUpdate, data: &Value) {
        let key = &update.key;
        self.client.pending().take(key, &update.id);
        let now = self.client.now();

        match update.kind {
            MutationKind::Create => {
                self.client.dispatch(StoreAction::Restore {
                    key: key.clone(),
                    snapshot: None,
                    issued: self.client.issue(),
                });
                let server_id = data.get("id").and_then(Value::as_str);
                self.client.invalidate(class, server_id);
                match server_id {
                    Some(id) => self.client.dispatch(StoreAction::Write {
                        key: entity_key(class, id),
                        data: data.clone(),
                        tier: class.tier(),
                        issued: self.client.issue(),
                        now,
                    }),
                    None => tracing::warn!(key = %key, "Create response carries no id"),
                }
            }
            MutationKind::Update => {
                self.client.invalidate(class, key.entity_id());
                // A later mutation staged on top keeps its tentative data.
                if !self.client.pending().has_pending(key) {
                    self.client.dispatch(StoreAction::Write {
                        key: key.clone(),
                        data: data.clone(),
                        tier: class.tier(),
                        issued: self.client.issue(),
                        now,
                    });
                }
            }
            MutationKind::Delete => {
                self.client.invalidate(class, key.entity_id());
                if !self.client.pending().has_pending(key) {
                    self.client.dispatch(StoreAction::Remove { key: key.clone() });
                }
            }
        }

        tracing::debug!(key = %key, kind = %update.kind, id = %update.id, "Mutation committed");
        self.emit(MutationEvent::Committed {
            id: update.id,
            key: key.clone(),
            kind: update.kind,
            data: data.clone(),
        });
    }

    /// Restores the snapshot captured when `update` was staged. Returns
    /// false if the update was already settled.
    ///
    /// A snapshot that was itself tentative data stays optimistic while
    /// other updates on the key are pending. Once none are left it is
    /// restored as stale authoritative data so the next read refetches it.
    fn rollback(&self, update: &OptimisticUpdate) -> bool {
        let mut pending = self.client.pending();
        if pending.take(&update.key, &update.id).is_none() {
            return false;
        }
        let settled = !pending.has_pending(&update.key);
        drop(pending);

        let mut snapshot = update.original_snapshot.clone();
        if let Some(entry) = snapshot.as_mut().filter(|e| settled && e.optimistic) {
            entry.optimistic = false;
            entry.mark_stale(self.client.now());
        }
        self.client.dispatch(StoreAction::Restore {
            key: update.key.clone(),
            snapshot,
            issued: self.client.issue(),
        });
        true
    }

    fn emit(&self, event: MutationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// A staged mutation that rolls itself back unless settled.
struct StagedMutation<'a> {
    coordinator: &'a MutationCoordinator,
    update: OptimisticUpdate,
    state: MutationState,
}

impl StagedMutation<'_> {
    fn settle(&mut self, next: MutationState) {
        debug_assert!(self.state.can_transition_to(next));
        self.state = next;
    }
}

impl Drop for StagedMutation<'_> {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.coordinator.rollback(&self.update) {
            tracing::warn!(
                key = %self.update.key,
                id = %self.update.id,
                "Mutation cancelled, rolled back"
            );
            self.coordinator.emit(MutationEvent::Cancelled {
                id: self.update.id,
                key: self.update.key.clone(),
                kind: self.update.kind,
            });
        }
    }
}
