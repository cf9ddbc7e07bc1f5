//! Speculative reads ahead of navigation.

use futures_util::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;

use clinicsync_core::cache::{is_temp_id, prefetch_targets, QueryKey};
use clinicsync_core::clinic::EntityClass;

use crate::query_client::QueryClient;

/// Outcome of one navigation's prefetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchReport {
    pub fetched: Vec<QueryKey>,
    /// Failures are reported here and logged, never raised.
    pub failed: Vec<QueryKey>,
}

#[derive(Clone)]
pub struct Prefetcher {
    client: QueryClient,
}

impl Prefetcher {
    pub fn new(client: QueryClient) -> Self {
        Self { client }
    }

    /// Prefetches what the screen for an entity is likely to read.
    ///
    /// Keys that are already fresh are skipped by the client. Entities that
    /// only exist as a staged create have nothing to prefetch.
    pub async fn on_navigate(&self, class: EntityClass, id: &str) -> PrefetchReport {
        if is_temp_id(id) {
            return PrefetchReport::default();
        }

        let targets = prefetch_targets(class, id);
        let results = join_all(targets.into_iter().map(|key| async move {
            let outcome = self.client.prefetch(&key).await;
            (key, outcome)
        }))
        .await;

        let mut report = PrefetchReport::default();
        for (key, outcome) in results {
            match outcome {
                Ok(()) => report.fetched.push(key),
                Err(error) => {
                    tracing::debug!(key = %key, error = %error, "Prefetch failed");
                    report.failed.push(key);
                }
            }
        }
        report
    }

    /// Runs [`Prefetcher::on_navigate`] in the background.
    pub fn spawn_on_navigate(
        &self,
        class: EntityClass,
        id: impl Into<String>,
    ) -> JoinHandle<PrefetchReport> {
        let prefetcher = self.clone();
        let id = id.into();
        tokio::spawn(async move { prefetcher.on_navigate(class, &id).await })
    }
}
