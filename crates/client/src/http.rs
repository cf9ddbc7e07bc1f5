//! HTTP transport for the clinicsync API.

use async_trait::async_trait;
use serde_json::Value;

use clinicsync_core::cache::{list_key, QueryKey};
use clinicsync_core::remote::{
    api_path, status_to_sync_error, Fetcher, MutationKind, MutationRequest, Mutator, Result,
    SyncError,
};

/// `reqwest`-backed [`Fetcher`] and [`Mutator`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, key: &QueryKey) -> String {
        format!("{}{}", self.base_url, api_path(key))
    }

    /// Turns a response into the JSON body or a classified error.
    async fn handle_response(&self, key: &QueryKey, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            let body = response.bytes().await.map_err(network_error)?;
            if body.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_slice(&body)
                .map_err(|e| SyncError::Network(format!("Invalid response body: {e}")))
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(status_to_sync_error(status.as_u16(), key, &message))
        }
    }
}

fn network_error(error: reqwest::Error) -> SyncError {
    SyncError::Network(error.to_string())
}

#[async_trait]
impl Fetcher for HttpTransport {
    async fn fetch(&self, key: &QueryKey) -> Result<Value> {
        tracing::trace!(key = %key, "GET");
        let response = self
            .client
            .get(self.url(key))
            .send()
            .await
            .map_err(network_error)?;
        self.handle_response(key, response).await
    }
}

#[async_trait]
impl Mutator for HttpTransport {
    async fn mutate(&self, request: &MutationRequest) -> Result<Value> {
        let key = request.key();
        tracing::trace!(key = %key, kind = %request.kind, "Sending mutation");
        let builder = match request.kind {
            // Creates go to the collection; the placeholder id stays local.
            MutationKind::Create => self
                .client
                .post(self.url(&list_key(request.class)))
                .json(&request.payload),
            MutationKind::Update => self.client.patch(self.url(&key)).json(&request.payload),
            MutationKind::Delete => self.client.delete(self.url(&key)),
        };
        let response = builder.send().await.map_err(network_error)?;
        self.handle_response(&key, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinicsync_core::cache::client_sessions_key;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let transport = HttpTransport::new("http://localhost:3000/");
        assert_eq!(transport.base_url(), "http://localhost:3000");
        assert_eq!(
            transport.url(&client_sessions_key("42")),
            "http://localhost:3000/api/clients/42/sessions"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_network_error() {
        let transport = HttpTransport::new("http://127.0.0.1:9");
        let error = transport
            .fetch(&client_sessions_key("42"))
            .await
            .unwrap_err();
        assert!(error.is_retryable());
    }
}
