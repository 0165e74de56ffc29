//! HTTP Ledger Gateway
//!
//! REST client for the processor's banking resources.
//!
//! ```text
//! list        GET  {base}/{collection}/?field=value...
//! get         GET  {base}/{collection}/{id}
//! create      POST {base}/{collection}/
//! transition  POST {base}/{collection}/{id}/{enroll|enqueue}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use super::LedgerGateway;
use crate::config::GatewayConfig;
use crate::reconcile::error::GatewayError;
use crate::reconcile::types::{EntityKind, Fields, RemoteEntity, TransitionKind};

/// Gateway backed by the processor's HTTP API
pub struct HttpGateway {
    client: reqwest::Client,
    /// `{api_base_url}/{api_version}` without trailing slash
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    /// Create a new HTTP gateway
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let base_url = format!(
            "{}/{}",
            config.api_base_url.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        );
        info!(base_url = %base_url, timeout_ms = config.timeout_ms, "Initializing HTTP gateway");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}/", self.base_url, kind.collection())
    }

    fn entity_url(&self, kind: EntityKind, remote_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.collection(), remote_id)
    }

    fn transition_url(&self, kind: EntityKind, remote_id: &str, transition: TransitionKind) -> String {
        format!("{}/{}", self.entity_url(kind, remote_id), transition.as_str())
    }

    /// Send an authorized request and fail on any non-2xx status
    async fn dispatch(&self, request: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::from_status(status.as_u16(), body))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        self.dispatch(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to decode response: {}", e)))
    }
}

/// Flatten a filter into query parameters
fn query_pairs(filter: &Fields) -> Vec<(String, String)> {
    filter
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[async_trait]
impl LedgerGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list(&self, kind: EntityKind, filter: &Fields) -> Result<Vec<RemoteEntity>, GatewayError> {
        debug!(kind = %kind, filters = filter.len(), "GET collection");
        let request = self
            .client
            .get(self.collection_url(kind))
            .query(&query_pairs(filter));
        self.fetch(request).await
    }

    async fn get(&self, kind: EntityKind, remote_id: &str) -> Result<RemoteEntity, GatewayError> {
        debug!(kind = %kind, remote_id, "GET entity");
        self.fetch(self.client.get(self.entity_url(kind, remote_id)))
            .await
    }

    async fn create(&self, kind: EntityKind, payload: &Fields) -> Result<RemoteEntity, GatewayError> {
        debug!(kind = %kind, "POST collection");
        let request = self.client.post(self.collection_url(kind)).json(payload);
        self.fetch(request).await
    }

    async fn transition(
        &self,
        kind: EntityKind,
        remote_id: &str,
        transition: TransitionKind,
        context: &Fields,
    ) -> Result<(), GatewayError> {
        debug!(kind = %kind, remote_id, transition = %transition, "POST transition");
        let request = self
            .client
            .post(self.transition_url(kind, remote_id, transition))
            .json(context);
        self.dispatch(request).await?;
        Ok(())
    }
}
