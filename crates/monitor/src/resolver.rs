//! Destination labelling via an address-intelligence service.

use std::sync::Arc;

use async_trait::async_trait;
use hackwatch_domain::model::UNKNOWN_LABEL;
use hackwatch_domain::services::LabelCache;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::send_json;
use crate::worker::MonitorError;

const UPSTREAM: &str = "labels api";

#[async_trait]
pub trait DestinationResolver: Send + Sync {
    /// Label for `address`, `"Unknown"` when none is known or the lookup fails.
    async fn resolve(&self, address: &str) -> String;
}

/// Resolves destinations in order and keeps the first label that is not
/// `"Unknown"`.
pub async fn resolve_first_known(
    resolver: &dyn DestinationResolver,
    addresses: &[String],
) -> String {
    for address in addresses {
        let label = resolver.resolve(address).await;
        if label != UNKNOWN_LABEL {
            return label;
        }
    }
    UNKNOWN_LABEL.to_string()
}

/// Used when no labels API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownResolver;

#[async_trait]
impl DestinationResolver for UnknownResolver {
    async fn resolve(&self, _address: &str) -> String {
        UNKNOWN_LABEL.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct LabelsResponse {
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    #[serde(default)]
    name: Option<String>,
}

fn first_label(response: LabelsResponse) -> Option<String> {
    response
        .labels
        .into_iter()
        .filter_map(|entry| entry.name)
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
}

/// `GET {base}/wallet/{address}/labels` with an `X-API-Key` header.
pub struct WalletLabelsResolver {
    client: Client,
    base_url: String,
    api_key: String,
    cache: Arc<dyn LabelCache>,
}

impl WalletLabelsResolver {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        cache: Arc<dyn LabelCache>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            cache,
        }
    }

    async fn lookup(&self, address: &str) -> Result<Option<String>, MonitorError> {
        let url = format!("{}/wallet/{address}/labels", self.base_url);
        let request = self
            .client
            .get(url)
            .header("accept", "application/json")
            .header("X-API-Key", &self.api_key);
        let response: LabelsResponse = send_json(request, UPSTREAM).await?;
        Ok(first_label(response))
    }
}

#[async_trait]
impl DestinationResolver for WalletLabelsResolver {
    async fn resolve(&self, address: &str) -> String {
        if let Some(label) = self.cache.get(address) {
            return label;
        }
        match self.lookup(address).await {
            Ok(label) => {
                let label = label.unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                debug!(address, label = %label, "resolved destination");
                self.cache.insert(address, label.clone());
                label
            }
            Err(err) => {
                warn!(address, error = %err, "label lookup failed, using Unknown");
                UNKNOWN_LABEL.to_string()
            }
        }
    }
}
