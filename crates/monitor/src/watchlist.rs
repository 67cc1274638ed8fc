//! Flagged-address feed and its merge into the watch set.

use async_trait::async_trait;
use hackwatch_domain::model::{ClassifyError, FlaggedAddress, IngestReport, UpsertOutcome};
use hackwatch_domain::storage::WatchlistStore;
use metrics::counter;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::send_json;
use crate::worker::MonitorError;

const UPSTREAM: &str = "flagged feed";

#[async_trait]
pub trait FlaggedAddressFeed: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>, MonitorError>;
}

/// Feed served as a JSON array of address strings.
pub struct HttpFlaggedFeed {
    client: Client,
    url: String,
}

impl HttpFlaggedFeed {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FlaggedAddressFeed for HttpFlaggedFeed {
    async fn fetch(&self) -> Result<Vec<String>, MonitorError> {
        let entries: Vec<Value> = send_json(self.client.get(&self.url), UPSTREAM).await?;
        let total = entries.len();
        let addresses: Vec<String> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(address) => Some(address),
                _ => None,
            })
            .collect();
        if addresses.len() != total {
            debug!(dropped = total - addresses.len(), "ignored non-string feed entries");
        }
        Ok(addresses)
    }
}

/// Merges raw feed entries into the watch set. Unclassifiable and malformed
/// entries are counted and skipped; existing rows keep their checkpoint.
pub async fn ingest<S>(store: &S, raw_addresses: &[String]) -> IngestReport
where
    S: WatchlistStore + ?Sized,
{
    let mut report = IngestReport::default();
    for raw in raw_addresses {
        let flagged = match FlaggedAddress::parse(raw) {
            Ok(flagged) => flagged,
            Err(ClassifyError::UnknownChainPrefix(address)) => {
                debug!(address = %address, "skipping address with unknown chain prefix");
                report.unknown_prefix += 1;
                counter!("watchlist_ingested_total", "result" => "unknown_prefix").increment(1);
                continue;
            }
            Err(err @ ClassifyError::InvalidFormat { .. }) => {
                debug!(error = %err, "skipping malformed address");
                report.invalid += 1;
                counter!("watchlist_ingested_total", "result" => "invalid").increment(1);
                continue;
            }
        };

        let address = flagged.as_str().to_string();
        match store.upsert_watched_address(flagged.into()).await {
            Ok(UpsertOutcome::Inserted) => {
                report.inserted += 1;
                counter!("watchlist_ingested_total", "result" => "inserted").increment(1);
            }
            Ok(UpsertOutcome::Existing) => {
                report.existing += 1;
                counter!("watchlist_ingested_total", "result" => "existing").increment(1);
            }
            Err(err) => {
                warn!(address = %address, error = %err, "failed to upsert watched address");
                report.failed += 1;
                counter!("watchlist_ingested_total", "result" => "failed").increment(1);
            }
        }
    }
    report
}
