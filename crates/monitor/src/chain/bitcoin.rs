use async_trait::async_trait;
use hackwatch_domain::model::{Amount, Chain, TransferCandidate};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::client::{send_json, send_text};
use crate::worker::MonitorError;

use super::ChainAdapter;

const UPSTREAM: &str = "bitcoin api";

/// Esplora-style REST adapter (`/blocks/tip/height`, `/address/{a}`, `/tx/{id}`).
pub struct EsploraAdapter {
    client: Client,
    base_url: String,
    tx_scan_limit: usize,
}

impl EsploraAdapter {
    pub fn new(client: Client, base_url: impl Into<String>, tx_scan_limit: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tx_scan_limit: tx_scan_limit.max(1),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddressTxids {
    #[serde(default)]
    txids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraTx {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub status: Option<EsploraStatus>,
    #[serde(default)]
    pub vin: Vec<EsploraVin>,
    #[serde(default)]
    pub vout: Vec<EsploraVout>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraStatus {
    #[serde(default)]
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraVin {
    #[serde(default)]
    pub prevout: Option<EsploraVout>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EsploraVout {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

impl EsploraTx {
    /// Confirmation height, `None` while unconfirmed.
    pub fn height(&self) -> Option<u64> {
        self.block_height
            .or_else(|| self.status.as_ref().and_then(|status| status.block_height))
            .filter(|height| *height > 0)
    }

    fn spends_from(&self, address: &str) -> bool {
        self.vin.iter().any(|vin| {
            vin.prevout
                .as_ref()
                .and_then(|prevout| prevout.scriptpubkey_address.as_deref())
                .is_some_and(|spent| Chain::Bitcoin.normalize(spent) == address)
        })
    }
}

/// Builds the transfer for `tx` when `address` funds one of its inputs and the
/// transaction confirmed above `since_height`. Every output is a destination
/// and the amount is the sum of all output values.
pub(crate) fn outgoing_transfer(
    address: &str,
    txid: &str,
    tx: &EsploraTx,
    since_height: u64,
) -> Result<Option<TransferCandidate>, MonitorError> {
    let Some(height) = tx.height() else {
        return Ok(None);
    };
    if height <= since_height || !tx.spends_from(address) {
        return Ok(None);
    }

    let decimals = Chain::Bitcoin.decimals();
    let mut amount = Amount::zero(decimals);
    for output in &tx.vout {
        amount = amount
            .checked_add(Amount::new(u128::from(output.value), decimals))
            .map_err(|err| MonitorError::parse(UPSTREAM, err))?;
    }
    let to_addresses = tx
        .vout
        .iter()
        .filter_map(|output| output.scriptpubkey_address.clone())
        .collect();

    Ok(Some(TransferCandidate {
        chain: Chain::Bitcoin,
        from_address: address.to_string(),
        to_addresses,
        amount,
        tx_hash: tx.txid.clone().unwrap_or_else(|| txid.to_string()),
        block_height: height,
    }))
}

#[async_trait]
impl ChainAdapter for EsploraAdapter {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn current_height(&self) -> Result<u64, MonitorError> {
        let url = format!("{}/blocks/tip/height", self.base_url);
        let body = send_text(self.client.get(url), UPSTREAM).await?;
        let height = body.trim();
        height
            .parse()
            .map_err(|err| MonitorError::parse(UPSTREAM, format!("tip height `{height}`: {err}")))
    }

    async fn outgoing_transfers(
        &self,
        address: &str,
        since_height: u64,
        tip_height: u64,
    ) -> Result<Vec<TransferCandidate>, MonitorError> {
        let url = format!("{}/address/{address}", self.base_url);
        let listing: AddressTxids = send_json(self.client.get(url), UPSTREAM).await?;

        let mut transfers = Vec::new();
        for txid in listing.txids.iter().take(self.tx_scan_limit) {
            let url = format!("{}/tx/{txid}", self.base_url);
            let tx: EsploraTx = send_json(self.client.get(url), UPSTREAM).await?;
            let Some(transfer) = outgoing_transfer(address, txid, &tx, since_height)? else {
                continue;
            };
            // Confirmed after the tip was read; the next cycle picks it up.
            if transfer.block_height > tip_height {
                continue;
            }
            transfers.push(transfer);
        }
        debug!(
            address,
            inspected = listing.txids.len().min(self.tx_scan_limit),
            outgoing = transfers.len(),
            "scanned bitcoin transactions"
        );
        Ok(transfers)
    }
}
