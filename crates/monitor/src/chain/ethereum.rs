use std::collections::HashSet;

use async_trait::async_trait;
use hackwatch_domain::model::{Amount, Chain, TransferCandidate};
use reqwest::Client;
use tracing::{debug, warn};

use crate::rpc::{parse_quantity, EthLog, EthTransaction, JsonRpcClient, LogFilter};
use crate::worker::MonitorError;

use super::ChainAdapter;

const UPSTREAM: &str = "ethereum rpc";

pub const DEFAULT_LOG_WINDOW: u64 = 10_000;
pub const DEFAULT_LOG_CHUNK: u64 = 1_000;

/// Ethereum adapter over a standard JSON-RPC endpoint.
///
/// Candidate transactions come from `eth_getLogs` filtered on the watched
/// address; each is then fetched and kept only when the address is its sender.
/// Log queries never reach further back than `log_window` blocks below the tip
/// and are split into requests of at most `log_chunk` blocks.
pub struct EthereumRpcAdapter {
    rpc: JsonRpcClient,
    log_window: u64,
    log_chunk: u64,
}

impl EthereumRpcAdapter {
    pub fn new(client: Client, rpc_url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(client, rpc_url, UPSTREAM),
            log_window: DEFAULT_LOG_WINDOW,
            log_chunk: DEFAULT_LOG_CHUNK,
        }
    }

    pub fn with_log_window(mut self, window: u64, chunk: u64) -> Self {
        self.log_window = window.max(1);
        self.log_chunk = chunk.max(1);
        self
    }
}

/// Inclusive block ranges covering `(since_height, tip_height]`, clipped to the
/// newest `window` blocks and split into spans of at most `chunk` blocks.
pub(crate) fn log_ranges(
    since_height: u64,
    tip_height: u64,
    window: u64,
    chunk: u64,
) -> Vec<(u64, u64)> {
    let span = chunk.max(1) - 1;
    let floor = tip_height.saturating_sub(window.max(1) - 1).max(1);
    let mut ranges = Vec::new();
    let mut start = since_height.saturating_add(1).max(floor);
    while start <= tip_height {
        let end = start.saturating_add(span).min(tip_height);
        ranges.push((start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    ranges
}

/// Unique transaction hashes in log order.
pub(crate) fn candidate_hashes(logs: &[EthLog]) -> Vec<String> {
    let mut seen = HashSet::new();
    logs.iter()
        .filter(|log| seen.insert(log.transaction_hash.to_ascii_lowercase()))
        .map(|log| log.transaction_hash.clone())
        .collect()
}

pub(crate) fn outgoing_transfer(
    address: &str,
    tx: &EthTransaction,
    since_height: u64,
) -> Result<Option<TransferCandidate>, MonitorError> {
    if !tx.from.eq_ignore_ascii_case(address) {
        return Ok(None);
    }
    let Some(to) = tx.to.as_deref() else {
        return Ok(None);
    };
    let Some(block) = tx.block_number.as_deref() else {
        return Ok(None);
    };
    let height = parse_quantity(block, UPSTREAM)?;
    if height <= since_height {
        return Ok(None);
    }
    let amount = Amount::from_hex_quantity(&tx.value, Chain::Ethereum.decimals())
        .map_err(|err| MonitorError::parse(UPSTREAM, err))?;

    Ok(Some(TransferCandidate {
        chain: Chain::Ethereum,
        from_address: Chain::Ethereum.normalize(&tx.from),
        to_addresses: vec![Chain::Ethereum.normalize(to)],
        amount,
        tx_hash: tx.hash.clone(),
        block_height: height,
    }))
}

#[async_trait]
impl ChainAdapter for EthereumRpcAdapter {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn current_height(&self) -> Result<u64, MonitorError> {
        let height: String = self.rpc.call("eth_blockNumber", Vec::<String>::new()).await?;
        parse_quantity(&height, UPSTREAM)
    }

    async fn outgoing_transfers(
        &self,
        address: &str,
        since_height: u64,
        tip_height: u64,
    ) -> Result<Vec<TransferCandidate>, MonitorError> {
        let ranges = log_ranges(since_height, tip_height, self.log_window, self.log_chunk);
        if let Some(&(first, _)) = ranges.first() {
            if since_height > 0 && first > since_height + 1 {
                warn!(
                    address,
                    checkpoint = since_height,
                    scanned_from = first,
                    "checkpoint is older than the log window, earlier blocks are not scanned"
                );
            }
        }

        let mut logs: Vec<EthLog> = Vec::new();
        for &(from, to) in &ranges {
            let filter = LogFilter {
                from_block: format!("0x{from:x}"),
                to_block: format!("0x{to:x}"),
                address: address.to_string(),
            };
            let page: Vec<EthLog> = self.rpc.call("eth_getLogs", [filter]).await?;
            logs.extend(page);
        }
        let hashes = candidate_hashes(&logs);

        let mut transfers = Vec::new();
        for hash in &hashes {
            let tx: Option<EthTransaction> =
                self.rpc.call("eth_getTransactionByHash", [hash]).await?;
            let Some(tx) = tx else {
                debug!(tx_hash = %hash, "transaction not found, skipping");
                continue;
            };
            if let Some(transfer) = outgoing_transfer(address, &tx, since_height)? {
                transfers.push(transfer);
            }
        }
        debug!(
            address,
            requests = ranges.len(),
            logs = logs.len(),
            candidates = hashes.len(),
            outgoing = transfers.len(),
            "scanned ethereum logs"
        );
        Ok(transfers)
    }
}
