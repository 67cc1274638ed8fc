//! Data structures shared across the monitor, storage and API crates.

mod address;
mod amount;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString, IntoStaticStr};
use thiserror::Error;

pub use address::{Chain, ClassifyError, FlaggedAddress};
pub use amount::{Amount, AmountError};

/// Label used whenever a destination cannot be identified.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// An address on the watch set together with its progress checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAddress {
    pub address: String,
    pub chain: Chain,
    /// Last chain height through which outgoing activity has been processed.
    pub checkpoint: u64,
}

impl From<FlaggedAddress> for WatchedAddress {
    fn from(value: FlaggedAddress) -> Self {
        Self {
            chain: value.chain(),
            address: value.into_inner(),
            checkpoint: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// The address was already watched; its checkpoint was left untouched.
    Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A transfer with the same `(chain, tx_hash)` is already stored.
    Duplicate,
}

/// Outgoing transfer as reported by a chain adapter, before destination
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCandidate {
    pub chain: Chain,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub amount: Amount,
    pub tx_hash: String,
    pub block_height: u64,
}

impl TransferCandidate {
    pub fn asset_symbol(&self) -> &'static str {
        self.chain.asset_symbol()
    }

    /// Rejects candidates that must never reach storage: missing source or
    /// destinations, destinations that are not addresses of the same chain,
    /// malformed hashes and unconfirmed heights.
    pub fn validate(&self) -> Result<(), CandidateError> {
        if self.from_address.trim().is_empty() {
            return Err(CandidateError::MissingSource);
        }
        if !is_valid_tx_hash(self.chain, &self.tx_hash) {
            return Err(CandidateError::InvalidHash(self.tx_hash.clone()));
        }
        if self.block_height == 0 {
            return Err(CandidateError::Unconfirmed);
        }
        if self.to_addresses.is_empty() {
            return Err(CandidateError::NoDestinations);
        }
        for destination in &self.to_addresses {
            if !self.chain.is_valid_address(&self.chain.normalize(destination)) {
                return Err(CandidateError::InvalidDestination(destination.clone()));
            }
        }
        Ok(())
    }

    pub fn into_event(self, destination_label: impl Into<String>) -> TransferEvent {
        TransferEvent {
            asset_symbol: self.asset_symbol().to_string(),
            amount: self.amount.to_string(),
            chain: self.chain,
            from_address: self.from_address,
            to_addresses: self.to_addresses,
            tx_hash: self.tx_hash,
            block_height: self.block_height,
            destination_label: destination_label.into(),
        }
    }
}

// Ethereum hashes carry a `0x` prefix, Esplora txids are bare hex.
fn is_valid_tx_hash(chain: Chain, hash: &str) -> bool {
    let digits = match chain {
        Chain::Ethereum => match hash.strip_prefix("0x") {
            Some(digits) => digits,
            None => return false,
        },
        Chain::Bitcoin => hash,
    };
    digits.len() == 64 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CandidateError {
    #[error("transfer has no source address")]
    MissingSource,
    #[error("malformed transaction hash `{0}`")]
    InvalidHash(String),
    #[error("transfer has no confirmed block height")]
    Unconfirmed,
    #[error("transfer has no destination address")]
    NoDestinations,
    #[error("destination `{0}` is not an address of the transfer's chain")]
    InvalidDestination(String),
}

/// A resolved outgoing transfer. Identity is `(chain, tx_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub chain: Chain,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    /// Decimal amount in the display unit (BTC, ETH).
    pub amount: String,
    pub asset_symbol: String,
    pub tx_hash: String,
    pub block_height: u64,
    pub destination_label: String,
}

/// Stored transfer with bookkeeping columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    #[serde(flatten)]
    pub event: TransferEvent,
    pub alert_pending: bool,
    pub detected_at: DateTime<Utc>,
}

/// Counters from the flagged-feed merge step of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: u64,
    pub existing: u64,
    pub unknown_prefix: u64,
    pub invalid: u64,
    pub failed: u64,
}

/// Outcome of one monitor cycle as exposed through the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub watchlist: IngestReport,
    /// `false` when the flagged feed could not be fetched this cycle.
    pub feed_ok: bool,
    pub addresses_processed: u64,
    pub addresses_skipped: u64,
    pub addresses_failed: u64,
    pub transfers_recorded: u64,
    pub transfers_duplicate: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub alerts_redelivered: u64,
    /// Set when a stop signal ended the cycle before every address was visited.
    pub interrupted: bool,
}

impl CycleReport {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            finished_at: at,
            watchlist: IngestReport::default(),
            feed_ok: true,
            addresses_processed: 0,
            addresses_skipped: 0,
            addresses_failed: 0,
            transfers_recorded: 0,
            transfers_duplicate: 0,
            alerts_sent: 0,
            alerts_failed: 0,
            alerts_redelivered: 0,
            interrupted: false,
        }
    }
}

/// Lifecycle of the most recent cycle as persisted in the monitor state row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CycleStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

/// Durable view of the monitor's last run. Survives restarts of either binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub status: CycleStatus,
    pub last_run: DateTime<Utc>,
    pub last_completed: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<CycleReport>,
}
