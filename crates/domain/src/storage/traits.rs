use async_trait::async_trait;
use thiserror::Error;

use chrono::{DateTime, Utc};

use crate::model::{
    Chain, CycleReport, CycleStatus, InsertOutcome, MonitorState, TransferEvent, TransferRecord,
    UpsertOutcome, WatchedAddress,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Inserts the address with checkpoint 0, or leaves an existing row as is.
    async fn upsert_watched_address(&self, address: WatchedAddress)
        -> StorageResult<UpsertOutcome>;
    async fn list_watched_addresses(&self) -> StorageResult<Vec<WatchedAddress>>;
    /// Raises the checkpoint to `height`; lower values never overwrite a
    /// higher stored checkpoint.
    async fn advance_checkpoint(&self, address: &str, chain: Chain, height: u64)
        -> StorageResult<()>;
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Idempotent on `(chain, tx_hash)`. New rows start with a pending alert.
    async fn insert_transfer(&self, event: &TransferEvent) -> StorageResult<InsertOutcome>;
    async fn transfer_exists(&self, chain: Chain, tx_hash: &str) -> StorageResult<bool>;
    /// Latest transfers by descending block height.
    async fn recent_transfers(&self, limit: u64) -> StorageResult<Vec<TransferRecord>>;
    async fn pending_alerts(&self, limit: u64) -> StorageResult<Vec<TransferRecord>>;
    async fn mark_alert_delivered(&self, chain: Chain, tx_hash: &str) -> StorageResult<()>;
}

/// Single-row record of the monitor's run history.
#[async_trait]
pub trait MonitorStateStore: Send + Sync {
    /// Marks a cycle as running. Earlier completion data is kept.
    async fn record_cycle_started(&self, started_at: DateTime<Utc>) -> StorageResult<()>;
    /// Stores the finished cycle's report with its final status.
    async fn record_cycle_finished(
        &self,
        status: CycleStatus,
        report: &CycleReport,
        last_error: Option<&str>,
    ) -> StorageResult<()>;
    async fn load_monitor_state(&self) -> StorageResult<Option<MonitorState>>;
}
