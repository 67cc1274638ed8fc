use chrono::Utc;
use hackwatch_domain::model::{Chain, InsertOutcome, TransferEvent, TransferRecord};
use hackwatch_domain::storage::{StorageError, StorageResult, TransferStore};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};

use crate::entity::{transactions, ChainDb};
use crate::watchlist_store::{from_db_height, to_db_height};
use crate::SeaOrmStorage;

const DESTINATION_SEPARATOR: &str = ", ";

#[async_trait::async_trait]
impl TransferStore for SeaOrmStorage {
    async fn insert_transfer(&self, event: &TransferEvent) -> StorageResult<InsertOutcome> {
        let model = transactions::ActiveModel {
            blockchain: Set(ChainDb::from(event.chain)),
            tx_hash: Set(event.tx_hash.clone()),
            from_address: Set(event.from_address.clone()),
            to_address: Set(event.to_addresses.join(DESTINATION_SEPARATOR)),
            amount: Set(event.amount.clone()),
            token_name: Set(event.asset_symbol.clone()),
            block_number: Set(to_db_height(event.block_height)?),
            destination: Set(event.destination_label.clone()),
            alert_pending: Set(true),
            detected_at: Set(Utc::now()),
        };
        let inserted = transactions::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    transactions::Column::Blockchain,
                    transactions::Column::TxHash,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(if inserted == 0 {
            InsertOutcome::Duplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn transfer_exists(&self, chain: Chain, tx_hash: &str) -> StorageResult<bool> {
        let found = transactions::Entity::find_by_id((ChainDb::from(chain), tx_hash.to_string()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(found.is_some())
    }

    async fn recent_transfers(&self, limit: u64) -> StorageResult<Vec<TransferRecord>> {
        let rows = transactions::Entity::find()
            .order_by_desc(transactions::Column::BlockNumber)
            .order_by_desc(transactions::Column::DetectedAt)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        rows.into_iter().map(record_from_model).collect()
    }

    async fn pending_alerts(&self, limit: u64) -> StorageResult<Vec<TransferRecord>> {
        let rows = transactions::Entity::find()
            .filter(transactions::Column::AlertPending.eq(true))
            .order_by_asc(transactions::Column::BlockNumber)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        rows.into_iter().map(record_from_model).collect()
    }

    async fn mark_alert_delivered(&self, chain: Chain, tx_hash: &str) -> StorageResult<()> {
        transactions::Entity::update_many()
            .col_expr(transactions::Column::AlertPending, Expr::value(false))
            .filter(transactions::Column::Blockchain.eq(ChainDb::from(chain)))
            .filter(transactions::Column::TxHash.eq(tx_hash))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }
}

fn record_from_model(model: transactions::Model) -> StorageResult<TransferRecord> {
    let to_addresses = model
        .to_address
        .split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(str::to_string)
        .collect();

    Ok(TransferRecord {
        event: TransferEvent {
            chain: model.blockchain.into(),
            from_address: model.from_address,
            to_addresses,
            amount: model.amount,
            asset_symbol: model.token_name,
            tx_hash: model.tx_hash,
            block_height: from_db_height(model.block_number)?,
            destination_label: model.destination,
        },
        alert_pending: model.alert_pending,
        detected_at: model.detected_at,
    })
}
