use chrono::Utc;
use hackwatch_domain::model::{Chain, UpsertOutcome, WatchedAddress};
use hackwatch_domain::storage::{StorageError, StorageResult, WatchlistStore};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::entity::{addresses, ChainDb};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl WatchlistStore for SeaOrmStorage {
    async fn upsert_watched_address(
        &self,
        address: WatchedAddress,
    ) -> StorageResult<UpsertOutcome> {
        let model = addresses::ActiveModel {
            address: Set(address.address),
            blockchain: Set(ChainDb::from(address.chain)),
            last_checked_block: Set(to_db_height(address.checkpoint)?),
            created_at: Set(Utc::now()),
        };
        let inserted = addresses::Entity::insert(model)
            .on_conflict(
                OnConflict::column(addresses::Column::Address)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(if inserted == 0 {
            UpsertOutcome::Existing
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn list_watched_addresses(&self) -> StorageResult<Vec<WatchedAddress>> {
        let rows = addresses::Entity::find()
            .order_by_asc(addresses::Column::CreatedAt)
            .order_by_asc(addresses::Column::Address)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        rows.into_iter().map(address_from_model).collect()
    }

    async fn advance_checkpoint(
        &self,
        address: &str,
        chain: Chain,
        height: u64,
    ) -> StorageResult<()> {
        let height = to_db_height(height)?;
        addresses::Entity::update_many()
            .col_expr(addresses::Column::LastCheckedBlock, Expr::value(height))
            .filter(addresses::Column::Address.eq(address))
            .filter(addresses::Column::Blockchain.eq(ChainDb::from(chain)))
            .filter(addresses::Column::LastCheckedBlock.lt(height))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }
}

pub(crate) fn to_db_height(height: u64) -> StorageResult<i64> {
    i64::try_from(height)
        .map_err(|_| StorageError::Database(format!("height {height} exceeds column range")))
}

pub(crate) fn from_db_height(height: i64) -> StorageResult<u64> {
    u64::try_from(height)
        .map_err(|_| StorageError::Database(format!("negative stored height {height}")))
}

fn address_from_model(model: addresses::Model) -> StorageResult<WatchedAddress> {
    Ok(WatchedAddress {
        address: model.address,
        chain: model.blockchain.into(),
        checkpoint: from_db_height(model.last_checked_block)?,
    })
}
