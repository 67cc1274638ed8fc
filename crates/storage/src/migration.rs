use sea_orm::sea_query::{ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{addresses, monitor_state, transactions};
use hackwatch_domain::storage::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let addresses_table = Table::create()
        .if_not_exists()
        .table(addresses::Entity)
        .col(
            ColumnDef::new(addresses::Column::Address)
                .string_len(128)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(addresses::Column::Blockchain)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(addresses::Column::LastCheckedBlock)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(addresses::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, addresses_table).await?;

    let transactions_table = Table::create()
        .if_not_exists()
        .table(transactions::Entity)
        .col(
            ColumnDef::new(transactions::Column::Blockchain)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::TxHash)
                .string_len(128)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::FromAddress)
                .string_len(128)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::ToAddress)
                .text()
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::Amount)
                .string_len(80)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::TokenName)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::BlockNumber)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::Destination)
                .string()
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::AlertPending)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(transactions::Column::DetectedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .primary_key(
            Index::create()
                .col(transactions::Column::Blockchain)
                .col(transactions::Column::TxHash),
        )
        .to_owned();
    create_table(db, backend, transactions_table).await?;

    let state_table = Table::create()
        .if_not_exists()
        .table(monitor_state::Entity)
        .col(
            ColumnDef::new(monitor_state::Column::Id)
                .integer()
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(monitor_state::Column::Status)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(monitor_state::Column::LastRun)
                .date_time()
                .not_null(),
        )
        .col(ColumnDef::new(monitor_state::Column::LastCompleted).date_time())
        .col(ColumnDef::new(monitor_state::Column::LastError).text())
        .col(ColumnDef::new(monitor_state::Column::LastReport).text())
        .to_owned();
    create_table(db, backend, state_table).await?;

    let block_index = Index::create()
        .if_not_exists()
        .name("idx_transactions_block_number")
        .table(transactions::Entity)
        .col(transactions::Column::BlockNumber)
        .to_owned();
    create_index(db, backend, block_index).await?;

    let pending_index = Index::create()
        .if_not_exists()
        .name("idx_transactions_alert_pending")
        .table(transactions::Entity)
        .col(transactions::Column::AlertPending)
        .to_owned();
    create_index(db, backend, pending_index).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    statement: IndexCreateStatement,
) -> StorageResult<()> {
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
