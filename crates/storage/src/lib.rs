//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).

mod builder;
mod entity;
mod migration;
mod monitor_state_store;
mod transfer_store;
mod watchlist_store;

use std::sync::Arc;

use hackwatch_domain::config::DatabaseConfig;
use hackwatch_domain::storage::StorageResult;
use sea_orm::DatabaseConnection;

pub use builder::StorageBuilder;

/// Shared storage handle used by the HTTP API and monitor services.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    /// Connects with the pool settings the binaries read from the environment.
    pub async fn connect_with(config: &DatabaseConfig) -> StorageResult<Self> {
        StorageBuilder::from_config(config).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

#[cfg(test)]
pub(crate) async fn memory_storage() -> SeaOrmStorage {
    SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("storage inits")
}
