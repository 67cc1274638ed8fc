use std::time::Duration;

use hackwatch_domain::config::DatabaseConfig;
use hackwatch_domain::storage::{StorageError, StorageResult};
use sea_orm::{ConnectOptions, Database};

use crate::{migration::run_migrations, SeaOrmStorage};

/// Connection settings for deployments that need more than a bare URL.
#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout: Option<Duration>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        let builder = Self::new()
            .database_url(config.url.clone())
            .connect_timeout(config.connect_timeout);
        match config.max_connections {
            Some(max) => builder.max_connections(max),
            None => builder,
        }
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let mut options = ConnectOptions::new(url);
        options.sqlx_logging(false);
        if let Some(max) = self.max_connections {
            options.max_connections(max);
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout(timeout);
        }
        let db = Database::connect(options)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(SeaOrmStorage::from_connection(db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hackwatch_domain::storage::WatchlistStore;

    #[tokio::test]
    async fn builder_requires_url() {
        let err = StorageBuilder::new().build().await.err().expect("missing url");
        assert_eq!(err, StorageError::Database("missing database url".into()));
    }

    #[tokio::test]
    async fn builder_connects_and_migrates() {
        let storage = SeaOrmStorage::builder()
            .database_url("sqlite::memory:")
            .connect_timeout(Duration::from_secs(5))
            .build()
            .await
            .expect("storage builds");
        let addresses = storage.list_watched_addresses().await.expect("query runs");
        assert!(addresses.is_empty());
    }

    #[tokio::test]
    async fn database_config_sets_pool_options() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: Some(1),
            connect_timeout: Duration::from_secs(2),
        };
        let builder = StorageBuilder::from_config(&config);
        assert_eq!(builder.max_connections, Some(1));
        assert_eq!(builder.connect_timeout, Some(Duration::from_secs(2)));

        let storage = SeaOrmStorage::connect_with(&config).await.expect("connects");
        assert!(storage.list_watched_addresses().await.unwrap().is_empty());
    }
}
