use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use chroma_config::{registry::Registry, Configurable};
use chroma_error::ChromaError;
use chroma_storage_sql::{RelationalStore, StoreProviderConfig};

use crate::memory_store::InMemoryLogStore;
use crate::sql_store::SqlLogStore;
use crate::store::LogStore;

/// Configures the Log Store backend. Kept separate from
/// `chroma_sysdb::CatalogConfig` even though both wrap the same
/// `StoreProviderConfig` choice, since the log and the catalog are
/// independently deployable and may point at different databases.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub store: StoreProviderConfig,
    /// Minimum number of unread log entries a collection must accumulate
    /// before `GetAllCollectionInfoToCompact` reports it.
    #[serde(default = "LogConfig::default_min_compaction_size")]
    pub min_compaction_size: u64,
    /// Upper bound on how many records a single `PullLogs` call returns,
    /// regardless of the caller's requested batch size.
    #[serde(default = "LogConfig::default_max_batch_size")]
    pub max_batch_size: i32,
}

impl LogConfig {
    fn default_min_compaction_size() -> u64 {
        1
    }

    fn default_max_batch_size() -> i32 {
        1000
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            store: StoreProviderConfig::Memory,
            min_compaction_size: Self::default_min_compaction_size(),
            max_batch_size: Self::default_max_batch_size(),
        }
    }
}

/// Builds the configured `LogStore` backend, running schema bootstrap for
/// the relational backend before returning.
#[async_trait]
impl Configurable<LogConfig> for Arc<dyn LogStore> {
    async fn try_from_config(
        config: &LogConfig,
        _registry: &Registry,
    ) -> Result<Self, Box<dyn ChromaError>> {
        match &config.store {
            StoreProviderConfig::Memory => Ok(Arc::new(InMemoryLogStore::new())),
            StoreProviderConfig::Relational(relational_config) => {
                let store = RelationalStore::connect(relational_config)
                    .await
                    .map_err(|err| err.boxed())?;
                let log_store = SqlLogStore::new(store);
                log_store.bootstrap().await.map_err(|err| err.boxed())?;
                Ok(Arc::new(log_store))
            }
        }
    }
}
