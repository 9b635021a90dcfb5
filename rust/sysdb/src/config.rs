use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use chroma_config::{registry::Registry, Configurable};
use chroma_error::ChromaError;
use chroma_storage_sql::{RelationalStore, StoreProviderConfig};

use crate::catalog::Catalog;
use crate::memory_catalog::InMemoryCatalog;
use crate::relational_catalog::RelationalCatalog;
use crate::segment_validation::{ExclusiveScopePerCollection, SegmentScopeValidator, UnrestrictedScope};

/// Which `SegmentScopeValidator` to wire into a catalog backend.
///
/// Defaults to `ExclusiveScopePerCollection`: the source system's own
/// segment creation path never issues two segments of the same scope for
/// one collection, so that is the behavior callers should get unless they
/// opt into the unrestricted policy (e.g. to host segment types this
/// implementation doesn't know about).
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentScopePolicy {
    #[default]
    ExclusivePerCollection,
    Unrestricted,
}

/// Configures the Catalog Store backend. Mirrors
/// `chroma_storage_sql::StoreProviderConfig`'s memory/relational split so
/// the coordinator can pick a non-durable backend for local development
/// without pulling in a Postgres instance.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub store: StoreProviderConfig,
    #[serde(default)]
    pub segment_scope_policy: SegmentScopePolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            store: StoreProviderConfig::Memory,
            segment_scope_policy: SegmentScopePolicy::default(),
        }
    }
}

/// Builds the configured `Catalog` backend, running schema bootstrap for
/// the relational backend before returning. Both the coordinator process
/// and the Log Service's catalog write-through sink go through this rather
/// than constructing `InMemoryCatalog`/`RelationalCatalog` directly, so a
/// new backend only ever needs to be wired in one place.
#[async_trait]
impl Configurable<CatalogConfig> for Arc<dyn Catalog> {
    async fn try_from_config(
        config: &CatalogConfig,
        _registry: &Registry,
    ) -> Result<Self, Box<dyn ChromaError>> {
        let validator: Arc<dyn SegmentScopeValidator> = match config.segment_scope_policy {
            SegmentScopePolicy::ExclusivePerCollection => Arc::new(ExclusiveScopePerCollection),
            SegmentScopePolicy::Unrestricted => Arc::new(UnrestrictedScope),
        };
        match &config.store {
            StoreProviderConfig::Memory => Ok(Arc::new(InMemoryCatalog::new(validator))),
            StoreProviderConfig::Relational(relational_config) => {
                let store = RelationalStore::connect(relational_config)
                    .await
                    .map_err(|err| err.boxed())?;
                let catalog = RelationalCatalog::new(store, validator);
                catalog.bootstrap().await.map_err(|err| err.boxed())?;
                Ok(Arc::new(catalog))
            }
        }
    }
}
