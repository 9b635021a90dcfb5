use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use uuid::Uuid;

use chroma_types::{
    CatalogError, Collection, CollectionUuid, Database, Notification, Segment, SegmentUuid, Tenant,
};

use crate::catalog::Catalog;
use crate::notification::TriggerMessage;
use crate::options::{
    CreateCollectionSpec, CreateSegmentSpec, GetCollectionsOptions, GetSegmentsOptions,
    UpdateCollectionSpec, UpdateSegmentSpec,
};

#[derive(Default)]
struct Cache {
    collections: HashMap<CollectionUuid, Collection>,
    segments: HashMap<SegmentUuid, Segment>,
}

/// Read-through/write-through cache in front of a `Catalog` backend.
///
/// Every mutation persists to the Catalog Store first; the cache is only
/// updated once that write has committed, and is invalidated (the stale
/// entry dropped, not left in place) rather than left inconsistent if the
/// post-commit cache update itself fails for some reason -- a cache miss is
/// always safe because it falls back to the store, a stale hit is not. This
/// is the only component that should hold an `Arc<dyn Catalog>` directly in
/// production; everything else goes through here or through `Coordinator`.
pub struct MetaTable {
    catalog: Arc<dyn Catalog>,
    trigger: Option<mpsc::Sender<TriggerMessage>>,
    cache: RwLock<Cache>,
}

impl std::fmt::Debug for MetaTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaTable").finish()
    }
}

impl MetaTable {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            trigger: None,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub fn with_trigger(mut self, trigger: mpsc::Sender<TriggerMessage>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Best-effort wakeup of the notification processor. The processor's
    /// periodic sweep will pick the notification up regardless, so a failed
    /// or dropped trigger is not an error, just a slightly later delivery.
    fn nudge(&self) {
        let Some(trigger) = &self.trigger else {
            return;
        };
        let (reply, _rx) = oneshot::channel();
        if trigger.try_send(TriggerMessage { reply }).is_err() {
            warn!("notification trigger channel full or closed, relying on periodic sweep");
        }
    }

    pub async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError> {
        self.catalog.create_tenant(name).await
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.catalog.get_tenant(name).await
    }

    pub async fn create_database(
        &self,
        id: Uuid,
        name: String,
        tenant: String,
    ) -> Result<Database, CatalogError> {
        let (database, _notification) = self.catalog.create_database(id, name, tenant).await?;
        self.nudge();
        Ok(database)
    }

    pub async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.catalog.get_database(name, tenant).await
    }

    pub async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.catalog.list_databases(tenant, limit, offset).await
    }

    pub async fn delete_database(&self, name: &str, tenant: &str) -> Result<(), CatalogError> {
        self.catalog.delete_database(name, tenant).await?;
        self.nudge();
        Ok(())
    }

    pub async fn create_collection(
        &self,
        spec: CreateCollectionSpec,
        topic: String,
    ) -> Result<Collection, CatalogError> {
        let (collection, notification) = self.catalog.create_collection(spec, topic).await?;
        self.cache
            .write()
            .collections
            .insert(collection.collection_id, collection.clone());
        if notification.is_some() {
            self.nudge();
        }
        Ok(collection)
    }

    pub async fn update_collection(
        &self,
        id: CollectionUuid,
        spec: UpdateCollectionSpec,
    ) -> Result<Collection, CatalogError> {
        let result = self.catalog.update_collection(id, spec).await;
        // The entry is no longer trustworthy the instant the store-side
        // write lands, regardless of whether it succeeds; a failed cache
        // refresh must not leave the old value looking current.
        self.cache.write().collections.remove(&id);
        let (collection, _notification) = result?;
        self.cache
            .write()
            .collections
            .insert(id, collection.clone());
        self.nudge();
        Ok(collection)
    }

    pub async fn delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        self.catalog.delete_collection(id).await?;
        self.cache.write().collections.remove(&id);
        self.nudge();
        Ok(())
    }

    pub async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError> {
        if let (Some(id), false) = (options.collection_id, options.include_soft_deleted) {
            if options.name.is_none() && options.tenant.is_none() && options.database.is_none() {
                if let Some(collection) = self.cache.read().collections.get(&id).cloned() {
                    return Ok(vec![collection]);
                }
            }
        }
        let collections = self.catalog.get_collections(options).await?;
        {
            let mut cache = self.cache.write();
            for collection in &collections {
                if !collection.is_deleted {
                    cache
                        .collections
                        .insert(collection.collection_id, collection.clone());
                }
            }
        }
        Ok(collections)
    }

    pub async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError> {
        let segment = self.catalog.create_segment(spec).await?;
        self.cache.write().segments.insert(segment.id, segment.clone());
        Ok(segment)
    }

    pub async fn update_segment(
        &self,
        id: SegmentUuid,
        spec: UpdateSegmentSpec,
    ) -> Result<Segment, CatalogError> {
        self.cache.write().segments.remove(&id);
        let segment = self.catalog.update_segment(id, spec).await?;
        self.cache.write().segments.insert(id, segment.clone());
        Ok(segment)
    }

    pub async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.catalog.delete_segment(id).await?;
        self.cache.write().segments.remove(&id);
        Ok(())
    }

    pub async fn get_segments(
        &self,
        options: GetSegmentsOptions,
    ) -> Result<Vec<Segment>, CatalogError> {
        if let Some(id) = options.id {
            if options.r#type.is_none() && options.scope.is_none() && options.collection_id.is_none() {
                if let Some(segment) = self.cache.read().segments.get(&id).cloned() {
                    return Ok(vec![segment]);
                }
            }
        }
        let segments = self.catalog.get_segments(options).await?;
        {
            let mut cache = self.cache.write();
            for segment in &segments {
                cache.segments.insert(segment.id, segment.clone());
            }
        }
        Ok(segments)
    }

    pub async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        self.catalog.set_log_position(collection_id, position).await?;
        if let Some(collection) = self.cache.write().collections.get_mut(&collection_id) {
            collection.log_position = position;
        }
        Ok(())
    }

    pub async fn list_pending_notifications(&self) -> Vec<Notification> {
        self.catalog.list_pending_notifications().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_catalog::InMemoryCatalog;
    use crate::segment_validation::ExclusiveScopePerCollection;
    use chroma_types::DEFAULT_TENANT;
    use std::time::Duration;

    fn spec(name: &str, get_or_create: bool) -> CreateCollectionSpec {
        CreateCollectionSpec {
            collection_id: CollectionUuid::new(),
            name: name.to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            database: chroma_types::DEFAULT_DATABASE.to_string(),
            dimension: None,
            metadata: None,
            configuration: Vec::new(),
            get_or_create,
        }
    }

    fn meta_table() -> MetaTable {
        MetaTable::new(Arc::new(InMemoryCatalog::new(Arc::new(
            ExclusiveScopePerCollection,
        ))))
    }

    #[tokio::test]
    async fn get_collections_by_id_is_served_from_cache_after_create() {
        let meta = meta_table();
        let collection = meta.create_collection(spec("x", false), "topic".into()).await.unwrap();
        let found = meta
            .get_collections(GetCollectionsOptions {
                collection_id: Some(collection.collection_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].collection_id, collection.collection_id);
    }

    #[tokio::test]
    async fn update_collection_refreshes_cached_entry() {
        let meta = meta_table();
        let collection = meta.create_collection(spec("x", false), "topic".into()).await.unwrap();
        let updated = meta
            .update_collection(
                collection.collection_id,
                UpdateCollectionSpec {
                    name: Some("renamed".to_string()),
                    metadata: None,
                    reset_metadata: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        let found = meta
            .get_collections(GetCollectionsOptions {
                collection_id: Some(collection.collection_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found[0].name, "renamed");
    }

    #[tokio::test]
    async fn delete_collection_evicts_from_cache() {
        let meta = meta_table();
        let collection = meta.create_collection(spec("x", false), "topic".into()).await.unwrap();
        meta.delete_collection(collection.collection_id).await.unwrap();
        let found = meta
            .get_collections(GetCollectionsOptions {
                collection_id: Some(collection.collection_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn mutation_nudges_trigger_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let meta = meta_table().with_trigger(tx);
        meta.create_collection(spec("x", false), "topic".into()).await.unwrap();
        let trigger = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("trigger should fire promptly")
            .expect("channel should still be open");
        let _ = trigger.reply.send(());
    }

    #[tokio::test]
    async fn get_or_create_collision_returns_same_collection_without_duplicate_cache_entry() {
        let meta = meta_table();
        let first = meta.create_collection(spec("x", true), "topic".into()).await.unwrap();
        let second = meta.create_collection(spec("x", true), "topic".into()).await.unwrap();
        assert_eq!(first.collection_id, second.collection_id);
        let all = meta
            .get_collections(GetCollectionsOptions::default())
            .await
            .unwrap();
        assert_eq!(all.iter().filter(|c| c.name == "x").count(), 1);
    }
}
