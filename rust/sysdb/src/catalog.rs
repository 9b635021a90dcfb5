use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;

use chroma_types::{
    CatalogError, Collection, CollectionUuid, Database, LogPositionSink, Notification, Segment,
    SegmentUuid, Tenant,
};

use crate::options::{
    CreateCollectionSpec, CreateSegmentSpec, GetCollectionsOptions, GetSegmentsOptions,
    UpdateCollectionSpec, UpdateSegmentSpec,
};

/// The Catalog Store (§4.2): transactional storage for tenants, databases,
/// collections and segments, with ACID guarantees scoped to a single
/// operation. Implemented by `InMemoryCatalog` (non-durable, for tests and
/// local development) and `RelationalCatalog` (Postgres-backed, durable).
///
/// `MetaTable` is the only caller that should hold one of these directly in
/// production; everything else goes through the cache.
#[async_trait]
pub trait Catalog: Send + Sync + Debug {
    async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError>;
    async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError>;

    async fn create_database(
        &self,
        id: Uuid,
        name: String,
        tenant: String,
    ) -> Result<(Database, Notification), CatalogError>;
    async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError>;
    async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError>;
    async fn delete_database(&self, name: &str, tenant: &str) -> Result<Notification, CatalogError>;

    async fn create_collection(
        &self,
        spec: CreateCollectionSpec,
        topic: String,
    ) -> Result<(Collection, Option<Notification>), CatalogError>;
    async fn update_collection(
        &self,
        id: CollectionUuid,
        spec: UpdateCollectionSpec,
    ) -> Result<(Collection, Notification), CatalogError>;
    async fn delete_collection(&self, id: CollectionUuid) -> Result<Notification, CatalogError>;
    async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError>;

    async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError>;
    async fn update_segment(
        &self,
        id: SegmentUuid,
        spec: UpdateSegmentSpec,
    ) -> Result<Segment, CatalogError>;
    async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError>;
    async fn get_segments(&self, options: GetSegmentsOptions)
        -> Result<Vec<Segment>, CatalogError>;

    async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError>;

    async fn list_pending_notifications(&self) -> Vec<Notification>;
    async fn mark_notification_sent(&self, id: i64) -> Result<(), CatalogError>;
}

#[async_trait]
impl Catalog for crate::memory_catalog::InMemoryCatalog {
    async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError> {
        self.create_tenant(name).await
    }

    async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.get_tenant(name).await
    }

    async fn create_database(
        &self,
        id: Uuid,
        name: String,
        tenant: String,
    ) -> Result<(Database, Notification), CatalogError> {
        self.create_database(id, name, tenant).await
    }

    async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.get_database(name, tenant).await
    }

    async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.list_databases(tenant, limit, offset).await
    }

    async fn delete_database(&self, name: &str, tenant: &str) -> Result<Notification, CatalogError> {
        self.delete_database(name, tenant).await
    }

    async fn create_collection(
        &self,
        spec: CreateCollectionSpec,
        topic: String,
    ) -> Result<(Collection, Option<Notification>), CatalogError> {
        self.create_collection(spec, topic).await
    }

    async fn update_collection(
        &self,
        id: CollectionUuid,
        spec: UpdateCollectionSpec,
    ) -> Result<(Collection, Notification), CatalogError> {
        self.update_collection(id, spec).await
    }

    async fn delete_collection(&self, id: CollectionUuid) -> Result<Notification, CatalogError> {
        self.delete_collection(id).await
    }

    async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.get_collections(options).await
    }

    async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError> {
        self.create_segment(spec).await
    }

    async fn update_segment(
        &self,
        id: SegmentUuid,
        spec: UpdateSegmentSpec,
    ) -> Result<Segment, CatalogError> {
        self.update_segment(id, spec).await
    }

    async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.delete_segment(id).await
    }

    async fn get_segments(
        &self,
        options: GetSegmentsOptions,
    ) -> Result<Vec<Segment>, CatalogError> {
        self.get_segments(options).await
    }

    async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        self.set_log_position(collection_id, position).await
    }

    async fn list_pending_notifications(&self) -> Vec<Notification> {
        self.list_pending_notifications().await
    }

    async fn mark_notification_sent(&self, id: i64) -> Result<(), CatalogError> {
        self.mark_notification_sent(id).await
    }
}

#[async_trait]
impl Catalog for crate::relational_catalog::RelationalCatalog {
    async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError> {
        self.create_tenant(name).await
    }

    async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.get_tenant(name).await
    }

    async fn create_database(
        &self,
        id: Uuid,
        name: String,
        tenant: String,
    ) -> Result<(Database, Notification), CatalogError> {
        self.create_database(id, name, tenant).await
    }

    async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.get_database(name, tenant).await
    }

    async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.list_databases(tenant, limit, offset).await
    }

    async fn delete_database(&self, name: &str, tenant: &str) -> Result<Notification, CatalogError> {
        self.delete_database(name, tenant).await
    }

    async fn create_collection(
        &self,
        spec: CreateCollectionSpec,
        topic: String,
    ) -> Result<(Collection, Option<Notification>), CatalogError> {
        self.create_collection(spec, topic).await
    }

    async fn update_collection(
        &self,
        id: CollectionUuid,
        spec: UpdateCollectionSpec,
    ) -> Result<(Collection, Notification), CatalogError> {
        self.update_collection(id, spec).await
    }

    async fn delete_collection(&self, id: CollectionUuid) -> Result<Notification, CatalogError> {
        self.delete_collection(id).await
    }

    async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.get_collections(options).await
    }

    async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError> {
        self.create_segment(spec).await
    }

    async fn update_segment(
        &self,
        id: SegmentUuid,
        spec: UpdateSegmentSpec,
    ) -> Result<Segment, CatalogError> {
        self.update_segment(id, spec).await
    }

    async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.delete_segment(id).await
    }

    async fn get_segments(
        &self,
        options: GetSegmentsOptions,
    ) -> Result<Vec<Segment>, CatalogError> {
        self.get_segments(options).await
    }

    async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        self.set_log_position(collection_id, position).await
    }

    async fn list_pending_notifications(&self) -> Vec<Notification> {
        self.list_pending_notifications().await
    }

    async fn mark_notification_sent(&self, id: i64) -> Result<(), CatalogError> {
        self.mark_notification_sent(id).await
    }
}

/// Lets the Log Service (which only depends on `chroma-types`, not on the
/// whole catalog stack) advance `Collection::log_position` through whichever
/// `Catalog` backend the coordinator is wired to.
#[async_trait]
impl LogPositionSink for dyn Catalog {
    async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        Catalog::set_log_position(self, collection_id, position).await
    }

    async fn collection_exists(&self, collection_id: CollectionUuid) -> Result<bool, CatalogError> {
        let found = Catalog::get_collections(
            self,
            GetCollectionsOptions {
                collection_id: Some(collection_id),
                ..Default::default()
            },
        )
        .await?;
        Ok(!found.is_empty())
    }
}
