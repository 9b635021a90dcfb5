use std::sync::Arc;

use uuid::Uuid;

use chroma_config::assignment::AssignmentPolicy;
use chroma_types::{
    CatalogError, Collection, CollectionUuid, Database, Segment, SegmentUuid, Tenant,
};

use crate::meta_table::MetaTable;
use crate::options::{
    CreateCollectionSpec, CreateSegmentSpec, GetCollectionsOptions, GetSegmentsOptions,
    UpdateCollectionSpec, UpdateSegmentSpec,
};

/// The SysDB's public business-logic facade: a `MetaTable` plus the
/// collection-to-log assignment policy. API layers (the coordinator's HTTP
/// surface, or an in-process caller) should only ever hold one of these,
/// never a bare `MetaTable` or `Catalog`.
///
/// The one piece of business logic that doesn't belong in the cache or the
/// store: computing a collection's log partition tag at creation time. The
/// assignment is permanent (collections never migrate between partitions),
/// so it happens exactly once, here, before the collection row is ever
/// written.
#[derive(Clone)]
pub struct Coordinator {
    meta_table: Arc<MetaTable>,
    assignment_policy: Arc<dyn AssignmentPolicy>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish()
    }
}

impl Coordinator {
    pub fn new(meta_table: Arc<MetaTable>, assignment_policy: Arc<dyn AssignmentPolicy>) -> Self {
        Self {
            meta_table,
            assignment_policy,
        }
    }

    pub async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError> {
        self.meta_table.create_tenant(name).await
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.meta_table.get_tenant(name).await
    }

    pub async fn create_database(
        &self,
        name: String,
        tenant: String,
    ) -> Result<Database, CatalogError> {
        self.meta_table.create_database(Uuid::new_v4(), name, tenant).await
    }

    pub async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.meta_table.get_database(name, tenant).await
    }

    pub async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.meta_table.list_databases(tenant, limit, offset).await
    }

    pub async fn delete_database(&self, name: &str, tenant: &str) -> Result<(), CatalogError> {
        self.meta_table.delete_database(name, tenant).await
    }

    pub async fn create_collection(
        &self,
        mut spec: CreateCollectionSpec,
    ) -> Result<Collection, CatalogError> {
        if spec.collection_id == CollectionUuid::default() {
            spec.collection_id = CollectionUuid::new();
        }
        let topic = self.assignment_policy.assign(spec.collection_id);
        self.meta_table.create_collection(spec, topic).await
    }

    pub async fn update_collection(
        &self,
        id: CollectionUuid,
        spec: UpdateCollectionSpec,
    ) -> Result<Collection, CatalogError> {
        self.meta_table.update_collection(id, spec).await
    }

    pub async fn delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        self.meta_table.delete_collection(id).await
    }

    pub async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.meta_table.get_collections(options).await
    }

    pub async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError> {
        self.meta_table.create_segment(spec).await
    }

    pub async fn update_segment(
        &self,
        id: SegmentUuid,
        spec: UpdateSegmentSpec,
    ) -> Result<Segment, CatalogError> {
        self.meta_table.update_segment(id, spec).await
    }

    pub async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.meta_table.delete_segment(id).await
    }

    pub async fn get_segments(
        &self,
        options: GetSegmentsOptions,
    ) -> Result<Vec<Segment>, CatalogError> {
        self.meta_table.get_segments(options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_catalog::InMemoryCatalog;
    use crate::segment_validation::ExclusiveScopePerCollection;
    use chroma_config::assignment::TopicNamespaceAssignmentPolicy;
    use chroma_types::{DEFAULT_DATABASE, DEFAULT_TENANT};

    fn coordinator() -> Coordinator {
        let catalog = Arc::new(InMemoryCatalog::new(Arc::new(ExclusiveScopePerCollection)));
        let meta_table = Arc::new(MetaTable::new(catalog));
        let assignment_policy = Arc::new(TopicNamespaceAssignmentPolicy::new(
            "tenant-ns".to_string(),
            "log".to_string(),
        ));
        Coordinator::new(meta_table, assignment_policy)
    }

    fn spec(name: &str) -> CreateCollectionSpec {
        CreateCollectionSpec {
            collection_id: CollectionUuid::default(),
            name: name.to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            dimension: None,
            metadata: None,
            configuration: Vec::new(),
            get_or_create: false,
        }
    }

    #[tokio::test]
    async fn create_collection_assigns_a_topic_and_a_fresh_id() {
        let coordinator = coordinator();
        let collection = coordinator.create_collection(spec("x")).await.unwrap();
        assert_ne!(collection.collection_id, CollectionUuid::default());
        assert_eq!(
            collection.topic,
            format!("persistent://tenant-ns/log/{}", collection.collection_id)
        );
    }

    #[tokio::test]
    async fn create_collection_honors_a_caller_supplied_id() {
        let coordinator = coordinator();
        let mut spec = spec("x");
        spec.collection_id = CollectionUuid::new();
        let supplied_id = spec.collection_id;
        let collection = coordinator.create_collection(spec).await.unwrap();
        assert_eq!(collection.collection_id, supplied_id);
    }

    #[tokio::test]
    async fn delete_database_then_create_database_of_same_name_succeeds() {
        let coordinator = coordinator();
        coordinator
            .create_database("db".to_string(), DEFAULT_TENANT.to_string())
            .await
            .unwrap();
        coordinator
            .delete_database("db", DEFAULT_TENANT)
            .await
            .unwrap();
        let recreated = coordinator
            .create_database("db".to_string(), DEFAULT_TENANT.to_string())
            .await
            .unwrap();
        assert_eq!(recreated.name, "db");
    }
}
