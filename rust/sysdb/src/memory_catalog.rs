use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use chroma_types::{
    CatalogError, Collection, CollectionUuid, Database, Notification, NotificationStatus,
    NotificationType, Segment, SegmentUuid, Tenant, DEFAULT_DATABASE, DEFAULT_TENANT,
};

use crate::options::{
    CreateCollectionSpec, CreateSegmentSpec, GetCollectionsOptions, GetSegmentsOptions,
    UpdateCollectionSpec, UpdateSegmentSpec,
};
use crate::segment_validation::SegmentScopeValidator;

struct Inner {
    tenants: HashMap<String, Tenant>,
    databases: HashMap<Uuid, Database>,
    collections: HashMap<CollectionUuid, Collection>,
    segments: HashMap<SegmentUuid, Segment>,
    notifications: Vec<Notification>,
    next_notification_id: i64,
}

impl Inner {
    fn database_by_name(&self, name: &str, tenant: &str) -> Option<&Database> {
        self.databases
            .values()
            .find(|d| !d.is_deleted && d.name == name && d.tenant == tenant)
    }

    fn push_notification(
        &mut self,
        collection_id: CollectionUuid,
        r#type: NotificationType,
    ) -> Notification {
        let notification = Notification {
            id: self.next_notification_id,
            collection_id,
            r#type,
            status: NotificationStatus::Pending,
        };
        self.next_notification_id += 1;
        self.notifications.push(notification.clone());
        notification
    }
}

/// A non-durable catalog backend: everything lives in process memory behind
/// a single mutex. Used for local development and tests (grounded in the
/// `TestSysDb` pattern: plain `HashMap`s guarded by one lock, no partial
/// persistence).
#[derive(Clone)]
pub struct InMemoryCatalog {
    inner: Arc<Mutex<Inner>>,
    validator: Arc<dyn SegmentScopeValidator>,
}

impl std::fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalog").finish()
    }
}

impl InMemoryCatalog {
    pub fn new(validator: Arc<dyn SegmentScopeValidator>) -> Self {
        let now = Utc::now();
        let mut tenants = HashMap::new();
        tenants.insert(
            DEFAULT_TENANT.to_string(),
            Tenant {
                id: DEFAULT_TENANT.to_string(),
                created_at: now,
                updated_at: now,
                is_deleted: false,
            },
        );
        let mut databases = HashMap::new();
        let default_db_id = Uuid::new_v4();
        databases.insert(
            default_db_id,
            Database {
                id: default_db_id,
                name: DEFAULT_DATABASE.to_string(),
                tenant: DEFAULT_TENANT.to_string(),
                created_at: now,
                is_deleted: false,
            },
        );
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tenants,
                databases,
                collections: HashMap::new(),
                segments: HashMap::new(),
                notifications: Vec::new(),
                next_notification_id: 1,
            })),
            validator,
        }
    }

    pub async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError> {
        let mut inner = self.inner.lock();
        if inner.tenants.contains_key(&name) {
            return Err(CatalogError::AlreadyExists(format!("tenant {name}")));
        }
        let now = Utc::now();
        let tenant = Tenant {
            id: name.clone(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };
        inner.tenants.insert(name, tenant.clone());
        Ok(tenant)
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        let inner = self.inner.lock();
        inner
            .tenants
            .get(name)
            .cloned()
            .filter(|t| !t.is_deleted)
            .ok_or_else(|| CatalogError::NotFound(format!("tenant {name}")))
    }

    pub async fn create_database(
        &self,
        id: Uuid,
        name: String,
        tenant: String,
    ) -> Result<(Database, Notification), CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.tenants.contains_key(&tenant) {
            return Err(CatalogError::NotFound(format!("tenant {tenant}")));
        }
        if inner.database_by_name(&name, &tenant).is_some() {
            return Err(CatalogError::AlreadyExists(format!(
                "database {tenant}/{name}"
            )));
        }
        let database = Database {
            id,
            name,
            tenant,
            created_at: Utc::now(),
            is_deleted: false,
        };
        inner.databases.insert(id, database.clone());
        // Database creation has no owning collection yet; notifications are
        // keyed by collection_id so none is emitted here. CreateDatabase and
        // DeleteDatabase notification types exist for the sink's benefit on
        // deletion, where a database's collections are already known.
        let notification = Notification {
            id: inner.next_notification_id,
            collection_id: CollectionUuid(Uuid::nil()),
            r#type: NotificationType::CreateDatabase,
            status: NotificationStatus::Pending,
        };
        inner.next_notification_id += 1;
        inner.notifications.push(notification.clone());
        Ok((database, notification))
    }

    pub async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        let inner = self.inner.lock();
        inner
            .database_by_name(name, tenant)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("database {tenant}/{name}")))
    }

    pub async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        let inner = self.inner.lock();
        let mut databases: Vec<Database> = inner
            .databases
            .values()
            .filter(|d| !d.is_deleted && d.tenant == tenant)
            .cloned()
            .collect();
        databases.sort_by(|a, b| a.name.cmp(&b.name));
        let databases = databases.into_iter().skip(offset as usize);
        Ok(match limit {
            Some(limit) => databases.take(limit as usize).collect(),
            None => databases.collect(),
        })
    }

    pub async fn delete_database(
        &self,
        name: &str,
        tenant: &str,
    ) -> Result<Notification, CatalogError> {
        let mut inner = self.inner.lock();
        let id = inner
            .database_by_name(name, tenant)
            .ok_or_else(|| CatalogError::NotFound(format!("database {tenant}/{name}")))?
            .id;
        inner.databases.get_mut(&id).unwrap().is_deleted = true;
        Ok(inner.push_notification(CollectionUuid(Uuid::nil()), NotificationType::DeleteDatabase))
    }

    pub async fn create_collection(
        &self,
        spec: CreateCollectionSpec,
        topic: String,
    ) -> Result<(Collection, Option<Notification>), CatalogError> {
        let mut inner = self.inner.lock();
        let database = inner
            .database_by_name(&spec.database, &spec.tenant)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("database {}/{}", spec.tenant, spec.database)))?;

        let existing = inner
            .collections
            .values()
            .find(|c| !c.is_deleted && c.database_id == database.id && c.name == spec.name)
            .cloned();

        if let Some(existing) = existing {
            if spec.get_or_create {
                return Ok((existing, None));
            }
            return Err(CatalogError::AlreadyExists(format!(
                "collection {}/{}",
                spec.database, spec.name
            )));
        }

        let collection = Collection {
            collection_id: spec.collection_id,
            name: spec.name,
            database_id: database.id,
            tenant: spec.tenant,
            database: spec.database,
            dimension: spec.dimension,
            metadata: spec.metadata,
            configuration: spec.configuration,
            topic,
            log_position: 0,
            version: 0,
            is_deleted: false,
        };
        inner
            .collections
            .insert(collection.collection_id, collection.clone());
        let notification =
            inner.push_notification(collection.collection_id, NotificationType::CreateCollection);
        Ok((collection, Some(notification)))
    }

    pub async fn update_collection(
        &self,
        id: CollectionUuid,
        spec: UpdateCollectionSpec,
    ) -> Result<(Collection, Notification), CatalogError> {
        if spec.reset_metadata && spec.metadata.as_ref().is_some_and(|m| !m.is_empty()) {
            return Err(CatalogError::InvalidArgument(
                "reset_metadata and a non-empty metadata update are mutually exclusive".into(),
            ));
        }
        let mut inner = self.inner.lock();
        let collection = inner
            .collections
            .get_mut(&id)
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| CatalogError::NotFound(format!("collection {id}")))?;

        if let Some(name) = spec.name {
            collection.name = name;
        }
        if spec.reset_metadata {
            collection.metadata = None;
        } else if let Some(updates) = spec.metadata {
            let mut metadata = collection.metadata.clone().unwrap_or_default();
            for (key, update) in updates {
                match update {
                    chroma_types::UpdateMetadataValue::Set(value) => {
                        metadata.insert(key, value);
                    }
                    chroma_types::UpdateMetadataValue::Remove => {
                        metadata.remove(&key);
                    }
                }
            }
            collection.metadata = Some(metadata);
        }
        collection.version += 1;
        let updated = collection.clone();
        let notification = inner.push_notification(id, NotificationType::UpdateCollection);
        Ok((updated, notification))
    }

    pub async fn delete_collection(&self, id: CollectionUuid) -> Result<Notification, CatalogError> {
        let mut inner = self.inner.lock();
        let collection = inner
            .collections
            .get_mut(&id)
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| CatalogError::NotFound(format!("collection {id}")))?;
        collection.is_deleted = true;
        Ok(inner.push_notification(id, NotificationType::DeleteCollection))
    }

    pub async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError> {
        let inner = self.inner.lock();
        let mut collections: Vec<Collection> = inner
            .collections
            .values()
            .filter(|c| options.include_soft_deleted || !c.is_deleted)
            .filter(|c| options.collection_id.is_none_or(|id| id == c.collection_id))
            .filter(|c| options.name.as_deref().is_none_or(|n| n == c.name))
            .filter(|c| options.tenant.as_deref().is_none_or(|t| t == c.tenant))
            .filter(|c| options.database.as_deref().is_none_or(|d| d == c.database))
            .cloned()
            .collect();
        collections.sort_by(|a, b| a.name.cmp(&b.name));
        let collections = collections.into_iter().skip(options.offset as usize);
        Ok(match options.limit {
            Some(limit) => collections.take(limit as usize).collect(),
            None => collections.collect(),
        })
    }

    pub async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError> {
        let mut inner = self.inner.lock();
        if !inner.collections.contains_key(&spec.collection_id) {
            return Err(CatalogError::NotFound(format!(
                "collection {}",
                spec.collection_id
            )));
        }
        let existing: Vec<Segment> = inner.segments.values().cloned().collect();
        self.validator
            .validate(&existing, spec.scope, spec.collection_id)?;
        let segment = Segment {
            id: spec.id,
            r#type: spec.r#type,
            scope: spec.scope,
            collection: spec.collection_id,
            metadata: spec.metadata,
        };
        inner.segments.insert(segment.id, segment.clone());
        Ok(segment)
    }

    pub async fn update_segment(
        &self,
        id: SegmentUuid,
        spec: UpdateSegmentSpec,
    ) -> Result<Segment, CatalogError> {
        if spec.reset_metadata && spec.metadata.as_ref().is_some_and(|m| !m.is_empty()) {
            return Err(CatalogError::InvalidArgument(
                "reset_metadata and a non-empty metadata update are mutually exclusive".into(),
            ));
        }
        let mut inner = self.inner.lock();
        let segment = inner
            .segments
            .get_mut(&id)
            .ok_or_else(|| CatalogError::NotFound(format!("segment {id}")))?;
        if spec.reset_metadata {
            segment.metadata = None;
        } else if let Some(updates) = spec.metadata {
            let mut metadata = segment.metadata.clone().unwrap_or_default();
            for (key, update) in updates {
                match update {
                    chroma_types::UpdateMetadataValue::Set(value) => {
                        metadata.insert(key, value);
                    }
                    chroma_types::UpdateMetadataValue::Remove => {
                        metadata.remove(&key);
                    }
                }
            }
            segment.metadata = Some(metadata);
        }
        Ok(segment.clone())
    }

    pub async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        inner
            .segments
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CatalogError::NotFound(format!("segment {id}")))
    }

    pub async fn get_segments(
        &self,
        options: GetSegmentsOptions,
    ) -> Result<Vec<Segment>, CatalogError> {
        let inner = self.inner.lock();
        Ok(inner
            .segments
            .values()
            .filter(|s| options.id.is_none_or(|id| id == s.id))
            .filter(|s| options.r#type.as_deref().is_none_or(|t| t == s.r#type))
            .filter(|s| options.scope.is_none_or(|scope| scope == s.scope))
            .filter(|s| options.collection_id.is_none_or(|id| id == s.collection))
            .cloned()
            .collect())
    }

    /// Mirrors the Log Service's compaction offset into the catalog's
    /// `log_position` column. See the open question on which component owns
    /// this write: in this implementation the Log Service is the sole
    /// writer, and this is the write-through call it makes after advancing
    /// its own `compaction_offset`.
    pub async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        let collection = inner
            .collections
            .get_mut(&collection_id)
            .ok_or_else(|| CatalogError::NotFound(format!("collection {collection_id}")))?;
        if position < collection.log_position {
            return Err(CatalogError::FailedPrecondition(format!(
                "log position would regress from {} to {}",
                collection.log_position, position
            )));
        }
        collection.log_position = position;
        Ok(())
    }

    pub async fn list_pending_notifications(&self) -> Vec<Notification> {
        let inner = self.inner.lock();
        inner
            .notifications
            .iter()
            .filter(|n| n.status == NotificationStatus::Pending)
            .cloned()
            .collect()
    }

    pub async fn mark_notification_sent(&self, id: i64) -> Result<(), CatalogError> {
        let mut inner = self.inner.lock();
        let notification = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("notification {id}")))?;
        notification.status = NotificationStatus::Sent;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_validation::ExclusiveScopePerCollection;
    use chroma_types::SegmentScope;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(Arc::new(ExclusiveScopePerCollection))
    }

    fn spec(database: &str, name: &str, get_or_create: bool) -> CreateCollectionSpec {
        CreateCollectionSpec {
            collection_id: CollectionUuid::new(),
            name: name.to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            database: database.to_string(),
            dimension: None,
            metadata: None,
            configuration: Vec::new(),
            get_or_create,
        }
    }

    #[tokio::test]
    async fn default_tenant_and_database_exist_from_first_boot() {
        let catalog = catalog();
        let tenant = catalog.get_tenant(DEFAULT_TENANT).await.unwrap();
        assert_eq!(tenant.id, DEFAULT_TENANT);
        let database = catalog
            .get_database(DEFAULT_DATABASE, DEFAULT_TENANT)
            .await
            .unwrap();
        assert_eq!(database.name, DEFAULT_DATABASE);
    }

    #[tokio::test]
    async fn create_collection_rejects_duplicate_name_without_get_or_create() {
        let catalog = catalog();
        let (first, _) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap();
        let err = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
        assert_eq!(
            catalog
                .get_collections(GetCollectionsOptions {
                    database: Some(DEFAULT_DATABASE.to_string()),
                    ..Default::default()
                })
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(first.name, "x");
    }

    #[tokio::test]
    async fn create_collection_get_or_create_is_idempotent() {
        // P5: two get_or_create calls with the same (database, name) return
        // the same id and no second notification/row is created.
        let catalog = catalog();
        let (first, notification1) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", true), "topic".into())
            .await
            .unwrap();
        let (second, notification2) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", true), "topic".into())
            .await
            .unwrap();
        assert_eq!(first.collection_id, second.collection_id);
        assert_eq!(first.metadata, second.metadata);
        assert!(notification1.is_some());
        assert!(notification2.is_none());
    }

    #[tokio::test]
    async fn update_collection_rejects_reset_with_nonempty_metadata() {
        let catalog = catalog();
        let (collection, _) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap();
        let mut metadata: chroma_types::UpdateMetadata = HashMap::new();
        metadata.insert(
            "k".to_string(),
            chroma_types::UpdateMetadataValue::Set(chroma_types::MetadataValue::Int(1)),
        );
        let err = catalog
            .update_collection(
                collection.collection_id,
                UpdateCollectionSpec {
                    name: None,
                    metadata: Some(metadata),
                    reset_metadata: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn delete_collection_is_not_found_after_delete() {
        let catalog = catalog();
        let (collection, _) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap();
        catalog.delete_collection(collection.collection_id).await.unwrap();
        assert!(catalog
            .delete_collection(collection.collection_id)
            .await
            .is_err());
        let found = catalog
            .get_collections(GetCollectionsOptions {
                collection_id: Some(collection.collection_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn set_log_position_never_regresses() {
        let catalog = catalog();
        let (collection, _) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap();
        catalog
            .set_log_position(collection.collection_id, 5)
            .await
            .unwrap();
        let err = catalog
            .set_log_position(collection.collection_id, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn exclusive_scope_rejects_second_segment_of_same_scope() {
        let catalog = catalog();
        let (collection, _) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap();
        catalog
            .create_segment(CreateSegmentSpec {
                id: SegmentUuid::new(),
                r#type: "hnsw".to_string(),
                scope: SegmentScope::Vector,
                collection_id: collection.collection_id,
                metadata: None,
            })
            .await
            .unwrap();
        let err = catalog
            .create_segment(CreateSegmentSpec {
                id: SegmentUuid::new(),
                r#type: "hnsw".to_string(),
                scope: SegmentScope::Vector,
                collection_id: collection.collection_id,
                metadata: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn notifications_start_pending_and_can_be_marked_sent() {
        let catalog = catalog();
        let (collection, notification) = catalog
            .create_collection(spec(DEFAULT_DATABASE, "x", false), "topic".into())
            .await
            .unwrap();
        let notification = notification.unwrap();
        assert_eq!(notification.collection_id, collection.collection_id);
        assert_eq!(notification.status, NotificationStatus::Pending);
        let pending = catalog.list_pending_notifications().await;
        assert!(pending.iter().any(|n| n.id == notification.id));
        catalog.mark_notification_sent(notification.id).await.unwrap();
        let pending = catalog.list_pending_notifications().await;
        assert!(!pending.iter().any(|n| n.id == notification.id));
    }
}
