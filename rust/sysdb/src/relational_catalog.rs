use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use chroma_error::WrappedSqlxError;
use chroma_storage_sql::RelationalStore;
use chroma_types::{
    CatalogError, Collection, CollectionUuid, Database, Metadata, MetadataValue, Notification,
    NotificationStatus, NotificationType, Segment, SegmentScope, SegmentUuid, Tenant,
    UpdateMetadataValue, DEFAULT_DATABASE, DEFAULT_TENANT,
};

use crate::options::{
    CreateCollectionSpec, CreateSegmentSpec, GetCollectionsOptions, GetSegmentsOptions,
    UpdateCollectionSpec, UpdateSegmentSpec,
};
use crate::segment_validation::SegmentScopeValidator;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS tenants (
        id TEXT PRIMARY KEY,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS databases (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        tenant_id TEXT NOT NULL REFERENCES tenants(id),
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (tenant_id, name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS collections (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        database_id UUID NOT NULL REFERENCES databases(id),
        dimension INTEGER,
        log_position BIGINT NOT NULL DEFAULT 0,
        configuration BYTEA NOT NULL DEFAULT '',
        topic TEXT NOT NULL,
        version INTEGER NOT NULL DEFAULT 0,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        UNIQUE (database_id, name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS collection_metadata (
        collection_id UUID NOT NULL REFERENCES collections(id),
        key TEXT NOT NULL,
        str_value TEXT,
        int_value BIGINT,
        float_value DOUBLE PRECISION,
        PRIMARY KEY (collection_id, key)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS segments (
        id UUID PRIMARY KEY,
        type TEXT NOT NULL,
        scope TEXT NOT NULL,
        collection_id UUID NOT NULL REFERENCES collections(id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS segment_metadata (
        segment_id UUID NOT NULL REFERENCES segments(id),
        key TEXT NOT NULL,
        str_value TEXT,
        int_value BIGINT,
        float_value DOUBLE PRECISION,
        PRIMARY KEY (segment_id, key)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS notifications (
        id BIGSERIAL PRIMARY KEY,
        collection_id UUID NOT NULL,
        type TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
];

fn metadata_value_to_columns(value: &MetadataValue) -> (Option<String>, Option<i64>, Option<f64>) {
    match value {
        MetadataValue::Str(s) => (Some(s.clone()), None, None),
        MetadataValue::Int(i) => (None, Some(*i), None),
        MetadataValue::Float(f) => (None, None, Some(*f)),
    }
}

fn columns_to_metadata_value(
    str_value: Option<String>,
    int_value: Option<i64>,
    float_value: Option<f64>,
) -> Option<MetadataValue> {
    match (str_value, int_value, float_value) {
        (Some(s), None, None) => Some(MetadataValue::Str(s)),
        (None, Some(i), None) => Some(MetadataValue::Int(i)),
        (None, None, Some(f)) => Some(MetadataValue::Float(f)),
        (None, None, None) => None,
        _ => None,
    }
}

fn sqlx_to_catalog_error(err: sqlx::Error) -> CatalogError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return CatalogError::AlreadyExists(db_err.message().to_string());
        }
    }
    let wrapped = WrappedSqlxError::from(err);
    CatalogError::Unavailable(wrapped.to_string())
}

struct CollectionRow {
    id: Uuid,
    name: String,
    database_id: Uuid,
    database_name: String,
    tenant_id: String,
    dimension: Option<i32>,
    log_position: i64,
    configuration: Vec<u8>,
    topic: String,
    version: i32,
    is_deleted: bool,
}

impl CollectionRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            database_id: row.try_get("database_id")?,
            database_name: row.try_get("database_name")?,
            tenant_id: row.try_get("tenant_id")?,
            dimension: row.try_get("dimension")?,
            log_position: row.try_get("log_position")?,
            configuration: row.try_get("configuration")?,
            topic: row.try_get("topic")?,
            version: row.try_get("version")?,
            is_deleted: row.try_get("is_deleted")?,
        })
    }

    fn into_collection(self, metadata: Option<Metadata>) -> Collection {
        Collection {
            collection_id: CollectionUuid(self.id),
            name: self.name,
            database_id: self.database_id,
            tenant: self.tenant_id,
            database: self.database_name,
            dimension: self.dimension,
            metadata,
            configuration: self.configuration,
            topic: self.topic,
            log_position: self.log_position,
            version: self.version,
            is_deleted: self.is_deleted,
        }
    }
}

const COLLECTION_SELECT: &str = r#"
    SELECT c.id AS id, c.name AS name, c.database_id AS database_id, c.dimension AS dimension,
           c.log_position AS log_position, c.configuration AS configuration, c.topic AS topic,
           c.version AS version, c.is_deleted AS is_deleted,
           d.name AS database_name, d.tenant_id AS tenant_id
    FROM collections c
    JOIN databases d ON d.id = c.database_id
"#;

/// Postgres-backed Catalog Store. All multi-statement operations run inside
/// a single transaction, including `enqueue_notification`, so a
/// notification never becomes visible to the processor unless the mutation
/// that caused it actually committed.
#[derive(Clone)]
pub struct RelationalCatalog {
    store: RelationalStore,
    validator: Arc<dyn SegmentScopeValidator>,
}

impl std::fmt::Debug for RelationalCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalCatalog").finish()
    }
}

impl RelationalCatalog {
    pub fn new(store: RelationalStore, validator: Arc<dyn SegmentScopeValidator>) -> Self {
        Self { store, validator }
    }

    /// Creates the schema (idempotently) and seeds `default_tenant` /
    /// `default_database` if they are not already present. Should be called
    /// once at process startup before the catalog serves requests.
    pub async fn bootstrap(&self) -> Result<(), CatalogError> {
        self.store
            .apply_schema(SCHEMA)
            .await
            .map_err(sqlx_to_catalog_error)?;

        let existing = self.get_tenant(DEFAULT_TENANT).await;
        if matches!(existing, Err(CatalogError::NotFound(_))) {
            self.create_tenant(DEFAULT_TENANT.to_string()).await?;
            self.create_database(Uuid::new_v4(), DEFAULT_DATABASE.to_string(), DEFAULT_TENANT.to_string())
                .await?;
        }
        Ok(())
    }

    async fn load_collection_metadata(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        collection_id: Uuid,
    ) -> Result<Option<Metadata>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT key, str_value, int_value, float_value FROM collection_metadata WHERE collection_id = $1",
        )
        .bind(collection_id)
        .fetch_all(&mut **tx)
        .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut metadata = Metadata::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let value = columns_to_metadata_value(
                row.try_get("str_value")?,
                row.try_get("int_value")?,
                row.try_get("float_value")?,
            );
            if let Some(value) = value {
                metadata.insert(key, value);
            }
        }
        Ok(Some(metadata))
    }

    async fn replace_collection_metadata(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        collection_id: Uuid,
        metadata: &Metadata,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM collection_metadata WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&mut **tx)
            .await?;
        for (key, value) in metadata {
            let (s, i, f) = metadata_value_to_columns(value);
            sqlx::query(
                "INSERT INTO collection_metadata (collection_id, key, str_value, int_value, float_value) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(collection_id)
            .bind(key)
            .bind(s)
            .bind(i)
            .bind(f)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn enqueue_notification(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        collection_id: CollectionUuid,
        r#type: NotificationType,
    ) -> Result<Notification, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO notifications (collection_id, type, status) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(collection_id.0)
        .bind(r#type.to_string())
        .bind("PENDING")
        .fetch_one(&mut **tx)
        .await?;
        Ok(Notification {
            id: row.try_get("id")?,
            collection_id,
            r#type,
            status: NotificationStatus::Pending,
        })
    }

    pub async fn create_tenant(&self, name: String) -> Result<Tenant, CatalogError> {
        let now: DateTime<Utc> = Utc::now();
        let result = sqlx::query(
            "INSERT INTO tenants (id, is_deleted, created_at, updated_at) VALUES ($1, FALSE, $2, $2)",
        )
        .bind(&name)
        .bind(now)
        .execute(self.store.pool())
        .await;
        match result {
            Ok(_) => Ok(Tenant {
                id: name,
                created_at: now,
                updated_at: now,
                is_deleted: false,
            }),
            Err(e) => Err(sqlx_to_catalog_error(e)),
        }
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        let row = sqlx::query(
            "SELECT id, is_deleted, created_at, updated_at FROM tenants WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(name)
        .fetch_optional(self.store.pool())
        .await
        .map_err(sqlx_to_catalog_error)?
        .ok_or_else(|| CatalogError::NotFound(format!("tenant {name}")))?;
        Ok(Tenant {
            id: row.try_get("id").map_err(sqlx_to_catalog_error)?,
            created_at: row.try_get("created_at").map_err(sqlx_to_catalog_error)?,
            updated_at: row.try_get("updated_at").map_err(sqlx_to_catalog_error)?,
            is_deleted: row.try_get("is_deleted").map_err(sqlx_to_catalog_error)?,
        })
    }

    pub async fn create_database(
        &self,
        id: Uuid,
        name: String,
        tenant: String,
    ) -> Result<(Database, Notification), CatalogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;

        let tenant_exists = sqlx::query("SELECT 1 FROM tenants WHERE id = $1")
            .bind(&tenant)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;
        if tenant_exists.is_none() {
            return Err(CatalogError::NotFound(format!("tenant {tenant}")));
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO databases (id, name, tenant_id, is_deleted, created_at) VALUES ($1, $2, $3, FALSE, $4)",
        )
        .bind(id)
        .bind(&name)
        .bind(&tenant)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_to_catalog_error)?;

        let notification = self
            .enqueue_notification(&mut tx, CollectionUuid(Uuid::nil()), NotificationType::CreateDatabase)
            .await
            .map_err(sqlx_to_catalog_error)?;

        tx.commit().await.map_err(sqlx_to_catalog_error)?;

        Ok((
            Database {
                id,
                name,
                tenant,
                created_at: now,
                is_deleted: false,
            },
            notification,
        ))
    }

    pub async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        let row = sqlx::query(
            "SELECT id, name, tenant_id, is_deleted, created_at FROM databases WHERE name = $1 AND tenant_id = $2 AND is_deleted = FALSE",
        )
        .bind(name)
        .bind(tenant)
        .fetch_optional(self.store.pool())
        .await
        .map_err(sqlx_to_catalog_error)?
        .ok_or_else(|| CatalogError::NotFound(format!("database {tenant}/{name}")))?;
        Ok(Database {
            id: row.try_get("id").map_err(sqlx_to_catalog_error)?,
            name: row.try_get("name").map_err(sqlx_to_catalog_error)?,
            tenant: row.try_get("tenant_id").map_err(sqlx_to_catalog_error)?,
            created_at: row.try_get("created_at").map_err(sqlx_to_catalog_error)?,
            is_deleted: row.try_get("is_deleted").map_err(sqlx_to_catalog_error)?,
        })
    }

    pub async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        let rows = sqlx::query(
            "SELECT id, name, tenant_id, is_deleted, created_at FROM databases WHERE tenant_id = $1 AND is_deleted = FALSE ORDER BY name OFFSET $2 LIMIT $3",
        )
        .bind(tenant)
        .bind(offset as i64)
        .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
        .fetch_all(self.store.pool())
        .await
        .map_err(sqlx_to_catalog_error)?;
        rows.into_iter()
            .map(|row| {
                Ok(Database {
                    id: row.try_get("id").map_err(sqlx_to_catalog_error)?,
                    name: row.try_get("name").map_err(sqlx_to_catalog_error)?,
                    tenant: row.try_get("tenant_id").map_err(sqlx_to_catalog_error)?,
                    created_at: row.try_get("created_at").map_err(sqlx_to_catalog_error)?,
                    is_deleted: row.try_get("is_deleted").map_err(sqlx_to_catalog_error)?,
                })
            })
            .collect()
    }

    pub async fn delete_database(&self, name: &str, tenant: &str) -> Result<Notification, CatalogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;
        let result = sqlx::query(
            "UPDATE databases SET is_deleted = TRUE WHERE name = $1 AND tenant_id = $2 AND is_deleted = FALSE",
        )
        .bind(name)
        .bind(tenant)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_to_catalog_error)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("database {tenant}/{name}")));
        }
        let notification = self
            .enqueue_notification(&mut tx, CollectionUuid(Uuid::nil()), NotificationType::DeleteDatabase)
            .await
            .map_err(sqlx_to_catalog_error)?;
        tx.commit().await.map_err(sqlx_to_catalog_error)?;
        Ok(notification)
    }

    pub async fn create_collection(
        &self,
        spec: CreateCollectionSpec,
        topic: String,
    ) -> Result<(Collection, Option<Notification>), CatalogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;

        let db_row = sqlx::query("SELECT id FROM databases WHERE name = $1 AND tenant_id = $2 AND is_deleted = FALSE")
            .bind(&spec.database)
            .bind(&spec.tenant)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?
            .ok_or_else(|| CatalogError::NotFound(format!("database {}/{}", spec.tenant, spec.database)))?;
        let database_id: Uuid = db_row.try_get("id").map_err(sqlx_to_catalog_error)?;

        let existing = sqlx::query(&format!(
            "{COLLECTION_SELECT} WHERE c.database_id = $1 AND c.name = $2 AND c.is_deleted = FALSE"
        ))
        .bind(database_id)
        .bind(&spec.name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_to_catalog_error)?;

        if let Some(row) = existing {
            let row = CollectionRow::from_row(&row).map_err(sqlx_to_catalog_error)?;
            if spec.get_or_create {
                let id = row.id;
                let metadata = self
                    .load_collection_metadata(&mut tx, id)
                    .await
                    .map_err(sqlx_to_catalog_error)?;
                tx.commit().await.map_err(sqlx_to_catalog_error)?;
                return Ok((row.into_collection(metadata), None));
            }
            return Err(CatalogError::AlreadyExists(format!(
                "collection {}/{}",
                spec.database, spec.name
            )));
        }

        sqlx::query(
            "INSERT INTO collections (id, name, database_id, dimension, log_position, configuration, topic, version, is_deleted) VALUES ($1, $2, $3, $4, 0, $5, $6, 0, FALSE)",
        )
        .bind(spec.collection_id.0)
        .bind(&spec.name)
        .bind(database_id)
        .bind(spec.dimension)
        .bind(&spec.configuration)
        .bind(&topic)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_to_catalog_error)?;

        if let Some(metadata) = &spec.metadata {
            self.replace_collection_metadata(&mut tx, spec.collection_id.0, metadata)
                .await
                .map_err(sqlx_to_catalog_error)?;
        }

        let notification = self
            .enqueue_notification(&mut tx, spec.collection_id, NotificationType::CreateCollection)
            .await
            .map_err(sqlx_to_catalog_error)?;

        tx.commit().await.map_err(sqlx_to_catalog_error)?;

        Ok((
            Collection {
                collection_id: spec.collection_id,
                name: spec.name,
                database_id,
                tenant: spec.tenant,
                database: spec.database,
                dimension: spec.dimension,
                metadata: spec.metadata,
                configuration: spec.configuration,
                topic,
                log_position: 0,
                version: 0,
                is_deleted: false,
            },
            Some(notification),
        ))
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

        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;

        let row = sqlx::query(&format!(
            "{COLLECTION_SELECT} WHERE c.id = $1 AND c.is_deleted = FALSE"
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_to_catalog_error)?
        .ok_or_else(|| CatalogError::NotFound(format!("collection {id}")))?;
        let row = CollectionRow::from_row(&row).map_err(sqlx_to_catalog_error)?;

        if let Some(name) = &spec.name {
            sqlx::query("UPDATE collections SET name = $1 WHERE id = $2")
                .bind(name)
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_to_catalog_error)?;
        }

        let mut metadata = self
            .load_collection_metadata(&mut tx, id.0)
            .await
            .map_err(sqlx_to_catalog_error)?;

        if spec.reset_metadata {
            sqlx::query("DELETE FROM collection_metadata WHERE collection_id = $1")
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_to_catalog_error)?;
            metadata = None;
        } else if let Some(updates) = spec.metadata {
            let mut merged = metadata.unwrap_or_default();
            for (key, update) in updates {
                match update {
                    UpdateMetadataValue::Set(value) => {
                        merged.insert(key, value);
                    }
                    UpdateMetadataValue::Remove => {
                        merged.remove(&key);
                    }
                }
            }
            self.replace_collection_metadata(&mut tx, id.0, &merged)
                .await
                .map_err(sqlx_to_catalog_error)?;
            metadata = Some(merged);
        }

        sqlx::query("UPDATE collections SET version = version + 1 WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;

        let notification = self
            .enqueue_notification(&mut tx, id, NotificationType::UpdateCollection)
            .await
            .map_err(sqlx_to_catalog_error)?;

        tx.commit().await.map_err(sqlx_to_catalog_error)?;

        let mut collection = row.into_collection(metadata);
        if let Some(name) = spec.name {
            collection.name = name;
        }
        collection.version += 1;
        Ok((collection, notification))
    }

    pub async fn delete_collection(&self, id: CollectionUuid) -> Result<Notification, CatalogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;
        let result = sqlx::query("UPDATE collections SET is_deleted = TRUE WHERE id = $1 AND is_deleted = FALSE")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("collection {id}")));
        }
        let notification = self
            .enqueue_notification(&mut tx, id, NotificationType::DeleteCollection)
            .await
            .map_err(sqlx_to_catalog_error)?;
        tx.commit().await.map_err(sqlx_to_catalog_error)?;
        Ok(notification)
    }

    pub async fn get_collections(
        &self,
        options: GetCollectionsOptions,
    ) -> Result<Vec<Collection>, CatalogError> {
        // Every placeholder below is always bound regardless of whether the
        // caller supplied that filter: Postgres requires the bound parameter
        // count to match what the query text references, so an absent
        // filter is expressed as "$N IS NULL OR ..." rather than by omitting
        // the clause (and the placeholder) altogether.
        let mut query = format!("{COLLECTION_SELECT} WHERE 1 = 1 ");
        if !options.include_soft_deleted {
            query.push_str("AND c.is_deleted = FALSE ");
        }
        query.push_str("AND ($1::uuid IS NULL OR c.id = $1) ");
        query.push_str("AND ($2::text IS NULL OR c.name = $2) ");
        query.push_str("AND ($3::text IS NULL OR d.tenant_id = $3) ");
        query.push_str("AND ($4::text IS NULL OR d.name = $4) ");
        query.push_str("ORDER BY c.name OFFSET $5 LIMIT $6");

        let mut q = sqlx::query(&query);
        q = q.bind(options.collection_id.map(|c| c.0));
        q = q.bind(options.name.clone());
        q = q.bind(options.tenant.clone());
        q = q.bind(options.database.clone());
        q = q.bind(options.offset as i64);
        q = q.bind(options.limit.map(|l| l as i64).unwrap_or(i64::MAX));

        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;
        let rows = q.fetch_all(&mut *tx).await.map_err(sqlx_to_catalog_error)?;

        let mut collections = Vec::with_capacity(rows.len());
        for row in rows {
            let row = CollectionRow::from_row(&row).map_err(sqlx_to_catalog_error)?;
            let metadata = self
                .load_collection_metadata(&mut tx, row.id)
                .await
                .map_err(sqlx_to_catalog_error)?;
            collections.push(row.into_collection(metadata));
        }
        tx.commit().await.map_err(sqlx_to_catalog_error)?;
        Ok(collections)
    }

    pub async fn create_segment(&self, spec: CreateSegmentSpec) -> Result<Segment, CatalogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;

        let collection_exists = sqlx::query("SELECT 1 FROM collections WHERE id = $1")
            .bind(spec.collection_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;
        if collection_exists.is_none() {
            return Err(CatalogError::NotFound(format!("collection {}", spec.collection_id)));
        }

        let existing_rows = sqlx::query("SELECT id, type, scope, collection_id FROM segments WHERE collection_id = $1")
            .bind(spec.collection_id.0)
            .fetch_all(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;
        let existing: Vec<Segment> = existing_rows
            .into_iter()
            .map(|row| -> Result<Segment, CatalogError> {
                let scope_str: String = row.try_get("scope").map_err(sqlx_to_catalog_error)?;
                Ok(Segment {
                    id: SegmentUuid(row.try_get("id").map_err(sqlx_to_catalog_error)?),
                    r#type: row.try_get("type").map_err(sqlx_to_catalog_error)?,
                    scope: scope_str.parse().map_err(|_| {
                        CatalogError::Internal(format!("corrupt segment scope {scope_str}"))
                    })?,
                    collection: CollectionUuid(row.try_get("collection_id").map_err(sqlx_to_catalog_error)?),
                    metadata: None,
                })
            })
            .collect::<Result<_, _>>()?;
        self.validator.validate(&existing, spec.scope, spec.collection_id)?;

        sqlx::query("INSERT INTO segments (id, type, scope, collection_id) VALUES ($1, $2, $3, $4)")
            .bind(spec.id.0)
            .bind(&spec.r#type)
            .bind(spec.scope.to_string())
            .bind(spec.collection_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;

        if let Some(metadata) = &spec.metadata {
            for (key, value) in metadata {
                let (s, i, f) = metadata_value_to_columns(value);
                sqlx::query(
                    "INSERT INTO segment_metadata (segment_id, key, str_value, int_value, float_value) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(spec.id.0)
                .bind(key)
                .bind(s)
                .bind(i)
                .bind(f)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_to_catalog_error)?;
            }
        }

        tx.commit().await.map_err(sqlx_to_catalog_error)?;

        Ok(Segment {
            id: spec.id,
            r#type: spec.r#type,
            scope: spec.scope,
            collection: spec.collection_id,
            metadata: spec.metadata,
        })
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
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;
        let row = sqlx::query("SELECT id, type, scope, collection_id FROM segments WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?
            .ok_or_else(|| CatalogError::NotFound(format!("segment {id}")))?;
        let scope_str: String = row.try_get("scope").map_err(sqlx_to_catalog_error)?;
        let r#type: String = row.try_get("type").map_err(sqlx_to_catalog_error)?;
        let collection: Uuid = row.try_get("collection_id").map_err(sqlx_to_catalog_error)?;
        let scope: SegmentScope = scope_str
            .parse()
            .map_err(|_| CatalogError::Internal(format!("corrupt segment scope {scope_str}")))?;

        let mut metadata_rows = sqlx::query(
            "SELECT key, str_value, int_value, float_value FROM segment_metadata WHERE segment_id = $1",
        )
        .bind(id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(sqlx_to_catalog_error)?;
        let mut metadata = Metadata::new();
        for row in metadata_rows.drain(..) {
            let key: String = row.try_get("key").map_err(sqlx_to_catalog_error)?;
            if let Some(value) = columns_to_metadata_value(
                row.try_get("str_value").map_err(sqlx_to_catalog_error)?,
                row.try_get("int_value").map_err(sqlx_to_catalog_error)?,
                row.try_get("float_value").map_err(sqlx_to_catalog_error)?,
            ) {
                metadata.insert(key, value);
            }
        }

        if spec.reset_metadata {
            sqlx::query("DELETE FROM segment_metadata WHERE segment_id = $1")
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_to_catalog_error)?;
            metadata.clear();
        } else if let Some(updates) = spec.metadata {
            for (key, update) in updates {
                match update {
                    UpdateMetadataValue::Set(value) => {
                        metadata.insert(key, value);
                    }
                    UpdateMetadataValue::Remove => {
                        metadata.remove(&key);
                    }
                }
            }
            sqlx::query("DELETE FROM segment_metadata WHERE segment_id = $1")
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_to_catalog_error)?;
            for (key, value) in &metadata {
                let (s, i, f) = metadata_value_to_columns(value);
                sqlx::query(
                    "INSERT INTO segment_metadata (segment_id, key, str_value, int_value, float_value) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(id.0)
                .bind(key)
                .bind(s)
                .bind(i)
                .bind(f)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_to_catalog_error)?;
            }
        }

        tx.commit().await.map_err(sqlx_to_catalog_error)?;

        Ok(Segment {
            id,
            r#type,
            scope,
            collection: CollectionUuid(collection),
            metadata: if metadata.is_empty() { None } else { Some(metadata) },
        })
    }

    pub async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        let result = sqlx::query("DELETE FROM segments WHERE id = $1")
            .bind(id.0)
            .execute(self.store.pool())
            .await
            .map_err(sqlx_to_catalog_error)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("segment {id}")));
        }
        Ok(())
    }

    pub async fn get_segments(
        &self,
        options: GetSegmentsOptions,
    ) -> Result<Vec<Segment>, CatalogError> {
        // Same "$N IS NULL OR ..." pattern as get_collections: all four
        // placeholders are always bound so the parameter count matches what
        // the query text references, whether or not the caller filtered on
        // them.
        let query = "SELECT id, type, scope, collection_id FROM segments WHERE 1 = 1 \
            AND ($1::uuid IS NULL OR id = $1) \
            AND ($2::text IS NULL OR type = $2) \
            AND ($3::text IS NULL OR scope = $3) \
            AND ($4::uuid IS NULL OR collection_id = $4)"
            .to_string();
        let mut q = sqlx::query(&query);
        q = q.bind(options.id.map(|s| s.0));
        q = q.bind(options.r#type.clone());
        q = q.bind(options.scope.map(|s| s.to_string()));
        q = q.bind(options.collection_id.map(|c| c.0));

        let rows = q.fetch_all(self.store.pool()).await.map_err(sqlx_to_catalog_error)?;
        let mut segments = Vec::with_capacity(rows.len());
        for row in rows {
            let scope_str: String = row.try_get("scope").map_err(sqlx_to_catalog_error)?;
            let id = SegmentUuid(row.try_get("id").map_err(sqlx_to_catalog_error)?);
            let metadata_rows = sqlx::query(
                "SELECT key, str_value, int_value, float_value FROM segment_metadata WHERE segment_id = $1",
            )
            .bind(id.0)
            .fetch_all(self.store.pool())
            .await
            .map_err(sqlx_to_catalog_error)?;
            let mut metadata = Metadata::new();
            for meta_row in metadata_rows {
                let key: String = meta_row.try_get("key").map_err(sqlx_to_catalog_error)?;
                if let Some(value) = columns_to_metadata_value(
                    meta_row.try_get("str_value").map_err(sqlx_to_catalog_error)?,
                    meta_row.try_get("int_value").map_err(sqlx_to_catalog_error)?,
                    meta_row.try_get("float_value").map_err(sqlx_to_catalog_error)?,
                ) {
                    metadata.insert(key, value);
                }
            }
            segments.push(Segment {
                id,
                r#type: row.try_get("type").map_err(sqlx_to_catalog_error)?,
                scope: scope_str.parse().map_err(|_| {
                    CatalogError::Internal(format!("corrupt segment scope {scope_str}"))
                })?,
                collection: CollectionUuid(row.try_get("collection_id").map_err(sqlx_to_catalog_error)?),
                metadata: if metadata.is_empty() { None } else { Some(metadata) },
            });
        }
        Ok(segments)
    }

    pub async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_catalog_error)?;
        let row = sqlx::query("SELECT log_position FROM collections WHERE id = $1")
            .bind(collection_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {collection_id}")))?;
        let current: i64 = row.try_get("log_position").map_err(sqlx_to_catalog_error)?;
        if position < current {
            return Err(CatalogError::FailedPrecondition(format!(
                "log position would regress from {current} to {position}"
            )));
        }
        sqlx::query("UPDATE collections SET log_position = $1 WHERE id = $2")
            .bind(position)
            .bind(collection_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_catalog_error)?;
        tx.commit().await.map_err(sqlx_to_catalog_error)?;
        Ok(())
    }

    pub async fn list_pending_notifications(&self) -> Vec<Notification> {
        let rows = sqlx::query("SELECT id, collection_id, type FROM notifications WHERE status = 'PENDING' ORDER BY id")
            .fetch_all(self.store.pool())
            .await
            .unwrap_or_default();
        rows.into_iter()
            .filter_map(|row| {
                let id: i64 = row.try_get("id").ok()?;
                let collection_id: Uuid = row.try_get("collection_id").ok()?;
                let type_str: String = row.try_get("type").ok()?;
                Some(Notification {
                    id,
                    collection_id: CollectionUuid(collection_id),
                    r#type: type_str.parse().ok()?,
                    status: NotificationStatus::Pending,
                })
            })
            .collect()
    }

    pub async fn mark_notification_sent(&self, id: i64) -> Result<(), CatalogError> {
        let result = sqlx::query("UPDATE notifications SET status = 'SENT' WHERE id = $1")
            .bind(id)
            .execute(self.store.pool())
            .await
            .map_err(sqlx_to_catalog_error)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }
}
