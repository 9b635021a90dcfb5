use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use chroma_error::WrappedSqlxError;
use chroma_storage_sql::RelationalStore;
use chroma_types::{CollectionInfo, CollectionLogState, CollectionUuid, LogError, LogRecord};

use crate::store::LogStore;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS collection_log (
        collection_id UUID PRIMARY KEY,
        enumeration_offset BIGINT NOT NULL DEFAULT 0,
        compaction_offset BIGINT NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS record_log (
        collection_id UUID NOT NULL REFERENCES collection_log(collection_id),
        log_offset BIGINT NOT NULL,
        ts_ns BIGINT NOT NULL,
        record BYTEA NOT NULL,
        PRIMARY KEY (collection_id, log_offset)
    )"#,
];

fn sqlx_to_log_error(err: sqlx::Error) -> LogError {
    let wrapped = WrappedSqlxError::from(err);
    LogError::Unavailable(wrapped.to_string())
}

/// Postgres-backed `LogStore`. `collection_log` tracks each collection's
/// offset watermarks; `record_log` holds the actual payloads. Separated
/// into two tables so the purger's delete (I3) is a plain range delete on
/// `record_log` that never touches the watermarks.
#[derive(Clone)]
pub struct SqlLogStore {
    store: RelationalStore,
}

impl std::fmt::Debug for SqlLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlLogStore").finish()
    }
}

impl SqlLogStore {
    pub fn new(store: RelationalStore) -> Self {
        Self { store }
    }

    pub async fn bootstrap(&self) -> Result<(), LogError> {
        self.store.apply_schema(SCHEMA).await.map_err(sqlx_to_log_error)
    }
}

#[async_trait]
impl LogStore for SqlLogStore {
    async fn append_batch(
        &self,
        collection_id: CollectionUuid,
        records: Vec<Vec<u8>>,
    ) -> Result<(i64, i64), LogError> {
        if records.is_empty() {
            return Err(LogError::InvalidArgument("push with no records".into()));
        }

        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_log_error)?;

        sqlx::query(
            "INSERT INTO collection_log (collection_id, enumeration_offset, compaction_offset) VALUES ($1, 0, 0) ON CONFLICT (collection_id) DO NOTHING",
        )
        .bind(collection_id.0)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_to_log_error)?;

        let row = sqlx::query("SELECT enumeration_offset FROM collection_log WHERE collection_id = $1 FOR UPDATE")
            .bind(collection_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(sqlx_to_log_error)?;
        let mut offset: i64 = row.try_get("enumeration_offset").map_err(sqlx_to_log_error)?;
        let first_offset = offset + 1;
        let ts_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

        for record in records {
            offset += 1;
            sqlx::query(
                "INSERT INTO record_log (collection_id, log_offset, ts_ns, record) VALUES ($1, $2, $3, $4)",
            )
            .bind(collection_id.0)
            .bind(offset)
            .bind(ts_ns)
            .bind(&record)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_log_error)?;
        }

        sqlx::query("UPDATE collection_log SET enumeration_offset = $1 WHERE collection_id = $2")
            .bind(offset)
            .bind(collection_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_log_error)?;

        tx.commit().await.map_err(sqlx_to_log_error)?;
        Ok((first_offset, offset))
    }

    async fn scan(
        &self,
        collection_id: CollectionUuid,
        start_offset: i64,
        batch_size: i32,
        end_timestamp: Option<i64>,
    ) -> Result<Vec<LogRecord>, LogError> {
        if batch_size < 0 {
            return Err(LogError::InvalidArgument("batch_size must be non-negative".into()));
        }
        let rows = sqlx::query(
            "SELECT log_offset, record FROM record_log WHERE collection_id = $1 AND log_offset >= $2 AND ts_ns <= $3 ORDER BY log_offset LIMIT $4",
        )
        .bind(collection_id.0)
        .bind(start_offset)
        .bind(end_timestamp.unwrap_or(i64::MAX))
        .bind(batch_size as i64)
        .fetch_all(self.store.pool())
        .await
        .map_err(sqlx_to_log_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(LogRecord {
                    log_offset: row.try_get("log_offset").map_err(sqlx_to_log_error)?,
                    record: row.try_get("record").map_err(sqlx_to_log_error)?,
                })
            })
            .collect()
    }

    async fn collection_log_state(
        &self,
        collection_id: CollectionUuid,
    ) -> Result<CollectionLogState, LogError> {
        let row = sqlx::query(
            "SELECT enumeration_offset, compaction_offset FROM collection_log WHERE collection_id = $1",
        )
        .bind(collection_id.0)
        .fetch_optional(self.store.pool())
        .await
        .map_err(sqlx_to_log_error)?;
        Ok(match row {
            Some(row) => CollectionLogState {
                enumeration_offset: row.try_get("enumeration_offset").map_err(sqlx_to_log_error)?,
                compaction_offset: row.try_get("compaction_offset").map_err(sqlx_to_log_error)?,
            },
            None => CollectionLogState::default(),
        })
    }

    async fn set_compaction_offset(
        &self,
        collection_id: CollectionUuid,
        new_offset: i64,
    ) -> Result<(), LogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_log_error)?;
        let row = sqlx::query(
            "SELECT enumeration_offset, compaction_offset FROM collection_log WHERE collection_id = $1 FOR UPDATE",
        )
        .bind(collection_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_to_log_error)?
        .ok_or_else(|| LogError::NotFound(format!("collection {collection_id}")))?;
        let enumeration_offset: i64 = row.try_get("enumeration_offset").map_err(sqlx_to_log_error)?;
        let compaction_offset: i64 = row.try_get("compaction_offset").map_err(sqlx_to_log_error)?;
        if new_offset > enumeration_offset {
            return Err(LogError::FailedPrecondition(format!(
                "compaction offset {new_offset} is past the enumeration offset {enumeration_offset}"
            )));
        }
        if new_offset < compaction_offset {
            return Err(LogError::FailedPrecondition(format!(
                "compaction offset would regress from {compaction_offset} to {new_offset}"
            )));
        }
        sqlx::query("UPDATE collection_log SET compaction_offset = $1 WHERE collection_id = $2")
            .bind(new_offset)
            .bind(collection_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_log_error)?;
        tx.commit().await.map_err(sqlx_to_log_error)?;
        Ok(())
    }

    async fn purge_upto(&self, collection_id: CollectionUuid, new_offset: i64) -> Result<(), LogError> {
        let row = sqlx::query("SELECT compaction_offset FROM collection_log WHERE collection_id = $1")
            .bind(collection_id.0)
            .fetch_optional(self.store.pool())
            .await
            .map_err(sqlx_to_log_error)?;
        let Some(row) = row else {
            return Ok(());
        };
        let compaction_offset: i64 = row.try_get("compaction_offset").map_err(sqlx_to_log_error)?;
        if new_offset > compaction_offset {
            return Err(LogError::FailedPrecondition(format!(
                "refusing to purge up to {new_offset}, past compaction offset {compaction_offset}"
            )));
        }
        sqlx::query("DELETE FROM record_log WHERE collection_id = $1 AND log_offset <= $2")
            .bind(collection_id.0)
            .bind(new_offset)
            .execute(self.store.pool())
            .await
            .map_err(sqlx_to_log_error)?;
        Ok(())
    }

    async fn collections_with_unread_entries(&self) -> Result<Vec<CollectionInfo>, LogError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (r.collection_id) r.collection_id, r.log_offset, r.ts_ns
            FROM record_log r
            JOIN collection_log c ON c.collection_id = r.collection_id
            WHERE r.log_offset > c.compaction_offset
            ORDER BY r.collection_id, r.log_offset ASC
            "#,
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(sqlx_to_log_error)?;

        rows.into_iter()
            .map(|row| -> Result<CollectionInfo, LogError> {
                let collection_id: Uuid = row.try_get("collection_id").map_err(sqlx_to_log_error)?;
                Ok(CollectionInfo {
                    collection_id: CollectionUuid(collection_id),
                    first_log_offset: row.try_get("log_offset").map_err(sqlx_to_log_error)?,
                    first_log_offset_ts: row.try_get("ts_ns").map_err(sqlx_to_log_error)?,
                })
            })
            .collect()
    }

    async fn tracked_collections(&self) -> Result<Vec<CollectionUuid>, LogError> {
        let rows = sqlx::query("SELECT collection_id FROM collection_log WHERE compaction_offset > 0")
            .fetch_all(self.store.pool())
            .await
            .map_err(sqlx_to_log_error)?;
        rows.into_iter()
            .map(|row| -> Result<CollectionUuid, LogError> {
                let id: Uuid = row.try_get("collection_id").map_err(sqlx_to_log_error)?;
                Ok(CollectionUuid(id))
            })
            .collect()
    }

    async fn forget_collection(&self, collection_id: CollectionUuid) -> Result<(), LogError> {
        let mut tx = self.store.pool().begin().await.map_err(sqlx_to_log_error)?;
        sqlx::query("DELETE FROM record_log WHERE collection_id = $1")
            .bind(collection_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_log_error)?;
        sqlx::query("DELETE FROM collection_log WHERE collection_id = $1")
            .bind(collection_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_to_log_error)?;
        tx.commit().await.map_err(sqlx_to_log_error)?;
        Ok(())
    }
}
