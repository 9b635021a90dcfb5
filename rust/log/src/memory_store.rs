use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use chroma_types::{CollectionInfo, CollectionLogState, CollectionUuid, LogError, LogRecord};

use crate::store::LogStore;

struct Entry {
    offset: i64,
    timestamp_ns: i64,
    record: Vec<u8>,
}

#[derive(Default)]
struct CollectionLog {
    entries: Vec<Entry>,
    state: CollectionLogState,
}

/// A non-durable log backend, everything held behind a single mutex. Used
/// for local development and tests, mirroring `InMemoryLog`'s role on the
/// client side: correct ordering, no persistence.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogStore {
    inner: Arc<Mutex<HashMap<CollectionUuid, CollectionLog>>>,
}

impl std::fmt::Debug for CollectionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionLog")
            .field("len", &self.entries.len())
            .field("state", &self.state)
            .finish()
    }
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_ns() -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    }
}

#[async_trait]
impl LogStore for InMemoryLogStore {
    async fn append_batch(
        &self,
        collection_id: CollectionUuid,
        records: Vec<Vec<u8>>,
    ) -> Result<(i64, i64), LogError> {
        if records.is_empty() {
            return Err(LogError::InvalidArgument("push with no records".into()));
        }
        let mut inner = self.inner.lock();
        let log = inner.entry(collection_id).or_default();
        let first_offset = log.state.enumeration_offset + 1;
        let ts = Self::now_ns();
        for record in records {
            log.state.enumeration_offset += 1;
            log.entries.push(Entry {
                offset: log.state.enumeration_offset,
                timestamp_ns: ts,
                record,
            });
        }
        Ok((first_offset, log.state.enumeration_offset))
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
        let inner = self.inner.lock();
        let Some(log) = inner.get(&collection_id) else {
            return Ok(Vec::new());
        };
        let end_ts = end_timestamp.unwrap_or(i64::MAX);
        Ok(log
            .entries
            .iter()
            .filter(|e| e.offset >= start_offset && e.timestamp_ns <= end_ts)
            .take(batch_size as usize)
            .map(|e| LogRecord {
                log_offset: e.offset,
                record: e.record.clone(),
            })
            .collect())
    }

    async fn collection_log_state(
        &self,
        collection_id: CollectionUuid,
    ) -> Result<CollectionLogState, LogError> {
        let inner = self.inner.lock();
        Ok(inner
            .get(&collection_id)
            .map(|log| log.state)
            .unwrap_or_default())
    }

    async fn set_compaction_offset(
        &self,
        collection_id: CollectionUuid,
        new_offset: i64,
    ) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        let log = inner.entry(collection_id).or_default();
        if new_offset > log.state.enumeration_offset {
            return Err(LogError::FailedPrecondition(format!(
                "compaction offset {new_offset} is past the enumeration offset {}",
                log.state.enumeration_offset
            )));
        }
        if new_offset < log.state.compaction_offset {
            return Err(LogError::FailedPrecondition(format!(
                "compaction offset would regress from {} to {new_offset}",
                log.state.compaction_offset
            )));
        }
        log.state.compaction_offset = new_offset;
        Ok(())
    }

    async fn purge_upto(&self, collection_id: CollectionUuid, new_offset: i64) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        let Some(log) = inner.get_mut(&collection_id) else {
            return Ok(());
        };
        if new_offset > log.state.compaction_offset {
            return Err(LogError::FailedPrecondition(format!(
                "refusing to purge up to {new_offset}, past compaction offset {}",
                log.state.compaction_offset
            )));
        }
        log.entries.retain(|e| e.offset > new_offset);
        Ok(())
    }

    async fn collections_with_unread_entries(&self) -> Result<Vec<CollectionInfo>, LogError> {
        let inner = self.inner.lock();
        Ok(inner
            .iter()
            .filter(|(_, log)| log.state.has_unread_entries())
            .filter_map(|(id, log)| {
                log.entries
                    .iter()
                    .find(|e| e.offset > log.state.compaction_offset)
                    .map(|e| CollectionInfo {
                        collection_id: *id,
                        first_log_offset: e.offset,
                        first_log_offset_ts: e.timestamp_ns,
                    })
            })
            .collect())
    }

    async fn tracked_collections(&self) -> Result<Vec<CollectionUuid>, LogError> {
        let inner = self.inner.lock();
        Ok(inner.keys().copied().collect())
    }

    async fn forget_collection(&self, collection_id: CollectionUuid) -> Result<(), LogError> {
        self.inner.lock().remove(&collection_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn append_assigns_contiguous_offsets() {
        let store = InMemoryLogStore::new();
        let collection_id = CollectionUuid(Uuid::new_v4());
        let (first, last) = store
            .append_batch(collection_id, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .await
            .unwrap();
        assert_eq!((first, last), (1, 3));
        let (first2, last2) = store
            .append_batch(collection_id, vec![b"d".to_vec()])
            .await
            .unwrap();
        assert_eq!((first2, last2), (4, 4));
    }

    #[tokio::test]
    async fn compaction_offset_cannot_exceed_enumeration_offset() {
        let store = InMemoryLogStore::new();
        let collection_id = CollectionUuid(Uuid::new_v4());
        store
            .append_batch(collection_id, vec![b"a".to_vec()])
            .await
            .unwrap();
        assert!(store.set_compaction_offset(collection_id, 5).await.is_err());
        assert!(store.set_compaction_offset(collection_id, 1).await.is_ok());
    }

    #[tokio::test]
    async fn compaction_offset_cannot_regress() {
        let store = InMemoryLogStore::new();
        let collection_id = CollectionUuid(Uuid::new_v4());
        store
            .append_batch(collection_id, vec![b"a".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
        store.set_compaction_offset(collection_id, 2).await.unwrap();
        assert!(store.set_compaction_offset(collection_id, 1).await.is_err());
    }

    #[tokio::test]
    async fn purge_refuses_past_compaction_offset() {
        let store = InMemoryLogStore::new();
        let collection_id = CollectionUuid(Uuid::new_v4());
        store
            .append_batch(collection_id, vec![b"a".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
        store.set_compaction_offset(collection_id, 1).await.unwrap();
        assert!(store.purge_upto(collection_id, 2).await.is_err());
        store.purge_upto(collection_id, 1).await.unwrap();
        let remaining = store.scan(collection_id, 1, 10, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].log_offset, 2);
    }

    #[tokio::test]
    async fn collections_with_unread_entries_reports_first_unread_offset() {
        let store = InMemoryLogStore::new();
        let collection_id = CollectionUuid(Uuid::new_v4());
        store
            .append_batch(collection_id, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .await
            .unwrap();
        store.set_compaction_offset(collection_id, 1).await.unwrap();
        let infos = store.collections_with_unread_entries().await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].collection_id, collection_id);
        assert_eq!(infos[0].first_log_offset, 2);
    }
}
