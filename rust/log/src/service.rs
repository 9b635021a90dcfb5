use std::sync::Arc;

use chroma_types::{CollectionInfo, CollectionUuid, LogError, LogPositionSink, LogRecord};

use crate::config::LogConfig;
use crate::store::LogStore;

/// The Log Service's business logic (PushLogs / PullLogs /
/// GetAllCollectionInfoToCompact / UpdateCollectionLogOffset / PurgeLogs),
/// layered over a `LogStore`. Everything here is storage-agnostic: swapping
/// `InMemoryLogStore` for `SqlLogStore` changes nothing above this line.
#[derive(Clone)]
pub struct LogService {
    store: Arc<dyn LogStore>,
    catalog_sink: Option<Arc<dyn LogPositionSink>>,
    min_compaction_size: u64,
    max_batch_size: i32,
}

impl std::fmt::Debug for LogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogService").finish()
    }
}

impl LogService {
    pub fn new(store: Arc<dyn LogStore>, config: &LogConfig) -> Self {
        Self {
            store,
            catalog_sink: None,
            min_compaction_size: config.min_compaction_size,
            max_batch_size: config.max_batch_size,
        }
    }

    /// Wires in the catalog write-through target for
    /// `UpdateCollectionLogOffset`. Without one, offsets are tracked
    /// locally but the catalog's `log_position` column is never advanced --
    /// useful for tests that don't need a catalog at all.
    pub fn with_catalog_sink(mut self, sink: Arc<dyn LogPositionSink>) -> Self {
        self.catalog_sink = Some(sink);
        self
    }

    /// Appends `records` and returns the offset of the last record written.
    /// Rejects empty batches: a `PushLogs` call must make progress. Rejects a
    /// collection the catalog has never heard of, when a catalog sink is
    /// wired in -- without one (e.g. tests of the wire API in isolation)
    /// any collection id is accepted.
    pub async fn push_logs(
        &self,
        collection_id: CollectionUuid,
        records: Vec<Vec<u8>>,
    ) -> Result<i64, LogError> {
        if records.is_empty() {
            return Err(LogError::InvalidArgument(
                "PushLogs requires at least one record".into(),
            ));
        }
        if let Some(sink) = &self.catalog_sink {
            let exists = sink
                .collection_exists(collection_id)
                .await
                .map_err(|err| LogError::Unavailable(err.to_string()))?;
            if !exists {
                return Err(LogError::NotFound(format!("collection {collection_id}")));
            }
        }
        let (_first, last) = self.store.append_batch(collection_id, records).await?;
        Ok(last)
    }

    /// `start_offset` is inclusive and 0 means "from the beginning" -- offsets
    /// handed out by `PushLogs` start at 1, so `store.scan`'s
    /// `offset >= start_offset` filter already includes everything when
    /// `start_offset` is 0.
    pub async fn pull_logs(
        &self,
        collection_id: CollectionUuid,
        start_offset: i64,
        batch_size: i32,
        end_timestamp: Option<i64>,
    ) -> Result<Vec<LogRecord>, LogError> {
        if start_offset < 0 {
            return Err(LogError::InvalidArgument(
                "start_offset must be >= 0".into(),
            ));
        }
        let batch_size = batch_size.clamp(0, self.max_batch_size);
        self.store
            .scan(collection_id, start_offset, batch_size, end_timestamp)
            .await
    }

    /// Reports every collection with at least `min_compaction_size` unread
    /// entries, for the compactor's poll loop.
    pub async fn get_all_collection_info_to_compact(&self) -> Result<Vec<CollectionInfo>, LogError> {
        let candidates = self.store.collections_with_unread_entries().await?;
        if self.min_compaction_size <= 1 {
            return Ok(candidates);
        }
        let mut result = Vec::with_capacity(candidates.len());
        for info in candidates {
            let state = self.store.collection_log_state(info.collection_id).await?;
            let unread = (state.enumeration_offset - state.compaction_offset).max(0) as u64;
            if unread >= self.min_compaction_size {
                result.push(info);
            }
        }
        Ok(result)
    }

    /// Acknowledges compaction up to `new_offset` and, if a catalog sink is
    /// configured, writes the same value through to the catalog's
    /// `log_position` column. The two writes are not transactional with
    /// each other; a crash between them leaves the log ahead of the
    /// catalog, which is safe since `log_position` is only ever used as a
    /// lower bound on what has already been compacted, not an upper one.
    pub async fn update_collection_log_offset(
        &self,
        collection_id: CollectionUuid,
        new_offset: i64,
    ) -> Result<(), LogError> {
        self.store.set_compaction_offset(collection_id, new_offset).await?;
        if let Some(sink) = &self.catalog_sink {
            sink.set_log_position(collection_id, new_offset)
                .await
                .map_err(|err| LogError::Unavailable(err.to_string()))?;
        }
        Ok(())
    }

    /// Physically deletes log entries at or before `new_offset`. Exposed
    /// both as a direct API (for a caller that wants to purge a specific
    /// collection) and used internally by the periodic purger.
    pub async fn purge_logs(&self, collection_id: CollectionUuid, upto_offset: i64) -> Result<(), LogError> {
        self.store.purge_upto(collection_id, upto_offset).await
    }

    /// The maintenance sweep: for every tracked collection, purge up to its
    /// current compaction offset. Run periodically by the Log Service's
    /// leader-gated purger loop.
    pub async fn purge_all_compacted(&self) -> Result<(), LogError> {
        for collection_id in self.store.tracked_collections().await? {
            let state = self.store.collection_log_state(collection_id).await?;
            if state.compaction_offset > 0 {
                self.store.purge_upto(collection_id, state.compaction_offset).await?;
            }
        }
        Ok(())
    }

    /// Drops all log state for a deleted collection. Called by the log
    /// service's notification subscriber when it observes a
    /// `DeleteCollection` notification.
    pub async fn handle_collection_deleted(&self, collection_id: CollectionUuid) -> Result<(), LogError> {
        self.store.forget_collection(collection_id).await
    }

    pub async fn collection_log_state(
        &self,
        collection_id: CollectionUuid,
    ) -> Result<chroma_types::CollectionLogState, LogError> {
        self.store.collection_log_state(collection_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::memory_store::InMemoryLogStore;

    #[tokio::test]
    async fn push_rejects_empty_batch() {
        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &LogConfig::default());
        let collection_id = CollectionUuid(Uuid::new_v4());
        assert!(service.push_logs(collection_id, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn pull_rejects_negative_offset() {
        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &LogConfig::default());
        let collection_id = CollectionUuid(Uuid::new_v4());
        assert!(service.pull_logs(collection_id, -1, 10, None).await.is_err());
    }

    #[tokio::test]
    async fn push_then_pull_round_trips() {
        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &LogConfig::default());
        let collection_id = CollectionUuid(Uuid::new_v4());
        let last = service
            .push_logs(collection_id, vec![b"a".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
        assert_eq!(last, 2);
        let records = service.pull_logs(collection_id, 1, 10, None).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record, b"a");
    }

    /// S1: a single PushLogs of three records followed by
    /// PullLogs(c, 0, 10) returns all three, in order, starting from offset
    /// 0 -- 0 means "from the beginning", not "invalid".
    #[tokio::test]
    async fn pull_from_offset_zero_returns_everything_pushed() {
        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &LogConfig::default());
        let collection_id = CollectionUuid(Uuid::new_v4());
        service
            .push_logs(
                collection_id,
                vec![b"r1".to_vec(), b"r2".to_vec(), b"r3".to_vec()],
            )
            .await
            .unwrap();
        let records = service.pull_logs(collection_id, 0, 10, None).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].log_offset, 1);
        assert_eq!(records[0].record, b"r1");
        assert_eq!(records[1].log_offset, 2);
        assert_eq!(records[1].record, b"r2");
        assert_eq!(records[2].log_offset, 3);
        assert_eq!(records[2].record, b"r3");
    }

    #[tokio::test]
    async fn compaction_offset_advances_catalog_sink() {
        #[derive(Debug)]
        struct RecordingSink {
            last: parking_lot::Mutex<Option<(CollectionUuid, i64)>>,
        }

        #[async_trait]
        impl chroma_types::LogPositionSink for RecordingSink {
            async fn set_log_position(
                &self,
                collection_id: CollectionUuid,
                position: i64,
            ) -> Result<(), chroma_types::CatalogError> {
                *self.last.lock() = Some((collection_id, position));
                Ok(())
            }

            async fn collection_exists(
                &self,
                _collection_id: CollectionUuid,
            ) -> Result<bool, chroma_types::CatalogError> {
                Ok(true)
            }
        }

        let sink = Arc::new(RecordingSink {
            last: parking_lot::Mutex::new(None),
        });
        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &LogConfig::default())
            .with_catalog_sink(sink.clone());
        let collection_id = CollectionUuid(Uuid::new_v4());
        service
            .push_logs(collection_id, vec![b"a".to_vec()])
            .await
            .unwrap();
        service
            .update_collection_log_offset(collection_id, 1)
            .await
            .unwrap();
        assert_eq!(*sink.last.lock(), Some((collection_id, 1)));
    }

    #[tokio::test]
    async fn push_logs_rejects_unknown_collection_when_catalog_sink_present() {
        #[derive(Debug)]
        struct KnowsNoCollections;

        #[async_trait]
        impl chroma_types::LogPositionSink for KnowsNoCollections {
            async fn set_log_position(
                &self,
                _collection_id: CollectionUuid,
                _position: i64,
            ) -> Result<(), chroma_types::CatalogError> {
                Ok(())
            }

            async fn collection_exists(
                &self,
                _collection_id: CollectionUuid,
            ) -> Result<bool, chroma_types::CatalogError> {
                Ok(false)
            }
        }

        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &LogConfig::default())
            .with_catalog_sink(Arc::new(KnowsNoCollections));
        let collection_id = CollectionUuid(Uuid::new_v4());
        let err = service
            .push_logs(collection_id, vec![b"a".to_vec()])
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::NotFound(_)));
    }

    #[tokio::test]
    async fn min_compaction_size_filters_small_backlogs() {
        let config = LogConfig {
            min_compaction_size: 3,
            ..LogConfig::default()
        };
        let service = LogService::new(Arc::new(InMemoryLogStore::new()), &config);
        let collection_id = CollectionUuid(Uuid::new_v4());
        service
            .push_logs(collection_id, vec![b"a".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
        assert!(service
            .get_all_collection_info_to_compact()
            .await
            .unwrap()
            .is_empty());
        service
            .push_logs(collection_id, vec![b"c".to_vec()])
            .await
            .unwrap();
        assert_eq!(service.get_all_collection_info_to_compact().await.unwrap().len(), 1);
    }
}
