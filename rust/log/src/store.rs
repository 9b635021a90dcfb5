use async_trait::async_trait;

use chroma_types::{CollectionInfo, CollectionLogState, CollectionUuid, LogError, LogRecord};

/// The physical write-ahead log: append, scan, and the offset bookkeeping
/// that `LogService` builds its business logic on top of.
///
/// Implementations own ordering and durability (I1: no gaps, no duplicates,
/// no reordering of offsets within a collection) but know nothing about
/// compaction policy, batching, or the catalog -- that belongs to
/// `LogService`.
#[async_trait]
pub trait LogStore: Send + Sync + std::fmt::Debug {
    /// Appends `records` as a contiguous run of offsets starting at
    /// `enumeration_offset + 1`, and returns `(first_offset, last_offset)`.
    async fn append_batch(
        &self,
        collection_id: CollectionUuid,
        records: Vec<Vec<u8>>,
    ) -> Result<(i64, i64), LogError>;

    /// Returns up to `batch_size` records starting at `start_offset`
    /// (inclusive), stopping before any record timestamped after
    /// `end_timestamp` if one is given.
    async fn scan(
        &self,
        collection_id: CollectionUuid,
        start_offset: i64,
        batch_size: i32,
        end_timestamp: Option<i64>,
    ) -> Result<Vec<LogRecord>, LogError>;

    async fn collection_log_state(
        &self,
        collection_id: CollectionUuid,
    ) -> Result<CollectionLogState, LogError>;

    /// Advances the compaction offset. Rejects a `new_offset` the store has
    /// never enumerated to, or one that would regress an already-recorded
    /// compaction offset (I2).
    async fn set_compaction_offset(
        &self,
        collection_id: CollectionUuid,
        new_offset: i64,
    ) -> Result<(), LogError>;

    /// Physically removes log entries at or before `new_offset`. Must never
    /// be called with an offset past the collection's current compaction
    /// offset (I3); implementations are expected to enforce this rather
    /// than trust the caller.
    async fn purge_upto(&self, collection_id: CollectionUuid, new_offset: i64) -> Result<(), LogError>;

    /// Every collection this store currently tracks that has at least one
    /// entry past its compaction offset, with the offset/timestamp of the
    /// first such entry.
    async fn collections_with_unread_entries(&self) -> Result<Vec<CollectionInfo>, LogError>;

    /// Every collection this store currently tracks with a non-zero
    /// compaction offset, for the purger's sweep.
    async fn tracked_collections(&self) -> Result<Vec<CollectionUuid>, LogError>;

    /// Drops all log state for a collection. Called when the log learns
    /// (via a catalog notification) that a collection has been deleted.
    async fn forget_collection(&self, collection_id: CollectionUuid) -> Result<(), LogError>;
}
