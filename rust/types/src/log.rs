use crate::errors::CatalogError;
use crate::ids::CollectionUuid;
use async_trait::async_trait;

/// A single entry returned from `PullLogs`. `record` is the opaque payload
/// exactly as it was stored by `PushLogs`; the log never inspects it.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub log_offset: i64,
    pub record: Vec<u8>,
}

/// One row of `GetAllCollectionInfoToCompact`: a collection with log entries
/// past its current compaction offset, and the offset/timestamp the
/// compactor should resume reading from.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectionInfo {
    pub collection_id: CollectionUuid,
    pub first_log_offset: i64,
    pub first_log_offset_ts: i64,
}

/// The Log Service's private bookkeeping for one collection's log.
///
/// `enumeration_offset` is the largest offset ever handed out by
/// `PushLogs`; `compaction_offset` is the largest offset the compactor has
/// acknowledged via `UpdateCollectionLogOffset`. `compaction_offset` is
/// always `<= enumeration_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CollectionLogState {
    pub enumeration_offset: i64,
    pub compaction_offset: i64,
}

impl CollectionLogState {
    pub fn has_unread_entries(&self) -> bool {
        self.enumeration_offset > self.compaction_offset
    }
}

/// The catalog-side surface `chroma-log` needs without depending on the
/// whole catalog stack: writing through `UpdateCollectionLogOffset`, and
/// checking that a collection exists before `PushLogs` accepts writes for
/// it.
///
/// Resolves the open question on which component advances the catalog's
/// `log_position` column: in this implementation the Log Service is the
/// sole writer, calling `set_log_position` immediately after it advances its
/// own `compaction_offset`. Kept as a small trait in `chroma-types` rather
/// than a direct dependency on `chroma-sysdb` so the log crate does not need
/// to depend on the whole catalog stack -- `chroma-sysdb`'s `Catalog` trait
/// implements this for its backends.
#[async_trait]
pub trait LogPositionSink: Send + Sync + std::fmt::Debug {
    async fn set_log_position(
        &self,
        collection_id: CollectionUuid,
        position: i64,
    ) -> Result<(), CatalogError>;

    /// Whether `collection_id` is a known, non-deleted collection. Used to
    /// reject `PushLogs` for a collection the catalog has never heard of.
    async fn collection_exists(&self, collection_id: CollectionUuid) -> Result<bool, CatalogError>;
}
