use uuid::Uuid;

use crate::ids::CollectionUuid;
use crate::metadata::Metadata;
use chroma_error::{ChromaError, ErrorCodes};
use thiserror::Error;

/// A collection as tracked by the catalog.
///
/// `configuration` is an opaque byte blob: the catalog stores and returns it
/// verbatim and never interprets its contents (index kind, HNSW parameters,
/// and similar concerns live entirely on the caller's side of this
/// boundary).
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    pub collection_id: CollectionUuid,
    pub name: String,
    pub database_id: Uuid,
    pub tenant: String,
    pub database: String,
    pub dimension: Option<i32>,
    pub metadata: Option<Metadata>,
    pub configuration: Vec<u8>,
    /// The log partition tag computed by the assignment policy at creation
    /// time and persisted so it never has to be recomputed (and cannot
    /// drift from what the Log Service actually used).
    pub topic: String,
    /// Catalog's view of the log compaction offset for this collection. See
    /// the open question in the log offset convergence design note: this
    /// field is written exclusively by the Log Service in this
    /// implementation.
    pub log_position: i64,
    pub version: i32,
    pub is_deleted: bool,
}

#[derive(Error, Debug)]
pub enum CollectionConversionError {
    #[error("Invalid collection id")]
    InvalidUuid,
}

impl ChromaError for CollectionConversionError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}
